use observer_call::application::{CallContext, CallController, CallHandle, CallTimeouts};
use observer_call::config::Config;
use observer_call::domain::call::{CallStatus, MediaKind, TrackKind};
use observer_call::domain::media::RemoteStreamRef;
use observer_call::domain::shared::value_objects::{StreamId, UserId};
use observer_call::infrastructure::media::SimulatedDevices;
use observer_call::infrastructure::signaling::MemorySignalingHub;
use observer_call::interface::api::{build_router, init_metrics, SignalingRelay};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = Config::load()?;

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Starting Observer Call");
    info!("Configuration loaded: {:?}", config);

    // Demo: run a call between two in-process users to verify the call core
    demo_call_lifecycle(&config).await?;

    if !config.relay.enabled {
        info!("Signaling relay disabled; exiting");
        return Ok(());
    }

    // Initialize metrics exporter
    info!("Initializing Prometheus metrics exporter");
    let prometheus_handle = match init_metrics() {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!("Metrics exporter unavailable: {}", e);
            None
        }
    };

    let relay = Arc::new(SignalingRelay::new());
    let app = build_router(relay, prometheus_handle);
    let address = format!("{}:{}", config.relay.host, config.relay.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;
    info!("Signaling relay listening on ws://{}/signaling/<user_id>", address);

    let server = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("Relay server failed: {}", e);
        }
    });

    // Keep the server running
    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");
    server.abort();

    Ok(())
}

/// Demonstrate the call lifecycle
async fn demo_call_lifecycle(config: &Config) -> anyhow::Result<()> {
    info!("=== Call Lifecycle Demo ===");

    let hub = MemorySignalingHub::new();
    let timeouts = CallTimeouts::from(&config.call);

    let spawn_user = |id: u64| -> CallHandle {
        let user = UserId::from(id);
        CallController::spawn(
            CallContext::new(user.clone()),
            timeouts,
            hub.connect(user),
            Arc::new(SimulatedDevices::new(config.devices.clone())),
        )
    };
    let alice = spawn_user(1);
    let bob = spawn_user(2);

    // Place the call
    let session_id = alice.initiate(bob.local_user().clone(), MediaKind::Video).await?;
    info!("Alice is calling Bob (session {})", session_id);

    let prompt = bob.wait_for(|v| v.show_incoming_prompt()).await?;
    info!("Bob sees: {}", prompt.status_label());

    // Answer
    bob.accept().await?;
    alice.wait_for(|v| v.status == CallStatus::Accepted).await?;

    // The media transport delivers each side's stream to the other
    for side in [&alice, &bob] {
        side.remote_media_arrived(session_id.clone(), RemoteStreamRef::new(StreamId::new()))
            .await?;
    }
    for (name, side) in [("Alice", &alice), ("Bob", &bob)] {
        let view = side.wait_for(|v| v.show_call_controls()).await?;
        info!("{}: {}", name, view.status_label());
    }

    // Mute
    alice.toggle_mute(TrackKind::Audio).await?;
    info!("Alice muted: {}", alice.view().audio_muted);

    // Hang up
    alice.end_call().await?;
    let notice = bob.wait_for(|v| v.status.is_terminal()).await?;
    info!("Bob sees: {}", notice.status_label());

    alice.shutdown().await;
    bob.shutdown().await;

    info!("=== Call Lifecycle Demo Complete ===");

    Ok(())
}
