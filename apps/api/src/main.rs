use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use dotenv::dotenv;
use tokio::net::TcpListener;
use tokio::sync::{broadcast::error::RecvError, watch};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::{self, TraceLayer};
use tracing::{debug, info, warn, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod router;

use auth_cell::{SessionEvents, SupabaseAuthClient};
use reminder_cell::{LogNotifier, ReminderScheduler, ReminderSweep};
use shared_config::AppConfig;
use shared_database::PortalContext;

use router::ApiServices;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting MedVault API server");

    let config = Arc::new(AppConfig::from_env());
    let ctx = PortalContext::from_config(config.clone()).await;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweep = Arc::new(ReminderSweep::new(ctx.store.clone(), Arc::new(LogNotifier)));
    let scheduler = ReminderScheduler::spawn(
        sweep,
        Duration::from_secs(config.reminder_interval_secs),
        shutdown_rx,
    );

    let provider = Arc::new(SupabaseAuthClient::new(&config));
    let services = ApiServices::new(ctx, provider);
    log_session_events(services.auth.events());

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = router::create_router(services)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(trace::DefaultMakeSpan::new()
                    .level(Level::INFO))
                .on_response(trace::DefaultOnResponse::new()
                    .level(Level::INFO)),
        )
        .layer(cors);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("Listening on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = shutdown_tx.send(true);
    if let Err(e) = scheduler.await {
        warn!("Reminder scheduler ended abnormally: {}", e);
    }
    info!("MedVault API stopped");
    Ok(())
}

fn log_session_events(events: &SessionEvents) {
    let mut rx = events.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok((event, session)) => {
                    let user = session.as_ref().map(|s| s.user.id.as_str()).unwrap_or("-");
                    info!(user_id = %user, "Session event {:?}", event);
                }
                Err(RecvError::Lagged(skipped)) => debug!("Session log skipped {} events", skipped),
                Err(RecvError::Closed) => break,
            }
        }
    });
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Could not listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
