pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod state;

pub use handlers::*;
pub use middleware::*;
pub use routes::*;
pub use state::*;

use bot_models::BotError;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::info;

/// Binds the listener up front so a taken port fails start-up instead of a
/// background task.
pub async fn bind(bind: &str, port: u16) -> Result<TcpListener, BotError> {
    let listener = TcpListener::bind(format!("{}:{}", bind, port)).await?;
    info!("Health server listening on {}", listener.local_addr()?);
    Ok(listener)
}

/// Serves `/healthz`, `/readyz` and `/metrics` until `shutdown` flips.
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), BotError> {
    let app = create_middleware_stack(build_router(state));

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            while !*shutdown.borrow() {
                if shutdown.changed().await.is_err() {
                    break;
                }
            }
        })
        .await?;
    info!("Health server stopped");
    Ok(())
}
