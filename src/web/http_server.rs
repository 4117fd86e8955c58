//! Read-only HTTP status endpoint (§7). The injected UI consumes this
//! instead of binding to the core's internals directly.

use crate::status::StatusBoard;
use axum::extract::State;
use axum::response::Json;
use axum::routing::get;
use axum::Router;
use log::info;
use std::sync::Arc;
use tokio::net::TcpListener;

pub async fn run_status_server(port: u16, status: Arc<StatusBoard>) -> std::io::Result<()> {
    let app = Router::new().route("/status", get(status_handler)).with_state(status);

    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr).await?;
    info!("status endpoint listening on http://{}/status", addr);
    axum::serve(listener, app).await
}

async fn status_handler(State(status): State<Arc<StatusBoard>>) -> Json<crate::status::StatusSnapshot> {
    Json(status.snapshot())
}
