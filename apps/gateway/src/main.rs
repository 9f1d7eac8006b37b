//! Process entry point: bootstrap the gateway core, mount the HTTP routes,
//! and serve (SPEC_FULL.md §6 "CLI/env surface").
//!
//! Grounded on `apps/gproxy/src/main.rs`'s bootstrap-then-serve shape, with
//! the teacher's embedded admin UI dropped — nothing in scope here serves
//! one (DESIGN.md).

use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let boot = openmux_core::bootstrap_from_env().await?;
    let app = openmux_router::router(boot.state.clone());

    let bind = format!("{}:{}", boot.global.host, boot.global.port);
    let listener = tokio::net::TcpListener::bind(&bind).await?;
    tracing::info!(%bind, "listening");
    axum::serve(listener, app).await?;
    Ok(())
}
