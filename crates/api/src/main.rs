use anyhow::Context;

use gatehouse_api::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    gatehouse_observability::init();

    let config = Config::from_env().context("loading configuration")?;
    tracing::info!(?config, "starting gatehouse");

    let addr = config.addr.clone();
    let app = gatehouse_api::app::build_app(config).await?;

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
