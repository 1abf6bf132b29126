use tracing_subscriber::EnvFilter;

mod core;
mod kernel;
mod net;

const DEFAULT_FILTER: &str = "rewrite_hub=info,url_rewrite=info,actix_rewrite=info";

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER)),
        )
        .with_target(true)
        .init();

    let krn = kernel::boot().await.map_err(|err| {
        tracing::error!("failed to boot: {err}");
        std::io::Error::other(err)
    })?;
    if krn.check_only() {
        tracing::info!("configuration is valid");
        return Ok(());
    }

    krn.setup_http_adapter().run().await
}
