//! Image similarity search API - entry point

#[tokio::main]
async fn main() -> eyre::Result<()> {
    // Before any fallible operation so startup errors are rendered
    core_config::tracing::install_color_eyre();

    imgsearch_api::run().await
}
