use ai_quiz::{config::ServerConfig, models::Catalog, proxy::Upstream, rejections};
use anyhow::Result;
use log::{info, warn};
use std::sync::Arc;
use tokio::fs;
use warp::Filter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    pretty_env_logger::init();

    let config = ServerConfig::from_env()?;

    let catalog = match &config.catalog_path {
        Some(path) => {
            let source = fs::read_to_string(path).await?;
            Catalog::from_toml(&source)?
        }
        None => Catalog::builtin()?,
    };
    info!(
        "loaded catalog with {} subjects and {} levels",
        catalog.subject.len(),
        catalog.level.len()
    );

    let upstream = Upstream::from_config(&config);
    if !upstream.has_credential() {
        warn!("GROQ_API_KEY is not set, completion requests will fail");
    }

    let cors = warp::cors()
        .allow_origin(config.cors_origin.as_str())
        .allow_methods(vec!["GET", "POST"])
        .allow_headers(vec!["Content-Type"]);

    let server = ai_quiz::routes(upstream, Arc::new(catalog))
        .recover(rejections::handle_rejection)
        .with(cors)
        .with(warp::log("ai_quiz::http"));

    info!("listening on {}", config.bind);
    warp::serve(server).run(config.bind).await;

    Ok(())
}
