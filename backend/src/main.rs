use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::prelude::__tracing_subscriber_SubscriberExt;

use backend::ranks::{MemoryLeaderboards, RankEngine};
use backend::validation::{RunValidator, ValidatorConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = backend::config::Config::parse();

    let level = config.log_level;
    let registry = tracing_subscriber::Registry::default()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::filter::filter_fn(move |meta| {
            let target = meta.target();
            let ours = ["backend", "analysis", "common", "tower_http"]
                .iter()
                .any(|name| target.starts_with(name));
            ours && *meta.level() <= level
        }));
    tracing::subscriber::set_global_default(registry)?;

    tracing::info!("Starting...");

    let maps = Arc::new(backend::maps::MapCatalog::load(&config.map_catalog).await?);

    if !tokio::fs::try_exists(&config.upload_folder).await.unwrap_or(false) {
        tokio::fs::create_dir_all(&config.upload_folder).await?;
    }

    let sessions = Arc::new(backend::session::RunSessions::new());
    tokio::spawn(backend::gc::gc_loop(
        sessions.clone(),
        config.session_sweep_interval(),
        config.session_idle_timeout(),
    ));

    let validator = RunValidator::new(ValidatorConfig {
        allowed_gamemodes: config.allowed_gamemodes(),
        ..Default::default()
    });
    let ranks = RankEngine::new(
        Arc::new(MemoryLeaderboards::new()),
        Arc::new(backend::xp::DefaultXpFormula::default()),
    )
    .with_max_attempts(config.max_commit_attempts);
    let storage = backend::storage::FileStorage::new(config.upload_folder.clone());

    let submissions = Arc::new(backend::submission::RunSubmissions::new(
        sessions.clone(),
        maps.clone(),
        validator,
        Box::new(storage),
        ranks,
    ));

    let state = Arc::new(backend::api::ApiState {
        sessions,
        maps,
        submissions,
        max_replay_size: config.max_replay_size,
    });

    let router = axum::Router::new()
        .nest("/api", backend::api::router(state))
        .layer(tower_http::trace::TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(config.listen).await?;
    tracing::info!("Listening on {}", config.listen);
    axum::serve(listener, router).await?;

    Ok(())
}
