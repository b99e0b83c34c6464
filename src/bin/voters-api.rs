// src/bin/voters-api.rs
use std::sync::Arc;

use poll_backend::config::{self, VotersConfig};
use poll_backend::handlers::voters::VotersState;
use poll_backend::links::LinkBuilder;
use poll_backend::metrics::HealthCounters;
use poll_backend::routes;
use poll_backend::server;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config: VotersConfig = config::load();
    server::init_tracing(config.server.log_json);
    tracing::info!(store = %config.server.store_display(), "Starting voters API");

    let store = server::open_store(&config.server).await?;
    let state = VotersState {
        store,
        links: LinkBuilder::new(&config.polls_url, &config.voters_url(), &config.votes_url),
        health: Arc::new(HealthCounters::new("Voters API")),
    };

    let app = routes::voters_routes(Arc::new(state));
    server::serve(app, &config.server.host, config.port).await
}
