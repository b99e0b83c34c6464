// src/bin/polls-api.rs
use std::sync::Arc;

use poll_backend::config::{self, PollsConfig};
use poll_backend::handlers::polls::PollsState;
use poll_backend::links::LinkBuilder;
use poll_backend::metrics::HealthCounters;
use poll_backend::routes;
use poll_backend::server;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config: PollsConfig = config::load();
    server::init_tracing(config.server.log_json);
    tracing::info!(store = %config.server.store_display(), "Starting polls API");

    let store = server::open_store(&config.server).await?;
    let state = PollsState {
        store,
        links: LinkBuilder::new(&config.polls_url(), &config.voters_url, &config.votes_url),
        health: Arc::new(HealthCounters::new("Polls API")),
    };

    let app = routes::polls_routes(Arc::new(state));
    server::serve(app, &config.server.host, config.port).await
}
