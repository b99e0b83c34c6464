// src/main.rs
use std::sync::Arc;

use anyhow::Context;
use poll_backend::config::{self, VotesConfig};
use poll_backend::coordinator::VoteCoordinator;
use poll_backend::handlers::votes::VotesState;
use poll_backend::links::LinkBuilder;
use poll_backend::metrics::{FanoutSink, HealthCounters, MetricsSink, TracingSink};
use poll_backend::routes;
use poll_backend::server;
use poll_backend::services::HttpAggregateClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config: VotesConfig = config::load();
    server::init_tracing(config.server.log_json);

    tracing::info!(
        store = %config.server.store_display(),
        polls = %config.polls_url,
        voters = %config.voters_url,
        compensation = !config.no_compensation,
        "Starting votes API"
    );

    let store = server::open_store(&config.server).await?;
    let remote = HttpAggregateClient::new(
        config.polls_url.clone(),
        config.voters_url.clone(),
        config.request_timeout(),
    )
    .context("Failed to build HTTP client")?;

    let health = Arc::new(HealthCounters::new("Votes API"));
    let sink = FanoutSink(vec![
        health.clone() as Arc<dyn MetricsSink>,
        Arc::new(TracingSink),
    ]);
    let links = LinkBuilder::new(&config.polls_url, &config.voters_url, &config.votes_url());

    let coordinator = VoteCoordinator::new(store, Arc::new(remote), links, Arc::new(sink))
        .with_compensation(!config.no_compensation);

    let app = routes::votes_routes(Arc::new(VotesState {
        coordinator,
        health,
    }));
    server::serve(app, &config.server.host, config.port).await
}
