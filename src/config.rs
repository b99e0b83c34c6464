// src/config.rs
use std::time::Duration;

use clap::{Args, Parser};

/// Settings shared by the three services.
#[derive(Debug, Clone, Args)]
pub struct ServerArgs {
    /// Interface to listen on
    #[arg(long, env = "RLAPI_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Document store: `memory://` or a postgres:// URL
    #[arg(short = 'c', long = "store", env = "DATABASE_URL", default_value = "memory://")]
    pub store_url: String,

    #[arg(long, env = "DB_MAX_CONNECTIONS", default_value_t = 5)]
    pub db_max_connections: u32,

    /// Log as JSON lines instead of human readable text
    #[arg(long, env = "LOG_JSON", default_value_t = false)]
    pub log_json: bool,
}

impl ServerArgs {
    /// The store URL with any credentials removed, for logging.
    pub fn store_display(&self) -> String {
        match (self.store_url.split_once("://"), self.store_url.rsplit_once('@')) {
            (Some((scheme, _)), Some((_, host))) => format!("{scheme}://{host}"),
            _ => self.store_url.clone(),
        }
    }
}

#[derive(Debug, Clone, Parser)]
#[command(name = "votes-api", about = "Casts and retracts votes against the poll and voter services")]
pub struct VotesConfig {
    #[command(flatten)]
    pub server: ServerArgs,

    #[arg(short, long, env = "PORT", default_value_t = 1080)]
    pub port: u16,

    /// Collection URL of the poll service
    #[arg(long = "polls", env = "POLL_API_URL", default_value = "http://localhost:1082/polls")]
    pub polls_url: String,

    /// Collection URL of the voter service
    #[arg(long = "voters", env = "VOTER_API_URL", default_value = "http://localhost:1081/voters")]
    pub voters_url: String,

    /// Public base URL of this service, used in links
    #[arg(long = "self-url", env = "SELF_URL", default_value = "http://localhost:1080")]
    pub self_url: String,

    /// Per-call timeout for the poll and voter services
    #[arg(long, env = "REQUEST_TIMEOUT_MS", default_value_t = 5000)]
    pub request_timeout_ms: u64,

    /// Leave completed steps applied when a later cast/retract step fails
    #[arg(long, env = "NO_COMPENSATION", default_value_t = false)]
    pub no_compensation: bool,
}

impl VotesConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn votes_url(&self) -> String {
        format!("{}/votes", self.self_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Clone, Parser)]
#[command(name = "polls-api", about = "Stores polls and their tallies")]
pub struct PollsConfig {
    #[command(flatten)]
    pub server: ServerArgs,

    #[arg(short, long, env = "PORT", default_value_t = 1082)]
    pub port: u16,

    #[arg(long = "self-url", env = "SELF_URL", default_value = "http://localhost:1082")]
    pub self_url: String,

    #[arg(long = "votes", env = "VOTES_API_URL", default_value = "http://localhost:1080/votes")]
    pub votes_url: String,

    #[arg(long = "voters", env = "VOTER_API_URL", default_value = "http://localhost:1081/voters")]
    pub voters_url: String,
}

impl PollsConfig {
    pub fn polls_url(&self) -> String {
        format!("{}/polls", self.self_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Clone, Parser)]
#[command(name = "voters-api", about = "Stores voters and their voting history")]
pub struct VotersConfig {
    #[command(flatten)]
    pub server: ServerArgs,

    #[arg(short, long, env = "PORT", default_value_t = 1081)]
    pub port: u16,

    #[arg(long = "self-url", env = "SELF_URL", default_value = "http://localhost:1081")]
    pub self_url: String,

    #[arg(long = "votes", env = "VOTES_API_URL", default_value = "http://localhost:1080/votes")]
    pub votes_url: String,

    #[arg(long = "polls", env = "POLL_API_URL", default_value = "http://localhost:1082/polls")]
    pub polls_url: String,
}

impl VotersConfig {
    pub fn voters_url(&self) -> String {
        format!("{}/voters", self.self_url.trim_end_matches('/'))
    }
}

/// Parse flags after loading `.env`; flags win over environment variables.
pub fn load<T: Parser>() -> T {
    dotenvy::dotenv().ok();
    T::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn votes_defaults_match_the_sibling_layout() {
        let config = VotesConfig::try_parse_from(["votes-api"]).unwrap();
        assert_eq!(config.port, 1080);
        assert_eq!(config.polls_url, "http://localhost:1082/polls");
        assert_eq!(config.voters_url, "http://localhost:1081/voters");
        assert_eq!(config.votes_url(), "http://localhost:1080/votes");
        assert_eq!(config.request_timeout(), Duration::from_secs(5));
        assert!(!config.no_compensation);
    }

    #[test]
    fn flags_override_defaults() {
        let config = VotesConfig::try_parse_from([
            "votes-api",
            "-p",
            "9000",
            "--polls",
            "http://polls:1082/polls",
            "--store",
            "postgres://localhost/votes",
            "--request-timeout-ms",
            "250",
            "--no-compensation",
        ])
        .unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.polls_url, "http://polls:1082/polls");
        assert_eq!(config.server.store_url, "postgres://localhost/votes");
        assert_eq!(config.request_timeout(), Duration::from_millis(250));
        assert!(config.no_compensation);
    }

    #[test]
    fn store_display_hides_credentials() {
        let config = VotesConfig::try_parse_from([
            "votes-api",
            "--store",
            "postgres://votes:secret@db:5432/votes",
        ])
        .unwrap();
        assert_eq!(config.server.store_display(), "postgres://db:5432/votes");
    }

    #[test]
    fn store_has_a_short_flag() {
        let config =
            PollsConfig::try_parse_from(["polls-api", "-c", "postgres://db/polls"]).unwrap();
        assert_eq!(config.server.store_url, "postgres://db/polls");
        assert_eq!(config.server.store_display(), "postgres://db/polls");
    }

    #[test]
    fn sibling_services_have_their_own_ports() {
        assert_eq!(PollsConfig::try_parse_from(["polls-api"]).unwrap().port, 1082);
        let voters = VotersConfig::try_parse_from(["voters-api"]).unwrap();
        assert_eq!(voters.port, 1081);
        assert_eq!(voters.voters_url(), "http://localhost:1081/voters");
    }
}
