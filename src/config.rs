use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::aggregation::TtlArming;
use crate::ingest::IngestConfig;
use crate::viewer::ViewerConfig;

/// Connection parameters for the backing store.
#[derive(Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// `tcp` or `unix`; for `unix` the host is the socket path.
    pub network: String,
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
    pub db: i64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            network: "tcp".to_string(),
            host: "127.0.0.1".to_string(),
            port: 6379,
            password: None,
            db: 0,
        }
    }
}

impl fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreConfig")
            .field("network", &self.network)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("password", &self.password.as_ref().map(|_| "***REDACTED***"))
            .field("db", &self.db)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub store: StoreConfig,
    pub ttl_arming: TtlArming,
    /// Upper bound on any single store round trip.
    pub store_deadline: Duration,
    pub ingest: IngestConfig,
    pub viewer: ViewerConfig,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let store_defaults = StoreConfig::default();
        let ingest_defaults = IngestConfig::default();
        let viewer_defaults = ViewerConfig::default();

        let projects = env::var("LEADERBOARD_PROJECTS")
            .ok()
            .map(|raw| parse_list(&raw))
            .filter(|list| !list.is_empty())
            .unwrap_or_else(|| ingest_defaults.projects.clone());

        Self {
            store: StoreConfig {
                network: env_or("LEADERBOARD_STORE_NETWORK", &store_defaults.network),
                host: env_or("LEADERBOARD_STORE_HOST", &store_defaults.host),
                port: env_or_parse("LEADERBOARD_STORE_PORT", store_defaults.port),
                password: env::var("LEADERBOARD_STORE_PASSWORD")
                    .ok()
                    .filter(|p| !p.is_empty()),
                db: env_or_parse("LEADERBOARD_STORE_DB", store_defaults.db),
            },
            ttl_arming: env_or_parse("LEADERBOARD_TTL_ARMING", TtlArming::default()),
            store_deadline: Duration::from_millis(env_or_parse(
                "LEADERBOARD_STORE_DEADLINE_MS",
                2_000_u64,
            )),
            ingest: IngestConfig {
                contributions: env_or_parse(
                    "LEADERBOARD_INGEST_CONTRIBUTIONS",
                    ingest_defaults.contributions,
                ),
                workers: env_or_parse("LEADERBOARD_INGEST_WORKERS", ingest_defaults.workers),
                users: env_or_parse("LEADERBOARD_INGEST_USERS", ingest_defaults.users),
                max_score: env_or_parse("LEADERBOARD_INGEST_MAX_SCORE", ingest_defaults.max_score),
                pause: Duration::from_millis(env_or_parse(
                    "LEADERBOARD_INGEST_PAUSE_MS",
                    ingest_defaults.pause.as_millis() as u64,
                )),
                max_retries: env_or_parse(
                    "LEADERBOARD_INGEST_MAX_RETRIES",
                    ingest_defaults.max_retries,
                ),
                retry_backoff: ingest_defaults.retry_backoff,
                projects: projects.clone(),
            },
            viewer: ViewerConfig {
                refresh_interval: Duration::from_millis(env_or_parse(
                    "LEADERBOARD_REFRESH_MS",
                    viewer_defaults.refresh_interval.as_millis() as u64,
                )),
                projects,
            },
        }
    }
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

pub fn env_or_parse<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    match env::var(key) {
        Ok(raw) => match raw.trim().parse::<T>() {
            Ok(v) => v,
            Err(_) => {
                tracing::warn!(key, value = %raw, "Failed to parse env var, using default");
                default
            }
        },
        Err(_) => default,
    }
}
