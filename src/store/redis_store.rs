use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, ConnectionAddr, ConnectionInfo, RedisConnectionInfo};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, instrument};

use super::{LeaderboardStore, StoreError};
use crate::config::StoreConfig;

/// Redis-backed store. Cloning shares one multiplexed connection, so a single
/// handle can be passed to every worker and to the reader.
#[derive(Clone)]
pub struct RedisStore {
    connection: ConnectionManager,
}

impl RedisStore {
    #[instrument(skip(config), fields(network = %config.network, host = %config.host, db = config.db))]
    pub async fn connect(config: &StoreConfig) -> Result<Self, StoreError> {
        let client = redis::Client::open(connection_info(config)?)?;
        let connection = client.get_connection_manager().await?;
        info!("Connected to redis");
        Ok(Self { connection })
    }
}

/// Translates connection parameters into redis connection info.
pub fn connection_info(config: &StoreConfig) -> Result<ConnectionInfo, StoreError> {
    let addr = match config.network.as_str() {
        "tcp" => ConnectionAddr::Tcp(config.host.clone(), config.port),
        "unix" => ConnectionAddr::Unix(PathBuf::from(&config.host)),
        other => {
            return Err(StoreError::Config(format!(
                "unsupported network '{other}', expected 'tcp' or 'unix'"
            )))
        }
    };

    Ok(ConnectionInfo {
        addr,
        redis: RedisConnectionInfo {
            db: config.db,
            password: config.password.clone(),
            ..Default::default()
        },
    })
}

fn millis(ttl: Duration) -> u64 {
    (ttl.as_millis() as u64).max(1)
}

#[async_trait]
impl LeaderboardStore for RedisStore {
    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        let mut con = self.connection.clone();
        let exists: bool = con.exists(key).await?;
        Ok(exists)
    }

    #[instrument(skip(self))]
    async fn incr_sorted_set(
        &self,
        key: &str,
        member: &str,
        delta: f64,
    ) -> Result<f64, StoreError> {
        let mut con = self.connection.clone();
        let score: f64 = con.zincr(key, member, delta).await?;
        debug!(score, "ZINCRBY");
        Ok(score)
    }

    #[instrument(skip(self, fields))]
    async fn set_hash_fields(
        &self,
        key: &str,
        fields: &[(&str, String)],
    ) -> Result<(), StoreError> {
        let mut con = self.connection.clone();
        con.hset_multiple::<_, _, _, ()>(key, fields).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        let mut con = self.connection.clone();
        let armed: bool = redis::cmd("PEXPIRE")
            .arg(key)
            .arg(millis(ttl))
            .query_async(&mut con)
            .await?;
        Ok(armed)
    }

    /// `PEXPIRE key ms NX` (Redis 7+): one server-side step, so concurrent
    /// first writers cannot both arm.
    #[instrument(skip(self))]
    async fn expire_if_unset(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        let mut con = self.connection.clone();
        let armed: bool = redis::cmd("PEXPIRE")
            .arg(key)
            .arg(millis(ttl))
            .arg("NX")
            .query_async(&mut con)
            .await?;
        debug!(armed, "PEXPIRE NX");
        Ok(armed)
    }

    #[instrument(skip(self))]
    async fn range_sorted_set_desc(&self, key: &str) -> Result<Vec<(String, f64)>, StoreError> {
        let mut con = self.connection.clone();
        let ranked: Vec<(String, f64)> = con.zrevrange_withscores(key, 0, -1).await?;
        Ok(ranked)
    }

    async fn hash_fields(&self, key: &str) -> Result<HashMap<String, String>, StoreError> {
        let mut con = self.connection.clone();
        let fields: HashMap<String, String> = con.hgetall(key).await?;
        Ok(fields)
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError> {
        let mut con = self.connection.clone();
        // -2: missing key, -1: no expiry
        let remaining: i64 = redis::cmd("PTTL").arg(key).query_async(&mut con).await?;
        Ok(u64::try_from(remaining).ok().map(Duration::from_millis))
    }
}
