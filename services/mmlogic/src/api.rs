//! Matchmaking logic API handlers
//!
//! Transport-independent implementations of the API surface. The HTTP and
//! WebSocket routes in [`crate::server`] are thin wrappers over these.

use crate::engine::{EngineSettings, PageSink, PoolEngine, PoolSummary};
use crate::error::ApiError;
use crate::observer::{MetricsSnapshot, Observer, ServiceMetrics, TracingObserver};
use mmlogic_config::MmlogicConfig;
use mmlogic_protocol::{IgnoreListQuery, MatchObject, PlayerPool, Profile, Roster, RpcResult, Timestamp};
use serde::{Deserialize, Serialize};
use state_storage::{ignorelist, ConnectionPool, Connector, PoolConfig};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Stored form of a profile's `playerPools` hash field
#[derive(Debug, Deserialize)]
struct StoredPools {
    #[serde(rename = "playerPools", default)]
    player_pools: Vec<PlayerPool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PoolStatusView {
    pub backend: String,
    pub max_size: usize,
    pub idle: usize,
    pub in_use: usize,
    pub created: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    pub service: &'static str,
    pub version: &'static str,
    pub metrics: MetricsSnapshot,
    pub store_pool: PoolStatusView,
}

pub struct MmlogicApi {
    config: Arc<MmlogicConfig>,
    pool: Arc<ConnectionPool>,
    engine: PoolEngine,
    metrics: Arc<ServiceMetrics>,
}

impl MmlogicApi {
    /// API backed by `connector`, reporting through a [`TracingObserver`]
    pub fn new(config: MmlogicConfig, connector: Arc<dyn Connector>) -> Self {
        let metrics = Arc::new(ServiceMetrics::new());
        let observer = Arc::new(TracingObserver::new(Arc::clone(&metrics)));
        Self::with_observer(config, connector, metrics, observer)
    }

    pub fn with_observer(
        config: MmlogicConfig,
        connector: Arc<dyn Connector>,
        metrics: Arc<ServiceMetrics>,
        observer: Arc<dyn Observer>,
    ) -> Self {
        let pool = ConnectionPool::new(
            connector,
            PoolConfig {
                max_size: config.storage.pool_max_size,
                acquire_timeout: config.acquire_timeout(),
            },
        );
        let engine = PoolEngine::new(Arc::clone(&pool), EngineSettings::from(&config), observer);
        Self {
            config: Arc::new(config),
            pool,
            engine,
            metrics,
        }
    }

    pub fn config(&self) -> &MmlogicConfig {
        &self.config
    }

    pub fn store_pool(&self) -> &Arc<ConnectionPool> {
        &self.pool
    }

    pub fn metrics(&self) -> &Arc<ServiceMetrics> {
        &self.metrics
    }

    /// Load a profile and decode its player pools.
    ///
    /// A profile that was never written comes back with empty properties
    /// and no pools.
    pub async fn get_profile(&self, profile_id: &str) -> Result<Profile, ApiError> {
        self.metrics.record_request("GetProfile");
        info!(profile_id, "Attempting retrieval of profile");

        let result = self.load_profile(profile_id).await;
        if let Err(e) = &result {
            self.metrics.record_request_error("GetProfile");
            error!(profile_id, error = %e, "Failed to retrieve profile");
        }
        result
    }

    async fn load_profile(&self, profile_id: &str) -> Result<Profile, ApiError> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| ApiError::store(format!("profile '{}'", profile_id), e))?;
        let mut fields = conn
            .hgetall(profile_id)
            .await
            .map_err(|e| ApiError::store(format!("profile '{}'", profile_id), e))?;
        drop(conn);

        let player_pools = match fields.remove("playerPools") {
            Some(raw) if !raw.trim().is_empty() => {
                let stored: StoredPools =
                    serde_json::from_str(&raw).map_err(|source| ApiError::ProfileDecode {
                        profile_id: profile_id.to_string(),
                        source,
                    })?;
                stored.player_pools
            }
            _ => Vec::new(),
        };
        debug!(profile_id, pools = player_pools.len(), "Retrieved profile from state storage");

        Ok(Profile {
            id: profile_id.to_string(),
            properties: fields.remove("properties").unwrap_or_default(),
            player_pools,
        })
    }

    /// Record a proposal: its players join the proposal ignore list, its
    /// properties are stored under its id and the id is queued.
    pub async fn create_proposal(&self, proposal: &MatchObject) -> Result<RpcResult, ApiError> {
        self.metrics.record_request("CreateProposal");
        info!(proposal_id = %proposal.id, "Attempting to create proposal");

        let result = self.write_proposal(proposal).await;
        if let Err(e) = &result {
            self.metrics.record_request_error("CreateProposal");
            error!(proposal_id = %proposal.id, error = %e, "Failed to create proposal");
        }
        result.map(|()| RpcResult::ok())
    }

    async fn write_proposal(&self, proposal: &MatchObject) -> Result<(), ApiError> {
        if proposal.id.is_empty() {
            return Err(ApiError::BadRequest("proposal id is required".to_string()));
        }
        let list = self.proposal_list()?;
        let queue = &self.config.proposals.queue;
        let player_ids = proposal.player_ids();

        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| ApiError::store(format!("proposal '{}'", proposal.id), e))?;

        let now = chrono::Utc::now().timestamp();
        ignorelist::add(&mut *conn, &list.key, &player_ids, now)
            .await
            .map_err(|e| ApiError::store(format!("ignore list '{}'", list.name), e))?;
        conn.set(&proposal.id, &proposal.properties)
            .await
            .map_err(|e| ApiError::store(format!("proposal '{}'", proposal.id), e))?;
        conn.sadd(queue, &proposal.id)
            .await
            .map_err(|e| ApiError::store(format!("proposal queue '{}'", queue), e))?;

        info!(
            proposal_id = %proposal.id,
            players = player_ids.len(),
            queue = %queue,
            "Proposal written"
        );
        Ok(())
    }

    /// Players on the proposal ignore list added at or before `older_than`
    pub async fn list_ignored_players(&self, older_than: Timestamp) -> Result<Roster, ApiError> {
        self.metrics.record_request("ListIgnoredPlayers");

        let result = async {
            let list = self.proposal_list()?;
            info!(ignore_list = %list.name, ts = older_than.ts, "Attempting to get ignore list");
            let ids = self.engine.aggregator().retrieve(list, older_than.ts).await?;
            Ok::<_, ApiError>(Roster::from_ids(ids))
        }
        .await;

        if let Err(e) = &result {
            self.metrics.record_request_error("ListIgnoredPlayers");
            error!(error = %e, "Failed to list ignored players");
        }
        result
    }

    /// Union of every configured ignore list
    pub async fn get_all_ignored_players(&self, query: IgnoreListQuery) -> Result<Roster, ApiError> {
        self.metrics.record_request("GetAllIgnoredPlayers");
        let as_of = query.as_of.unwrap_or_else(|| chrono::Utc::now().timestamp());

        match self
            .engine
            .aggregator()
            .combine(self.engine.ignore_lists(), as_of)
            .await
        {
            Ok(ignored) => Ok(Roster::from_ids(ignored)),
            Err(e) => {
                self.metrics.record_request_error("GetAllIgnoredPlayers");
                Err(e.into())
            }
        }
    }

    /// Resolve `pool` and stream its pages into `sink`, bounded by the
    /// configured request timeout
    pub async fn get_player_pool<S>(&self, pool: PlayerPool, sink: &mut S) -> Result<PoolSummary, ApiError>
    where
        S: PageSink + ?Sized,
    {
        self.metrics.record_request("GetPlayerPool");
        let pool_id = pool.id.clone();
        let timeout = self.config.request_timeout();

        let result = match tokio::time::timeout(timeout, self.engine.stream_player_pool(pool, sink)).await {
            Ok(outcome) => outcome.map_err(ApiError::from),
            Err(_) => {
                warn!(pool_id = %pool_id, timeout_secs = timeout.as_secs(), "Player pool request timed out");
                Err(ApiError::Timeout(timeout))
            }
        };

        if result.is_err() {
            self.metrics.record_request_error("GetPlayerPool");
        }
        result
    }

    pub fn status(&self) -> StatusReport {
        let stats = self.pool.stats();
        StatusReport {
            service: "mmlogic",
            version: env!("CARGO_PKG_VERSION"),
            metrics: self.metrics.snapshot(),
            store_pool: PoolStatusView {
                backend: self.pool.backend().to_string(),
                max_size: stats.max_size,
                idle: stats.idle,
                in_use: stats.in_use,
                created: stats.created,
            },
        }
    }

    /// Stop handing out store connections
    pub fn shutdown(&self) {
        info!("Closing state storage pool");
        self.pool.close();
    }

    fn proposal_list(&self) -> Result<&mmlogic_config::IgnoreListConfig, ApiError> {
        let name = &self.config.proposals.ignore_list;
        self.config
            .ignore_list(name)
            .ok_or_else(|| ApiError::UnknownIgnoreList(name.clone()))
    }
}
