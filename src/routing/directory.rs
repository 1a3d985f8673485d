//! Supernode directory: refresh and liveness filtering.
//!
//! The raw list comes from a [`DirectorySource`] and is replaced wholesale on
//! every refresh; [`SupernodeDirectory::filtered`] refreshes it once it is
//! older than the cache TTL. Filtering probes every candidate concurrently under one
//! wall-clock deadline; stragglers are aborted and counted as timeouts.

use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::policy::{is_transient, RetryPolicy};
use crate::protocol::{LIVENESS_PATH, PING_PATH};
use crate::routing::cache::FilterCache;
use crate::transport::SupernodeTransport;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

/// Registration state of a supernode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SupernodeStatus {
    /// Fully active.
    Enabled,
    /// Registered and warming up.
    PreEnabled,
    /// Any other state reported by the chain.
    Other(String),
}

impl SupernodeStatus {
    /// Whether the supernode may serve requests.
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Enabled | Self::PreEnabled)
    }
}

impl<'de> Deserialize<'de> for SupernodeStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Ok(match text.as_str() {
            "ENABLED" => Self::Enabled,
            "PRE_ENABLED" => Self::PreEnabled,
            _ => Self::Other(text),
        })
    }
}

/// One entry of the supernode list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupernodeRecord {
    /// Supernode PastelID.
    #[serde(rename = "extKey")]
    pub pastelid: String,
    /// `ip:port` of the node's core service.
    #[serde(rename = "ipaddress:port")]
    pub ip_port: String,
    /// Registration state.
    #[serde(rename = "supernode_status")]
    pub status: SupernodeStatus,
    /// P2P endpoint; empty when the node advertises none.
    #[serde(rename = "extP2P", default)]
    pub ext_p2p: String,
    /// External address.
    #[serde(rename = "extAddress", default)]
    pub ext_address: String,
}

impl SupernodeRecord {
    /// Host part of `ip_port`.
    #[must_use]
    pub fn ip(&self) -> &str {
        self.ip_port
            .rsplit_once(':')
            .map_or(self.ip_port.as_str(), |(ip, _)| ip)
    }

    /// Base URL of the supernode HTTP API.
    #[must_use]
    pub fn api_url(&self, api_port: u16) -> String {
        format!("http://{}:{api_port}", self.ip())
    }

    /// Active, advertises a P2P endpoint and is not excluded.
    #[must_use]
    pub fn is_eligible(&self, excluded: &[String]) -> bool {
        self.status.is_active()
            && !self.ext_p2p.trim().is_empty()
            && !excluded.iter().any(|x| *x == self.ip_port)
    }
}

/// A supernode that passed liveness and performance probes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilteredPeer {
    /// Supernode PastelID.
    pub pastelid: String,
    /// Base URL of its HTTP API.
    pub url: String,
    /// Measured ping round trip.
    pub latency: Duration,
    /// Reported `performance_ratio_score`.
    pub performance_score: f64,
}

/// Where the raw supernode list comes from.
#[async_trait]
pub trait DirectorySource: Send + Sync {
    /// Fetch the full, unfiltered supernode list.
    async fn fetch_supernodes(&self) -> Result<Vec<SupernodeRecord>>;
}

/// Thresholds for one filter pass.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterParams {
    /// Ping deadline; slower peers are dropped.
    pub max_latency: Duration,
    /// Minimum acceptable performance score.
    pub min_performance_ratio: f64,
    /// Cap on surviving peers.
    pub max_count: usize,
    /// Wall-clock bound for the whole pass.
    pub total_timeout: Duration,
}

impl FilterParams {
    /// Thresholds from the `directory` section.
    #[must_use]
    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            max_latency: config.directory.max_latency(),
            min_performance_ratio: config.directory.min_performance_ratio,
            max_count: config.directory.max_supernodes,
            total_timeout: config.directory.total_timeout(),
        }
    }
}

/// Outcome counts of one filter pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterStats {
    /// Candidates probed.
    pub processed: usize,
    /// Dropped for failing or exceeding the ping deadline.
    pub removed_ping: usize,
    /// Dropped for a low performance score.
    pub removed_performance: usize,
    /// Dropped for a malformed or failed performance probe.
    pub removed_error: usize,
    /// Still probing when the pass deadline fired.
    pub timeouts: usize,
}

enum ProbeOutcome {
    Kept(FilteredPeer),
    Ping,
    Performance,
    Failed,
}

struct RecordSnapshot {
    records: Arc<Vec<SupernodeRecord>>,
    fetched_at: Option<Instant>,
}

/// Cached, filtered view of the supernode list.
pub struct SupernodeDirectory {
    source: Arc<dyn DirectorySource>,
    transport: Arc<dyn SupernodeTransport>,
    records: RwLock<RecordSnapshot>,
    records_ttl: Duration,
    cache: FilterCache,
    params: FilterParams,
    api_port: u16,
    excluded: Vec<String>,
    reachability_timeout: Duration,
    retry: RetryPolicy,
}

impl SupernodeDirectory {
    /// Create an empty directory; call [`Self::refresh`] or
    /// [`Self::filtered`] to populate it.
    #[must_use]
    pub fn new(
        source: Arc<dyn DirectorySource>,
        transport: Arc<dyn SupernodeTransport>,
        config: &ClientConfig,
    ) -> Self {
        Self {
            source,
            transport,
            records: RwLock::new(RecordSnapshot {
                records: Arc::new(Vec::new()),
                fetched_at: None,
            }),
            records_ttl: config.directory.cache_ttl(),
            cache: FilterCache::new(config.directory.cache_ttl()),
            params: FilterParams::from_config(config),
            api_port: config.supernode_api_port,
            excluded: config.directory.excluded_addresses.clone(),
            reachability_timeout: config.directory.reachability_timeout(),
            retry: RetryPolicy::from_config(&config.retry),
        }
    }

    /// Fetch the supernode list and keep the eligible records.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Network`] if the source stays unreachable and
    /// [`Error::NotFound`] if no record is eligible.
    pub async fn refresh(&self) -> Result<Arc<Vec<SupernodeRecord>>> {
        let fetched = self
            .retry
            .run(
                "supernode list refresh",
                |_| self.source.fetch_supernodes(),
                is_transient,
            )
            .await?;
        let total = fetched.len();
        let eligible: Vec<SupernodeRecord> = fetched
            .into_iter()
            .filter(|r| r.is_eligible(&self.excluded))
            .collect();
        if eligible.is_empty() {
            return Err(Error::NotFound(format!(
                "none of {total} listed supernodes is eligible"
            )));
        }
        info!("Supernode list refreshed: {} of {total} eligible", eligible.len());
        let eligible = Arc::new(eligible);
        *self.records.write() = RecordSnapshot {
            records: Arc::clone(&eligible),
            fetched_at: Some(Instant::now()),
        };
        Ok(eligible)
    }

    /// Records from the last refresh.
    #[must_use]
    pub fn records(&self) -> Arc<Vec<SupernodeRecord>> {
        Arc::clone(&self.records.read().records)
    }

    /// Filter the current records with the configured thresholds.
    ///
    /// The list is refreshed first when nothing has been fetched yet or the
    /// last fetch is older than the cache TTL. A failed refresh of a stale
    /// list falls back to the previous records.
    ///
    /// # Errors
    ///
    /// Returns an error if there are no records and the refresh fails.
    pub async fn filtered(&self) -> Result<Arc<Vec<FilteredPeer>>> {
        let (mut records, stale) = {
            let snapshot = self.records.read();
            let stale = !matches!(
                snapshot.fetched_at,
                Some(at) if at.elapsed() < self.records_ttl
            );
            (Arc::clone(&snapshot.records), stale)
        };
        if stale {
            match self.refresh().await {
                Ok(fresh) => records = fresh,
                Err(e) if !records.is_empty() => {
                    warn!("Supernode list refresh failed, keeping previous list: {e}");
                }
                Err(e) => return Err(e),
            }
        }
        let (peers, _) = self.filter(&records, &self.params).await;
        Ok(peers)
    }

    /// Probe `candidates` and keep those meeting `params`.
    ///
    /// Survivors keep candidate order and are capped at `params.max_count`.
    /// A cached result for the same candidates in the same order is returned
    /// without probing; its stats are all zero. Empty results are not cached.
    pub async fn filter(
        &self,
        candidates: &[SupernodeRecord],
        params: &FilterParams,
    ) -> (Arc<Vec<FilteredPeer>>, FilterStats) {
        let key = FilterCache::key(candidates, params);
        if let Some(peers) = self.cache.get(&key) {
            debug!("Returning {} cached supernodes", peers.len());
            return (peers, FilterStats::default());
        }

        let mut stats = FilterStats {
            processed: candidates.len(),
            ..FilterStats::default()
        };
        let mut probes = JoinSet::new();
        for (index, record) in candidates.iter().enumerate() {
            let transport = Arc::clone(&self.transport);
            let peer = FilteredPeer {
                pastelid: record.pastelid.clone(),
                url: record.api_url(self.api_port),
                latency: Duration::ZERO,
                performance_score: 0.0,
            };
            let params = params.clone();
            probes.spawn(async move { (index, probe(transport, peer, &params).await) });
        }

        let deadline = tokio::time::Instant::now() + params.total_timeout;
        let mut survivors = Vec::new();
        loop {
            match tokio::time::timeout_at(deadline, probes.join_next()).await {
                Ok(Some(Ok((index, outcome)))) => match outcome {
                    ProbeOutcome::Kept(peer) => survivors.push((index, peer)),
                    ProbeOutcome::Ping => stats.removed_ping += 1,
                    ProbeOutcome::Performance => stats.removed_performance += 1,
                    ProbeOutcome::Failed => stats.removed_error += 1,
                },
                Ok(Some(Err(e))) => {
                    warn!("Supernode probe task failed: {e}");
                    stats.removed_error += 1;
                }
                Ok(None) => break,
                Err(_) => {
                    stats.timeouts = probes.len();
                    probes.abort_all();
                    break;
                }
            }
        }

        survivors.sort_by_key(|(index, _)| *index);
        let peers: Vec<FilteredPeer> = survivors
            .into_iter()
            .map(|(_, peer)| peer)
            .take(params.max_count)
            .collect();
        debug!(
            "Filtered supernodes: processed {}, kept {}, removed for ping {}, performance {}, errors {}, timeouts {}",
            stats.processed,
            peers.len(),
            stats.removed_ping,
            stats.removed_performance,
            stats.removed_error,
            stats.timeouts
        );

        let peers = Arc::new(peers);
        if !peers.is_empty() {
            self.cache.insert(key, Arc::clone(&peers));
        }
        (peers, stats)
    }

    /// API base URL of a listed supernode.
    #[must_use]
    pub fn url_for(&self, pastelid: &str) -> Option<String> {
        self.records
            .read()
            .records
            .iter()
            .find(|r| r.pastelid == pastelid)
            .map(|r| r.api_url(self.api_port))
    }

    /// One more liveness probe against `url`.
    pub async fn is_reachable(&self, url: &str) -> bool {
        match self
            .transport
            .ping(&format!("{url}{PING_PATH}"), self.reachability_timeout)
            .await
        {
            Ok(_) => true,
            Err(e) => {
                debug!("{url} failed reachability check: {e}");
                false
            }
        }
    }

    /// Drop cached filter results.
    pub fn invalidate(&self) {
        self.cache.clear();
    }
}

impl std::fmt::Debug for SupernodeDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupernodeDirectory")
            .field("records", &self.records.read().records.len())
            .field("cache", &self.cache)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

async fn probe(
    transport: Arc<dyn SupernodeTransport>,
    mut peer: FilteredPeer,
    params: &FilterParams,
) -> ProbeOutcome {
    let ping_url = format!("{}{PING_PATH}", peer.url);
    peer.latency = match transport.ping(&ping_url, params.max_latency).await {
        Ok(latency) if latency <= params.max_latency => latency,
        Ok(latency) => {
            trace!("{} too slow: {latency:?}", peer.url);
            return ProbeOutcome::Ping;
        }
        Err(e) => {
            trace!("{} failed ping: {e}", peer.url);
            return ProbeOutcome::Ping;
        }
    };

    let liveness_url = format!("{}{LIVENESS_PATH}", peer.url);
    let score = match transport.get_json(&liveness_url, params.max_latency).await {
        Ok(body) => body.get("performance_ratio_score").and_then(Value::as_f64),
        Err(e) => {
            trace!("{} failed performance probe: {e}", peer.url);
            None
        }
    };
    match score {
        None => ProbeOutcome::Failed,
        Some(score) if score < params.min_performance_ratio => ProbeOutcome::Performance,
        Some(score) => {
            peer.performance_score = score;
            ProbeOutcome::Kept(peer)
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Clone, Copy)]
    enum Behaviour {
        Healthy(f64),
        Slow,
        Down,
        Hang,
        NoScore,
    }

    #[derive(Default)]
    struct ScriptedTransport {
        hosts: Mutex<HashMap<String, Behaviour>>,
        pings: AtomicUsize,
    }

    impl ScriptedTransport {
        fn with(hosts: &[(&str, Behaviour)]) -> Arc<Self> {
            let t = Self::default();
            for (ip, b) in hosts {
                t.hosts.lock().insert(format!("http://{ip}:7123"), *b);
            }
            Arc::new(t)
        }

        fn behaviour(&self, url: &str) -> Behaviour {
            let base = url.rsplit_once('/').map_or(url, |(b, _)| b);
            self.hosts.lock().get(base).copied().unwrap_or(Behaviour::Down)
        }
    }

    #[async_trait]
    impl SupernodeTransport for ScriptedTransport {
        async fn ping(&self, url: &str, _timeout: Duration) -> Result<Duration> {
            self.pings.fetch_add(1, Ordering::SeqCst);
            match self.behaviour(url) {
                Behaviour::Healthy(_) | Behaviour::NoScore => Ok(Duration::from_millis(10)),
                Behaviour::Slow => Ok(Duration::from_millis(900)),
                Behaviour::Down => Err(Error::Network("refused".into())),
                Behaviour::Hang => {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    Ok(Duration::from_secs(30))
                }
            }
        }

        async fn get_json(&self, url: &str, _timeout: Duration) -> Result<Value> {
            match self.behaviour(url) {
                Behaviour::Healthy(score) => Ok(json!({"performance_ratio_score": score})),
                _ => Ok(json!({"status": "alive"})),
            }
        }

        async fn post_json(&self, _url: &str, _body: &Value, _timeout: Duration) -> Result<Value> {
            Err(Error::Network("unused".into()))
        }
    }

    struct FixedSource(Vec<SupernodeRecord>);

    #[async_trait]
    impl DirectorySource for FixedSource {
        async fn fetch_supernodes(&self) -> Result<Vec<SupernodeRecord>> {
            Ok(self.0.clone())
        }
    }

    #[derive(Default)]
    struct SwitchableSource {
        records: Mutex<Vec<SupernodeRecord>>,
        down: std::sync::atomic::AtomicBool,
    }

    impl SwitchableSource {
        fn serve(&self, records: Vec<SupernodeRecord>) {
            *self.records.lock() = records;
        }
    }

    #[async_trait]
    impl DirectorySource for SwitchableSource {
        async fn fetch_supernodes(&self) -> Result<Vec<SupernodeRecord>> {
            if self.down.load(Ordering::SeqCst) {
                return Err(Error::Network("list endpoint unreachable".into()));
            }
            Ok(self.records.lock().clone())
        }
    }

    fn record(id: &str, ip: &str, status: SupernodeStatus) -> SupernodeRecord {
        SupernodeRecord {
            pastelid: id.to_string(),
            ip_port: format!("{ip}:9933"),
            status,
            ext_p2p: format!("{ip}:9934"),
            ext_address: String::new(),
        }
    }

    fn directory(
        records: Vec<SupernodeRecord>,
        transport: Arc<ScriptedTransport>,
    ) -> SupernodeDirectory {
        let mut config = ClientConfig::default();
        config.directory.excluded_addresses = vec!["10.0.0.99:9933".to_string()];
        SupernodeDirectory::new(Arc::new(FixedSource(records)), transport, &config)
    }

    #[test]
    fn test_record_parses_list_entry() {
        let record: SupernodeRecord = serde_json::from_value(json!({
            "extKey": "jXabc",
            "ipaddress:port": "149.56.1.2:9933",
            "supernode_status": "PRE_ENABLED",
            "extP2P": "149.56.1.2:9934",
            "rank": 3,
        }))
        .unwrap();
        assert_eq!(record.status, SupernodeStatus::PreEnabled);
        assert_eq!(record.api_url(7123), "http://149.56.1.2:7123");
        assert!(record.is_eligible(&[]));
    }

    #[tokio::test]
    async fn test_refresh_keeps_only_eligible_records() {
        let mut no_p2p = record("d", "10.0.0.4", SupernodeStatus::Enabled);
        no_p2p.ext_p2p.clear();
        let records = vec![
            record("a", "10.0.0.1", SupernodeStatus::Enabled),
            record("b", "10.0.0.2", SupernodeStatus::PreEnabled),
            record("c", "10.0.0.3", SupernodeStatus::Other("EXPIRED".into())),
            no_p2p,
            record("e", "10.0.0.99", SupernodeStatus::Enabled),
        ];
        let dir = directory(records, ScriptedTransport::with(&[]));
        let kept = dir.refresh().await.unwrap();
        let ids: Vec<&str> = kept.iter().map(|r| r.pastelid.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(dir.url_for("b").as_deref(), Some("http://10.0.0.2:7123"));
        assert!(dir.url_for("c").is_none());
    }

    #[tokio::test]
    async fn test_refresh_with_nothing_eligible_is_not_found() {
        let dir = directory(
            vec![record("c", "10.0.0.3", SupernodeStatus::Other("NEW".into()))],
            ScriptedTransport::with(&[]),
        );
        assert!(matches!(dir.refresh().await, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_filter_drops_slow_weak_and_broken_peers() {
        let transport = ScriptedTransport::with(&[
            ("10.0.0.1", Behaviour::Healthy(0.9)),
            ("10.0.0.2", Behaviour::Slow),
            ("10.0.0.3", Behaviour::Healthy(0.5)),
            ("10.0.0.4", Behaviour::NoScore),
            ("10.0.0.5", Behaviour::Healthy(1.0)),
        ]);
        let records: Vec<_> = (1..=6)
            .map(|i| record(&format!("sn{i}"), &format!("10.0.0.{i}"), SupernodeStatus::Enabled))
            .collect();
        let dir = directory(records.clone(), transport);
        let params = FilterParams::from_config(&ClientConfig::default());

        let (peers, stats) = dir.filter(&records, &params).await;
        let ids: Vec<&str> = peers.iter().map(|p| p.pastelid.as_str()).collect();
        assert_eq!(ids, vec!["sn1", "sn5"]);
        assert_eq!(stats.processed, 6);
        assert_eq!(stats.removed_ping, 2);
        assert_eq!(stats.removed_performance, 1);
        assert_eq!(stats.removed_error, 1);
    }

    #[tokio::test]
    async fn test_filter_respects_cap_and_cache() {
        let hosts: Vec<(String, Behaviour)> = (1..=5)
            .map(|i| (format!("10.0.0.{i}"), Behaviour::Healthy(1.0)))
            .collect();
        let host_refs: Vec<(&str, Behaviour)> =
            hosts.iter().map(|(h, b)| (h.as_str(), *b)).collect();
        let transport = ScriptedTransport::with(&host_refs);
        let records: Vec<_> = (1..=5)
            .map(|i| record(&format!("sn{i}"), &format!("10.0.0.{i}"), SupernodeStatus::Enabled))
            .collect();
        let dir = directory(records.clone(), Arc::clone(&transport));
        let mut params = FilterParams::from_config(&ClientConfig::default());
        params.max_count = 3;

        let (first, _) = dir.filter(&records, &params).await;
        assert_eq!(first.len(), 3);
        let pings = transport.pings.load(Ordering::SeqCst);

        let (second, stats) = dir.filter(&records, &params).await;
        assert_eq!(first, second);
        assert_eq!(stats, FilterStats::default());
        assert_eq!(transport.pings.load(Ordering::SeqCst), pings);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stragglers_are_aborted_at_deadline() {
        let transport = ScriptedTransport::with(&[
            ("10.0.0.1", Behaviour::Healthy(1.0)),
            ("10.0.0.2", Behaviour::Hang),
        ]);
        let records = vec![
            record("sn1", "10.0.0.1", SupernodeStatus::Enabled),
            record("sn2", "10.0.0.2", SupernodeStatus::Enabled),
        ];
        let dir = directory(records.clone(), transport);
        let params = FilterParams::from_config(&ClientConfig::default());

        let (peers, stats) = dir.filter(&records, &params).await;
        assert_eq!(peers.len(), 1);
        assert_eq!(stats.timeouts, 1);
    }

    fn ids(peers: &[FilteredPeer]) -> Vec<&str> {
        peers.iter().map(|p| p.pastelid.as_str()).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_list_is_refetched() {
        let transport = ScriptedTransport::with(&[
            ("10.0.0.1", Behaviour::Healthy(1.0)),
            ("10.0.0.2", Behaviour::Healthy(1.0)),
        ]);
        let source = Arc::new(SwitchableSource::default());
        source.serve(vec![record("old", "10.0.0.1", SupernodeStatus::Enabled)]);
        let dir = SupernodeDirectory::new(
            Arc::clone(&source) as Arc<dyn DirectorySource>,
            transport,
            &ClientConfig::default(),
        );

        assert_eq!(ids(&dir.filtered().await.unwrap()), vec!["old"]);

        source.serve(vec![record("new", "10.0.0.2", SupernodeStatus::Enabled)]);
        assert_eq!(ids(&dir.filtered().await.unwrap()), vec!["old"]);

        tokio::time::advance(Duration::from_secs(3600)).await;
        assert_eq!(ids(&dir.filtered().await.unwrap()), vec!["new"]);
        assert_eq!(dir.url_for("new").as_deref(), Some("http://10.0.0.2:7123"));
        assert!(dir.url_for("old").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_refresh_keeps_previous_list() {
        let transport = ScriptedTransport::with(&[("10.0.0.1", Behaviour::Healthy(1.0))]);
        let source = Arc::new(SwitchableSource::default());
        source.serve(vec![record("sn1", "10.0.0.1", SupernodeStatus::Enabled)]);
        let dir = SupernodeDirectory::new(
            Arc::clone(&source) as Arc<dyn DirectorySource>,
            transport,
            &ClientConfig::default(),
        );
        assert_eq!(ids(&dir.filtered().await.unwrap()), vec!["sn1"]);

        source.down.store(true, Ordering::SeqCst);
        tokio::time::advance(Duration::from_secs(3600)).await;
        assert_eq!(ids(&dir.filtered().await.unwrap()), vec!["sn1"]);
    }

    #[tokio::test]
    async fn test_first_refresh_failure_is_an_error() {
        let source = Arc::new(SwitchableSource::default());
        source.down.store(true, Ordering::SeqCst);
        let mut config = ClientConfig::default();
        config.retry.initial_backoff_ms = 1;
        config.retry.max_backoff_ms = 2;
        let dir = SupernodeDirectory::new(source, ScriptedTransport::with(&[]), &config);
        assert!(matches!(dir.filtered().await, Err(Error::Network(_))));
    }

    #[tokio::test]
    async fn test_empty_pass_is_not_cached() {
        let transport = ScriptedTransport::with(&[("10.0.0.1", Behaviour::Down)]);
        let records = vec![record("sn1", "10.0.0.1", SupernodeStatus::Enabled)];
        let dir = directory(records.clone(), Arc::clone(&transport));
        let params = FilterParams::from_config(&ClientConfig::default());

        let (peers, _) = dir.filter(&records, &params).await;
        assert!(peers.is_empty());

        transport
            .hosts
            .lock()
            .insert("http://10.0.0.1:7123".to_string(), Behaviour::Healthy(1.0));
        let (peers, stats) = dir.filter(&records, &params).await;
        assert_eq!(ids(&peers), vec!["sn1"]);
        assert_eq!(stats.processed, 1);
    }

    #[tokio::test]
    async fn test_reordered_candidates_keep_their_order() {
        let transport = ScriptedTransport::with(&[
            ("10.0.0.1", Behaviour::Healthy(1.0)),
            ("10.0.0.2", Behaviour::Healthy(1.0)),
        ]);
        let forward = vec![
            record("sn1", "10.0.0.1", SupernodeStatus::Enabled),
            record("sn2", "10.0.0.2", SupernodeStatus::Enabled),
        ];
        let backward: Vec<_> = forward.iter().rev().cloned().collect();
        let dir = directory(forward.clone(), transport);
        let params = FilterParams::from_config(&ClientConfig::default());

        let (first, _) = dir.filter(&forward, &params).await;
        let (second, _) = dir.filter(&backward, &params).await;
        assert_eq!(ids(&first), vec!["sn1", "sn2"]);
        assert_eq!(ids(&second), vec!["sn2", "sn1"]);
    }
}
