//! Provider selection and health tracking.
//!
//! [`LoadBalancer`] owns an ordered set of providers, each with a health
//! record. Selection skips providers marked unavailable; a periodic probe
//! ([`LoadBalancer::run_health_checks`]) flips availability on state
//! transitions only.
//!
//! When every provider is unavailable the balancer still hands out the
//! first one (logging a warning) so that tasks fail with a concrete
//! provider error instead of hanging in the queue.

use std::str::FromStr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use renderq_core::dispatch::{HEALTH_CHECK_INTERVAL, PROBE_TIMEOUT};
use renderq_core::types::{DbId, Timestamp};
use serde::Serialize;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::provider::{call_with_deadline, ImageProvider, ProviderError};

/// Stable identifier of a provider entry. Unlike its index, it survives
/// membership changes, so probe results land on the right entry.
pub type ProviderId = u64;

// ---------------------------------------------------------------------------
// Strategy
// ---------------------------------------------------------------------------

/// How the balancer picks a provider for a task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BalanceStrategy {
    /// Rotate through available providers.
    #[default]
    RoundRobin,
    /// Pin each owner to `owner_id mod N`, falling back to round-robin when
    /// that provider is unavailable.
    UserAffinity,
}

impl FromStr for BalanceStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "round-robin" | "round_robin" => Ok(Self::RoundRobin),
            "user-hash" | "user-affinity" | "user_affinity" => Ok(Self::UserAffinity),
            other => Err(format!(
                "unknown balance strategy '{other}' (expected 'round-robin' or 'user-hash')"
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Health record for one provider.
#[derive(Debug, Clone, Default)]
pub struct ProviderHealth {
    pub available: bool,
    pub last_checked: Option<Timestamp>,
    pub last_error: Option<String>,
}

struct ProviderEntry {
    id: ProviderId,
    provider: Arc<dyn ImageProvider>,
    health: ProviderHealth,
}

/// The provider chosen for one task.
#[derive(Clone)]
pub struct SelectedProvider {
    pub id: ProviderId,
    pub index: usize,
    pub provider: Arc<dyn ImageProvider>,
}

/// Per-provider row in [`BalancerStats`].
#[derive(Debug, Clone, Serialize)]
pub struct ProviderStatus {
    pub id: ProviderId,
    pub name: String,
    pub available: bool,
    pub last_checked: Option<Timestamp>,
    pub last_error: Option<String>,
}

/// Snapshot of balancer state for the stats endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct BalancerStats {
    pub strategy: BalanceStrategy,
    pub total: usize,
    pub available: usize,
    /// Raw round-robin cursor (not reduced modulo `total`).
    pub next_index: usize,
    pub providers: Vec<ProviderStatus>,
}

// ---------------------------------------------------------------------------
// LoadBalancer
// ---------------------------------------------------------------------------

/// Picks a provider per task and tracks provider health.
///
/// Shared as `Arc<LoadBalancer>` between the worker pool, the health
/// checker, and request handlers.
pub struct LoadBalancer {
    entries: RwLock<Vec<ProviderEntry>>,
    next_index: AtomicUsize,
    next_id: AtomicU64,
    strategy: BalanceStrategy,
    probe_timeout: Duration,
    check_interval: Duration,
}

impl LoadBalancer {
    /// Build a balancer over `providers`, all initially available.
    pub fn new(providers: Vec<Arc<dyn ImageProvider>>, strategy: BalanceStrategy) -> Self {
        let next_id = AtomicU64::new(0);
        let entries = providers
            .into_iter()
            .map(|provider| ProviderEntry {
                id: next_id.fetch_add(1, Ordering::Relaxed),
                provider,
                health: ProviderHealth {
                    available: true,
                    ..Default::default()
                },
            })
            .collect();

        Self {
            entries: RwLock::new(entries),
            next_index: AtomicUsize::new(0),
            next_id,
            strategy,
            probe_timeout: PROBE_TIMEOUT,
            check_interval: HEALTH_CHECK_INTERVAL,
        }
    }

    /// Override the per-probe deadline and the interval between probe
    /// rounds.
    pub fn with_health_timing(mut self, probe_timeout: Duration, check_interval: Duration) -> Self {
        self.probe_timeout = probe_timeout;
        self.check_interval = check_interval;
        self
    }

    pub fn strategy(&self) -> BalanceStrategy {
        self.strategy
    }

    /// Choose a provider for a task owned by `owner_id`.
    ///
    /// Returns `None` only when the balancer has no providers at all.
    pub async fn select(&self, owner_id: DbId) -> Option<SelectedProvider> {
        let entries = self.entries.read().await;
        if entries.is_empty() {
            return None;
        }

        if self.strategy == BalanceStrategy::UserAffinity {
            let index = (owner_id.unsigned_abs() % entries.len() as u64) as usize;
            if entries[index].health.available {
                return Some(Self::selected(&entries, index));
            }
            tracing::debug!(
                owner_id,
                index,
                "Affinity provider unavailable, falling back to round-robin",
            );
        }

        Some(self.pick_round_robin(&entries))
    }

    /// Next available provider in rotation, ignoring any affinity.
    pub async fn next_round_robin(&self) -> Option<SelectedProvider> {
        let entries = self.entries.read().await;
        if entries.is_empty() {
            return None;
        }
        Some(self.pick_round_robin(&entries))
    }

    /// Append a provider (initially available) and return its ID.
    pub async fn add(&self, provider: Arc<dyn ImageProvider>) -> ProviderId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let name = provider.name().to_string();
        self.entries.write().await.push(ProviderEntry {
            id,
            provider,
            health: ProviderHealth {
                available: true,
                ..Default::default()
            },
        });
        tracing::info!(provider_id = id, provider = %name, "Provider added");
        id
    }

    /// Remove the provider at `index`. Out-of-range indices are a no-op
    /// returning `None`.
    pub async fn remove(&self, index: usize) -> Option<ProviderId> {
        let mut entries = self.entries.write().await;
        if index >= entries.len() {
            return None;
        }
        let removed = entries.remove(index);
        tracing::info!(
            provider_id = removed.id,
            provider = %removed.provider.name(),
            "Provider removed",
        );
        Some(removed.id)
    }

    /// Probe every provider once, concurrently, and apply the results.
    ///
    /// The entry lock is not held while probes are in flight.
    pub async fn probe_all(&self) {
        let targets: Vec<(ProviderId, Arc<dyn ImageProvider>)> = self
            .entries
            .read()
            .await
            .iter()
            .map(|e| (e.id, Arc::clone(&e.provider)))
            .collect();

        let timeout = self.probe_timeout;
        let results = join_all(targets.into_iter().map(|(id, provider)| async move {
            let outcome = call_with_deadline(timeout, provider.ping(timeout)).await;
            (id, outcome)
        }))
        .await;

        let mut entries = self.entries.write().await;
        for (id, outcome) in results {
            // Removed while the probe was in flight.
            let Some(entry) = entries.iter_mut().find(|e| e.id == id) else {
                continue;
            };
            Self::record_probe(entry, outcome);
        }
    }

    /// Run [`probe_all`](Self::probe_all) on a fixed interval until
    /// `cancel` fires. The first round runs one interval after start.
    pub async fn run_health_checks(self: Arc<Self>, cancel: CancellationToken) {
        let period = self.check_interval;
        let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);

        tracing::info!(interval_secs = period.as_secs(), "Provider health checker started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Provider health checker stopping");
                    break;
                }
                _ = interval.tick() => {
                    self.probe_all().await;
                }
            }
        }
    }

    /// Counts and per-provider health.
    pub async fn stats(&self) -> BalancerStats {
        let entries = self.entries.read().await;
        let providers: Vec<ProviderStatus> = entries
            .iter()
            .map(|e| ProviderStatus {
                id: e.id,
                name: e.provider.name().to_string(),
                available: e.health.available,
                last_checked: e.health.last_checked,
                last_error: e.health.last_error.clone(),
            })
            .collect();

        BalancerStats {
            strategy: self.strategy,
            total: providers.len(),
            available: providers.iter().filter(|p| p.available).count(),
            next_index: self.next_index.load(Ordering::Relaxed),
            providers,
        }
    }

    // ---- private helpers ----

    /// Rotate through at most one full cycle looking for an available
    /// provider; degrade to the first entry if none is. `entries` must be
    /// non-empty.
    fn pick_round_robin(&self, entries: &[ProviderEntry]) -> SelectedProvider {
        let n = entries.len();
        for _ in 0..n {
            let index = self.next_index.fetch_add(1, Ordering::Relaxed) % n;
            if entries[index].health.available {
                return Self::selected(entries, index);
            }
        }

        tracing::warn!(
            provider = %entries[0].provider.name(),
            total = n,
            "No available providers, using first provider",
        );
        Self::selected(entries, 0)
    }

    fn selected(entries: &[ProviderEntry], index: usize) -> SelectedProvider {
        SelectedProvider {
            id: entries[index].id,
            index,
            provider: Arc::clone(&entries[index].provider),
        }
    }

    fn record_probe(entry: &mut ProviderEntry, outcome: Result<(), ProviderError>) {
        entry.health.last_checked = Some(Utc::now());
        match outcome {
            Ok(()) => {
                entry.health.last_error = None;
                if !entry.health.available {
                    entry.health.available = true;
                    tracing::info!(
                        provider_id = entry.id,
                        provider = %entry.provider.name(),
                        "Provider is available again",
                    );
                }
            }
            Err(e) => {
                entry.health.last_error = Some(e.to_string());
                if entry.health.available {
                    entry.health.available = false;
                    tracing::warn!(
                        provider_id = entry.id,
                        provider = %entry.provider.name(),
                        error = %e,
                        "Provider marked unavailable",
                    );
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::AtomicBool;

    use assert_matches::assert_matches;
    use async_trait::async_trait;

    use super::*;
    use crate::provider::{GeneratedImage, GenerationRequest};

    /// Provider whose readiness is toggled by the test.
    struct StubProvider {
        name: String,
        ready: AtomicBool,
        ping_delay: Duration,
    }

    impl StubProvider {
        fn ready(name: &str) -> Arc<Self> {
            Self::slow(name, Duration::ZERO)
        }

        fn hanging(name: &str) -> Arc<Self> {
            Self::slow(name, Duration::from_secs(60))
        }

        fn slow(name: &str, ping_delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                name: name.into(),
                ready: AtomicBool::new(true),
                ping_delay,
            })
        }

        fn set_ready(&self, ready: bool) {
            self.ready.store(ready, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl ImageProvider for StubProvider {
        fn name(&self) -> &str {
            &self.name
        }

        async fn ping(&self, _timeout: Duration) -> Result<(), ProviderError> {
            tokio::time::sleep(self.ping_delay).await;
            if self.ready.load(Ordering::SeqCst) {
                Ok(())
            } else {
                Err(ProviderError::NotReady("stub offline".into()))
            }
        }

        async fn generate(
            &self,
            request: &GenerationRequest,
            _timeout: Duration,
        ) -> Result<GeneratedImage, ProviderError> {
            Ok(GeneratedImage {
                data: request.prompt.as_bytes().to_vec(),
                mime_type: "image/png".into(),
            })
        }
    }

    fn balancer(stubs: &[Arc<StubProvider>], strategy: BalanceStrategy) -> LoadBalancer {
        let providers = stubs
            .iter()
            .map(|s| Arc::clone(s) as Arc<dyn ImageProvider>)
            .collect();
        LoadBalancer::new(providers, strategy)
            .with_health_timing(Duration::from_millis(50), Duration::from_millis(20))
    }

    async fn pick_names(lb: &LoadBalancer, owner_id: DbId, n: usize) -> Vec<String> {
        let mut names = Vec::with_capacity(n);
        for _ in 0..n {
            let selected = lb.select(owner_id).await.unwrap();
            names.push(selected.provider.name().to_string());
        }
        names
    }

    // -- strategy parsing ---------------------------------------------------

    #[test]
    fn strategy_parses_config_values() {
        assert_eq!("round-robin".parse::<BalanceStrategy>(), Ok(BalanceStrategy::RoundRobin));
        assert_eq!("user-hash".parse::<BalanceStrategy>(), Ok(BalanceStrategy::UserAffinity));
        assert_eq!(" User-Hash ".parse::<BalanceStrategy>(), Ok(BalanceStrategy::UserAffinity));
        assert_matches!("random".parse::<BalanceStrategy>(), Err(_));
    }

    // -- selection ----------------------------------------------------------

    #[tokio::test]
    async fn empty_balancer_selects_nothing() {
        let lb = balancer(&[], BalanceStrategy::RoundRobin);
        assert!(lb.select(1).await.is_none());
        assert!(lb.next_round_robin().await.is_none());
    }

    #[tokio::test]
    async fn round_robin_visits_each_provider_once_per_cycle() {
        let stubs = [StubProvider::ready("a"), StubProvider::ready("b"), StubProvider::ready("c")];
        let lb = balancer(&stubs, BalanceStrategy::RoundRobin);

        let names = pick_names(&lb, 0, 6).await;
        assert_eq!(names, ["a", "b", "c", "a", "b", "c"]);
    }

    #[tokio::test]
    async fn round_robin_skips_unavailable_provider() {
        let stubs = [StubProvider::ready("a"), StubProvider::ready("b"), StubProvider::ready("c")];
        let lb = balancer(&stubs, BalanceStrategy::RoundRobin);

        stubs[1].set_ready(false);
        lb.probe_all().await;

        let names = pick_names(&lb, 0, 4).await;
        assert!(names.iter().all(|n| n != "b"));
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for n in &names {
            *counts.entry(n.as_str()).or_default() += 1;
        }
        assert_eq!(counts.get("a"), Some(&2));
        assert_eq!(counts.get("c"), Some(&2));
    }

    #[tokio::test]
    async fn all_unavailable_falls_back_to_first_provider() {
        let stubs = [StubProvider::ready("a"), StubProvider::ready("b")];
        let lb = balancer(&stubs, BalanceStrategy::RoundRobin);

        for s in &stubs {
            s.set_ready(false);
        }
        lb.probe_all().await;

        let selected = lb.select(9).await.unwrap();
        assert_eq!(selected.index, 0);
        assert_eq!(selected.provider.name(), "a");
    }

    #[tokio::test]
    async fn affinity_pins_owner_to_same_provider() {
        let stubs = [StubProvider::ready("a"), StubProvider::ready("b"), StubProvider::ready("c")];
        let lb = balancer(&stubs, BalanceStrategy::UserAffinity);

        // 7 mod 3 == 1
        let names = pick_names(&lb, 7, 3).await;
        assert_eq!(names, ["b", "b", "b"]);
        // Negative owners hash by magnitude.
        assert_eq!(lb.select(-7).await.unwrap().index, 1);
    }

    #[tokio::test]
    async fn affinity_falls_back_when_pinned_provider_is_down() {
        let stubs = [StubProvider::ready("a"), StubProvider::ready("b")];
        let lb = balancer(&stubs, BalanceStrategy::UserAffinity);

        stubs[1].set_ready(false);
        lb.probe_all().await;

        let selected = lb.select(1).await.unwrap();
        assert_eq!(selected.provider.name(), "a");
    }

    // -- health ---------------------------------------------------------------

    #[tokio::test]
    async fn probe_recovers_provider_after_it_comes_back() {
        let stubs = [StubProvider::ready("a")];
        let lb = balancer(&stubs, BalanceStrategy::RoundRobin);

        stubs[0].set_ready(false);
        lb.probe_all().await;
        let stats = lb.stats().await;
        assert_eq!(stats.available, 0);
        assert_eq!(stats.providers[0].last_error.as_deref(), Some("Provider not ready: stub offline"));

        stubs[0].set_ready(true);
        lb.probe_all().await;
        let stats = lb.stats().await;
        assert_eq!(stats.available, 1);
        assert!(stats.providers[0].last_error.is_none());
        assert!(stats.providers[0].last_checked.is_some());
    }

    #[tokio::test]
    async fn hanging_probe_times_out_as_unavailable() {
        let stubs = [StubProvider::ready("fast"), StubProvider::hanging("slow")];
        let lb = balancer(&stubs, BalanceStrategy::RoundRobin);

        lb.probe_all().await;

        let stats = lb.stats().await;
        assert!(stats.providers[0].available);
        assert!(!stats.providers[1].available);
    }

    #[tokio::test]
    async fn health_loop_marks_provider_down_and_stops_on_cancel() {
        let stubs = [StubProvider::ready("a")];
        let lb = Arc::new(balancer(&stubs, BalanceStrategy::RoundRobin));
        stubs[0].set_ready(false);

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(Arc::clone(&lb).run_health_checks(cancel.clone()));

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(lb.stats().await.available, 0);

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("health loop should exit after cancel")
            .unwrap();
    }

    #[tokio::test]
    async fn provider_removed_during_probe_does_not_shift_results() {
        let a = StubProvider::slow("a", Duration::from_millis(100));
        let b = StubProvider::slow("b", Duration::from_millis(100));
        b.set_ready(false);
        let lb = Arc::new(
            LoadBalancer::new(
                vec![a as Arc<dyn ImageProvider>, b as Arc<dyn ImageProvider>],
                BalanceStrategy::RoundRobin,
            )
            .with_health_timing(Duration::from_secs(1), Duration::from_secs(1)),
        );

        let probe = tokio::spawn({
            let lb = Arc::clone(&lb);
            async move { lb.probe_all().await }
        });
        // Let the probe round take its snapshot before membership changes.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(lb.remove(0).await, Some(0));
        probe.await.unwrap();

        // "a" answered ready, "b" did not; the surviving entry keeps its own result.
        let stats = lb.stats().await;
        assert_eq!(stats.total, 1);
        assert_eq!(stats.providers[0].name, "b");
        assert!(!stats.providers[0].available);
        assert_eq!(stats.providers[0].last_error.as_deref(), Some("Provider not ready: stub offline"));
    }

    // -- membership ------------------------------------------------------------

    #[tokio::test]
    async fn add_and_remove_change_membership() {
        let stubs = [StubProvider::ready("a")];
        let lb = balancer(&stubs, BalanceStrategy::RoundRobin);

        let added = lb.add(StubProvider::ready("b")).await;
        assert_eq!(lb.stats().await.total, 2);

        assert_eq!(lb.remove(0).await, Some(0));
        assert_eq!(lb.remove(5).await, None);

        let stats = lb.stats().await;
        assert_eq!(stats.total, 1);
        assert_eq!(stats.providers[0].id, added);
        assert_eq!(stats.providers[0].name, "b");
    }

    #[tokio::test]
    async fn stats_report_counts_and_cursor() {
        let stubs = [StubProvider::ready("a"), StubProvider::ready("b")];
        let lb = balancer(&stubs, BalanceStrategy::RoundRobin);

        lb.select(1).await;
        lb.select(1).await;
        lb.select(1).await;

        let stats = lb.stats().await;
        assert_eq!(stats.total, 2);
        assert_eq!(stats.available, 2);
        assert_eq!(stats.next_index, 3);
        assert_eq!(stats.strategy, BalanceStrategy::RoundRobin);
    }
}
