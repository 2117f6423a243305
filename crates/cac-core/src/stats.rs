//! Aggregate stats snapshot: refresh, periodic refresher, report.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::{
    accounts::AccountRepository,
    formatting::{format_count, format_memory, format_timestamp, format_uptime},
    model::{ServerStatus, StatsCounters, StatsSnapshot},
    ports::StatsStore,
    Result,
};

/// Source of the point-in-time process sample.
pub trait ResourceSampler: Send + Sync {
    fn sample(&self) -> ServerStatus;
}

/// Samples this process via `/proc`. Degrades to zeros where `/proc` is missing.
#[derive(Clone, Debug)]
pub struct ProcSampler {
    started: Instant,
}

impl ProcSampler {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
        }
    }
}

impl Default for ProcSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceSampler for ProcSampler {
    fn sample(&self) -> ServerStatus {
        let memory_bytes = std::fs::read_to_string("/proc/self/status")
            .ok()
            .and_then(|s| parse_vm_rss(&s))
            .unwrap_or(0);
        let cpu_load = std::fs::read_to_string("/proc/loadavg")
            .ok()
            .and_then(|s| parse_loadavg(&s))
            .unwrap_or(0.0);

        ServerStatus {
            memory_bytes,
            cpu_load,
            uptime_seconds: self.started.elapsed().as_secs(),
        }
    }
}

fn parse_vm_rss(status: &str) -> Option<u64> {
    let line = status.lines().find(|l| l.starts_with("VmRSS:"))?;
    let kb = line
        .trim_start_matches("VmRSS:")
        .split_whitespace()
        .next()?
        .parse::<u64>()
        .ok()?;
    Some(kb * 1024)
}

fn parse_loadavg(s: &str) -> Option<f64> {
    s.split_whitespace().next()?.parse::<f64>().ok()
}

#[derive(Clone)]
pub struct StatsAggregator {
    store: Arc<dyn StatsStore>,
    accounts: AccountRepository,
    sampler: Arc<dyn ResourceSampler>,
}

impl StatsAggregator {
    pub fn new(
        store: Arc<dyn StatsStore>,
        accounts: AccountRepository,
        sampler: Arc<dyn ResourceSampler>,
    ) -> Self {
        Self {
            store,
            accounts,
            sampler,
        }
    }

    /// Upsert the snapshot with `counters`, the current active set and a fresh sample.
    pub async fn refresh(&self, counters: StatsCounters, now: DateTime<Utc>) -> Result<StatsSnapshot> {
        let mut active_usernames: Vec<String> = self
            .accounts
            .list_active(now)
            .await?
            .into_iter()
            .map(|a| a.username)
            .collect();
        active_usernames.sort();
        active_usernames.dedup();

        let snapshot = StatsSnapshot {
            active_usernames,
            counters,
            last_updated_at: now,
            server_status: self.sampler.sample(),
        };
        self.store.upsert(&snapshot).await?;
        tracing::debug!(
            active = snapshot.active_usernames.len(),
            total_checks = counters.total_checks,
            "stats refreshed"
        );
        Ok(snapshot)
    }

    /// Refresh keeping whatever counters are already stored.
    pub async fn refresh_carry_forward(&self, now: DateTime<Utc>) -> Result<StatsSnapshot> {
        let counters = self
            .store
            .load()
            .await?
            .map(|s| s.counters)
            .unwrap_or_default();
        self.refresh(counters, now).await
    }

    pub async fn report(&self) -> Result<String> {
        let snapshot = self.store.load().await?;
        Ok(render_report(snapshot.as_ref()))
    }

    /// Run `refresh_carry_forward` every `interval` until `cancel` fires.
    pub fn spawn_refresher(&self, interval: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(interval);
            loop {
                tokio::select! {
                  _ = cancel.cancelled() => break,
                  _ = tick.tick() => {
                    if let Err(e) = this.refresh_carry_forward(Utc::now()).await {
                      tracing::warn!(error = %e, "periodic stats refresh failed");
                    }
                  }
                }
            }
            tracing::debug!("stats refresher stopped");
        })
    }
}

/// Render the snapshot as Telegram HTML. A missing snapshot renders as zeros.
pub fn render_report(snapshot: Option<&StatsSnapshot>) -> String {
    let empty = StatsSnapshot {
        active_usernames: Vec::new(),
        counters: StatsCounters::default(),
        last_updated_at: DateTime::<Utc>::UNIX_EPOCH,
        server_status: ServerStatus::default(),
    };
    let s = snapshot.unwrap_or(&empty);
    let updated = match snapshot {
        Some(s) => format_timestamp(s.last_updated_at),
        None => "never".to_string(),
    };

    [
        "📊 <b>System Statistics</b>".to_string(),
        String::new(),
        format!("👥 Active users: {}", format_count(s.active_usernames.len() as u64)),
        format!("📈 Total checks: {}", format_count(s.counters.total_checks)),
        format!("✅ Lives found: {}", format_count(s.counters.lives_found)),
        String::new(),
        "🖥️ <b>Server status</b>".to_string(),
        format!("- Memory: {}", format_memory(s.server_status.memory_bytes)),
        format!("- CPU load: {:.2}", s.server_status.cpu_load),
        format!("- Uptime: {}", format_uptime(s.server_status.uptime_seconds)),
        String::new(),
        format!("⏰ Last update: {updated}"),
    ]
    .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Account, SubscriptionStatus};
    use crate::test_support::MemoryStore;
    use chrono::TimeZone;

    struct FixedSampler;

    impl ResourceSampler for FixedSampler {
        fn sample(&self) -> ServerStatus {
            ServerStatus {
                memory_bytes: 64 * 1024 * 1024,
                cpu_load: 0.5,
                uptime_seconds: 3 * 3600 + 25 * 60,
            }
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 7, 4, 9, 15, 0).unwrap()
    }

    fn aggregator(store: Arc<MemoryStore>) -> StatsAggregator {
        StatsAggregator::new(
            store.clone(),
            AccountRepository::new(store),
            Arc::new(FixedSampler),
        )
    }

    #[test]
    fn parses_proc_samples() {
        let status = "Name:\tcac\nVmPeak:\t  9000 kB\nVmRSS:\t  2048 kB\n";
        assert_eq!(parse_vm_rss(status), Some(2048 * 1024));
        assert_eq!(parse_vm_rss("Name: x\n"), None);
        assert_eq!(parse_loadavg("0.42 0.30 0.20 1/123 4567\n"), Some(0.42));
    }

    #[test]
    fn empty_report_shows_zero_placeholders() {
        let r = render_report(None);
        assert!(r.contains("Active users: 0"));
        assert!(r.contains("Total checks: 0"));
        assert!(r.contains("Memory: 0MB"));
        assert!(r.contains("Uptime: 0h 0m"));
        assert!(r.contains("Last update: never"));
    }

    #[tokio::test]
    async fn refresh_upserts_single_snapshot() {
        let store = Arc::new(MemoryStore::default());
        let mut a = Account::new("alice");
        a.subscription.status = SubscriptionStatus::Active;
        store.insert_account(a);
        store.insert_account(Account::new("idle"));

        let agg = aggregator(store.clone());
        agg.refresh(StatsCounters { total_checks: 1_234_567, lives_found: 89 }, t0())
            .await
            .unwrap();
        agg.refresh(StatsCounters { total_checks: 1_300_000, lives_found: 90 }, t0())
            .await
            .unwrap();

        assert_eq!(store.stats_upserts(), 2);
        let snap = store.stats().unwrap();
        assert_eq!(snap.active_usernames, vec!["alice".to_string()]);
        assert_eq!(snap.counters.total_checks, 1_300_000);

        let report = agg.report().await.unwrap();
        assert!(report.contains("Active users: 1"));
        assert!(report.contains("Total checks: 1,300,000"));
        assert!(report.contains("Lives found: 90"));
        assert!(report.contains("Memory: 64MB"));
        assert!(report.contains("CPU load: 0.50"));
        assert!(report.contains("Uptime: 3h 25m"));
        assert!(report.contains("2026-07-04 09:15:00 UTC"));
    }

    #[tokio::test]
    async fn carry_forward_keeps_stored_counters() {
        let store = Arc::new(MemoryStore::default());
        let agg = aggregator(store.clone());
        agg.refresh(StatsCounters { total_checks: 10, lives_found: 2 }, t0())
            .await
            .unwrap();

        let snap = agg.refresh_carry_forward(t0() + chrono::Duration::minutes(1)).await.unwrap();
        assert_eq!(snap.counters, StatsCounters { total_checks: 10, lives_found: 2 });
        assert_eq!(snap.last_updated_at, t0() + chrono::Duration::minutes(1));
    }

    #[tokio::test(start_paused = true)]
    async fn refresher_stops_on_cancel() {
        let store = Arc::new(MemoryStore::default());
        let agg = aggregator(store.clone());
        let cancel = CancellationToken::new();

        let handle = agg.spawn_refresher(Duration::from_secs(60), cancel.clone());
        tokio::time::sleep(Duration::from_secs(150)).await;
        cancel.cancel();
        handle.await.unwrap();

        assert_eq!(store.stats_upserts(), 3);
    }
}
