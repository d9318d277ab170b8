//! ==============================================================================
//! monitor.rs - status fetch cycle
//! ==============================================================================
//!
//! purpose:
//!     the caller side of the decode contract. one refresh writes `STATUS`
//!     to the link, decodes the reply, persists it, and swaps it in as the
//!     current snapshot. on any failure the previous snapshot stays and an
//!     error message is shown instead.
//!
//! concurrency:
//!     refreshes never overlap. a second refresh while one is outstanding
//!     returns `MonitorError::Busy` immediately, the same way the status
//!     page disables its button while a fetch is in flight. blocking link
//!     and store i/o runs on tokio's blocking pool. a refresh dropped before
//!     it finishes leaves the displayed state untouched.
//!
//! relationships:
//!     - uses: link.rs, decoder.rs, store.rs
//!     - used by: server.rs (api + dashboard), main.rs (poll loop)
//!
//! ==============================================================================

use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;

use crate::config::FarmConfig;
use crate::decoder::{DecodeError, StatusDecoder, STATUS_REQUEST};
use crate::domain::SystemSnapshot;
use crate::link::{LinkError, PeripheralLink};
use crate::plant::{PlantConfig, PlantConfigError};
use crate::store::StatusStore;

pub const FETCH_FAILED_MESSAGE: &str = "Failed to fetch system status. Please try again.";
pub const INVALID_STATUS_MESSAGE: &str = "Invalid data format received from the controller.";

#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error("a status refresh is already in progress")]
    Busy,
    #[error(transparent)]
    Transport(#[from] LinkError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Plant(#[from] PlantConfigError),
}

impl MonitorError {
    /// text shown on the dashboard next to the retained snapshot
    pub fn user_message(&self) -> String {
        match self {
            MonitorError::Transport(_) => FETCH_FAILED_MESSAGE.to_string(),
            MonitorError::Decode(_) => INVALID_STATUS_MESSAGE.to_string(),
            other => other.to_string(),
        }
    }
}

/// everything the dashboard needs to render the status view
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardState {
    pub snapshot: SystemSnapshot,
    pub last_error: Option<String>,
    /// unix timestamp (ms) of last successful decode, 0 if none yet
    pub last_update_ms: u64,
    pub fetching: bool,
}

#[derive(Clone)]
pub struct StatusMonitor {
    inner: Arc<Inner>,
}

struct Inner {
    link: Arc<Mutex<Box<dyn PeripheralLink>>>,
    store: Arc<dyn StatusStore>,
    decoder: StatusDecoder,
    state: RwLock<DashboardState>,
    fetching: AtomicBool,
}

/// clears the in-flight flag however the refresh ends
struct FetchGuard<'a>(&'a AtomicBool);

impl<'a> FetchGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for FetchGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl StatusMonitor {
    /// seeds the displayed snapshot from the store, or the initial zero
    /// reading when nothing usable was persisted
    pub fn new(link: Box<dyn PeripheralLink>, store: Box<dyn StatusStore>, farms: &FarmConfig) -> Self {
        let snapshot = match store.load() {
            Ok(Some(snapshot)) => {
                tracing::info!("restored last known snapshot from store");
                snapshot
            }
            Ok(None) => SystemSnapshot::initial(farms),
            Err(e) => {
                tracing::warn!("ignoring unreadable status store: {:#}", e);
                SystemSnapshot::initial(farms)
            }
        };
        tracing::info!("status monitor using {}", link.describe());

        Self {
            inner: Arc::new(Inner {
                link: Arc::new(Mutex::new(link)),
                store: Arc::from(store),
                decoder: StatusDecoder::new(),
                state: RwLock::new(DashboardState {
                    snapshot,
                    last_error: None,
                    last_update_ms: 0,
                    fetching: false,
                }),
                fetching: AtomicBool::new(false),
            }),
        }
    }

    pub async fn state(&self) -> DashboardState {
        let mut state = self.inner.state.read().await.clone();
        state.fetching = self.inner.fetching.load(Ordering::Acquire);
        state
    }

    /// one fetch-then-decode cycle
    pub async fn refresh(&self) -> Result<SystemSnapshot, MonitorError> {
        let _guard = FetchGuard::acquire(&self.inner.fetching).ok_or(MonitorError::Busy)?;

        let outcome = self.fetch_and_decode().await;

        match &outcome {
            Ok(snapshot) => {
                {
                    let mut state = self.inner.state.write().await;
                    state.snapshot = snapshot.clone();
                    state.last_error = None;
                    state.last_update_ms = now_ms();
                }
                self.persist(snapshot.clone()).await;
            }
            Err(e) => {
                tracing::warn!("status refresh failed: {}", e);
                self.inner.state.write().await.last_error = Some(e.user_message());
            }
        }
        outcome
    }

    async fn persist(&self, snapshot: SystemSnapshot) {
        let store = self.inner.store.clone();
        match tokio::task::spawn_blocking(move || store.save(&snapshot)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!("failed to persist snapshot: {:#}", e),
            Err(e) => tracing::warn!("failed to persist snapshot: task join error: {}", e),
        }
    }

    async fn fetch_and_decode(&self) -> Result<SystemSnapshot, MonitorError> {
        let mut link = self.inner.link.clone().lock_owned().await;
        let reply = tokio::task::spawn_blocking(move || link.exchange(STATUS_REQUEST))
            .await
            .map_err(|e| LinkError::Connect(format!("task join error: {}", e)))??;

        let text = String::from_utf8_lossy(&reply);
        // stray terminators from a previous line can arrive ahead of the reply
        let line = text.trim_matches(['\r', '\n']);
        tracing::debug!("received status line: {}", line);

        Ok(self.inner.decoder.decode(line)?)
    }

    /// validate a plant configuration and upload it to the controller
    pub async fn send_plant_config(&self, plant: &PlantConfig) -> Result<(), MonitorError> {
        plant.validate()?;
        let payload = plant.to_payload();

        let mut link = self.inner.link.clone().lock_owned().await;
        tokio::task::spawn_blocking(move || link.send(&payload))
            .await
            .map_err(|e| LinkError::Connect(format!("task join error: {}", e)))??;

        tracing::info!(name = %plant.name, row = %plant.row_number, "plant configuration sent");
        Ok(())
    }

    /// refresh every `period` until the handle is aborted
    ///
    /// the first refresh happens one period after start; ticks that land on
    /// an outstanding refresh are skipped.
    pub fn spawn_poller(&self, period: Duration, show_data: bool) -> JoinHandle<()> {
        let monitor = self.clone();
        tokio::spawn(async move {
            let start = tokio::time::Instant::now() + period;
            let mut ticker = tokio::time::interval_at(start, period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match monitor.refresh().await {
                    Ok(snap) if show_data => {
                        println!(
                            "[STATUS] A: {}% / {}% pump {} | B: {}% / {}% pump {} | {:.1}°C {:.1}% {}",
                            snap.farm_a.current_moisture,
                            snap.farm_a.ideal_moisture,
                            on_off(snap.farm_a.pump_active),
                            snap.farm_b.current_moisture,
                            snap.farm_b.ideal_moisture,
                            on_off(snap.farm_b.pump_active),
                            snap.environment.temperature_celsius,
                            snap.environment.humidity_percent,
                            if snap.environment.is_raining { "raining" } else { "clear" },
                        );
                    }
                    Ok(_) => {}
                    Err(MonitorError::Busy) => tracing::debug!("poll tick skipped, refresh in flight"),
                    // already logged and recorded by refresh()
                    Err(_) => {}
                }
            }
        })
    }
}

fn on_off(active: bool) -> &'static str {
    if active { "ON" } else { "OFF" }
}

/// unix timestamp in milliseconds
pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

// ==============================================================================
// tests
// ==============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::FixtureLink;
    use crate::store::MemoryStore;

    const GOOD: &str = "<STATUS:A:0:60:0:B:100:70:1:20.0:30.0:1>";
    const NO_BRACKETS: &str = "STATUS:A:45:60:1:B:52:70:0:24.5:55.0:0";

    fn monitor_with(link: &FixtureLink) -> (StatusMonitor, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::default());
        let monitor = StatusMonitor::new(
            Box::new(link.clone()),
            Box::new(SharedStore(store.clone())),
            &FarmConfig::default(),
        );
        (monitor, store)
    }

    /// lets a test keep a handle on the store the monitor owns
    struct SharedStore(Arc<MemoryStore>);

    impl StatusStore for SharedStore {
        fn load(&self) -> anyhow::Result<Option<SystemSnapshot>> {
            self.0.load()
        }
        fn save(&self, snapshot: &SystemSnapshot) -> anyhow::Result<()> {
            self.0.save(snapshot)
        }
    }

    #[tokio::test]
    async fn starts_from_initial_snapshot() {
        let (monitor, _) = monitor_with(&FixtureLink::new());
        let state = monitor.state().await;
        assert_eq!(state.snapshot, SystemSnapshot::initial(&FarmConfig::default()));
        assert_eq!(state.last_update_ms, 0);
        assert!(state.last_error.is_none());
        assert!(!state.fetching);
    }

    #[tokio::test]
    async fn restores_persisted_snapshot() {
        let saved = StatusDecoder::new().decode(GOOD).unwrap();
        let monitor = StatusMonitor::new(
            Box::new(FixtureLink::new()),
            Box::new(MemoryStore::with(saved.clone())),
            &FarmConfig::default(),
        );
        assert_eq!(monitor.state().await.snapshot, saved);
    }

    #[tokio::test]
    async fn successful_refresh_replaces_and_persists() {
        let link = FixtureLink::new();
        link.push_reply(format!("{GOOD}\r\n"));
        let (monitor, store) = monitor_with(&link);

        let snap = monitor.refresh().await.unwrap();
        assert!(snap.farm_b.pump_active);

        let state = monitor.state().await;
        assert_eq!(state.snapshot, snap);
        assert!(state.last_update_ms > 0);
        assert_eq!(store.load().unwrap(), Some(snap));
        assert_eq!(link.sent(), vec![STATUS_REQUEST.to_vec()]);
    }

    struct ReadOnlyStore;

    impl StatusStore for ReadOnlyStore {
        fn load(&self) -> anyhow::Result<Option<SystemSnapshot>> {
            Ok(None)
        }
        fn save(&self, _snapshot: &SystemSnapshot) -> anyhow::Result<()> {
            anyhow::bail!("read-only store")
        }
    }

    #[tokio::test]
    async fn persist_failure_does_not_fail_refresh() {
        let link = FixtureLink::new();
        link.push_reply(GOOD);
        let monitor =
            StatusMonitor::new(Box::new(link.clone()), Box::new(ReadOnlyStore), &FarmConfig::default());

        let snap = monitor.refresh().await.unwrap();
        let state = monitor.state().await;
        assert_eq!(state.snapshot, snap);
        assert!(state.last_error.is_none());
    }

    #[tokio::test]
    async fn leading_line_terminators_are_ignored() {
        let link = FixtureLink::new();
        link.push_reply(format!("\r\n{GOOD}\r\n")).push_reply(format!("\n{GOOD}"));
        let (monitor, _) = monitor_with(&link);

        let first = monitor.refresh().await.unwrap();
        assert_eq!(monitor.refresh().await.unwrap(), first);
        assert!(monitor.state().await.last_error.is_none());
    }

    #[tokio::test]
    async fn malformed_reply_keeps_previous_snapshot() {
        let link = FixtureLink::new();
        link.push_reply(GOOD).push_reply(NO_BRACKETS);
        let (monitor, store) = monitor_with(&link);

        let first = monitor.refresh().await.unwrap();
        let err = monitor.refresh().await.unwrap_err();
        assert!(matches!(
            err,
            MonitorError::Decode(DecodeError::MalformedMessage { ref raw }) if raw == NO_BRACKETS
        ));

        let state = monitor.state().await;
        assert_eq!(state.snapshot, first);
        assert_eq!(state.last_error.as_deref(), Some(INVALID_STATUS_MESSAGE));
        assert_eq!(store.load().unwrap(), Some(first));
    }

    #[tokio::test]
    async fn transport_failure_shows_fetch_error() {
        let link = FixtureLink::new();
        link.push_failure(LinkError::Timeout).push_reply(GOOD);
        let (monitor, _) = monitor_with(&link);

        assert!(matches!(monitor.refresh().await, Err(MonitorError::Transport(LinkError::Timeout))));
        let state = monitor.state().await;
        assert_eq!(state.last_error.as_deref(), Some(FETCH_FAILED_MESSAGE));
        assert_eq!(state.snapshot, SystemSnapshot::initial(&FarmConfig::default()));

        // next successful refresh clears the error
        monitor.refresh().await.unwrap();
        assert!(monitor.state().await.last_error.is_none());
    }

    /// fails the first exchange, then answers slowly
    struct SlowLink {
        calls: usize,
        delay: Duration,
    }

    impl PeripheralLink for SlowLink {
        fn exchange(&mut self, _request: &[u8]) -> Result<Vec<u8>, LinkError> {
            self.calls += 1;
            if self.calls == 1 {
                return Err(LinkError::Timeout);
            }
            std::thread::sleep(self.delay);
            Ok(GOOD.as_bytes().to_vec())
        }
        fn send(&mut self, _payload: &[u8]) -> Result<(), LinkError> {
            Ok(())
        }
        fn describe(&self) -> String {
            "slow".to_string()
        }
    }

    #[tokio::test]
    async fn cancelled_refresh_keeps_error_and_snapshot() {
        let monitor = StatusMonitor::new(
            Box::new(SlowLink { calls: 0, delay: Duration::from_millis(300) }),
            Box::new(MemoryStore::default()),
            &FarmConfig::default(),
        );
        assert!(monitor.refresh().await.is_err());

        let cancelled = tokio::time::timeout(Duration::from_millis(50), monitor.refresh()).await;
        assert!(cancelled.is_err());

        let state = monitor.state().await;
        assert_eq!(state.last_error.as_deref(), Some(FETCH_FAILED_MESSAGE));
        assert_eq!(state.snapshot, SystemSnapshot::initial(&FarmConfig::default()));
        assert_eq!(state.last_update_ms, 0);
        assert!(!state.fetching);
    }

    /// blocks each exchange until the test releases it
    struct GateLink {
        gate: std::sync::mpsc::Receiver<()>,
    }

    impl PeripheralLink for GateLink {
        fn exchange(&mut self, _request: &[u8]) -> Result<Vec<u8>, LinkError> {
            self.gate.recv().map_err(|_| LinkError::Empty)?;
            Ok(GOOD.as_bytes().to_vec())
        }
        fn send(&mut self, _payload: &[u8]) -> Result<(), LinkError> {
            Ok(())
        }
        fn describe(&self) -> String {
            "gate".to_string()
        }
    }

    #[tokio::test]
    async fn overlapping_refresh_is_rejected() {
        let (release, gate) = std::sync::mpsc::channel();
        let monitor = StatusMonitor::new(
            Box::new(GateLink { gate }),
            Box::new(MemoryStore::default()),
            &FarmConfig::default(),
        );

        let background = monitor.clone();
        let first = tokio::spawn(async move { background.refresh().await });
        while !monitor.state().await.fetching {
            tokio::task::yield_now().await;
        }

        assert!(matches!(monitor.refresh().await, Err(MonitorError::Busy)));

        release.send(()).unwrap();
        first.await.unwrap().unwrap();
        assert!(!monitor.state().await.fetching);
    }

    #[tokio::test]
    async fn plant_config_is_validated_before_sending() {
        let link = FixtureLink::new();
        let (monitor, _) = monitor_with(&link);

        let bad = PlantConfig::default();
        assert!(matches!(monitor.send_plant_config(&bad).await, Err(MonitorError::Plant(_))));
        assert!(link.sent().is_empty());

        let mut good = PlantConfig::default();
        good.name = "Tomatoes".into();
        good.pump_schedule.duration = 20;
        monitor.send_plant_config(&good).await.unwrap();
        assert_eq!(link.sent(), vec![good.to_payload()]);
    }

    #[tokio::test(start_paused = true)]
    async fn poller_refreshes_on_interval() {
        let link = FixtureLink::new();
        link.push_reply(GOOD);
        let (monitor, _) = monitor_with(&link);

        let handle = monitor.spawn_poller(Duration::from_secs(10), false);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(link.sent().is_empty());

        tokio::time::sleep(Duration::from_secs(6)).await;
        for _ in 0..100 {
            if monitor.state().await.last_update_ms > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        handle.abort();
        assert_eq!(link.sent().len(), 1);
        assert!(monitor.state().await.last_update_ms > 0);
    }
}
