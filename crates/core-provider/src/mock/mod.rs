//! A reference [`DataProvider`] used by unit tests and by `oak-bin`'s demo
//! scenarios. Holds canned historical bars per `(symbol, interval)`, an
//! optional declared base interval per symbol, and reference-counts
//! subscriptions exactly as the contract requires.

use crate::{BarSink, DataProvider, ProviderCapabilities, SubscriptionHandle};
use async_trait::async_trait;
use core_interval::Interval;
use core_model::{Bar, OakViewError, SymbolRecord};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct Fixtures {
    historical: HashMap<(String, String), Vec<Bar>>,
    base_intervals: HashMap<String, Interval>,
    available_intervals: HashMap<String, Vec<Interval>>,
    subscription_refcounts: HashMap<(String, String), usize>,
}

/// In-memory, feature-gated reference provider. Not intended for production
/// use — a production consumer disables the `mock` feature.
pub struct MockProvider {
    fixtures: Arc<Mutex<Fixtures>>,
    disconnect_calls: AtomicUsize,
    tick_interval: Duration,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockProvider {
    pub fn new() -> Self {
        Self {
            fixtures: Arc::new(Mutex::new(Fixtures::default())),
            disconnect_calls: AtomicUsize::new(0),
            tick_interval: Duration::from_secs(1),
        }
    }

    /// How often the synthetic tick generator emits a bar to each live
    /// subscriber. Defaults to one second; tests shrink this to keep
    /// assertions fast.
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    /// Seed canned historical bars for `(symbol, interval)`.
    pub fn with_historical(self, symbol: &str, interval: &Interval, bars: Vec<Bar>) -> Self {
        self.fixtures
            .lock()
            .unwrap()
            .historical
            .insert((symbol.to_string(), interval.token().to_string()), bars);
        self
    }

    /// Declare the finest interval this provider natively serves for `symbol`.
    pub fn with_base_interval(self, symbol: &str, interval: Interval) -> Self {
        self.fixtures
            .lock()
            .unwrap()
            .base_intervals
            .insert(symbol.to_string(), interval);
        self
    }

    /// Declare an explicit whitelist of intervals served natively.
    pub fn with_available_intervals(self, symbol: &str, intervals: Vec<Interval>) -> Self {
        self.fixtures
            .lock()
            .unwrap()
            .available_intervals
            .insert(symbol.to_string(), intervals);
        self
    }

    /// How many times `disconnect` has been called (idempotence assertions).
    pub fn disconnect_call_count(&self) -> usize {
        self.disconnect_calls.load(Ordering::SeqCst)
    }

    /// Current reference count for a subscription key, for contract tests.
    pub fn subscription_refcount(&self, symbol: &str, interval: &Interval) -> usize {
        self.fixtures
            .lock()
            .unwrap()
            .subscription_refcounts
            .get(&(symbol.to_string(), interval.token().to_string()))
            .copied()
            .unwrap_or(0)
    }
}

/// Synthetic tick generator: walks the last seeded historical bar forward
/// one interval step at a time, nudging the close price with a small
/// deterministic oscillation, and hands each new bar to `sink` until `stop`
/// is set. Runs on its own OS thread rather than a tokio task since this
/// crate only pulls in `tokio` as a dev-dependency for its test suite.
///
/// Only the sink belonging to the subscriber that triggered the 0→1
/// refcount transition receives ticks — this is a reference double for
/// tests and demos, not a multi-subscriber fan-out broker.
fn spawn_ticker(
    fixtures: Arc<Mutex<Fixtures>>,
    key: (String, String),
    sink: BarSink,
    interval: Duration,
    stop: Arc<AtomicBool>,
) {
    std::thread::spawn(move || {
        let step_seconds = core_interval::parse(&key.1)
            .ok()
            .and_then(|iv| core_interval::to_milliseconds(&iv).ok())
            .map(|ms| ms / 1000)
            .unwrap_or(60);
        let mut last = {
            let fixtures = fixtures.lock().unwrap();
            fixtures.historical.get(&key).and_then(|bars| bars.last().copied())
        };

        let mut tick = 0u64;
        while !stop.load(Ordering::SeqCst) {
            std::thread::sleep(interval);
            if stop.load(Ordering::SeqCst) {
                break;
            }
            tick += 1;
            let wobble = ((tick % 7) as f64 - 3.0) * 0.05;
            let next = match last {
                Some(prev) => Bar {
                    time: prev.time + step_seconds,
                    open: prev.close,
                    high: prev.close + wobble.abs() + 0.01,
                    low: prev.close - wobble.abs() - 0.01,
                    close: prev.close + wobble,
                    volume: prev.volume,
                },
                None => break,
            };
            last = Some(next);
            sink(next);
        }
    });
}

#[async_trait]
impl DataProvider for MockProvider {
    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            can_initialize: true,
            can_subscribe: true,
            has_base_interval: true,
            has_available_intervals: true,
            can_search_symbols: true,
        }
    }

    async fn fetch_historical(&self, symbol: &str, interval: &Interval) -> Result<Vec<Bar>, OakViewError> {
        let fixtures = self.fixtures.lock().unwrap();
        fixtures
            .historical
            .get(&(symbol.to_string(), interval.token().to_string()))
            .cloned()
            .ok_or_else(|| OakViewError::UnknownSymbol {
                symbol: symbol.to_string(),
            })
    }

    async fn disconnect(&self) {
        self.disconnect_calls.fetch_add(1, Ordering::SeqCst);
    }

    async fn initialize(&self, _config: &str) -> Result<(), OakViewError> {
        Ok(())
    }

    async fn subscribe(&self, symbol: &str, interval: &Interval, sink: BarSink) -> SubscriptionHandle {
        let key = (symbol.to_string(), interval.token().to_string());
        let is_first_subscriber = {
            let mut fixtures = self.fixtures.lock().unwrap();
            let count = fixtures.subscription_refcounts.entry(key.clone()).or_insert(0);
            *count += 1;
            *count == 1
        };

        // The wire-level subscription opens on the 0→1 transition (spawning
        // the synthetic tick generator here) and tears down on the 1→0
        // transition below; the refcount is shared via `Arc` so the handle
        // can outlive the borrow of `self`.
        let stop = Arc::new(AtomicBool::new(false));
        if is_first_subscriber {
            spawn_ticker(self.fixtures.clone(), key.clone(), sink, self.tick_interval, stop.clone());
        }

        let fixtures = self.fixtures.clone();
        SubscriptionHandle::new(move || {
            stop.store(true, Ordering::SeqCst);
            let mut fixtures = fixtures.lock().unwrap();
            if let Some(count) = fixtures.subscription_refcounts.get_mut(&key) {
                *count = count.saturating_sub(1);
                if *count == 0 {
                    fixtures.subscription_refcounts.remove(&key);
                    tracing::debug!(target: "provider", symbol = %key.0, interval = %key.1, "subscription torn down");
                }
            }
        })
    }

    async fn get_base_interval(&self, symbol: &str) -> Option<Interval> {
        self.fixtures.lock().unwrap().base_intervals.get(symbol).cloned()
    }

    async fn get_available_intervals(&self, symbol: &str) -> Option<Vec<Interval>> {
        self.fixtures
            .lock()
            .unwrap()
            .available_intervals
            .get(symbol)
            .cloned()
    }

    async fn search_symbols(&self, query: &str) -> Result<Vec<SymbolRecord>, OakViewError> {
        let fixtures = self.fixtures.lock().unwrap();
        Ok(fixtures
            .historical
            .keys()
            .map(|(symbol, _)| symbol.clone())
            .filter(|symbol| symbol.to_lowercase().contains(&query.to_lowercase()))
            .collect::<std::collections::BTreeSet<_>>()
            .into_iter()
            .map(|symbol| SymbolRecord {
                symbol,
                description: None,
                exchange: None,
                kind: None,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(time: i64) -> Bar {
        Bar { time, open: 1.0, high: 1.0, low: 1.0, close: 1.0, volume: 1.0 }
    }

    #[tokio::test]
    async fn fetch_historical_returns_seeded_fixture() {
        let interval = core_interval::parse("1D").unwrap();
        let provider = MockProvider::new().with_historical("AAPL", &interval, vec![bar(0), bar(86_400)]);
        let bars = provider.fetch_historical("AAPL", &interval).await.unwrap();
        assert_eq!(bars.len(), 2);
    }

    #[tokio::test]
    async fn fetch_historical_unknown_symbol_fails() {
        let provider = MockProvider::new();
        let interval = core_interval::parse("1D").unwrap();
        let err = provider.fetch_historical("NOPE", &interval).await.unwrap_err();
        assert!(matches!(err, OakViewError::UnknownSymbol { .. }));
    }

    #[tokio::test]
    async fn subscribe_increments_refcount_per_call() {
        let interval = core_interval::parse("1S").unwrap();
        let provider = MockProvider::new();
        let _h1 = provider.subscribe("X", &interval, Box::new(|_| {})).await;
        let _h2 = provider.subscribe("X", &interval, Box::new(|_| {})).await;
        assert_eq!(provider.subscription_refcount("X", &interval), 2);
    }

    #[tokio::test]
    async fn subscribe_refcount_drops_to_zero_after_all_handles_dropped() {
        let interval = core_interval::parse("1S").unwrap();
        let provider = MockProvider::new();
        let h1 = provider.subscribe("X", &interval, Box::new(|_| {})).await;
        let h2 = provider.subscribe("X", &interval, Box::new(|_| {})).await;
        assert_eq!(provider.subscription_refcount("X", &interval), 2);
        drop(h1);
        assert_eq!(provider.subscription_refcount("X", &interval), 1);
        drop(h2);
        assert_eq!(provider.subscription_refcount("X", &interval), 0);
    }

    #[tokio::test]
    async fn subscribe_emits_synthetic_ticks_derived_from_last_historical_bar() {
        use std::sync::mpsc::channel;

        let interval = core_interval::parse("1S").unwrap();
        let provider = MockProvider::new()
            .with_tick_interval(Duration::from_millis(5))
            .with_historical("X", &interval, vec![bar(0)]);

        let (tx, rx) = channel();
        let _handle = provider
            .subscribe("X", &interval, Box::new(move |b| {
                let _ = tx.send(b);
            }))
            .await;

        let received = rx.recv_timeout(Duration::from_millis(500)).expect("expected a synthetic tick");
        assert_eq!(received.time, 1);
    }

    #[tokio::test]
    async fn disconnect_is_idempotent_to_call() {
        let provider = MockProvider::new();
        provider.disconnect().await;
        provider.disconnect().await;
        assert_eq!(provider.disconnect_call_count(), 2);
    }
}
