//! The `DataProvider` contract: the abstract interface every data source
//! must satisfy, plus the capability-negotiation algorithm built on top of
//! it. Concrete providers live outside this crate; only the [`mock`] module
//! (test/demo support) implements the trait here.

use async_trait::async_trait;
use core_interval::Interval;
use core_model::{Bar, OakViewError, SymbolRecord};

#[cfg(feature = "mock")]
pub mod mock;

/// A provider's declared capability set, computed once when it is attached
/// rather than probed on every call (mirroring a one-shot capability
/// detection: cheap to consult, computed a single time per attachment).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[non_exhaustive]
pub struct ProviderCapabilities {
    pub can_initialize: bool,
    pub can_subscribe: bool,
    pub has_base_interval: bool,
    pub has_available_intervals: bool,
    pub can_search_symbols: bool,
}

/// A callback invoked with a full [`Bar`] each time a bar completes or an
/// in-flight bar updates. Boxed so it can cross an `async_trait` boundary
/// and be stored alongside a live subscription.
pub type BarSink = Box<dyn Fn(Bar) + Send + Sync>;

/// RAII guard over a live subscription. `Drop` calls the teardown closure at
/// most once; calling `unsubscribe` explicitly and then dropping the handle
/// is a no-op the second time.
pub struct SubscriptionHandle {
    teardown: Option<Box<dyn FnOnce() + Send>>,
}

impl SubscriptionHandle {
    pub fn new(teardown: impl FnOnce() + Send + 'static) -> Self {
        Self {
            teardown: Some(Box::new(teardown)),
        }
    }

    /// Tear down the subscription now. Idempotent: a second call, or a
    /// subsequent drop, does nothing.
    pub fn unsubscribe(&mut self) {
        if let Some(f) = self.teardown.take() {
            f();
        }
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

/// Every concrete provider is polymorphic over this capability set. Required
/// methods have no default; optional capabilities degrade gracefully via
/// default implementations that report absence, and [`ProviderCapabilities`]
/// tells callers which defaults are "really absent" versus "present but
/// legitimately empty".
#[async_trait]
pub trait DataProvider: Send + Sync {
    /// The capability set this provider declares. Computed once by the
    /// implementor; callers should not assume it is cheap to call
    /// repeatedly with different results.
    fn capabilities(&self) -> ProviderCapabilities;

    /// Fetch an ascending, deduplicated, validated bar array.
    async fn fetch_historical(&self, symbol: &str, interval: &Interval) -> Result<Vec<Bar>, OakViewError>;

    /// Release all provider-held resources. Idempotent.
    async fn disconnect(&self);

    /// One-shot setup, called at most once. No-op unless
    /// `capabilities().can_initialize`.
    async fn initialize(&self, _config: &str) -> Result<(), OakViewError> {
        Ok(())
    }

    /// Subscribe to a real-time stream. Providers must reference-count
    /// multiple subscriptions to the same `(symbol, interval)` so the
    /// wire-level subscription opens on the 0→1 transition and tears down
    /// on the 1→0 transition. No-op unless `capabilities().can_subscribe`.
    async fn subscribe(&self, symbol: &str, interval: &Interval, sink: BarSink) -> SubscriptionHandle {
        let _ = (symbol, interval, sink);
        SubscriptionHandle::new(|| {})
    }

    /// The finest interval this provider natively serves for `symbol`.
    /// `None` unless `capabilities().has_base_interval`.
    async fn get_base_interval(&self, _symbol: &str) -> Option<Interval> {
        None
    }

    /// Explicit whitelist of intervals served natively; `None` means "all
    /// intervals the client can resample to are acceptable".
    async fn get_available_intervals(&self, _symbol: &str) -> Option<Vec<Interval>> {
        None
    }

    async fn search_symbols(&self, _query: &str) -> Result<Vec<SymbolRecord>, OakViewError> {
        Ok(Vec::new())
    }
}

/// The outcome of capability negotiation for a `(symbol, interval)` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchPlan {
    /// Call `fetch_historical(symbol, interval)` directly.
    Direct,
    /// Fetch at `base` and resample client-side to the requested interval.
    ResampleFromBase(Interval),
}

/// Capability negotiation (spec §4.3 steps 1–3), as a pure function over a
/// declared base interval. `base` should be `None` whenever
/// `capabilities().has_base_interval` is false.
pub fn negotiate(requested: &Interval, base: Option<&Interval>) -> FetchPlan {
    match base {
        None => FetchPlan::Direct,
        Some(base) if base == requested => FetchPlan::Direct,
        // Finer than base: attempt fetchHistorical at the requested interval
        // anyway — the provider may support finer on-demand.
        Some(base) if core_interval::is_finer_than(requested, base) => FetchPlan::Direct,
        // Coarser than base: fetch at base and resample.
        Some(base) => FetchPlan::ResampleFromBase(base.clone()),
    }
}

/// The interval the coordinator should subscribe at for a symbol group: the
/// base interval if the provider declares one finer than `finest_requested`,
/// otherwise `finest_requested` itself. Never coarser than any pane's
/// requested interval.
pub fn subscription_interval(finest_requested: &Interval, base: Option<&Interval>) -> Interval {
    match base {
        Some(base) if core_interval::is_finer_than(base, finest_requested) => base.clone(),
        _ => finest_requested.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn iv(token: &str) -> Interval {
        core_interval::parse(token).unwrap()
    }

    #[test]
    fn negotiate_direct_when_no_base() {
        assert_eq!(negotiate(&iv("1W"), None), FetchPlan::Direct);
    }

    #[test]
    fn negotiate_direct_when_interval_equals_base() {
        assert_eq!(negotiate(&iv("1D"), Some(&iv("1D"))), FetchPlan::Direct);
    }

    #[test]
    fn negotiate_resamples_when_coarser_than_base() {
        // S4: base 1D, requested 1W.
        assert_eq!(
            negotiate(&iv("1W"), Some(&iv("1D"))),
            FetchPlan::ResampleFromBase(iv("1D"))
        );
    }

    #[test]
    fn negotiate_fetches_directly_when_finer_than_base() {
        // S5: base 1D, requested 1 (minute) — direct fetch, no resample attempt.
        assert_eq!(negotiate(&iv("1"), Some(&iv("1D"))), FetchPlan::Direct);
    }

    #[test]
    fn subscription_interval_prefers_finer_base() {
        assert_eq!(subscription_interval(&iv("10S"), Some(&iv("1S"))), iv("1S"));
    }

    #[test]
    fn subscription_interval_never_coarser_than_requested() {
        assert_eq!(subscription_interval(&iv("1S"), Some(&iv("1D"))), iv("1S"));
        assert_eq!(subscription_interval(&iv("1S"), None), iv("1S"));
    }

    #[test]
    fn subscription_handle_unsubscribes_at_most_once() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        let calls = Arc::new(AtomicUsize::new(0));
        let counted = calls.clone();
        let mut handle = SubscriptionHandle::new(move || {
            counted.fetch_add(1, Ordering::SeqCst);
        });
        handle.unsubscribe();
        handle.unsubscribe();
        drop(handle);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn subscription_handle_drop_without_explicit_unsubscribe_still_fires_once() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        let calls = Arc::new(AtomicUsize::new(0));
        let counted = calls.clone();
        let handle = SubscriptionHandle::new(move || {
            counted.fetch_add(1, Ordering::SeqCst);
        });
        drop(handle);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
