//! Event types crossing the boundary between the core and its host, plus the
//! bounded channel the core's internal bar/fetch plumbing uses to reach the
//! coordinator without blocking a provider's callback thread.
//!
//! Two layers:
//! - [`HostEvent`]: DOM-facing, bubbling events a consumer observes from the
//!   outside. One variant per row of the external-interfaces event table.
//! - [`CoreEvent`]: internal notifications (a bar arrived, a fetch finished,
//!   a subscription closed) that flow from provider callbacks into the
//!   coordinator's single-threaded update loop.

use core_interval::Interval;
use core_model::{Bar, LayoutMode, PaneId, PaneSettings};

// -------------------------------------------------------------------------
// Channel policy
// -------------------------------------------------------------------------
// A provider's subscription sink runs on whatever thread the provider
// chooses; it must never block waiting on the coordinator. The channel is
// bounded rather than unbounded so a stalled coordinator applies
// backpressure instead of letting memory grow without limit, but the
// capacity is sized generously since bar arrivals are comparatively rare
// (sub-second at the very finest) next to keystroke-rate event streams.
pub const EVENT_CHANNEL_CAP: usize = 1024;

/// DOM-facing event emitted to the host. Field sets mirror the external
/// event table exactly; `pane_index` is the pane's position in the current
/// layout grid, `pane_id` is its stable identity independent of layout.
#[derive(Debug, Clone, PartialEq)]
pub enum HostEvent {
    PaneSelected {
        pane_index: usize,
        pane_id: PaneId,
        symbol: String,
        interval: Interval,
    },
    SymbolChange {
        symbol: String,
        pane_index: usize,
        pane_id: PaneId,
    },
    IntervalChange {
        interval: Interval,
        pane_index: usize,
        pane_id: PaneId,
        symbol: String,
    },
    LayoutChange {
        layout: LayoutMode,
    },
    ConfigRestored {
        layout: LayoutMode,
        panes: Vec<PaneSettings>,
    },
    LoadError {
        pane_id: PaneId,
        symbol: String,
        interval: Interval,
        error: String,
    },
}

/// Internal notification flowing from a live subscription or a completed
/// fetch into the coordinator. Never surfaced to the host directly; the
/// coordinator translates a `FetchFailed` into a [`HostEvent::LoadError`]
/// and a `BarArrived` into renderer/indicator updates.
#[derive(Debug, Clone)]
pub enum CoreEvent {
    /// A live subscription delivered a bar for `symbol`, not yet
    /// distributed to the symbol's pane group. The coordinator is the only
    /// thing that knows which panes subscribe at which interval, so the
    /// sink a subscription is opened with carries just the symbol and the
    /// raw bar; fan-out to panes (direct or through a resampler) happens
    /// once this reaches the coordinator's single-threaded loop.
    SubscriptionBar { symbol: String, bar: Bar },
    /// A bar already resolved to a specific pane (e.g. replayed directly
    /// in tests, or produced by a future dispatch path that bypasses
    /// symbol-group fan-out).
    BarArrived { pane_id: PaneId, bar: Bar },
    /// A historical fetch (initial load or resample source fetch) finished.
    FetchCompleted { pane_id: PaneId, bars: Vec<Bar> },
    /// A fetch or subscribe attempt failed; carries enough context to build
    /// a [`HostEvent::LoadError`] without re-deriving symbol/interval.
    FetchFailed {
        pane_id: PaneId,
        symbol: String,
        interval: Interval,
        error: String,
    },
    /// The provider tore down a subscription outside of an explicit
    /// unsubscribe (e.g. the wire connection dropped).
    SubscriptionClosed { pane_id: PaneId },
}

/// Optional hooks observing every event crossing the bus, for diagnostics or
/// tests. Default implementation is a no-op; hooks must not block.
pub trait EventHooks: Send + Sync + 'static {
    fn on_host_event(&self, _event: &HostEvent) {}
    fn on_core_event(&self, _event: &CoreEvent) {}
}

pub struct NoopEventHooks;
impl EventHooks for NoopEventHooks {}

/// Bounded channel carrying [`CoreEvent`]s from provider callbacks to the
/// coordinator. Senders are cheap to clone (one per live subscription);
/// the coordinator owns the single receiver.
pub struct EventBus {
    sender: tokio::sync::mpsc::Sender<CoreEvent>,
    receiver: tokio::sync::mpsc::Receiver<CoreEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(EVENT_CHANNEL_CAP)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, receiver) = tokio::sync::mpsc::channel(capacity);
        Self { sender, receiver }
    }

    /// A cloneable handle provider callbacks use to push events in. Uses
    /// `try_send` so a full channel drops the event with a warning rather
    /// than ever blocking the provider's thread.
    pub fn sender(&self) -> EventBusSender {
        EventBusSender {
            inner: self.sender.clone(),
        }
    }

    /// Await the next event. Returns `None` once every sender has been
    /// dropped.
    pub async fn recv(&mut self) -> Option<CoreEvent> {
        self.receiver.recv().await
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Cloneable producer side of an [`EventBus`]. Non-blocking: a full channel
/// means the coordinator is falling behind, and the event is dropped rather
/// than stalling whatever thread the provider delivers bars on.
#[derive(Clone)]
pub struct EventBusSender {
    inner: tokio::sync::mpsc::Sender<CoreEvent>,
}

impl EventBusSender {
    pub fn send(&self, event: CoreEvent) {
        if self.inner.try_send(event).is_err() {
            tracing::warn!(target: "events", "event bus full or closed; dropping event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar() -> Bar {
        Bar {
            time: 0,
            open: 1.0,
            high: 1.0,
            low: 1.0,
            close: 1.0,
            volume: 1.0,
        }
    }

    #[tokio::test]
    async fn send_then_recv_round_trips() {
        let mut bus = EventBus::with_capacity(4);
        let sender = bus.sender();
        sender.send(CoreEvent::BarArrived {
            pane_id: PaneId(0),
            bar: bar(),
        });
        match bus.recv().await.unwrap() {
            CoreEvent::BarArrived { pane_id, .. } => assert_eq!(pane_id, PaneId(0)),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn recv_returns_none_once_all_senders_dropped() {
        let mut bus = EventBus::with_capacity(4);
        {
            let _sender = bus.sender();
        }
        assert!(bus.recv().await.is_none());
    }

    #[tokio::test]
    async fn full_channel_drops_rather_than_blocks() {
        let mut bus = EventBus::with_capacity(1);
        let sender = bus.sender();
        sender.send(CoreEvent::BarArrived {
            pane_id: PaneId(0),
            bar: bar(),
        });
        // Channel now full; this send must not block the test.
        sender.send(CoreEvent::SubscriptionClosed { pane_id: PaneId(1) });

        let first = bus.recv().await.unwrap();
        assert!(matches!(first, CoreEvent::BarArrived { .. }));
    }

    #[test]
    fn host_event_carries_exact_field_set() {
        let event = HostEvent::PaneSelected {
            pane_index: 0,
            pane_id: PaneId(0),
            symbol: "AAPL".to_string(),
            interval: core_interval::parse("1D").unwrap(),
        };
        match event {
            HostEvent::PaneSelected {
                pane_index,
                pane_id,
                symbol,
                ..
            } => {
                assert_eq!(pane_index, 0);
                assert_eq!(pane_id, PaneId(0));
                assert_eq!(symbol, "AAPL");
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }
}
