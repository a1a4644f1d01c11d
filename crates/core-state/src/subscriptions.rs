//! The subscription rebalance algorithm: one live upstream subscription per
//! symbol, opened at the finest interval any of that symbol's panes ask
//! for (or the provider's own base interval, if it declares one finer),
//! plus the per-pane resamplers needed for panes whose interval is coarser
//! than the subscription.
//!
//! Extracted into its own module the way the teacher pulls undo bookkeeping
//! out of the state-owner crate: one self-contained algorithm, tested on
//! its own.

use core_events::{CoreEvent, EventBusSender};
use core_interval::Interval;
use core_model::{Bar, PaneId, PaneSettings};
use core_provider::{DataProvider, SubscriptionHandle};
use core_resampler::BarResampler;
use std::collections::BTreeMap;
use std::sync::Arc;

/// One live subscription: its negotiated interval, the handle that tears it
/// down on drop, the full membership of its symbol group (for fan-out), and
/// a resampler for every member pane whose interval differs from it.
struct SymbolSubscription {
    interval: Interval,
    handle: SubscriptionHandle,
    members: Vec<(PaneId, Interval)>,
    resamplers: BTreeMap<PaneId, BarResampler>,
}

/// Build a resampler for every member pane whose interval differs from the
/// group's negotiated `target`; panes at `target` are delivered to
/// directly and need none.
fn build_resamplers(members: &[(PaneId, Interval)], target: &Interval) -> BTreeMap<PaneId, BarResampler> {
    members
        .iter()
        .filter(|(_, interval)| interval != target)
        .filter_map(|(pane_id, interval)| match BarResampler::new(interval.clone()) {
            Ok(resampler) => Some((*pane_id, resampler)),
            Err(err) => {
                tracing::warn!(target: "state", %pane_id, token = interval.token(), error = %err, "interval cannot be resampled; pane will not receive live updates");
                None
            }
        })
        .collect()
}

/// Owns the coordinator's single active subscription per symbol. Panes
/// never subscribe directly; they are only ever members of a group here.
#[derive(Default)]
pub struct SubscriptionTable {
    subscriptions: BTreeMap<String, SymbolSubscription>,
}

impl SubscriptionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recompute every subscription from the current pane settings. Opens,
    /// keeps, or cancels subscriptions per symbol; never touches a
    /// subscription whose negotiated interval hasn't changed.
    pub async fn rebalance(
        &mut self,
        pane_settings: &BTreeMap<PaneId, PaneSettings>,
        provider: &Arc<dyn DataProvider>,
        events: &EventBusSender,
    ) {
        let mut groups: BTreeMap<String, Vec<(PaneId, Interval)>> = BTreeMap::new();
        for (id, settings) in pane_settings {
            groups
                .entry(settings.symbol.clone())
                .or_default()
                .push((*id, settings.interval.clone()));
        }

        let stale: Vec<String> = self
            .subscriptions
            .keys()
            .filter(|symbol| !groups.contains_key(*symbol))
            .cloned()
            .collect();
        for symbol in stale {
            tracing::debug!(target: "state", symbol, "symbol no longer referenced by any pane; cancelling subscription");
            self.subscriptions.remove(&symbol);
        }

        let capabilities = provider.capabilities();
        for (symbol, members) in groups {
            let requested_finest = core_interval::finest_of(members.iter().map(|(_, iv)| iv))
                .expect("group is non-empty by construction")
                .clone();
            let base = if capabilities.has_base_interval {
                provider.get_base_interval(&symbol).await
            } else {
                None
            };
            let target = core_provider::subscription_interval(&requested_finest, base.as_ref());

            if let Some(existing) = self.subscriptions.get_mut(&symbol)
                && existing.interval == target
            {
                // The group's negotiated interval hasn't moved, but an
                // individual pane's interval may have (S3: a pane can
                // change interval without moving the group's finest). Keep
                // the live handle; just refresh membership and resamplers.
                existing.resamplers = build_resamplers(&members, &target);
                existing.members = members;
                continue;
            }

            self.subscriptions.remove(&symbol);
            if !capabilities.can_subscribe {
                tracing::debug!(target: "state", symbol, "provider lacks subscribe capability; live updates disabled");
                continue;
            }

            let resamplers = build_resamplers(&members, &target);

            let sink_symbol = symbol.clone();
            let sink_events = events.clone();
            let handle = provider
                .subscribe(
                    &symbol,
                    &target,
                    Box::new(move |bar: Bar| {
                        sink_events.send(CoreEvent::SubscriptionBar {
                            symbol: sink_symbol.clone(),
                            bar,
                        });
                    }),
                )
                .await;

            self.subscriptions.insert(
                symbol,
                SymbolSubscription {
                    interval: target,
                    handle,
                    members,
                    resamplers,
                },
            );
        }
    }

    /// Distribute one raw subscription bar to its symbol's pane group: a
    /// pane whose interval matches the subscription receives `bar`
    /// directly, others receive whatever their resampler completes (if
    /// anything) this call. Returns the resolved `(pane, bar)` deliveries in
    /// pane-index order within the group.
    pub fn distribute(&mut self, symbol: &str, bar: Bar) -> Vec<(PaneId, Bar)> {
        let Some(sub) = self.subscriptions.get_mut(symbol) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        for (pane_id, interval) in &sub.members {
            if *interval == sub.interval {
                out.push((*pane_id, bar));
                continue;
            }
            if let Some(resampler) = sub.resamplers.get_mut(pane_id) {
                match resampler.add_bar(bar) {
                    Ok(Some(completed)) => out.push((*pane_id, completed)),
                    Ok(None) => {}
                    Err(err) => {
                        tracing::debug!(target: "state", %pane_id, error = %err, "resampler dropped out-of-order bar");
                    }
                }
            }
        }
        out
    }

    /// The negotiated subscription interval for `symbol`, if one is open.
    pub fn interval_for(&self, symbol: &str) -> Option<&Interval> {
        self.subscriptions.get(symbol).map(|sub| &sub.interval)
    }

    pub fn active_symbols(&self) -> impl Iterator<Item = &str> {
        self.subscriptions.keys().map(String::as_str)
    }

    /// Tear down every subscription (each handle's `Drop` unsubscribes).
    pub fn clear(&mut self) {
        self.subscriptions.clear();
    }
}
