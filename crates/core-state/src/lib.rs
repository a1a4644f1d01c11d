//! `LayoutCoordinator`: the heart of the system. Owns the pane grid, the
//! focused-pane index, every pane's settings, the single upstream
//! subscription per symbol, and configuration persistence.
//!
//! Subscription bookkeeping (the rebalance algorithm) is extracted into
//! [`subscriptions`] the way the teacher pulls undo bookkeeping out of its
//! own state-owner crate: one self-contained algorithm, tested on its own.
//!
//! Panes never hold a pointer back to the coordinator — they are named by
//! [`PaneId`] alone (see `core-model`'s module doc for why). Everything the
//! coordinator does to a pane goes through the id, never the reverse.

pub mod subscriptions;

use core_config::{ConfigStorage, ConfigStore, PersistedPane, PersistedState};
use core_events::{CoreEvent, EventBusSender, EventHooks, HostEvent};
use core_interval::Interval;
use core_model::{CoordinatorState, LayoutMode, PaneId, PaneSettings};
use core_plugin::{IndicatorFactory, IndicatorRegistry};
use core_provider::DataProvider;
use core_render::{ChartRenderer, PaneChart};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use subscriptions::SubscriptionTable;

/// Owns every live pane, the current layout/selection/persistence state,
/// and the single subscription table shared across panes of the same
/// symbol.
pub struct LayoutCoordinator<R: ChartRenderer, S: ConfigStorage> {
    state: CoordinatorState,
    panes: BTreeMap<PaneId, PaneChart<R>>,
    /// Settings of panes removed from the active layout. Retained so a
    /// later `setLayoutMode` back to a larger grid restores them instead of
    /// re-seeding defaults; garbage-collectable on the next save.
    retained_settings: BTreeMap<PaneId, PaneSettings>,
    provider: Arc<dyn DataProvider>,
    make_renderer: Box<dyn Fn() -> R + Send>,
    indicators: Arc<Mutex<IndicatorRegistry>>,
    subscriptions: SubscriptionTable,
    events: EventBusSender,
    hooks: Arc<dyn EventHooks>,
    config: ConfigStore<S>,
    default_symbol: String,
    default_interval: Interval,
}

impl<R: ChartRenderer, S: ConfigStorage> LayoutCoordinator<R, S> {
    pub fn new(
        provider: Arc<dyn DataProvider>,
        make_renderer: Box<dyn Fn() -> R + Send>,
        config: ConfigStore<S>,
        default_symbol: impl Into<String>,
        default_interval: Interval,
        events: EventBusSender,
        hooks: Arc<dyn EventHooks>,
    ) -> Self {
        let default_symbol = default_symbol.into();
        let mut pane_settings = BTreeMap::new();
        pane_settings.insert(PaneId(0), PaneSettings::new(default_symbol.clone(), default_interval.clone()));
        Self {
            state: CoordinatorState {
                layout_mode: LayoutMode::Single,
                selected_pane_index: 0,
                expanded_pane_index: None,
                pane_settings,
                previous_layout_mode: None,
            },
            panes: BTreeMap::new(),
            retained_settings: BTreeMap::new(),
            provider,
            make_renderer,
            indicators: Arc::new(Mutex::new(IndicatorRegistry::new())),
            subscriptions: SubscriptionTable::new(),
            events,
            hooks,
            config,
            default_symbol,
            default_interval,
        }
    }

    pub fn state(&self) -> &CoordinatorState {
        &self.state
    }

    pub fn pane(&self, id: PaneId) -> Option<&PaneChart<R>> {
        self.panes.get(&id)
    }

    pub fn pane_mut(&mut self, id: PaneId) -> Option<&mut PaneChart<R>> {
        self.panes.get_mut(&id)
    }

    pub fn selected_pane(&self) -> PaneId {
        self.selected_pane_id()
    }

    pub fn events(&self) -> EventBusSender {
        self.events.clone()
    }

    pub fn register_indicator_factory(&self, factory: Arc<dyn IndicatorFactory>) {
        self.indicators.lock().unwrap().register(factory);
    }

    fn selected_pane_id(&self) -> PaneId {
        PaneId(self.state.selected_pane_index)
    }

    fn clamp_index(&self, index: usize) -> usize {
        let max = self.state.layout_mode.pane_count().saturating_sub(1);
        if index > max {
            tracing::warn!(target: "state", index, max, "pane index out of range; clamped");
            max
        } else {
            index
        }
    }

    /// Read-on-start: adopt a persisted layout (if present) before
    /// instantiating any pane, then build panes for the resulting layout
    /// and recompute subscriptions. Call once before serving panes to a
    /// host.
    pub async fn start(&mut self) {
        let restored = self.load_config();
        for id in self.state.layout_mode.pane_ids() {
            let default_symbol = self.default_symbol.clone();
            let default_interval = self.default_interval.clone();
            let settings = self
                .state
                .pane_settings
                .entry(id)
                .or_insert_with(|| PaneSettings::new(default_symbol, default_interval))
                .clone();
            self.panes
                .entry(id)
                .or_insert_with(|| PaneChart::new(id, (self.make_renderer)(), settings, self.indicators.clone()));
        }
        if restored {
            let panes = self
                .state
                .layout_mode
                .pane_ids()
                .into_iter()
                .filter_map(|id| self.state.pane_settings.get(&id).cloned())
                .collect();
            self.hooks.on_host_event(&HostEvent::ConfigRestored {
                layout: self.state.layout_mode,
                panes,
            });
        }
        self.rebalance_subscriptions().await;
    }

    fn load_config(&mut self) -> bool {
        let Some(persisted) = self.config.load() else {
            return false;
        };
        self.state.layout_mode = persisted.layout_mode;
        self.state.pane_settings = persisted
            .panes
            .into_iter()
            .map(|pane| {
                (
                    pane.id,
                    PaneSettings {
                        symbol: pane.symbol,
                        interval: pane.interval,
                        chart_type: pane.chart_type,
                        indicators: pane.indicators,
                    },
                )
            })
            .collect();
        true
    }

    /// Write-on-mutation: persist `{ layoutMode, panes }` exactly, merging
    /// into whatever the store last round-tripped so unrelated keys aren't
    /// clobbered.
    pub fn save_config(&mut self) {
        let panes = self
            .state
            .pane_settings
            .iter()
            .map(|(id, settings)| PersistedPane {
                id: *id,
                symbol: settings.symbol.clone(),
                interval: settings.interval.clone(),
                chart_type: settings.chart_type,
                indicators: settings.indicators.clone(),
            })
            .collect();
        self.config.save(&PersistedState {
            layout_mode: self.state.layout_mode,
            panes,
        });
    }

    /// Replace the pane set. Pane-ids already present in both the old and
    /// new layout keep their settings untouched; newly-introduced ids
    /// inherit retained settings if this id was seen before, or the
    /// coordinator's defaults otherwise; ids dropped from the new layout
    /// have their settings moved to `retained_settings` rather than
    /// discarded.
    pub async fn set_layout_mode(&mut self, mode: LayoutMode) {
        let new_ids = mode.pane_ids();
        let old_ids: Vec<PaneId> = self.state.pane_settings.keys().copied().collect();

        for id in old_ids {
            if !new_ids.contains(&id)
                && let Some(settings) = self.state.pane_settings.remove(&id)
            {
                self.retained_settings.insert(id, settings);
                self.panes.remove(&id);
            }
        }

        for id in &new_ids {
            if !self.state.pane_settings.contains_key(id) {
                let settings = self.retained_settings.remove(id).unwrap_or_else(|| {
                    PaneSettings::new(self.default_symbol.clone(), self.default_interval.clone())
                });
                self.state.pane_settings.insert(*id, settings);
            }
            if !self.panes.contains_key(id) {
                let settings = self.state.pane_settings[id].clone();
                self.panes
                    .insert(*id, PaneChart::new(*id, (self.make_renderer)(), settings, self.indicators.clone()));
            }
        }

        self.state.previous_layout_mode = Some(self.state.layout_mode);
        self.state.layout_mode = mode;
        self.state.selected_pane_index = self.clamp_index(self.state.selected_pane_index);
        self.state.expanded_pane_index = None;

        self.hooks.on_host_event(&HostEvent::LayoutChange { layout: mode });
        self.rebalance_subscriptions().await;

        for id in &new_ids {
            let (symbol, interval) = {
                let settings = &self.state.pane_settings[id];
                (settings.symbol.clone(), settings.interval.clone())
            };
            if self.panes[id].bars().is_empty() {
                self.reload_pane(*id, &symbol, &interval).await;
            }
        }
        self.save_config();
    }

    /// Updates `selectedPaneIndex`; the control surface now reads/writes
    /// this pane's settings.
    pub fn select_pane(&mut self, index: usize) {
        let index = self.clamp_index(index);
        self.state.selected_pane_index = index;
        let id = PaneId(index);
        let settings = self.state.pane_settings.get(&id).cloned().unwrap_or_else(|| {
            PaneSettings::new(self.default_symbol.clone(), self.default_interval.clone())
        });
        self.hooks.on_host_event(&HostEvent::PaneSelected {
            pane_index: index,
            pane_id: id,
            symbol: settings.symbol,
            interval: settings.interval,
        });
    }

    /// No pane expanded -> hide all but `index`, single-rendering.
    /// Expanded, different index clicked -> switch focus, stay expanded.
    /// Expanded, same index clicked -> collapse back to the full grid.
    /// Never touches `layoutMode`.
    pub fn toggle_expansion(&mut self, index: usize) {
        let index = self.clamp_index(index);
        self.state.expanded_pane_index = match self.state.expanded_pane_index {
            Some(current) if current == index => None,
            _ => Some(index),
        };
    }

    /// Change only the selected pane's symbol; rebalance subscriptions;
    /// reload data for `(newSymbol, pane.interval)`.
    pub async fn on_symbol_change(&mut self, new_symbol: impl Into<String>) {
        let new_symbol = new_symbol.into();
        let id = self.selected_pane_id();
        let Some(settings) = self.state.pane_settings.get_mut(&id) else {
            return;
        };
        settings.symbol = new_symbol.clone();
        let interval = settings.interval.clone();

        self.hooks.on_host_event(&HostEvent::SymbolChange {
            symbol: new_symbol.clone(),
            pane_index: self.state.selected_pane_index,
            pane_id: id,
        });

        self.rebalance_subscriptions().await;
        self.reload_pane(id, &new_symbol, &interval).await;
        self.save_config();
    }

    /// Change only the selected pane's interval; rebalance subscriptions
    /// (may change the group's subscription interval); reload data for
    /// that pane.
    pub async fn on_interval_change(&mut self, new_interval: Interval) {
        let id = self.selected_pane_id();
        let Some(settings) = self.state.pane_settings.get_mut(&id) else {
            return;
        };
        settings.interval = new_interval.clone();
        let symbol = settings.symbol.clone();

        self.hooks.on_host_event(&HostEvent::IntervalChange {
            interval: new_interval.clone(),
            pane_index: self.state.selected_pane_index,
            pane_id: id,
            symbol: symbol.clone(),
        });

        self.rebalance_subscriptions().await;
        self.reload_pane(id, &symbol, &new_interval).await;
        self.save_config();
    }

    /// Propagate a new provider to every pane; tear down existing
    /// subscriptions and rebuild against it.
    pub async fn set_data_provider(&mut self, provider: Arc<dyn DataProvider>) {
        self.subscriptions.clear();
        self.provider = provider;
        self.rebalance_subscriptions().await;
    }

    pub async fn rebalance_subscriptions(&mut self) {
        self.subscriptions
            .rebalance(&self.state.pane_settings, &self.provider, &self.events)
            .await;
    }

    /// Orchestrate a historical load for `pane`, via the capability
    /// negotiation `PaneChart::load_symbol_data` performs. On failure the
    /// pane is left with an empty series, the failure is logged, and a
    /// `load-error` host event is emitted; no other state is touched.
    async fn reload_pane(&mut self, pane: PaneId, symbol: &str, interval: &Interval) {
        let Some(chart) = self.panes.get_mut(&pane) else {
            return;
        };
        match chart.load_symbol_data(self.provider.as_ref(), symbol, interval).await {
            Ok(()) => {
                if let Some(settings) = self.state.pane_settings.get_mut(&pane) {
                    *settings = chart.settings().clone();
                }
            }
            Err(err) => {
                tracing::warn!(
                    target: "state",
                    %pane,
                    symbol,
                    interval = interval.token(),
                    error = %err,
                    "historical load failed; pane left empty"
                );
                chart.set_data(Vec::new());
                self.hooks.on_host_event(&HostEvent::LoadError {
                    pane_id: pane,
                    symbol: symbol.to_string(),
                    interval: interval.clone(),
                    error: err.to_string(),
                });
            }
        }
    }

    /// Teardown the selected pane's visual series and rebuild it as `kind`,
    /// syncing the persisted settings copy and writing it back. Returns
    /// `false` if the selected pane doesn't exist.
    pub fn set_chart_type(&mut self, kind: core_model::ChartType) -> bool {
        let id = self.selected_pane_id();
        let Some(chart) = self.panes.get_mut(&id) else {
            return false;
        };
        chart.set_chart_type(kind);
        if let Some(settings) = self.state.pane_settings.get_mut(&id) {
            settings.chart_type = kind;
        }
        self.save_config();
        true
    }

    /// Attach `id` to the selected pane via the shared indicator registry,
    /// syncing the persisted settings copy on success. Non-fatal: a missing
    /// factory or failed `create` returns `false` without touching state.
    pub async fn attach_indicator(&mut self, id: String) -> bool {
        let pane = self.selected_pane_id();
        let Some(chart) = self.panes.get_mut(&pane) else {
            return false;
        };
        if !chart.attach_indicator(&id).await {
            return false;
        }
        if let Some(settings) = self.state.pane_settings.get_mut(&pane) {
            settings.indicators = chart.settings().indicators.clone();
        }
        self.save_config();
        true
    }

    /// Detach `id` from the selected pane, syncing the persisted settings
    /// copy. Returns `false` if the selected pane doesn't exist.
    pub fn detach_indicator(&mut self, id: &str) -> bool {
        let pane = self.selected_pane_id();
        let Some(chart) = self.panes.get_mut(&pane) else {
            return false;
        };
        chart.detach_indicator(id);
        if let Some(settings) = self.state.pane_settings.get_mut(&pane) {
            settings.indicators = chart.settings().indicators.clone();
        }
        self.save_config();
        true
    }

    /// Drain and apply one internal event: fan a raw subscription bar out
    /// to its symbol group (direct update or through a resampler), or apply
    /// an already-resolved per-pane event. A subscription callback can
    /// never propagate a panic past this boundary back to the provider —
    /// the worst a malformed bar does is get logged and dropped by the
    /// resampler.
    pub fn handle_core_event(&mut self, event: CoreEvent) {
        match event {
            CoreEvent::SubscriptionBar { symbol, bar } => {
                for (pane_id, bar) in self.subscriptions.distribute(&symbol, bar) {
                    if let Some(chart) = self.panes.get_mut(&pane_id) {
                        chart.update_realtime(bar);
                    }
                }
            }
            CoreEvent::BarArrived { pane_id, bar } => {
                if let Some(chart) = self.panes.get_mut(&pane_id) {
                    chart.update_realtime(bar);
                }
            }
            CoreEvent::FetchCompleted { pane_id, bars } => {
                if let Some(chart) = self.panes.get_mut(&pane_id) {
                    chart.set_data(bars);
                }
            }
            CoreEvent::FetchFailed { pane_id, symbol, interval, error } => {
                if let Some(chart) = self.panes.get_mut(&pane_id) {
                    chart.set_data(Vec::new());
                }
                tracing::warn!(target: "state", %pane_id, symbol, interval = interval.token(), %error, "fetch failed");
                self.hooks.on_host_event(&HostEvent::LoadError { pane_id, symbol, interval, error });
            }
            CoreEvent::SubscriptionClosed { pane_id } => {
                tracing::warn!(target: "state", %pane_id, "subscription closed by provider outside an explicit unsubscribe");
            }
        }
    }
}
