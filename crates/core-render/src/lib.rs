//! `PaneChart`: the owner of one grid cell's displayed series, and the
//! opaque chart-renderer contract its host implements (`core-tui`'s ratatui
//! backend is the one shipped in this workspace).
//!
//! `PaneChart` never touches pixels — it only calls through [`ChartRenderer`].
//! Every operation here rebuilds the visual series solely from its owned bar
//! array plus attached indicators, so a chart-type change, or an indicator
//! attach/detach, can happen at any time without the legend ever diverging
//! from the data.

use core_interval::Interval;
use core_model::{Bar, ChartType, OakViewError, PaneId, PaneSettings};
use core_plugin::IndicatorRegistry;
use core_provider::{DataProvider, FetchPlan, negotiate};
use core_resampler::resample;
use std::sync::{Arc, Mutex};

/// Passthrough chart-level options the renderer applies verbatim (theme,
/// etc.). Kept intentionally thin; the concrete renderer owns layout/axes.
#[derive(Debug, Clone, Default)]
pub struct ChartOptions {
    pub theme: Option<String>,
}

/// Options accompanying `add_series`.
#[derive(Debug, Clone, Default)]
pub struct SeriesOptions {
    pub color: Option<String>,
}

/// The opaque chart-renderer contract: `create`, `applyOptions`,
/// `addSeries`, `removeSeries`, `setData`, `update`,
/// `subscribeCrosshairMove`, `fitContent`, `remove`. The core never touches
/// pixels or layout; it only calls through this trait. `Handle` identifies
/// one series (the main OHLCV series, or one indicator plot) within the
/// renderer's own bookkeeping.
pub trait ChartRenderer: Send {
    type Handle: Copy + Eq + std::fmt::Debug + Send;

    fn create(&mut self);
    fn apply_options(&mut self, options: ChartOptions);
    fn add_series(&mut self, kind: ChartType, options: SeriesOptions) -> Self::Handle;
    fn remove_series(&mut self, handle: Self::Handle);
    fn set_data(&mut self, handle: Self::Handle, bars: &[Bar]);
    fn update(&mut self, handle: Self::Handle, bar: Bar);
    fn subscribe_crosshair_move(&mut self, callback: Box<dyn FnMut(Option<i64>) + Send>);
    fn fit_content(&mut self);
    fn remove(&mut self);
}

/// One OHLC legend readout, colored by the spec's bullish/bearish rule.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OhlcReadout {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub bullish: bool,
}

impl From<Bar> for OhlcReadout {
    fn from(bar: Bar) -> Self {
        Self {
            open: bar.open,
            high: bar.high,
            low: bar.low,
            close: bar.close,
            volume: bar.volume,
            bullish: bar.is_bullish(),
        }
    }
}

/// One attached indicator's legend readout: the plug-in contract's
/// `metadata.plots[0].color` and `metadata.inputs[*].defval` (spec §6), read
/// fresh from the registry on every `legend()` call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndicatorReadout {
    pub id: String,
    pub title: String,
    pub color: Option<String>,
    pub default_value: Option<f64>,
}

/// Everything the legend needs: title strings, the readout driving the four
/// OHLC fields, and each attached indicator's readout.
#[derive(Debug, Clone, Default)]
pub struct Legend {
    pub symbol: String,
    pub interval_label: String,
    pub ohlc: Option<OhlcReadout>,
    pub indicator_values: Vec<IndicatorReadout>,
}

/// Owns the displayed series for one grid cell: bars, chart type, attached
/// indicators, crosshair state, and the renderer handles backing them.
pub struct PaneChart<R: ChartRenderer> {
    pane_id: PaneId,
    renderer: R,
    settings: PaneSettings,
    bars: Vec<Bar>,
    main_handle: Option<R::Handle>,
    indicators: Arc<Mutex<IndicatorRegistry>>,
    hovered_time: Option<i64>,
}

impl<R: ChartRenderer> PaneChart<R> {
    pub fn new(
        pane_id: PaneId,
        mut renderer: R,
        settings: PaneSettings,
        indicators: Arc<Mutex<IndicatorRegistry>>,
    ) -> Self {
        renderer.create();
        let main_handle = renderer.add_series(settings.chart_type, SeriesOptions::default());
        Self {
            pane_id,
            renderer,
            settings,
            bars: Vec::new(),
            main_handle: Some(main_handle),
            indicators,
            hovered_time: None,
        }
    }

    pub fn pane_id(&self) -> PaneId {
        self.pane_id
    }

    pub fn settings(&self) -> &PaneSettings {
        &self.settings
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    fn main_series(&self) -> R::Handle {
        self.main_handle.expect("main series is created in new() and only torn down in set_chart_type/Drop")
    }

    /// Projects the owned OHLCV array down to `(time, close)` triples when
    /// the active chart type is close-only; returns the bars as-is for
    /// OHLCV-derived types.
    fn series_view(&self) -> Vec<Bar> {
        if self.settings.chart_type.is_close_only() {
            self.bars.iter().map(|bar| project_close_only(*bar)).collect()
        } else {
            self.bars.clone()
        }
    }

    /// Replace the entire series, rebuild the visual series of the current
    /// chart type, and refresh the legend's titles/values from the last bar.
    pub fn set_data(&mut self, bars: Vec<Bar>) {
        self.bars = bars;
        let handle = self.main_series();
        let projected = self.series_view();
        self.renderer.set_data(handle, &projected);
    }

    /// Upsert a single bar by `time` identity: matches the last bar's time
    /// -> update in place; strictly later -> append. Anything else is
    /// silently dropped as out-of-order.
    pub fn update_realtime(&mut self, bar: Bar) {
        match self.bars.last().map(|last| last.time) {
            None => self.bars.push(bar),
            Some(last_time) if bar.time == last_time => {
                *self.bars.last_mut().expect("checked Some above") = bar;
            }
            Some(last_time) if bar.time > last_time => self.bars.push(bar),
            _ => return,
        }

        let handle = self.main_series();
        let projected = if self.settings.chart_type.is_close_only() {
            project_close_only(bar)
        } else {
            bar
        };
        self.renderer.update(handle, projected);

        if let Ok(mut indicators) = self.indicators.lock() {
            indicators.update_pane(self.pane_id, bar);
        }
    }

    /// Pipe `bars` through a fresh resampler targeting `target`, flushing
    /// the trailing partial bucket. Returns a new array without mutating
    /// this pane's own series.
    pub fn resample_historical_data(
        &self,
        bars: &[Bar],
        target: Interval,
    ) -> Result<Vec<Bar>, OakViewError> {
        resample(bars, target)
    }

    /// Orchestrate capability negotiation (see `core_provider::negotiate`)
    /// and call `set_data` with the result. The only coordinator-facing
    /// per-pane async entry point.
    pub async fn load_symbol_data(
        &mut self,
        provider: &dyn DataProvider,
        symbol: &str,
        interval: &Interval,
    ) -> Result<(), OakViewError> {
        let base = if provider.capabilities().has_base_interval {
            provider.get_base_interval(symbol).await
        } else {
            None
        };
        let bars = match negotiate(interval, base.as_ref()) {
            FetchPlan::Direct => provider.fetch_historical(symbol, interval).await?,
            FetchPlan::ResampleFromBase(base_interval) => {
                let base_bars = provider.fetch_historical(symbol, &base_interval).await?;
                self.resample_historical_data(&base_bars, interval.clone())?
            }
        };
        self.settings.symbol = symbol.to_string();
        self.settings.interval = interval.clone();
        self.set_data(bars);
        Ok(())
    }

    /// Teardown the current visual series, construct a new one of `kind`,
    /// repopulate from the owned OHLCV array.
    pub fn set_chart_type(&mut self, kind: ChartType) {
        if let Some(handle) = self.main_handle.take() {
            self.renderer.remove_series(handle);
        }
        self.settings.chart_type = kind;
        let handle = self.renderer.add_series(kind, SeriesOptions::default());
        self.main_handle = Some(handle);
        let projected = self.series_view();
        self.renderer.set_data(handle, &projected);
    }

    /// Resolve `id` against the shared indicator registry and attach it to
    /// this pane. Non-fatal: a missing factory or a failed `create` is
    /// logged by the registry and simply returns `false`.
    pub async fn attach_indicator(&mut self, id: &str) -> bool {
        let bars = self.bars.clone();
        let attached = {
            let mut indicators = self.indicators.lock().unwrap();
            indicators
                .attach_indicator(self.pane_id, id, &bars, serde_json::json!({}))
                .await
        };
        if attached {
            self.settings.indicators.push(id.to_string());
        }
        attached
    }

    pub fn detach_indicator(&mut self, id: &str) {
        self.indicators.lock().unwrap().detach_indicator(self.pane_id, id);
        self.settings.indicators.retain(|existing| existing != id);
    }

    /// Move the crosshair to `time`, or clear it (`None`) back to the
    /// default of "last bar". Drives the legend's OHLC readouts.
    pub fn hover_at(&mut self, time: Option<i64>) {
        self.hovered_time = time;
    }

    pub fn legend(&self) -> Legend {
        let active = match self.hovered_time {
            Some(time) => self.bars.iter().rev().find(|bar| bar.time == time).copied(),
            None => self.bars.last().copied(),
        };
        let indicators = self.indicators.lock().unwrap();
        Legend {
            symbol: self.settings.symbol.clone(),
            interval_label: self.settings.interval.token().to_string(),
            ohlc: active.map(OhlcReadout::from),
            indicator_values: self
                .settings
                .indicators
                .iter()
                .map(|id| match indicators.metadata(self.pane_id, id) {
                    Some(metadata) => IndicatorReadout {
                        id: id.clone(),
                        title: metadata.short_name.clone().unwrap_or_else(|| metadata.title.clone()),
                        color: metadata.plots.first().and_then(|plot| plot.color.clone()),
                        default_value: metadata
                            .inputs
                            .first()
                            .and_then(|input| input.default_value.as_f64()),
                    },
                    None => IndicatorReadout { id: id.clone(), ..Default::default() },
                })
                .collect(),
        }
    }
}

fn project_close_only(bar: Bar) -> Bar {
    Bar {
        open: bar.close,
        high: bar.close,
        low: bar.close,
        ..bar
    }
}

impl<R: ChartRenderer> Drop for PaneChart<R> {
    fn drop(&mut self) {
        if let Ok(mut indicators) = self.indicators.lock() {
            indicators.clear_pane(self.pane_id);
        }
        self.renderer.remove();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use core_model::SymbolRecord;
    use std::collections::HashMap;

    #[derive(Default)]
    struct FakeRenderer {
        next_handle: usize,
        series: HashMap<usize, Vec<Bar>>,
        removed: Vec<usize>,
        created: bool,
        removed_self: bool,
    }

    impl ChartRenderer for FakeRenderer {
        type Handle = usize;

        fn create(&mut self) {
            self.created = true;
        }

        fn apply_options(&mut self, _options: ChartOptions) {}

        fn add_series(&mut self, _kind: ChartType, _options: SeriesOptions) -> usize {
            let handle = self.next_handle;
            self.next_handle += 1;
            self.series.insert(handle, Vec::new());
            handle
        }

        fn remove_series(&mut self, handle: usize) {
            self.series.remove(&handle);
            self.removed.push(handle);
        }

        fn set_data(&mut self, handle: usize, bars: &[Bar]) {
            self.series.insert(handle, bars.to_vec());
        }

        fn update(&mut self, handle: usize, bar: Bar) {
            let series = self.series.entry(handle).or_default();
            match series.last_mut() {
                Some(last) if last.time == bar.time => *last = bar,
                _ => series.push(bar),
            }
        }

        fn subscribe_crosshair_move(&mut self, _callback: Box<dyn FnMut(Option<i64>) + Send>) {}

        fn fit_content(&mut self) {}

        fn remove(&mut self) {
            self.removed_self = true;
        }
    }

    struct FixedIndicatorHandle {
        metadata: core_plugin::IndicatorMetadata,
        last_value: Arc<Mutex<Option<f64>>>,
    }

    impl core_plugin::IndicatorHandle for FixedIndicatorHandle {
        fn metadata(&self) -> &core_plugin::IndicatorMetadata {
            &self.metadata
        }
        fn attach(&mut self) {}
        fn detach(&mut self) {}
        fn update(&mut self, bar: Bar) {
            *self.last_value.lock().unwrap() = Some(bar.close);
        }
        fn set_options(&mut self, _options: serde_json::Value) {}
    }

    struct SmaFactory {
        last_value: Arc<Mutex<Option<f64>>>,
    }

    #[async_trait]
    impl core_plugin::IndicatorFactory for SmaFactory {
        fn id(&self) -> &str {
            "sma"
        }
        async fn create(
            &self,
            _bars: &[Bar],
            _options: serde_json::Value,
        ) -> anyhow::Result<Box<dyn core_plugin::IndicatorHandle>> {
            Ok(Box::new(FixedIndicatorHandle {
                metadata: core_plugin::IndicatorMetadata {
                    title: "SMA".to_string(),
                    short_name: Some("SMA".to_string()),
                    overlay: true,
                    inputs: vec![core_plugin::InputMetadata {
                        name: "length".to_string(),
                        default_value: serde_json::json!(20),
                    }],
                    plots: vec![core_plugin::PlotMetadata { color: Some("#2962FF".to_string()) }],
                },
                last_value: self.last_value.clone(),
            }))
        }
    }

    struct StubProvider {
        base_interval: Option<Interval>,
        bars: Vec<Bar>,
    }

    #[async_trait]
    impl DataProvider for StubProvider {
        fn capabilities(&self) -> core_provider::ProviderCapabilities {
            core_provider::ProviderCapabilities {
                has_base_interval: self.base_interval.is_some(),
                ..Default::default()
            }
        }
        async fn fetch_historical(&self, _symbol: &str, _interval: &Interval) -> Result<Vec<Bar>, OakViewError> {
            Ok(self.bars.clone())
        }
        async fn disconnect(&self) {}
        async fn get_base_interval(&self, _symbol: &str) -> Option<Interval> {
            self.base_interval.clone()
        }
        async fn search_symbols(&self, _query: &str) -> Result<Vec<SymbolRecord>, OakViewError> {
            Ok(Vec::new())
        }
    }

    fn bar(time: i64, close: f64) -> Bar {
        Bar { time, open: close, high: close, low: close, close, volume: 1.0 }
    }

    fn new_pane(chart_type: ChartType) -> PaneChart<FakeRenderer> {
        let mut settings = PaneSettings::new("AAPL", core_interval::parse("1D").unwrap());
        settings.chart_type = chart_type;
        PaneChart::new(
            PaneId(0),
            FakeRenderer::default(),
            settings,
            Arc::new(Mutex::new(IndicatorRegistry::new())),
        )
    }

    #[test]
    fn set_data_populates_renderer_series() {
        let mut pane = new_pane(ChartType::Candlestick);
        pane.set_data(vec![bar(0, 1.0), bar(86_400, 2.0)]);
        assert_eq!(pane.bars().len(), 2);
        assert_eq!(pane.renderer.series[&0].len(), 2);
    }

    #[test]
    fn update_realtime_replaces_matching_last_bar() {
        let mut pane = new_pane(ChartType::Candlestick);
        pane.set_data(vec![bar(0, 1.0)]);
        pane.update_realtime(bar(0, 1.5));
        assert_eq!(pane.bars().len(), 1);
        assert_eq!(pane.bars()[0].close, 1.5);
    }

    #[test]
    fn update_realtime_appends_when_strictly_later() {
        let mut pane = new_pane(ChartType::Candlestick);
        pane.set_data(vec![bar(0, 1.0)]);
        pane.update_realtime(bar(60, 2.0));
        assert_eq!(pane.bars().len(), 2);
        assert_eq!(pane.bars()[1].time, 60);
    }

    #[test]
    fn update_realtime_drops_out_of_order_bar() {
        let mut pane = new_pane(ChartType::Candlestick);
        pane.set_data(vec![bar(60, 1.0)]);
        pane.update_realtime(bar(0, 9.0));
        assert_eq!(pane.bars().len(), 1);
        assert_eq!(pane.bars()[0].time, 60);
    }

    #[test]
    fn close_only_chart_types_project_bars() {
        let mut pane = new_pane(ChartType::Line);
        pane.set_data(vec![bar(0, 5.0)]);
        let projected = &pane.renderer.series[&0][0];
        assert_eq!(projected.open, 5.0);
        assert_eq!(projected.high, 5.0);
        assert_eq!(projected.low, 5.0);
        assert_eq!(projected.close, 5.0);
    }

    #[test]
    fn set_chart_type_removes_old_series_and_rebuilds_from_owned_data() {
        let mut pane = new_pane(ChartType::Candlestick);
        pane.set_data(vec![bar(0, 1.0), bar(60, 2.0)]);
        pane.set_chart_type(ChartType::Line);
        assert_eq!(pane.renderer.removed, vec![0]);
        assert_eq!(pane.renderer.series[&1].len(), 2);
        assert_eq!(pane.settings().chart_type, ChartType::Line);
    }

    #[test]
    fn legend_defaults_to_last_bar_and_switches_on_hover() {
        let mut pane = new_pane(ChartType::Candlestick);
        pane.set_data(vec![bar(0, 1.0), bar(60, 2.0)]);
        assert_eq!(pane.legend().ohlc.unwrap().close, 2.0);
        pane.hover_at(Some(0));
        assert_eq!(pane.legend().ohlc.unwrap().close, 1.0);
        pane.hover_at(None);
        assert_eq!(pane.legend().ohlc.unwrap().close, 2.0);
    }

    #[tokio::test]
    async fn attach_then_update_then_detach_indicator() {
        let mut pane = new_pane(ChartType::Candlestick);
        let last_value = Arc::new(Mutex::new(None));
        pane.indicators
            .lock()
            .unwrap()
            .register(Arc::new(SmaFactory { last_value: last_value.clone() }));

        assert!(pane.attach_indicator("sma").await);
        assert_eq!(pane.settings().indicators, vec!["sma".to_string()]);

        let readout = &pane.legend().indicator_values[0];
        assert_eq!(readout.id, "sma");
        assert_eq!(readout.title, "SMA");
        assert_eq!(readout.color.as_deref(), Some("#2962FF"));
        assert_eq!(readout.default_value, Some(20.0));

        pane.set_data(vec![bar(0, 3.0)]);
        pane.update_realtime(bar(60, 4.0));
        assert_eq!(*last_value.lock().unwrap(), Some(4.0));

        pane.detach_indicator("sma");
        assert!(pane.settings().indicators.is_empty());
        assert!(pane.legend().indicator_values.is_empty());
    }

    #[tokio::test]
    async fn load_symbol_data_resamples_when_requested_is_coarser_than_base() {
        let provider = StubProvider {
            base_interval: Some(core_interval::parse("1D").unwrap()),
            bars: vec![bar(0, 1.0), bar(86_400 * 6, 2.0)],
        };
        let mut pane = new_pane(ChartType::Candlestick);
        let target = core_interval::parse("1W").unwrap();
        pane.load_symbol_data(&provider, "AAPL", &target).await.unwrap();
        assert_eq!(pane.bars().len(), 1);
        assert_eq!(pane.settings().interval, target);
    }
}
