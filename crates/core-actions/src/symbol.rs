//! Pane-content actions: symbol, interval, chart type, indicator
//! attach/detach, and crosshair hover — everything that targets the
//! currently selected pane rather than the grid as a whole.

use crate::ActionOutcome;
use core_config::ConfigStorage;
use core_interval::Interval;
use core_model::ChartType;
use core_render::ChartRenderer;
use core_state::LayoutCoordinator;

pub async fn handle_change_symbol<R, S>(coordinator: &mut LayoutCoordinator<R, S>, symbol: String) -> ActionOutcome
where
    R: ChartRenderer,
    S: ConfigStorage,
{
    coordinator.on_symbol_change(symbol).await;
    ActionOutcome::redraw()
}

pub async fn handle_change_interval<R, S>(coordinator: &mut LayoutCoordinator<R, S>, interval: Interval) -> ActionOutcome
where
    R: ChartRenderer,
    S: ConfigStorage,
{
    coordinator.on_interval_change(interval).await;
    ActionOutcome::redraw()
}

pub fn handle_set_chart_type<R, S>(coordinator: &mut LayoutCoordinator<R, S>, kind: ChartType) -> ActionOutcome
where
    R: ChartRenderer,
    S: ConfigStorage,
{
    if coordinator.set_chart_type(kind) {
        ActionOutcome::redraw()
    } else {
        ActionOutcome::clean()
    }
}

pub async fn handle_attach_indicator<R, S>(coordinator: &mut LayoutCoordinator<R, S>, id: String) -> ActionOutcome
where
    R: ChartRenderer,
    S: ConfigStorage,
{
    let pane = coordinator.selected_pane();
    if coordinator.attach_indicator(id.clone()).await {
        ActionOutcome::redraw()
    } else {
        tracing::debug!(target: "actions", %pane, indicator = %id, "attach declined by registry; no-op");
        ActionOutcome::clean()
    }
}

pub fn handle_detach_indicator<R, S>(coordinator: &mut LayoutCoordinator<R, S>, id: String) -> ActionOutcome
where
    R: ChartRenderer,
    S: ConfigStorage,
{
    if coordinator.detach_indicator(&id) {
        ActionOutcome::redraw()
    } else {
        ActionOutcome::clean()
    }
}

pub fn handle_hover_at<R, S>(coordinator: &mut LayoutCoordinator<R, S>, time: Option<i64>) -> ActionOutcome
where
    R: ChartRenderer,
    S: ConfigStorage,
{
    let pane = coordinator.selected_pane();
    match coordinator.pane_mut(pane) {
        Some(chart) => {
            chart.hover_at(time);
            ActionOutcome::redraw()
        }
        None => ActionOutcome::clean(),
    }
}
