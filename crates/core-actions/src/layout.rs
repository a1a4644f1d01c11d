//! Grid-shape actions: `setLayoutMode`.

use crate::ActionOutcome;
use core_config::ConfigStorage;
use core_model::LayoutMode;
use core_render::ChartRenderer;
use core_state::LayoutCoordinator;

pub async fn handle_set_layout_mode<R, S>(coordinator: &mut LayoutCoordinator<R, S>, mode: LayoutMode) -> ActionOutcome
where
    R: ChartRenderer,
    S: ConfigStorage,
{
    coordinator.set_layout_mode(mode).await;
    ActionOutcome::redraw()
}
