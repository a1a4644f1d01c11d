//! Selection/expansion actions: `selectPane`, `toggleExpansion`. Both are
//! synchronous — neither touches a provider or persists anything.

use crate::ActionOutcome;
use core_config::ConfigStorage;
use core_render::ChartRenderer;
use core_state::LayoutCoordinator;

pub fn handle_select_pane<R, S>(coordinator: &mut LayoutCoordinator<R, S>, index: usize) -> ActionOutcome
where
    R: ChartRenderer,
    S: ConfigStorage,
{
    coordinator.select_pane(index);
    ActionOutcome::redraw()
}

pub fn handle_toggle_expansion<R, S>(coordinator: &mut LayoutCoordinator<R, S>, index: usize) -> ActionOutcome
where
    R: ChartRenderer,
    S: ConfigStorage,
{
    coordinator.toggle_expansion(index);
    ActionOutcome::redraw()
}
