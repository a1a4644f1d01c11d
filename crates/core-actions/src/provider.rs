//! Swapping the data source: `setDataProvider`.

use crate::ActionOutcome;
use core_config::ConfigStorage;
use core_provider::DataProvider;
use core_render::ChartRenderer;
use core_state::LayoutCoordinator;
use std::sync::Arc;

pub async fn handle_set_data_provider<R, S>(
    coordinator: &mut LayoutCoordinator<R, S>,
    provider: Arc<dyn DataProvider>,
) -> ActionOutcome
where
    R: ChartRenderer,
    S: ConfigStorage,
{
    coordinator.set_data_provider(provider).await;
    ActionOutcome::redraw()
}
