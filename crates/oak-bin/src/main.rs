//! Demonstration entrypoint wiring every OakView crate together against the
//! mock provider: a `clap`-driven binary that constructs a coordinator,
//! exercises it, and optionally draws the focused pane with a terminal UI.
//! Logging setup (`tracing-subscriber` with an `EnvFilter`, a non-blocking
//! rolling file appender via `tracing-appender`) follows the teacher's own
//! entrypoint.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use core_actions::{CoordinatorAction, dispatch};
use core_config::{ConfigStorage, ConfigStore, FileStorage, InMemoryStorage};
use core_events::{EventBus, EventHooks, HostEvent};
use core_interval::Interval;
use core_model::{Bar, LayoutMode};
use core_provider::DataProvider;
use core_provider::mock::MockProvider;
use core_render::ChartRenderer;
use core_state::LayoutCoordinator;
use core_tui::TuiChartRenderer;
use crossterm::event::{self, Event as TermEvent, KeyCode};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;

#[derive(Parser, Debug)]
#[command(name = "oak-bin", version, about = "OakView demonstration host")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build a fresh coordinator against the mock provider and drive it
    /// through layout/symbol/interval changes, printing every host event.
    Run {
        #[arg(long, default_value = "single")]
        layout: String,
        #[arg(long, default_value = "AAPL")]
        symbol: String,
        #[arg(long, default_value = "1D")]
        interval: String,
        /// Directory of `<SYMBOL>.json` fixture files (bar arrays) to seed
        /// the mock provider with. Without this a small synthetic series is
        /// generated for `--symbol`.
        #[arg(long)]
        fixture: Option<PathBuf>,
        /// Persist layout/pane settings here on every mutation.
        #[arg(long)]
        config: Option<PathBuf>,
        /// Draw the focused pane's candles in the terminal instead of
        /// printing a textual summary.
        #[arg(long)]
        tui: bool,
    },
    /// Reload a previously saved config blob and print the restored layout.
    Replay {
        #[arg(long)]
        config: PathBuf,
        #[arg(long)]
        tui: bool,
    },
}

fn configure_logging() -> Result<WorkerGuard> {
    let log_dir = Path::new(".");
    let log_path = log_dir.join("oak-bin.log");
    if log_path.exists() {
        let _ = std::fs::remove_file(&log_path);
    }
    let file_appender = tracing_appender::rolling::never(log_dir, "oak-bin.log");
    let (writer, guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(writer)
        .try_init()
        .ok();
    Ok(guard)
}

/// Logs every host event at `info`, matching the demonstration requirement
/// that every `HostEvent` reach the operator via `tracing`; core events fire
/// once per live tick and are left to `trace` level instead.
struct LoggingHooks;

impl EventHooks for LoggingHooks {
    fn on_host_event(&self, event: &HostEvent) {
        info!(target: "oak-bin.host_event", ?event, "host event");
    }
}

fn parse_layout(token: &str) -> Result<LayoutMode> {
    match token {
        "single" | "1x1" => Ok(LayoutMode::Single),
        "2x1" => Ok(LayoutMode::TwoByOne),
        "1x2" => Ok(LayoutMode::OneByTwo),
        "2x2" => Ok(LayoutMode::TwoByTwo),
        "3x1" => Ok(LayoutMode::ThreeByOne),
        "1x3" => Ok(LayoutMode::OneByThree),
        other => anyhow::bail!("unknown layout {other:?}; expected one of single, 2x1, 1x2, 2x2, 3x1, 1x3"),
    }
}

/// A flat uptrend series, stepped by `interval`'s own duration, used when no
/// `--fixture` directory is supplied.
fn synthetic_series(interval: &Interval, bars: usize) -> Vec<Bar> {
    let step = core_interval::to_milliseconds(interval).map(|ms| ms / 1000).unwrap_or(86_400);
    (0..bars)
        .map(|i| {
            let open = 100.0 + i as f64;
            Bar {
                time: i as i64 * step,
                open,
                high: open + 2.0,
                low: open - 1.0,
                close: open + 1.0,
                volume: 10.0,
            }
        })
        .collect()
}

/// Reads every `<SYMBOL>.json` file in `dir` (a JSON array of bars) and
/// seeds the mock provider with it at `interval`, declaring that same
/// interval as each symbol's base.
fn load_fixtures(provider: MockProvider, dir: &Path, interval: &Interval) -> Result<MockProvider> {
    let mut provider = provider;
    for entry in std::fs::read_dir(dir).with_context(|| format!("reading fixture directory {}", dir.display()))? {
        let entry = entry?;
        let path = entry.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
            continue;
        }
        let symbol = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| anyhow::anyhow!("fixture file {} has no usable stem", path.display()))?
            .to_string();
        let raw = std::fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
        let bars: Vec<Bar> = serde_json::from_str(&raw).with_context(|| format!("parsing {} as a bar array", path.display()))?;
        info!(target: "oak-bin", symbol = %symbol, bar_count = bars.len(), "loaded fixture");
        provider = provider.with_historical(&symbol, interval, bars).with_base_interval(&symbol, interval.clone());
    }
    Ok(provider)
}

fn build_provider(fixture: Option<&Path>, symbol: &str, interval: &Interval) -> Result<MockProvider> {
    let provider = MockProvider::new();
    match fixture {
        Some(dir) => load_fixtures(provider, dir, interval),
        None => Ok(provider
            .with_historical(symbol, interval, synthetic_series(interval, 60))
            .with_base_interval(symbol, interval.clone())),
    }
}

/// For every pane in the active layout, select it and re-apply its own
/// symbol. `ChangeSymbol` always reloads regardless of whether the value
/// changed, which is the only dispatch path that triggers a fetch outside of
/// an actual symbol/interval edit — `start()` deliberately leaves every pane
/// empty, firing `config-restored` as the cue for the host to load data
/// itself.
async fn load_every_pane<R: ChartRenderer, S: ConfigStorage>(coordinator: &mut LayoutCoordinator<R, S>) {
    let pane_ids = coordinator.state().layout_mode.pane_ids();
    let original_selection = coordinator.state().selected_pane_index;
    for id in pane_ids {
        let Some(symbol) = coordinator.state().pane_settings.get(&id).map(|s| s.symbol.clone()) else {
            continue;
        };
        dispatch(CoordinatorAction::SelectPane(id.0), coordinator).await;
        dispatch(CoordinatorAction::ChangeSymbol(symbol), coordinator).await;
    }
    dispatch(CoordinatorAction::SelectPane(original_selection), coordinator).await;
}

fn print_pane_summary<R: ChartRenderer, S: ConfigStorage>(coordinator: &LayoutCoordinator<R, S>) {
    for id in coordinator.state().layout_mode.pane_ids() {
        let Some(pane) = coordinator.pane(id) else { continue };
        let legend = pane.legend();
        println!(
            "{id}: {symbol} {interval} {chart_type:?} bars={bars} last_close={close:?}",
            id = id,
            symbol = pane.settings().symbol,
            interval = pane.settings().interval.token(),
            chart_type = pane.settings().chart_type,
            bars = pane.bars().len(),
            close = legend.ohlc.map(|o| o.close),
        );
    }
}

/// `PaneChart` keeps its renderer private, so the TUI path mirrors a pane's
/// own bar array into a scratch renderer on every frame rather than reaching
/// into the pane for one.
fn draw_pane(pane: &core_render::PaneChart<TuiChartRenderer>, frame: &mut ratatui::Frame, area: ratatui::layout::Rect) {
    let mut scratch = TuiChartRenderer::new();
    let handle = scratch.add_series(pane.settings().chart_type, core_render::SeriesOptions::default());
    scratch.set_data(handle, pane.bars());
    let title = format!("{} {}", pane.settings().symbol, pane.settings().interval.token());
    scratch.render(frame, area, &title);
}

async fn run_tui<S: ConfigStorage>(coordinator: &mut LayoutCoordinator<TuiChartRenderer, S>) -> Result<()> {
    enable_raw_mode()?;
    let mut terminal = Terminal::new(CrosstermBackend::new(std::io::stdout()))?;

    let result = (|| -> Result<()> {
        loop {
            let focused = coordinator.selected_pane();
            terminal.draw(|frame| {
                if let Some(pane) = coordinator.pane(focused) {
                    draw_pane(pane, frame, frame.area());
                }
            })?;

            if event::poll(Duration::from_millis(200))?
                && let TermEvent::Key(key) = event::read()?
                && matches!(key.code, KeyCode::Char('q') | KeyCode::Esc)
            {
                break;
            }
        }
        Ok(())
    })();

    disable_raw_mode()?;
    result
}

enum ConfigBackend {
    File(FileStorage),
    Memory(InMemoryStorage),
}

impl ConfigStorage for ConfigBackend {
    fn load(&self) -> Option<String> {
        match self {
            Self::File(s) => s.load(),
            Self::Memory(s) => s.load(),
        }
    }

    fn save(&self, blob: &str) {
        match self {
            Self::File(s) => s.save(blob),
            Self::Memory(s) => s.save(blob),
        }
    }
}

fn config_store_backend(path: Option<PathBuf>) -> ConfigBackend {
    match path {
        Some(path) => ConfigBackend::File(FileStorage::new(path)),
        None => ConfigBackend::Memory(InMemoryStorage::new()),
    }
}

/// A `ChartRenderer` that discards everything it's given. Used for the
/// non-`--tui` path, where `oak-bin` only needs `PaneChart` to exercise its
/// contract, not actually paint anything.
#[derive(Default)]
struct NullRenderer {
    next_handle: usize,
}

impl ChartRenderer for NullRenderer {
    type Handle = usize;
    fn create(&mut self) {}
    fn apply_options(&mut self, _options: core_render::ChartOptions) {}
    fn add_series(&mut self, _kind: core_model::ChartType, _options: core_render::SeriesOptions) -> usize {
        let handle = self.next_handle;
        self.next_handle += 1;
        handle
    }
    fn remove_series(&mut self, _handle: usize) {}
    fn set_data(&mut self, _handle: usize, _bars: &[Bar]) {}
    fn update(&mut self, _handle: usize, _bar: Bar) {}
    fn subscribe_crosshair_move(&mut self, _callback: Box<dyn FnMut(Option<i64>) + Send>) {}
    fn fit_content(&mut self) {}
    fn remove(&mut self) {}
}

async fn run_command(
    layout: LayoutMode,
    symbol: String,
    interval: Interval,
    fixture: Option<PathBuf>,
    config_path: Option<PathBuf>,
    tui: bool,
) -> Result<()> {
    let provider: Arc<dyn DataProvider> = Arc::new(build_provider(fixture.as_deref(), &symbol, &interval)?);
    let bus = EventBus::new();
    let hooks = Arc::new(LoggingHooks);
    let config = ConfigStore::new(config_store_backend(config_path));

    if tui {
        let mut coordinator = LayoutCoordinator::new(
            provider,
            Box::new(TuiChartRenderer::new),
            config,
            symbol,
            interval,
            bus.sender(),
            hooks,
        );
        coordinator.start().await;
        dispatch(CoordinatorAction::SetLayoutMode(layout), &mut coordinator).await;
        load_every_pane(&mut coordinator).await;
        coordinator.save_config();
        run_tui(&mut coordinator).await
    } else {
        let mut coordinator = LayoutCoordinator::new(
            provider,
            Box::new(NullRenderer::default),
            config,
            symbol,
            interval,
            bus.sender(),
            hooks,
        );
        coordinator.start().await;
        dispatch(CoordinatorAction::SetLayoutMode(layout), &mut coordinator).await;
        load_every_pane(&mut coordinator).await;
        coordinator.save_config();
        print_pane_summary(&coordinator);
        Ok(())
    }
}

async fn replay_command(config_path: PathBuf, tui: bool) -> Result<()> {
    let provider: Arc<dyn DataProvider> = Arc::new(MockProvider::new());
    let bus = EventBus::new();
    let hooks = Arc::new(LoggingHooks);
    let config = ConfigStore::new(FileStorage::new(config_path));
    let default_interval = core_interval::parse("1D").expect("1D is a valid interval token");

    if tui {
        let mut coordinator = LayoutCoordinator::new(
            provider,
            Box::new(TuiChartRenderer::new),
            config,
            "AAPL",
            default_interval,
            bus.sender(),
            hooks,
        );
        coordinator.start().await;
        run_tui(&mut coordinator).await
    } else {
        let mut coordinator = LayoutCoordinator::new(
            provider,
            Box::new(NullRenderer::default),
            config,
            "AAPL",
            default_interval,
            bus.sender(),
            hooks,
        );
        coordinator.start().await;
        println!("restored layout: {:?}", coordinator.state().layout_mode);
        print_pane_summary(&coordinator);
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let _log_guard = configure_logging()?;
    info!(target: "oak-bin", "startup");
    let args = Args::parse();

    match args.command {
        Command::Run {
            layout,
            symbol,
            interval,
            fixture,
            config,
            tui,
        } => {
            let layout = parse_layout(&layout)?;
            let interval = core_interval::parse(&interval).map_err(|e| anyhow::anyhow!("{e}"))?;
            run_command(layout, symbol, interval, fixture, config, tui).await
        }
        Command::Replay { config, tui } => replay_command(config, tui).await,
    }
}
