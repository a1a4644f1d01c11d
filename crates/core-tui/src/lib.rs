//! A terminal `ChartRenderer`: draws candlesticks, OHLC bars, and
//! close-only line/area/baseline series with `ratatui`, one row per price
//! bucket. The glyph table and per-row zone logic (wick / body / wick,
//! with 0.25/0.75 sub-character thresholds) are the same box-drawing
//! technique the pack's own terminal candlestick renderer uses; `core-tui`
//! generalizes it to every `ChartType` the core supports and drives it from
//! the `ChartRenderer` contract instead of a single hardcoded widget.
//!
//! `PaneChart` only ever calls the `ChartRenderer` trait methods below —
//! they just record state. [`TuiChartRenderer::render`] is the host-driven
//! half of the contract: a terminal host calls it once per draw tick with
//! the `Rect` the pane owns this frame.

use chrono::{TimeZone, Utc};
use core_model::{Bar, ChartType};
use core_render::{ChartOptions, ChartRenderer, SeriesOptions};
use ratatui::Frame;
use ratatui::layout::Rect;
use ratatui::style::{Color, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph};
use std::collections::BTreeMap;

const BODY: char = '┃';
const HALF_BODY_BOTTOM: char = '╻';
const HALF_BODY_TOP: char = '╹';
const WICK: char = '│';
const TOP: char = '╽';
const BOTTOM: char = '╿';
const UPPER_WICK: char = '╷';
const LOWER_WICK: char = '╵';
const VOID: char = ' ';

const BULLISH_COLOR: Color = Color::Rgb(52, 208, 88);
const BEARISH_COLOR: Color = Color::Rgb(234, 74, 90);
const LINE_COLOR: Color = Color::Rgb(89, 150, 255);
const AREA_COLOR: Color = Color::Rgb(40, 70, 120);
const Y_AXIS_WIDTH: u16 = 10;
const X_AXIS_HEIGHT: u16 = 2;

/// One series this renderer owns: its chart type and the bar array
/// `PaneChart` last pushed through `set_data`/`update`.
struct Series {
    kind: ChartType,
    #[allow(dead_code)]
    options: SeriesOptions,
    bars: Vec<Bar>,
}

/// `ChartRenderer` implementation drawing one pane's active series into a
/// ratatui `Frame`.
#[derive(Default)]
pub struct TuiChartRenderer {
    next_handle: usize,
    series: BTreeMap<usize, Series>,
    main_handle: Option<usize>,
    options: ChartOptions,
    crosshair: Option<Box<dyn FnMut(Option<i64>) + Send>>,
    hovered_time: Option<i64>,
}

impl TuiChartRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move the crosshair `offset` bars from wherever it currently sits
    /// (negative = back in time), clamped to the series range, and notify
    /// whatever `subscribe_crosshair_move` registered. A terminal has no
    /// pointer to track, so the host drives this from a keybinding instead
    /// of mouse movement.
    pub fn move_crosshair(&mut self, offset: i64) {
        let Some(series) = self.main_handle.and_then(|h| self.series.get(&h)) else {
            return;
        };
        if series.bars.is_empty() {
            return;
        }
        let current_index = self
            .hovered_time
            .and_then(|t| series.bars.iter().position(|b| b.time == t))
            .unwrap_or(series.bars.len() - 1);
        let next_index = (current_index as i64 + offset).clamp(0, series.bars.len() as i64 - 1) as usize;
        let time = series.bars[next_index].time;
        self.hovered_time = Some(time);
        if let Some(cb) = self.crosshair.as_mut() {
            cb(Some(time));
        }
    }

    /// Render the pane's main series into `area`. Draws an empty bordered
    /// block titled `title` if nothing has been pushed via `set_data` yet.
    pub fn render(&self, frame: &mut Frame, area: Rect, title: &str) {
        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White))
            .title(title.to_string());

        let Some(series) = self.main_handle.and_then(|h| self.series.get(&h)) else {
            frame.render_widget(block, area);
            return;
        };
        if series.bars.is_empty() {
            frame.render_widget(block, area);
            return;
        }

        let lines = match series.kind {
            ChartType::Candlestick | ChartType::Bar => render_ohlc(series, area),
            ChartType::Line | ChartType::Area | ChartType::Baseline => render_close_only(series, area),
        };
        frame.render_widget(Paragraph::new(lines).block(block), area);
    }
}

impl ChartRenderer for TuiChartRenderer {
    type Handle = usize;

    fn create(&mut self) {}

    fn apply_options(&mut self, options: ChartOptions) {
        self.options = options;
    }

    fn add_series(&mut self, kind: ChartType, options: SeriesOptions) -> usize {
        let handle = self.next_handle;
        self.next_handle += 1;
        self.series.insert(
            handle,
            Series {
                kind,
                options,
                bars: Vec::new(),
            },
        );
        if self.main_handle.is_none() {
            self.main_handle = Some(handle);
        }
        handle
    }

    fn remove_series(&mut self, handle: usize) {
        self.series.remove(&handle);
        if self.main_handle == Some(handle) {
            self.main_handle = self.series.keys().next().copied();
        }
    }

    fn set_data(&mut self, handle: usize, bars: &[Bar]) {
        if let Some(series) = self.series.get_mut(&handle) {
            series.bars = bars.to_vec();
        }
    }

    fn update(&mut self, handle: usize, bar: Bar) {
        if let Some(series) = self.series.get_mut(&handle) {
            match series.bars.last_mut() {
                Some(last) if last.time == bar.time => *last = bar,
                _ => series.bars.push(bar),
            }
        }
    }

    fn subscribe_crosshair_move(&mut self, callback: Box<dyn FnMut(Option<i64>) + Send>) {
        self.crosshair = Some(callback);
    }

    fn fit_content(&mut self) {}

    fn remove(&mut self) {
        self.series.clear();
        self.main_handle = None;
    }
}

fn price_bounds(bars: &[Bar]) -> (f64, f64) {
    let max = bars.iter().fold(f64::NEG_INFINITY, |m, b| m.max(b.high));
    let min = bars.iter().fold(f64::INFINITY, |m, b| m.min(b.low));
    let margin = (max - min) * 0.02;
    ((min - margin).max(0.0), max + margin)
}

fn visible<'a>(bars: &'a [Bar], width: usize) -> &'a [Bar] {
    if bars.len() <= width { bars } else { &bars[bars.len() - width..] }
}

fn y_axis_label(y: u16, height: u16, min_price: f64, max_price: f64) -> String {
    if y % 4 == 0 {
        let price = min_price + (y as f64 * (max_price - min_price) / height.max(1) as f64);
        format!("{:>8.2} │ ", price)
    } else {
        format!("{:>8} │ ", "")
    }
}

fn x_axis_line(height: u16, bars: &[Bar]) -> Line<'static> {
    let Some(first) = bars.first() else {
        return Line::from("");
    };
    let last = bars.last().unwrap();
    let first_label = Utc.timestamp_opt(first.time, 0).single().map(|t| t.format("%d/%m %H:%M").to_string()).unwrap_or_default();
    let last_label = Utc.timestamp_opt(last.time, 0).single().map(|t| t.format("%d/%m %H:%M").to_string()).unwrap_or_default();
    Line::from(vec![
        Span::raw(format!("{:>width$}", "", width = Y_AXIS_WIDTH as usize)),
        Span::styled(first_label, Style::default().fg(Color::Gray)),
        Span::raw(" ".repeat((height as usize).max(1))),
        Span::styled(last_label, Style::default().fg(Color::Gray)),
    ])
}

/// Candlestick / bar rendering: one column per visible bar, three zones
/// (upper wick, body, lower wick) with 0.25/0.75 sub-character thresholds
/// so a wick that only partially crosses a row still shows a half-glyph.
fn render_ohlc(series: &Series, area: Rect) -> Vec<Line<'static>> {
    let height = area.height.saturating_sub(3 + X_AXIS_HEIGHT).max(1);
    let width = area.width.saturating_sub(Y_AXIS_WIDTH).max(1) as usize;
    let visible_bars = visible(&series.bars, width);
    let (min_price, max_price) = price_bounds(visible_bars);
    let to_row = |price: f64| -> f64 {
        if max_price == min_price {
            height as f64 / 2.0
        } else {
            (price - min_price) / (max_price - min_price) * height as f64
        }
    };

    let mut lines = Vec::with_capacity(height as usize + X_AXIS_HEIGHT as usize);
    for y in (1..=height).rev() {
        let mut spans = vec![Span::styled(
            y_axis_label(y, height, min_price, max_price),
            Style::default().fg(Color::Gray),
        )];
        for bar in visible_bars {
            let high_y = to_row(bar.high);
            let low_y = to_row(bar.low);
            let max_y = to_row(bar.open.max(bar.close));
            let min_y = to_row(bar.open.min(bar.close));
            let row = y as f64;

            let glyph = if high_y.ceil() >= row && row >= max_y.floor() {
                if max_y - row > 0.75 {
                    BODY
                } else if max_y - row > 0.25 {
                    if high_y - row > 0.75 { TOP } else { HALF_BODY_BOTTOM }
                } else if high_y - row > 0.75 {
                    WICK
                } else if high_y - row > 0.25 {
                    UPPER_WICK
                } else {
                    VOID
                }
            } else if max_y.floor() >= row && row >= min_y.ceil() {
                BODY
            } else if min_y.ceil() >= row && row >= low_y.floor() {
                if min_y - row < 0.25 {
                    BODY
                } else if min_y - row < 0.75 {
                    if low_y - row < 0.25 { BOTTOM } else { HALF_BODY_TOP }
                } else if low_y - row < 0.25 {
                    WICK
                } else if low_y - row < 0.75 {
                    LOWER_WICK
                } else {
                    VOID
                }
            } else {
                VOID
            };

            let color = if bar.is_bullish() { BULLISH_COLOR } else { BEARISH_COLOR };
            spans.push(Span::styled(glyph.to_string(), Style::default().fg(color)));
        }
        lines.push(Line::from(spans));
    }
    lines.push(x_axis_line(height, visible_bars));
    lines
}

/// Close-only rendering shared by `Line`/`Area`/`Baseline`: a single glyph
/// column per bar tracking its close price, with `Area` shading every row
/// below the line down to the price floor and `Baseline` coloring above vs.
/// below the series' own midpoint.
fn render_close_only(series: &Series, area: Rect) -> Vec<Line<'static>> {
    let height = area.height.saturating_sub(3 + X_AXIS_HEIGHT).max(1);
    let width = area.width.saturating_sub(Y_AXIS_WIDTH).max(1) as usize;
    let visible_bars = visible(&series.bars, width);
    let (min_price, max_price) = price_bounds(visible_bars);
    let to_row = |price: f64| -> f64 {
        if max_price == min_price {
            height as f64 / 2.0
        } else {
            (price - min_price) / (max_price - min_price) * height as f64
        }
    };
    let baseline = visible_bars.iter().map(|b| b.close).sum::<f64>() / visible_bars.len().max(1) as f64;
    let baseline_row = to_row(baseline);

    let mut lines = Vec::with_capacity(height as usize + X_AXIS_HEIGHT as usize);
    for y in (1..=height).rev() {
        let mut spans = vec![Span::styled(
            y_axis_label(y, height, min_price, max_price),
            Style::default().fg(Color::Gray),
        )];
        for bar in visible_bars {
            let close_row = to_row(bar.close);
            let row = y as f64;
            let on_line = (close_row - row).abs() < 0.5;
            let below_line = row < close_row && matches!(series.kind, ChartType::Area);

            let (glyph, color) = if on_line {
                let color = match series.kind {
                    ChartType::Baseline if close_row < baseline_row => BEARISH_COLOR,
                    ChartType::Baseline => BULLISH_COLOR,
                    _ => LINE_COLOR,
                };
                (BODY, color)
            } else if below_line {
                (VOID, AREA_COLOR)
            } else {
                (VOID, Color::Reset)
            };
            spans.push(Span::styled(glyph.to_string(), Style::default().fg(color)));
        }
        lines.push(Line::from(spans));
    }
    lines.push(x_axis_line(height, visible_bars));
    lines
}
