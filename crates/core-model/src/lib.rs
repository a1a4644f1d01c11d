//! Shared domain types for OakView.
//!
//! This crate owns the vocabulary every other crate speaks: `Bar`, the
//! per-pane settings record, the layout grid, the coordinator's top-level
//! state snapshot, and the error taxonomy. Nothing here performs I/O or
//! holds a back-reference to a pane or the coordinator — panes are named by
//! [`PaneId`] alone, and whoever owns them (the coordinator) maps the id to
//! the pane. This is the indirection the system is built around: it is what
//! lets `PaneChart` and `LayoutCoordinator` refer to each other without a
//! reference cycle.
//!
//! Invariants that must hold across every mutation performed by callers:
//! * For every pane-id in the active layout there is exactly one
//!   [`PaneSettings`] entry in [`CoordinatorState::pane_settings`].
//! * `CoordinatorState::selected_pane_index` is always `< layout_mode.pane_count()`.
//! * Bars handed to or emitted by any component are sorted strictly
//!   ascending by `time` with no duplicate timestamps.

use core_interval::Interval;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// One OHLCV record. `time` is seconds since the Unix epoch, UTC.
///
/// Within one bar: `low <= min(open, close) <= max(open, close) <= high`.
/// This is a data invariant enforced by producers (the resampler, mock
/// provider fixtures); it is not re-validated on every field access.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    pub fn is_bullish(&self) -> bool {
        self.close >= self.open
    }

    pub fn body(&self) -> f64 {
        (self.close - self.open).abs()
    }
}

/// Stable identifier for a grid cell. Panes never hold a pointer to the
/// coordinator or to each other — they are addressed by this id alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PaneId(pub usize);

impl fmt::Display for PaneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pane-{}", self.0)
    }
}

/// The visual representation a pane draws its OHLCV array as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartType {
    Candlestick,
    Bar,
    Line,
    Area,
    Baseline,
}

impl ChartType {
    /// Whether this chart type projects bars down to `(time, close)` pairs
    /// rather than drawing the full OHLC body.
    pub fn is_close_only(self) -> bool {
        matches!(self, Self::Line | Self::Area | Self::Baseline)
    }
}

/// Per-pane configuration. Created when a pane first appears in the active
/// layout; mutated only through `LayoutCoordinator`'s event handlers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaneSettings {
    pub symbol: String,
    #[serde(with = "interval_token")]
    pub interval: Interval,
    pub chart_type: ChartType,
    pub indicators: Vec<String>,
}

impl PaneSettings {
    pub fn new(symbol: impl Into<String>, interval: Interval) -> Self {
        Self {
            symbol: symbol.into(),
            interval,
            chart_type: ChartType::Candlestick,
            indicators: Vec::new(),
        }
    }
}

/// (De)serialize an [`Interval`] through its token string, since `Interval`
/// itself carries no `serde` impl (only `core-interval::parse` constructs a
/// valid one).
mod interval_token {
    use core_interval::Interval;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(value: &Interval, s: S) -> Result<S::Ok, S::Error> {
        value.token().serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Interval, D::Error> {
        let token = String::deserialize(d)?;
        core_interval::parse(&token).map_err(serde::de::Error::custom)
    }
}

/// One of the fixed grid shapes. Each maps to a deterministic pane count and
/// ordered pane ids `0..n`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayoutMode {
    Single,
    #[serde(rename = "2x1")]
    TwoByOne,
    #[serde(rename = "1x2")]
    OneByTwo,
    #[serde(rename = "2x2")]
    TwoByTwo,
    #[serde(rename = "3x1")]
    ThreeByOne,
    #[serde(rename = "1x3")]
    OneByThree,
}

impl LayoutMode {
    pub fn pane_count(self) -> usize {
        match self {
            Self::Single => 1,
            Self::TwoByOne | Self::OneByTwo => 2,
            Self::TwoByTwo => 4,
            Self::ThreeByOne | Self::OneByThree => 3,
        }
    }

    pub fn pane_ids(self) -> Vec<PaneId> {
        (0..self.pane_count()).map(PaneId).collect()
    }
}

/// `SymbolRecord` as returned by `DataProvider::search_symbols`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolRecord {
    pub symbol: String,
    pub description: Option<String>,
    pub exchange: Option<String>,
    pub kind: Option<String>,
}

/// The coordinator's top-level state snapshot: everything `ConfigStore`
/// persists, plus transient presentation state (`expanded_pane`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinatorState {
    pub layout_mode: LayoutMode,
    pub selected_pane_index: usize,
    pub expanded_pane_index: Option<usize>,
    pub pane_settings: std::collections::BTreeMap<PaneId, PaneSettings>,
    pub previous_layout_mode: Option<LayoutMode>,
}

/// The error taxonomy named in the spec's error handling design, as a single
/// `thiserror` enum. Each variant carries the context a diagnostic log line
/// or a `load-error` event detail needs.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum OakViewError {
    #[error("invalid interval token {token:?}")]
    InvalidInterval { token: String },

    #[error("interval {token:?} is tick- or range-based and cannot be resampled")]
    UnsupportedInterval { token: String },

    #[error("bar at time {got} is earlier than in-flight bucket start {bucket_start}")]
    OutOfOrder { got: i64, bucket_start: i64 },

    #[error("unknown symbol {symbol:?}")]
    UnknownSymbol { symbol: String },

    #[error("unknown interval {token:?} for symbol {symbol:?}")]
    UnknownInterval { symbol: String, token: String },

    #[error("transport failure fetching {symbol:?}: {message}")]
    Transport { symbol: String, message: String },

    #[error("malformed response for {symbol:?}: {message}")]
    Malformed { symbol: String, message: String },

    #[error("provider lacks capability: {capability}")]
    CapabilityMissing { capability: &'static str },

    #[error("internal invariant violated: {message}")]
    Internal { message: String },
}
