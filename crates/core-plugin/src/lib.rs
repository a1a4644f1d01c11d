//! The indicator plug-in contract.
//!
//! Each indicator is, conceptually, an async factory keyed by an id stored
//! in `PaneSettings`. The core only ever calls `attach`/`detach`/`update` on
//! the handle a factory hands back and reads `metadata` for the legend — it
//! never executes indicator math itself. A factory that fails to produce a
//! handle is non-fatal: the indicator is dropped from the pane's *active*
//! list for the session but its id is left untouched in `PaneSettings`, so
//! a later config restore or plugin reload can retry it.

use async_trait::async_trait;
use core_model::{Bar, PaneId};
use std::collections::HashMap;
use std::sync::Arc;

/// One entry of `metadata.plots` in the spec's factory contract.
#[derive(Debug, Clone, Default)]
pub struct PlotMetadata {
    pub color: Option<String>,
}

/// One entry of `metadata.inputs`.
#[derive(Debug, Clone)]
pub struct InputMetadata {
    pub name: String,
    pub default_value: serde_json::Value,
}

/// The `metadata` object an indicator factory reports: title, overlay flag,
/// and the plot/input descriptors the legend reads.
#[derive(Debug, Clone, Default)]
pub struct IndicatorMetadata {
    pub title: String,
    pub short_name: Option<String>,
    pub overlay: bool,
    pub inputs: Vec<InputMetadata>,
    pub plots: Vec<PlotMetadata>,
}

/// The handle an attached indicator hands back: `{ attach, detach, update,
/// setOptions, metadata }` in the spec's terms.
pub trait IndicatorHandle: Send + Sync {
    fn metadata(&self) -> &IndicatorMetadata;
    fn attach(&mut self);
    fn detach(&mut self);
    fn update(&mut self, bar: Bar);
    fn set_options(&mut self, options: serde_json::Value);
}

/// A factory keyed by a stable id, resolved once per `attach_indicator`
/// call. `create` is async because a real host resolves this via a dynamic
/// import; failures are caught by [`IndicatorRegistry`] and never propagate
/// past the pane.
#[async_trait]
pub trait IndicatorFactory: Send + Sync {
    fn id(&self) -> &str;
    async fn create(
        &self,
        bars: &[Bar],
        options: serde_json::Value,
    ) -> anyhow::Result<Box<dyn IndicatorHandle>>;
}

/// Per-pane attach/detach bookkeeping over a set of registered factories.
/// Mirrors the shape of a plugin host that discovers zero-or-more
/// contributions and hands ownership of each live handle to its caller.
#[derive(Default)]
pub struct IndicatorRegistry {
    factories: HashMap<String, Arc<dyn IndicatorFactory>>,
    attached: HashMap<PaneId, HashMap<String, Box<dyn IndicatorHandle>>>,
}

impl IndicatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, factory: Arc<dyn IndicatorFactory>) {
        self.factories.insert(factory.id().to_string(), factory);
    }

    pub fn is_registered(&self, id: &str) -> bool {
        self.factories.contains_key(id)
    }

    /// Attach indicator `id` to `pane`. A missing factory or a factory that
    /// fails to create a handle is logged and treated as "not attached this
    /// session" rather than an error the caller must handle — per the
    /// spec's non-fatal plug-in-load design note.
    pub async fn attach_indicator(
        &mut self,
        pane: PaneId,
        id: &str,
        bars: &[Bar],
        options: serde_json::Value,
    ) -> bool {
        let Some(factory) = self.factories.get(id).cloned() else {
            tracing::warn!(target: "plugin", %pane, indicator = id, "no factory registered; dropped for this session");
            return false;
        };
        match factory.create(bars, options).await {
            Ok(mut handle) => {
                handle.attach();
                self.attached.entry(pane).or_default().insert(id.to_string(), handle);
                true
            }
            Err(err) => {
                tracing::warn!(target: "plugin", %pane, indicator = id, error = %err, "indicator factory failed; dropped for this session");
                false
            }
        }
    }

    /// Detach indicator `id` from `pane`, disposing its handle. No-op if not
    /// attached.
    pub fn detach_indicator(&mut self, pane: PaneId, id: &str) {
        if let Some(handles) = self.attached.get_mut(&pane) {
            if let Some(mut handle) = handles.remove(id) {
                handle.detach();
            }
        }
    }

    /// Forward a new bar to every indicator attached to `pane`.
    pub fn update_pane(&mut self, pane: PaneId, bar: Bar) {
        if let Some(handles) = self.attached.get_mut(&pane) {
            for handle in handles.values_mut() {
                handle.update(bar);
            }
        }
    }

    /// Remove every handle attached to `pane` (e.g. on pane removal),
    /// disposing each one.
    pub fn clear_pane(&mut self, pane: PaneId) {
        if let Some(mut handles) = self.attached.remove(&pane) {
            for handle in handles.values_mut() {
                handle.detach();
            }
        }
    }

    pub fn metadata(&self, pane: PaneId, id: &str) -> Option<&IndicatorMetadata> {
        self.attached.get(&pane)?.get(id).map(|h| h.metadata())
    }

    pub fn attached_ids(&self, pane: PaneId) -> Vec<String> {
        self.attached
            .get(&pane)
            .map(|handles| handles.keys().cloned().collect())
            .unwrap_or_default()
    }
}
