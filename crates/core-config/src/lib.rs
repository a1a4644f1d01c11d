//! Persistence for the one config blob the coordinator owns: layout mode
//! plus per-pane settings, as UTF-8 JSON under a single storage key.
//!
//! Schema is versioned implicitly by its shape. Unknown top-level fields
//! are preserved across a load-then-save round trip: we keep the whole
//! decoded blob as a [`serde_json::Value`] and only overwrite the keys this
//! crate understands, the same way the teacher's config layer tolerates and
//! ignores unrecognized keys rather than rejecting the file outright.

use core_interval::Interval;
use core_model::{ChartType, LayoutMode, PaneId};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// One pane entry of the persisted blob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedPane {
    pub id: PaneId,
    pub symbol: String,
    #[serde(with = "interval_token")]
    pub interval: Interval,
    pub chart_type: ChartType,
    pub indicators: Vec<String>,
}

/// The decoded shape of the persisted blob: `{ layoutMode, panes: [...] }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedState {
    pub layout_mode: LayoutMode,
    pub panes: Vec<PersistedPane>,
}

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

/// Where the single persisted-state key lives. Implementors need only
/// round-trip an opaque string; `ConfigStore` owns the JSON shape.
pub trait ConfigStorage: Send + Sync {
    fn load(&self) -> Option<String>;
    fn save(&self, blob: &str);
}

/// In-memory storage, useful for tests and for hosts that manage
/// persistence themselves and only want the schema/merge logic here.
/// Cheaply cloneable: clones share the same backing blob, so a test can
/// hand one clone to a coordinator and inspect another.
#[derive(Default, Clone)]
pub struct InMemoryStorage {
    blob: Arc<Mutex<Option<String>>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConfigStorage for InMemoryStorage {
    fn load(&self) -> Option<String> {
        self.blob.lock().unwrap().clone()
    }

    fn save(&self, blob: &str) {
        *self.blob.lock().unwrap() = Some(blob.to_string());
    }
}

/// File-backed storage, following the platform-config-dir discovery the
/// teacher's `discover()` uses for its own settings file: prefer a local
/// working-directory file, fall back to the OS config directory.
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Best-effort default path: `./oakview.json` if present, otherwise the
    /// platform config directory.
    pub fn discover() -> Self {
        let local = PathBuf::from("oakview.json");
        if local.exists() {
            return Self::new(local);
        }
        let path = dirs::config_dir()
            .map(|dir| dir.join("oakview").join("oakview.json"))
            .unwrap_or(local);
        Self::new(path)
    }
}

impl ConfigStorage for FileStorage {
    fn load(&self) -> Option<String> {
        std::fs::read_to_string(&self.path).ok()
    }

    fn save(&self, blob: &str) {
        if let Some(parent) = self.path.parent() {
            if let Err(err) = std::fs::create_dir_all(parent) {
                tracing::warn!(target: "config", error = %err, "failed to create config directory");
                return;
            }
        }
        if let Err(err) = std::fs::write(&self.path, blob) {
            tracing::warn!(target: "config", error = %err, "failed to persist config blob");
        }
    }
}

/// Owns the read-on-start / write-on-mutation cycle over a [`ConfigStorage`]
/// backend, preserving any fields in the stored blob this crate does not
/// itself model.
pub struct ConfigStore<S: ConfigStorage> {
    storage: S,
    raw: Mutex<Option<serde_json::Value>>,
}

impl<S: ConfigStorage> ConfigStore<S> {
    pub fn new(storage: S) -> Self {
        Self {
            storage,
            raw: Mutex::new(None),
        }
    }

    /// Read-on-start. `None` means no blob was present or it failed to
    /// parse as JSON at all; a blob that parses as JSON but is missing the
    /// fields this crate expects degrades field-by-field via `serde`
    /// defaults where possible, `None` for the whole call otherwise.
    pub fn load(&self) -> Option<PersistedState> {
        let blob = self.storage.load()?;
        let value: serde_json::Value = match serde_json::from_str(&blob) {
            Ok(v) => v,
            Err(err) => {
                tracing::warn!(target: "config", error = %err, "config blob is not valid JSON; ignoring");
                return None;
            }
        };
        let state = match serde_json::from_value::<PersistedState>(value.clone()) {
            Ok(state) => state,
            Err(err) => {
                tracing::warn!(target: "config", error = %err, "config blob does not match expected schema; ignoring");
                return None;
            }
        };
        *self.raw.lock().unwrap() = Some(value);
        Some(state)
    }

    /// Write-on-mutation. Merges the known fields into whatever blob was
    /// last loaded (or an empty object, if none was), so unrelated keys a
    /// newer or older version of this crate might have written survive.
    pub fn save(&self, state: &PersistedState) {
        let mut raw = self.raw.lock().unwrap();
        let mut root = raw.take().unwrap_or_else(|| serde_json::json!({}));
        let encoded = serde_json::to_value(state).expect("PersistedState always serializes");
        if let (Some(root_obj), Some(encoded_obj)) = (root.as_object_mut(), encoded.as_object()) {
            for (key, value) in encoded_obj {
                root_obj.insert(key.clone(), value.clone());
            }
        } else {
            root = encoded;
        }
        let blob = serde_json::to_string(&root).expect("merged config value always serializes");
        self.storage.save(&blob);
        *raw = Some(root);
    }
}
