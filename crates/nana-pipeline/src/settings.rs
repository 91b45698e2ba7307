//! Shared generation settings

use nana_ai::ModelConfig;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Settings read at the start of every task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default)]
    pub model: ModelConfig,
    /// Stream partial output into the placeholder entry
    #[serde(default = "default_stream")]
    pub stream: bool,
}

fn default_stream() -> bool {
    true
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_key: None,
            model: ModelConfig::default(),
            stream: default_stream(),
        }
    }
}

/// Shared, lock-protected settings.
#[derive(Debug, Clone, Default)]
pub struct SettingsStore {
    inner: Arc<RwLock<Settings>>,
}

impl SettingsStore {
    pub fn new(settings: Settings) -> Self {
        Self {
            inner: Arc::new(RwLock::new(settings)),
        }
    }

    pub fn snapshot(&self) -> Settings {
        self.inner.read().clone()
    }

    pub fn update(&self, f: impl FnOnce(&mut Settings)) {
        f(&mut self.inner.write());
    }

    pub fn has_api_key(&self) -> bool {
        self.inner
            .read()
            .api_key
            .as_deref()
            .is_some_and(|key| !key.trim().is_empty())
    }

    pub fn model_name(&self) -> String {
        self.inner.read().model.model.clone()
    }

    pub fn set_model_name(&self, model: impl Into<String>) {
        self.inner.write().model.model = model.into();
    }

    /// Switch the active model until the returned guard is dropped.
    ///
    /// `None` leaves the setting untouched.
    pub fn override_model(&self, model: Option<&str>) -> ModelOverride {
        let previous = model.map(|model| {
            let previous = self.model_name();
            tracing::debug!(from = %previous, to = %model, "model override");
            self.set_model_name(model);
            previous
        });
        ModelOverride {
            store: self.clone(),
            previous,
        }
    }
}

/// Restores the previous model name on drop.
#[must_use = "the override is reverted as soon as the guard is dropped"]
pub struct ModelOverride {
    store: SettingsStore,
    previous: Option<String>,
}

impl Drop for ModelOverride {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            self.store.set_model_name(previous);
        }
    }
}
