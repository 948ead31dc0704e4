//! Per-instance state carried in the `wasmtime::Store`.
//!
//! Every import function a plugin calls re-enters the host through a
//! `Caller<'_, HostState>`; this is the one place the resource table,
//! cookie jar, partial-home accumulator, and injected collaborators live.

use std::sync::Arc;

use wasmtime::Memory;

use crate::config::RuntimeConfig;
use crate::cookie_jar::CookieJar;
use crate::home::HomeAccumulator;
use crate::http_bridge::HttpBridge;
use crate::resource_table::ResourceTable;
use crate::settings::{SettingsGetter, SettingsSetter};

pub struct HostState {
    pub plugin_id: String,
    pub table: ResourceTable,
    /// Set once, right after instantiation, since the plugin's exported
    /// memory only exists once the instance does — host functions defined
    /// on the `Linker` read it back out of here on every call.
    pub memory: Option<Memory>,
    pub http_bridge: Arc<dyn HttpBridge>,
    pub settings_getter: Arc<dyn SettingsGetter>,
    pub settings_setter: Arc<dyn SettingsSetter>,
    pub cookie_jar: CookieJar,
    pub home: HomeAccumulator,
    /// Per-instance chapter counter referenced by spec.md §5 "Shared state".
    /// Used by legacy-ABI chapter-list decoding to assign stable indices.
    pub chapter_counter: u32,
    /// Invoked by `env.send_partial_result` with the accumulated layout
    /// after each emission during the current `get_home` call (spec.md
    /// §4.10). `None` outside of a home call, or when the caller didn't
    /// ask to observe partials.
    pub on_partial: Option<Box<dyn FnMut(crate::domain::HomeLayout) + Send>>,
    #[cfg(feature = "canvas")]
    pub default_font: Option<sourcehost_canvas::Font>,
    /// Memory/table ceilings `Store::limiter` enforces on this instance.
    pub limits: InstanceLimits,
}

impl HostState {
    pub fn new(
        plugin_id: impl Into<String>,
        http_bridge: Arc<dyn HttpBridge>,
        settings_getter: Arc<dyn SettingsGetter>,
        settings_setter: Arc<dyn SettingsSetter>,
    ) -> Self {
        Self {
            plugin_id: plugin_id.into(),
            table: ResourceTable::new(),
            memory: None,
            http_bridge,
            settings_getter,
            settings_setter,
            cookie_jar: CookieJar::new(),
            home: HomeAccumulator::new(),
            chapter_counter: 0,
            on_partial: None,
            #[cfg(feature = "canvas")]
            default_font: None,
            limits: InstanceLimits::from_config(&RuntimeConfig::default()),
        }
    }

    pub fn memory(&self) -> Option<Memory> {
        self.memory
    }
}

/// `wasmtime::ResourceLimiter` impl held on `HostState` so `Store::limiter`
/// can enforce the sandbox ceilings a `RuntimeConfig` names (spec.md §5).
#[derive(Debug, Clone, Copy)]
pub struct InstanceLimits {
    pub max_memory_bytes: usize,
    pub max_table_elements: u64,
}

impl InstanceLimits {
    pub fn from_config(config: &RuntimeConfig) -> Self {
        Self { max_memory_bytes: config.max_memory_bytes, max_table_elements: config.max_table_elements }
    }
}

impl wasmtime::ResourceLimiter for InstanceLimits {
    fn memory_growing(&mut self, _current: usize, desired: usize, _maximum: Option<usize>) -> anyhow::Result<bool> {
        Ok(desired <= self.max_memory_bytes)
    }

    fn table_growing(&mut self, _current: usize, desired: usize, _maximum: Option<usize>) -> anyhow::Result<bool> {
        Ok(desired as u64 <= self.max_table_elements)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::NullSettingsStore;

    struct NoopBridge;
    impl HttpBridge for NoopBridge {
        fn send(
            &self,
            _request: crate::http_bridge::BridgeRequest,
        ) -> Result<crate::http_bridge::BridgeResponse, crate::http_bridge::BridgeError> {
            Err(crate::http_bridge::BridgeError::Failed("unused in this test".into()))
        }
    }

    #[test]
    fn new_instance_starts_with_no_memory_and_default_limits() {
        let store = Arc::new(NullSettingsStore);
        let state = HostState::new("plugin-a", Arc::new(NoopBridge), store.clone(), store);
        assert!(state.memory().is_none());
        assert_eq!(state.limits.max_memory_bytes, RuntimeConfig::default().max_memory_bytes);
        assert_eq!(state.chapter_counter, 0);
    }
}
