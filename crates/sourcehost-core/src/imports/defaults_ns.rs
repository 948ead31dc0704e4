//! The `defaults` import namespace: plugin settings storage (spec.md §4.8).
//!
//! The core never persists anything itself — every `get`/`set` call is
//! delegated straight to the embedder-supplied [`SettingsGetter`]/
//! [`SettingsSetter`].

use wasmtime::{Caller, Linker};

use crate::error::HostError;
use crate::memory;
use crate::resource_table::{ResourceKind, ResourcePayload, Rid};
use crate::state::HostState;
use crate::value::Value;

pub fn get(state: &HostState, key: &str) -> Rid {
    let value = state.settings_getter.get(key).unwrap_or(Value::Null);
    state.table.allocate(ResourcePayload::Value(value), ResourceKind::Value)
}

pub fn set(state: &HostState, key: &str, value_rid: Rid) -> bool {
    let Some(value) = state.table.with_value(value_rid, |v| v.clone()) else { return false };
    state.settings_setter.set(key, value);
    true
}

pub fn register(linker: &mut Linker<HostState>) -> Result<(), HostError> {
    linker.func_wrap(
        "defaults",
        "get",
        |caller: Caller<'_, HostState>, ptr: i32, len: i32| -> i32 {
            let Some(memory) = caller.data().memory() else { return -1 };
            let Some(key) = memory::read_string(&caller, &memory, ptr, len) else { return -1 };
            get(caller.data(), &key)
        },
    )?;
    linker.func_wrap(
        "defaults",
        "set",
        |caller: Caller<'_, HostState>, ptr: i32, len: i32, value_rid: i32| -> i32 {
            let Some(memory) = caller.data().memory() else { return -1 };
            let Some(key) = memory::read_string(&caller, &memory, ptr, len) else { return -1 };
            set(caller.data(), &key, value_rid) as i32
        },
    )?;
    Ok(())
}
