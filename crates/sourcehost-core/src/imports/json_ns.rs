//! The `json` import namespace: parsing plugin-supplied bytes into the
//! dynamic [`Value`] model (spec.md §4.7).

use wasmtime::{Caller, Linker};

use crate::error::HostError;
use crate::memory;
use crate::resource_table::{ResourceKind, ResourcePayload, ResourceTable, Rid};
use crate::state::HostState;

pub fn parse(table: &ResourceTable, bytes: &[u8]) -> Result<Rid, i32> {
    let value = crate::json::parse(bytes).map_err(|_| -1)?;
    Ok(table.allocate(ResourcePayload::Value(value), ResourceKind::Value))
}

pub fn register(linker: &mut Linker<HostState>) -> Result<(), HostError> {
    linker.func_wrap(
        "json",
        "parse",
        |caller: Caller<'_, HostState>, ptr: i32, len: i32| -> i32 {
            let Some(memory) = caller.data().memory() else { return -1 };
            let Some(bytes) = memory::read_bytes(&caller, &memory, ptr, len) else { return -1 };
            parse(&caller.data().table, &bytes).unwrap_or_else(|e| e)
        },
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn parse_registers_a_value_resource() {
        let table = ResourceTable::new();
        let rid = parse(&table, br#"{"a":1}"#).unwrap();
        let ok = table.with_value(rid, |v| matches!(v, Value::Object(_))).unwrap_or(false);
        assert!(ok);
    }

    #[test]
    fn malformed_json_is_reported() {
        let table = ResourceTable::new();
        assert!(parse(&table, b"{not json").is_err());
    }
}
