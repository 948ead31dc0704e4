//! The `std` import namespace: the resource lifecycle and dynamic-value
//! operations every plugin ABI mode shares (spec.md §4.4).
//!
//! Each wasmtime closure below is a thin adapter: it pulls bytes out of
//! plugin memory, calls a plain function that only knows about
//! [`ResourceTable`]/[`Value`], and writes the result back. The plain
//! functions are what's unit tested; the closures just wire them up.

use wasmtime::{Caller, Linker};

use crate::error::HostError;
use crate::memory;
use crate::resource_table::{ResourceKind, ResourcePayload, Rid};
use crate::state::HostState;
use crate::value::{TypeTag, Value};

pub fn create_null(table: &crate::resource_table::ResourceTable) -> Rid {
    table.allocate(ResourcePayload::Value(Value::Null), ResourceKind::Value)
}

pub fn create_int(table: &crate::resource_table::ResourceTable, v: i64) -> Rid {
    table.allocate(ResourcePayload::Value(Value::Int(v)), ResourceKind::Value)
}

pub fn create_float(table: &crate::resource_table::ResourceTable, v: f64) -> Rid {
    table.allocate(ResourcePayload::Value(Value::Float(v)), ResourceKind::Value)
}

pub fn create_bool(table: &crate::resource_table::ResourceTable, v: bool) -> Rid {
    table.allocate(ResourcePayload::Value(Value::Bool(v)), ResourceKind::Value)
}

pub fn create_string(table: &crate::resource_table::ResourceTable, s: String) -> Rid {
    table.allocate(ResourcePayload::Value(Value::String(s)), ResourceKind::Value)
}

pub fn create_object(table: &crate::resource_table::ResourceTable) -> Rid {
    table.allocate(ResourcePayload::Value(Value::Object(Vec::new())), ResourceKind::Value)
}

pub fn create_array(table: &crate::resource_table::ResourceTable) -> Rid {
    table.allocate(ResourcePayload::Value(Value::Array(Vec::new())), ResourceKind::Value)
}

pub fn create_date(table: &crate::resource_table::ResourceTable, v: i64) -> Rid {
    table.allocate(ResourcePayload::Value(Value::Date(v)), ResourceKind::Value)
}

pub fn copy(table: &crate::resource_table::ResourceTable, rid: Rid) -> Option<Rid> {
    let value = table.with_value(rid, |v| v.clone())?;
    Some(table.allocate(ResourcePayload::Value(value), ResourceKind::Value))
}

pub fn type_of(table: &crate::resource_table::ResourceTable, rid: Rid) -> i32 {
    match table.kind_of(rid) {
        None => TypeTag::Unknown as i32,
        Some(ResourceKind::HtmlDocument) | Some(ResourceKind::HtmlNodes) => TypeTag::Node as i32,
        Some(ResourceKind::Value) => table.with_value(rid, |v| v.type_tag() as i32).unwrap_or(TypeTag::Unknown as i32),
        Some(_) => TypeTag::Unknown as i32,
    }
}

pub fn object_len(table: &crate::resource_table::ResourceTable, rid: Rid) -> Option<i32> {
    table.with_value(rid, |v| match v {
        Value::Object(entries) => Some(entries.len() as i32),
        _ => None,
    })?
}

pub fn object_get(table: &crate::resource_table::ResourceTable, rid: Rid, key: &str) -> Option<Rid> {
    let value = table.with_value(rid, |v| v.object_get(key).cloned())??;
    Some(table.allocate(ResourcePayload::Value(value), ResourceKind::Value))
}

pub fn object_set(table: &crate::resource_table::ResourceTable, rid: Rid, key: &str, value_rid: Rid) -> bool {
    let Some(value) = table.with_value(value_rid, |v| v.clone()) else { return false };
    table.with_value_mut(rid, |target| target.object_set(key, value)).is_some()
}

pub fn object_remove(table: &crate::resource_table::ResourceTable, rid: Rid, key: &str) -> bool {
    table.with_value_mut(rid, |target| target.object_remove(key)).flatten().is_some()
}

pub fn object_keys(table: &crate::resource_table::ResourceTable, rid: Rid) -> Option<Rid> {
    let keys = table.with_value(rid, |v| match v {
        Value::Object(entries) => Some(entries.iter().map(|(k, _)| Value::String(k.clone())).collect::<Vec<_>>()),
        _ => None,
    })??;
    Some(table.allocate(ResourcePayload::Value(Value::Array(keys)), ResourceKind::Value))
}

pub fn object_values(table: &crate::resource_table::ResourceTable, rid: Rid) -> Option<Rid> {
    let values = table.with_value(rid, |v| match v {
        Value::Object(entries) => Some(entries.iter().map(|(_, v)| v.clone()).collect::<Vec<_>>()),
        _ => None,
    })??;
    Some(table.allocate(ResourcePayload::Value(Value::Array(values)), ResourceKind::Value))
}

pub fn array_len(table: &crate::resource_table::ResourceTable, rid: Rid) -> Option<i32> {
    table.with_value(rid, |v| match v {
        Value::Array(items) => Some(items.len() as i32),
        _ => None,
    })?
}

pub fn array_get(table: &crate::resource_table::ResourceTable, rid: Rid, index: i32) -> Option<Rid> {
    if index < 0 {
        return None;
    }
    let value = table.with_value(rid, |v| match v {
        Value::Array(items) => items.get(index as usize).cloned(),
        _ => None,
    })??;
    Some(table.allocate(ResourcePayload::Value(value), ResourceKind::Value))
}

pub fn array_set(table: &crate::resource_table::ResourceTable, rid: Rid, index: i32, value_rid: Rid) -> bool {
    if index < 0 {
        return false;
    }
    let Some(value) = table.with_value(value_rid, |v| v.clone()) else { return false };
    table
        .with_value_mut(rid, |target| {
            if let Value::Array(items) = target {
                if let Some(slot) = items.get_mut(index as usize) {
                    *slot = value;
                    return true;
                }
            }
            false
        })
        .unwrap_or(false)
}

pub fn array_append(table: &crate::resource_table::ResourceTable, rid: Rid, value_rid: Rid) -> bool {
    let Some(value) = table.with_value(value_rid, |v| v.clone()) else { return false };
    table
        .with_value_mut(rid, |target| {
            if let Value::Array(items) = target {
                items.push(value);
                true
            } else {
                false
            }
        })
        .unwrap_or(false)
}

pub fn array_remove(table: &crate::resource_table::ResourceTable, rid: Rid, index: i32) -> bool {
    if index < 0 {
        return false;
    }
    table
        .with_value_mut(rid, |target| {
            if let Value::Array(items) = target {
                if (index as usize) < items.len() {
                    items.remove(index as usize);
                    return true;
                }
            }
            false
        })
        .unwrap_or(false)
}

pub fn string_len(table: &crate::resource_table::ResourceTable, rid: Rid) -> Option<i32> {
    table.with_value(rid, |v| match v {
        Value::String(s) => Some(s.as_bytes().len() as i32),
        _ => None,
    })?
}

pub fn read_string_value(table: &crate::resource_table::ResourceTable, rid: Rid) -> Option<String> {
    table.with_value(rid, |v| match v {
        Value::String(s) => Some(s.clone()),
        _ => None,
    })?
}

pub fn read_int(table: &crate::resource_table::ResourceTable, rid: Rid) -> Option<i64> {
    table.with_value(rid, |v| match v {
        Value::Int(i) => Some(*i),
        Value::Bytes(b) => Value::coerce_int(b),
        _ => None,
    })?
}

pub fn read_float(table: &crate::resource_table::ResourceTable, rid: Rid) -> Option<f64> {
    table.with_value(rid, |v| match v {
        Value::Float(f) => Some(*f),
        Value::Bytes(b) => Value::coerce_float(b),
        _ => None,
    })?
}

pub fn read_bool(table: &crate::resource_table::ResourceTable, rid: Rid) -> Option<bool> {
    table.with_value(rid, |v| match v {
        Value::Bool(b) => Some(*b),
        Value::Bytes(b) => Value::coerce_bool(b),
        _ => None,
    })?
}

pub fn read_date(table: &crate::resource_table::ResourceTable, rid: Rid) -> Option<i64> {
    table.with_value(rid, |v| match v {
        Value::Date(d) => Some(*d),
        _ => None,
    })?
}

/// Format a `Date` value as an RFC 3339 string, the counterpart of
/// `read_date` for plugins that want the textual form back (spec.md §4.4
/// "read_date_string").
pub fn read_date_string(table: &crate::resource_table::ResourceTable, rid: Rid) -> Option<String> {
    let seconds = read_date(table, rid)?;
    let dt = chrono::DateTime::<chrono::Utc>::from_timestamp(seconds, 0)?;
    Some(dt.to_rfc3339())
}

/// Encode the value as bytes and cache that encoding in place, so a
/// following `read_buffer` sees exactly the byte count `buffer_len`
/// reported (spec.md §4.1).
pub fn buffer_len(table: &crate::resource_table::ResourceTable, rid: Rid) -> Option<i32> {
    let encoded = table.with_value(rid, |v| v.encode_for_settings())?;
    let len = encoded.len() as i32;
    table.update(rid, ResourcePayload::Value(Value::Bytes(encoded)));
    Some(len)
}

pub fn read_buffer_bytes(table: &crate::resource_table::ResourceTable, rid: Rid) -> Option<Vec<u8>> {
    table.with_value(rid, |v| match v {
        Value::Bytes(b) => Some(b.clone()),
        other => Some(other.encode_for_settings()),
    })?
}

pub fn register(linker: &mut Linker<HostState>) -> Result<(), HostError> {
    linker.func_wrap("std", "destroy", |caller: Caller<'_, HostState>, rid: i32| -> i32 {
        caller.data().table.destroy(rid) as i32
    })?;
    linker.func_wrap("std", "typeof", |caller: Caller<'_, HostState>, rid: i32| -> i32 {
        type_of(&caller.data().table, rid)
    })?;
    linker.func_wrap("std", "copy", |caller: Caller<'_, HostState>, rid: i32| -> i32 {
        copy(&caller.data().table, rid).unwrap_or(-1)
    })?;

    linker.func_wrap("std", "create_null", |caller: Caller<'_, HostState>| -> i32 {
        create_null(&caller.data().table)
    })?;
    linker.func_wrap("std", "create_int", |caller: Caller<'_, HostState>, v: i64| -> i32 {
        create_int(&caller.data().table, v)
    })?;
    linker.func_wrap("std", "create_float", |caller: Caller<'_, HostState>, v: f64| -> i32 {
        create_float(&caller.data().table, v)
    })?;
    linker.func_wrap("std", "create_bool", |caller: Caller<'_, HostState>, v: i32| -> i32 {
        create_bool(&caller.data().table, v != 0)
    })?;
    linker.func_wrap("std", "create_date", |caller: Caller<'_, HostState>, v: i64| -> i32 {
        create_date(&caller.data().table, v)
    })?;
    linker.func_wrap("std", "create_object", |caller: Caller<'_, HostState>| -> i32 {
        create_object(&caller.data().table)
    })?;
    linker.func_wrap("std", "create_array", |caller: Caller<'_, HostState>| -> i32 {
        create_array(&caller.data().table)
    })?;
    linker.func_wrap(
        "std",
        "create_string",
        |caller: Caller<'_, HostState>, ptr: i32, len: i32| -> i32 {
            let Some(memory) = caller.data().memory() else { return -1 };
            let Some(s) = memory::read_string(&caller, &memory, ptr, len) else { return -1 };
            create_string(&caller.data().table, s)
        },
    )?;

    linker.func_wrap(
        "std",
        "object_len",
        |caller: Caller<'_, HostState>, rid: i32| -> i32 { object_len(&caller.data().table, rid).unwrap_or(-1) },
    )?;
    linker.func_wrap(
        "std",
        "object_get",
        |caller: Caller<'_, HostState>, rid: i32, ptr: i32, len: i32| -> i32 {
            let Some(memory) = caller.data().memory() else { return -1 };
            let Some(key) = memory::read_string(&caller, &memory, ptr, len) else { return -1 };
            object_get(&caller.data().table, rid, &key).unwrap_or(-1)
        },
    )?;
    linker.func_wrap(
        "std",
        "object_set",
        |caller: Caller<'_, HostState>, rid: i32, ptr: i32, len: i32, value_rid: i32| -> i32 {
            let Some(memory) = caller.data().memory() else { return -1 };
            let Some(key) = memory::read_string(&caller, &memory, ptr, len) else { return -1 };
            object_set(&caller.data().table, rid, &key, value_rid) as i32
        },
    )?;
    linker.func_wrap(
        "std",
        "object_remove",
        |caller: Caller<'_, HostState>, rid: i32, ptr: i32, len: i32| -> i32 {
            let Some(memory) = caller.data().memory() else { return -1 };
            let Some(key) = memory::read_string(&caller, &memory, ptr, len) else { return -1 };
            object_remove(&caller.data().table, rid, &key) as i32
        },
    )?;
    linker.func_wrap(
        "std",
        "object_keys",
        |caller: Caller<'_, HostState>, rid: i32| -> i32 { object_keys(&caller.data().table, rid).unwrap_or(-1) },
    )?;
    linker.func_wrap(
        "std",
        "object_values",
        |caller: Caller<'_, HostState>, rid: i32| -> i32 { object_values(&caller.data().table, rid).unwrap_or(-1) },
    )?;

    linker.func_wrap(
        "std",
        "array_len",
        |caller: Caller<'_, HostState>, rid: i32| -> i32 { array_len(&caller.data().table, rid).unwrap_or(-1) },
    )?;
    linker.func_wrap(
        "std",
        "array_get",
        |caller: Caller<'_, HostState>, rid: i32, index: i32| -> i32 {
            array_get(&caller.data().table, rid, index).unwrap_or(-1)
        },
    )?;
    linker.func_wrap(
        "std",
        "array_set",
        |caller: Caller<'_, HostState>, rid: i32, index: i32, value_rid: i32| -> i32 {
            array_set(&caller.data().table, rid, index, value_rid) as i32
        },
    )?;
    linker.func_wrap(
        "std",
        "array_append",
        |caller: Caller<'_, HostState>, rid: i32, value_rid: i32| -> i32 {
            array_append(&caller.data().table, rid, value_rid) as i32
        },
    )?;
    linker.func_wrap(
        "std",
        "array_remove",
        |caller: Caller<'_, HostState>, rid: i32, index: i32| -> i32 {
            array_remove(&caller.data().table, rid, index) as i32
        },
    )?;

    linker.func_wrap(
        "std",
        "string_len",
        |caller: Caller<'_, HostState>, rid: i32| -> i32 { string_len(&caller.data().table, rid).unwrap_or(-1) },
    )?;
    linker.func_wrap(
        "std",
        "read_string",
        |mut caller: Caller<'_, HostState>, rid: i32, ptr: i32| -> i32 {
            let Some(s) = read_string_value(&caller.data().table, rid) else { return -1 };
            let Some(memory) = caller.data().memory() else { return -1 };
            if memory::write_bytes(&mut caller, &memory, ptr, s.as_bytes()) {
                s.as_bytes().len() as i32
            } else {
                -1
            }
        },
    )?;
    linker.func_wrap("std", "read_int", |caller: Caller<'_, HostState>, rid: i32| -> i64 {
        read_int(&caller.data().table, rid).unwrap_or(0)
    })?;
    linker.func_wrap("std", "read_float", |caller: Caller<'_, HostState>, rid: i32| -> f64 {
        read_float(&caller.data().table, rid).unwrap_or(0.0)
    })?;
    linker.func_wrap("std", "read_bool", |caller: Caller<'_, HostState>, rid: i32| -> i32 {
        read_bool(&caller.data().table, rid).unwrap_or(false) as i32
    })?;
    linker.func_wrap("std", "read_date", |caller: Caller<'_, HostState>, rid: i32| -> i64 {
        read_date(&caller.data().table, rid).unwrap_or(0)
    })?;
    linker.func_wrap(
        "std",
        "read_date_string",
        |mut caller: Caller<'_, HostState>, rid: i32, ptr: i32| -> i32 {
            let Some(s) = read_date_string(&caller.data().table, rid) else { return -1 };
            let Some(memory) = caller.data().memory() else { return -1 };
            if memory::write_bytes(&mut caller, &memory, ptr, s.as_bytes()) {
                s.as_bytes().len() as i32
            } else {
                -1
            }
        },
    )?;

    linker.func_wrap(
        "std",
        "buffer_len",
        |caller: Caller<'_, HostState>, rid: i32| -> i32 { buffer_len(&caller.data().table, rid).unwrap_or(-1) },
    )?;
    linker.func_wrap(
        "std",
        "read_buffer",
        |mut caller: Caller<'_, HostState>, rid: i32, ptr: i32| -> i32 {
            let Some(bytes) = read_buffer_bytes(&caller.data().table, rid) else { return -1 };
            let Some(memory) = caller.data().memory() else { return -1 };
            if memory::write_bytes(&mut caller, &memory, ptr, &bytes) {
                bytes.len() as i32
            } else {
                -1
            }
        },
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource_table::ResourceTable;

    #[test]
    fn object_roundtrip() {
        let table = ResourceTable::new();
        let obj = create_object(&table);
        let v = create_int(&table, 7);
        assert!(object_set(&table, obj, "a", v));
        let got = object_get(&table, obj, "a").unwrap();
        assert_eq!(read_int(&table, got), Some(7));
        assert_eq!(object_len(&table, obj), Some(1));
        assert!(object_remove(&table, obj, "a"));
        assert_eq!(object_len(&table, obj), Some(0));
    }

    #[test]
    fn array_roundtrip() {
        let table = ResourceTable::new();
        let arr = create_array(&table);
        let a = create_int(&table, 1);
        let b = create_int(&table, 2);
        assert!(array_append(&table, arr, a));
        assert!(array_append(&table, arr, b));
        assert_eq!(array_len(&table, arr), Some(2));
        let got = array_get(&table, arr, 1).unwrap();
        assert_eq!(read_int(&table, got), Some(2));
        assert!(array_remove(&table, arr, 0));
        assert_eq!(array_len(&table, arr), Some(1));
    }

    #[test]
    fn buffer_len_caches_encoded_bytes_for_read_buffer() {
        let table = ResourceTable::new();
        let s = create_string(&table, "hi".to_string());
        let len = buffer_len(&table, s).unwrap();
        let bytes = read_buffer_bytes(&table, s).unwrap();
        assert_eq!(len as usize, bytes.len());
    }

    #[test]
    fn type_of_reports_node_for_html_kinds() {
        let table = ResourceTable::new();
        let rid = table.allocate(ResourcePayload::Opaque(Box::new(())), ResourceKind::HtmlDocument);
        assert_eq!(type_of(&table, rid), TypeTag::Node as i32);
    }

    #[test]
    fn read_date_string_formats_as_rfc3339() {
        let table = ResourceTable::new();
        let rid = create_date(&table, 0);
        assert_eq!(read_date_string(&table, rid).as_deref(), Some("1970-01-01T00:00:00+00:00"));
    }

    #[test]
    fn copy_produces_an_independent_value() {
        let table = ResourceTable::new();
        let original = create_int(&table, 5);
        let cloned = copy(&table, original).unwrap();
        assert!(table.with_value_mut(cloned, |v| *v = Value::Int(9)).is_some());
        assert_eq!(read_int(&table, original), Some(5));
        assert_eq!(read_int(&table, cloned), Some(9));
    }
}
