//! The `js` import namespace (spec.md §4.13, feature `js`).
//!
//! `sourcehost_js::JsContext` wraps a QuickJS runtime, which is thread-
//! affine by construction (rquickjs's `Runtime`/`Context` are not `Send`).
//! The resource table requires `Send + Sync` payloads because it's a
//! generic store shared across every import, but spec.md §5 already commits
//! this whole embedding to a single-threaded, fully synchronous call model —
//! a context is only ever touched from the one thread driving the current
//! plugin call, so the wrapper's `unsafe impl` is sound under that
//! invariant, not a generic thread-safety claim about QuickJS itself.

use sourcehost_js::{JsContext, JsError};
use wasmtime::{Caller, Linker};

use crate::error::HostError;
use crate::memory;
use crate::resource_table::{ResourceKind, ResourcePayload, ResourceTable, Rid};
use crate::state::HostState;

struct JsContextHandle(JsContext);
unsafe impl Send for JsContextHandle {}
unsafe impl Sync for JsContextHandle {}

pub fn new_context(table: &ResourceTable) -> Result<Rid, i32> {
    let ctx = JsContext::new().map_err(i32::from)?;
    Ok(table.allocate(ResourcePayload::Opaque(Box::new(JsContextHandle(ctx))), ResourceKind::JsContext))
}

pub fn set_var(table: &ResourceTable, rid: Rid, name: &str, value: &str) -> bool {
    table
        .with_payload_mut::<JsContextHandle, _>(rid, |handle| handle.0.set_var(name, value))
        .is_some()
}

pub fn eval(table: &ResourceTable, rid: Rid, src: &str) -> Result<String, i32> {
    table
        .with_payload_mut::<JsContextHandle, _>(rid, |handle| handle.0.eval(src))
        .ok_or(i32::from(JsError::InvalidContext))?
        .map_err(i32::from)
}

pub fn register(linker: &mut Linker<HostState>) -> Result<(), HostError> {
    linker.func_wrap("js", "new_context", |caller: Caller<'_, HostState>| -> i32 {
        new_context(&caller.data().table).unwrap_or_else(|e| e)
    })?;
    linker.func_wrap(
        "js",
        "set_var",
        |caller: Caller<'_, HostState>, rid: i32, nptr: i32, nlen: i32, vptr: i32, vlen: i32| -> i32 {
            let Some(memory) = caller.data().memory() else { return i32::from(JsError::InvalidString) };
            let Some(name) = memory::read_string(&caller, &memory, nptr, nlen) else {
                return i32::from(JsError::InvalidString);
            };
            let Some(value) = memory::read_string(&caller, &memory, vptr, vlen) else {
                return i32::from(JsError::InvalidString);
            };
            set_var(&caller.data().table, rid, &name, &value) as i32
        },
    )?;
    linker.func_wrap(
        "js",
        "eval",
        |mut caller: Caller<'_, HostState>, rid: i32, sptr: i32, slen: i32, out_ptr: i32| -> i32 {
            let Some(memory) = caller.data().memory() else { return i32::from(JsError::InvalidContext) };
            let Some(src) = memory::read_string(&caller, &memory, sptr, slen) else {
                return i32::from(JsError::InvalidString);
            };
            let result = eval(&caller.data().table, rid, &src);
            match result {
                Ok(value) => {
                    if memory::write_bytes(&mut caller, &memory, out_ptr, value.as_bytes()) {
                        value.as_bytes().len() as i32
                    } else {
                        i32::from(JsError::Eval(String::new()))
                    }
                }
                Err(code) => code,
            }
        },
    )?;
    linker.func_wrap("js", "close", |caller: Caller<'_, HostState>, rid: i32| -> i32 {
        caller.data().table.destroy(rid) as i32
    })?;
    Ok(())
}
