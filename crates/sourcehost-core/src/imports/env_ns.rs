//! The `env` import namespace: host-call plumbing every plugin needs
//! regardless of ABI mode — diagnostics, date/time, and partial-result
//! streaming (spec.md §4.9, §4.10).
//!
//! `env.sleep` really does block the calling thread for the requested
//! duration rather than busy-waiting: the whole plugin call is already a
//! synchronous, blocking invocation from the host's perspective (spec.md
//! §5), so there's no cooperative scheduler here to starve.

use std::time::Duration;

use chrono::Utc;
use wasmtime::{Caller, Linker};

use crate::date;
use crate::domain::{HomeComponent, HomeLayout};
use crate::error::HostError;
use crate::home::PartialHome;
use crate::memory;
use crate::state::HostState;

/// The two shapes `send_partial_result` may carry, tags fixed to match
/// `HomeLayout`/`HomeComponent`'s own postcard derivations (spec.md §4.10).
#[derive(serde::Deserialize)]
enum PartialHomeWire {
    Layout(HomeLayout),
    Component(HomeComponent),
}

impl From<PartialHomeWire> for PartialHome {
    fn from(wire: PartialHomeWire) -> Self {
        match wire {
            PartialHomeWire::Layout(layout) => PartialHome::Layout(layout),
            PartialHomeWire::Component(component) => PartialHome::Component(component),
        }
    }
}

pub fn register(linker: &mut Linker<HostState>) -> Result<(), HostError> {
    linker.func_wrap(
        "env",
        "print",
        |caller: Caller<'_, HostState>, ptr: i32, len: i32| {
            let Some(memory) = caller.data().memory() else { return };
            if let Some(message) = memory::read_string(&caller, &memory, ptr, len) {
                tracing::info!(plugin = %caller.data().plugin_id, "{message}");
            }
        },
    )?;

    linker.func_wrap(
        "env",
        "abort",
        |caller: Caller<'_, HostState>, msg_ptr: i32, file_ptr: i32, line: i32, col: i32| -> anyhow::Result<()> {
            let Some(memory) = caller.data().memory() else {
                return Err(anyhow::anyhow!(HostError::Abort {
                    id: caller.data().plugin_id.clone(),
                    message: "abort".into(),
                    file: String::new(),
                    line: line as u32,
                    col: col as u32,
                }));
            };
            // AssemblyScript strings carry their length as a 32-bit LE
            // integer 4 bytes before the pointer (spec.md §6).
            let message = memory::read_as_string(&caller, &memory, msg_ptr).unwrap_or_default();
            let file = memory::read_as_string(&caller, &memory, file_ptr).unwrap_or_default();
            Err(anyhow::anyhow!(HostError::Abort {
                id: caller.data().plugin_id.clone(),
                message,
                file,
                line: line as u32,
                col: col as u32,
            }))
        },
    )?;

    linker.func_wrap("env", "sleep", |_caller: Caller<'_, HostState>, millis: i32| {
        if millis > 0 {
            std::thread::sleep(Duration::from_millis(millis as u64));
        }
    })?;

    linker.func_wrap("env", "current_date", |_caller: Caller<'_, HostState>| -> f64 {
        date::current_date_seconds(Utc::now())
    })?;
    linker.func_wrap("env", "utc_offset", |_caller: Caller<'_, HostState>| -> i64 {
        date::utc_offset_seconds()
    })?;
    linker.func_wrap(
        "env",
        "parse_date",
        |caller: Caller<'_, HostState>,
         vptr: i32,
         vlen: i32,
         fptr: i32,
         flen: i32,
         lptr: i32,
         llen: i32,
         tptr: i32,
         tlen: i32|
         -> i64 {
            let Some(memory) = caller.data().memory() else { return 0 };
            let value = memory::read_string(&caller, &memory, vptr, vlen).unwrap_or_default();
            let format = memory::read_string(&caller, &memory, fptr, flen).unwrap_or_default();
            let locale = memory::read_string(&caller, &memory, lptr, llen).unwrap_or_default();
            let timezone = memory::read_string(&caller, &memory, tptr, tlen).unwrap_or_default();
            date::parse_date(&value, &format, &locale, &timezone, Utc::now()).unwrap_or(0)
        },
    )?;

    linker.func_wrap(
        "env",
        "send_partial_result",
        |mut caller: Caller<'_, HostState>, ptr: i32, len: i32| -> i32 {
            let Some(memory) = caller.data().memory() else { return -1 };
            let Some(bytes) = memory::read_bytes(&caller, &memory, ptr, len) else { return -1 };
            let Ok(wire) = postcard::from_bytes::<PartialHomeWire>(&bytes) else { return -1 };
            let snapshot = caller.data_mut().home.push(wire.into());
            if let Some(callback) = caller.data_mut().on_partial.as_mut() {
                callback(snapshot);
            }
            0
        },
    )?;

    Ok(())
}
