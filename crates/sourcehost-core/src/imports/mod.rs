//! Import namespace registration (spec.md §4.4-§4.13).
//!
//! Every namespace is a thin adapter layer: memory reads/writes and
//! resource-table plumbing live here, the actual logic lives in the module
//! each namespace wraps (`value`, `html`, `json`, `date`, `cookie_jar`,
//! `home`, or a feature-gated sibling crate).

#[cfg(feature = "canvas")]
pub mod canvas_ns;
pub mod defaults_ns;
pub mod env_ns;
pub mod html_ns;
#[cfg(feature = "js")]
pub mod js_ns;
pub mod json_ns;
pub mod net_ns;
pub mod std_ns;

use wasmtime::Linker;

use crate::error::HostError;
use crate::state::HostState;

/// Register every import namespace the current feature set supports onto
/// `linker`. Called once per `Engine`/`Linker`, before any module is
/// instantiated against it.
pub fn register_all(linker: &mut Linker<HostState>) -> Result<(), HostError> {
    std_ns::register(linker)?;
    net_ns::register(linker)?;
    html_ns::register(linker)?;
    json_ns::register(linker)?;
    defaults_ns::register(linker)?;
    env_ns::register(linker)?;
    #[cfg(feature = "canvas")]
    canvas_ns::register(linker)?;
    #[cfg(feature = "js")]
    js_ns::register(linker)?;
    Ok(())
}
