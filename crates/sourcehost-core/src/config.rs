//! Runtime tunables.
//!
//! Every magic number spec.md names as a default lives here rather than
//! scattered through the modules that use it.

use std::time::Duration;

/// Resource table sweeper thresholds and wasmtime sandboxing limits.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// How long an unretained descriptor (refcount at its default of 1, i.e.
    /// never `std.retain`ed) may sit idle before the sweeper reclaims it.
    pub descriptor_age: Duration,
    /// How long a completed HTTP request entry may sit idle before the
    /// sweeper reclaims it.
    pub request_age: Duration,
    /// Soft cap on live descriptors; once exceeded the sweeper evicts the
    /// oldest unretained entries until back under the cap.
    pub descriptor_cap: usize,
    /// Soft cap on live request entries.
    pub request_cap: usize,
    /// How often the sweeper tick runs.
    pub sweep_interval: Duration,

    /// Fuel granted per plugin call (CPU operation budget).
    pub fuel_limit: u64,
    /// Maximum linear memory a plugin instance may grow to.
    pub max_memory_bytes: usize,
    /// Maximum table elements a plugin instance may grow to.
    pub max_table_elements: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            descriptor_age: Duration::from_secs(5 * 60),
            request_age: Duration::from_secs(10 * 60),
            descriptor_cap: 10_000,
            request_cap: 1_000,
            sweep_interval: Duration::from_secs(60),
            fuel_limit: 10_000_000,
            max_memory_bytes: 16 * 1024 * 1024,
            max_table_elements: 10_000,
        }
    }
}
