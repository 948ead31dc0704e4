//! Host-level error types.
//!
//! These are distinct from the ABI error *codes* each import namespace
//! returns to plugins (see [`crate::imports`]): `HostError` is for the
//! Rust-facing API surface an embedder calls directly (loading a package,
//! compiling a module), and never crosses the plugin boundary.

use thiserror::Error;

/// Errors raised by the host-facing API (package loading, module
/// compilation, manifest parsing).
#[derive(Error, Debug)]
pub enum HostError {
    /// No `Payload/main.wasm` at the expected location.
    #[error("plugin '{id}' has no compiled module at {path}")]
    MissingModule { id: String, path: String },

    /// The manifest (`source.json`) failed to parse or validate.
    #[error("invalid manifest for plugin '{id}': {message}")]
    InvalidManifest { id: String, message: String },

    /// wasmtime failed to compile the module.
    #[error("failed to compile plugin '{id}': {message}")]
    Compilation { id: String, message: String },

    /// The plugin does not export a function the dispatcher needed.
    #[error("plugin '{id}' does not export '{export}'")]
    MissingExport { id: String, export: String },

    /// A fatal `env.abort` call unwound out of a plugin call.
    #[error("[{id}] Abort: {message} at {file}:{line}:{col}")]
    Abort {
        id: String,
        message: String,
        file: String,
        line: u32,
        col: u32,
    },

    /// Underlying I/O failure reading a package directory.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// wasmtime runtime failure (trap, fuel exhaustion, etc.).
    #[error("WASM runtime error: {0}")]
    Wasm(#[from] wasmtime::Error),
}

impl HostError {
    pub fn missing_module(id: impl Into<String>, path: impl Into<String>) -> Self {
        Self::MissingModule { id: id.into(), path: path.into() }
    }

    pub fn invalid_manifest(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidManifest { id: id.into(), message: message.into() }
    }

    pub fn compilation(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Compilation { id: id.into(), message: message.into() }
    }

    pub fn missing_export(id: impl Into<String>, export: impl Into<String>) -> Self {
        Self::MissingExport { id: id.into(), export: export.into() }
    }
}

/// Result alias for host-facing fallible operations.
pub type Result<T> = std::result::Result<T, HostError>;
