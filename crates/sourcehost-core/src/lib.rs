//! # sourcehost-core
//!
//! A WebAssembly host runtime for sandboxed content-source plugins —
//! Aidoku/Paperback-style manga-source modules compiled to `wasm32-unknown-unknown`
//! and driven through a fixed host ABI.
//!
//! ## Features
//!
//! - **Dual ABI**: auto-detects whether a compiled module speaks the modern
//!   postcard-result-pointer convention or the legacy generic-object-descriptor
//!   one, and dispatches accordingly.
//! - **Sandboxing**: fuel metering and memory/table ceilings enforced per
//!   instance through `wasmtime::ResourceLimiter`.
//! - **Unified resource table**: every host-held value a plugin references —
//!   decoded values, in-flight HTTP requests, HTML documents, canvas contexts,
//!   images, fonts, JS contexts — lives behind one reference-counted id space
//!   with scoped, per-call cleanup.
//! - **Import namespaces**: `std`, `net`, `html`, `json`, `defaults`, `env`,
//!   and the feature-gated `canvas`/`js` namespaces, matching the host
//!   functions a compiled plugin expects to link against.
//! - **Partial results**: `get_home` may stream incremental layout snapshots
//!   to an embedder-supplied callback as the plugin emits them.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use sourcehost_core::{Plugin, PluginManifest, RuntimeConfig};
//!
//! let manifest = PluginManifest::parse(&manifest_json)?;
//! manifest.validate()?;
//!
//! let mut plugin = Plugin::load(
//!     &wasm_bytes,
//!     manifest,
//!     RuntimeConfig::default(),
//!     http_bridge,
//!     settings_getter,
//!     settings_setter,
//! )?;
//!
//! let results = plugin.search_manga_list(Some("query"), 1, &[])?;
//! ```

pub mod abi;
pub mod config;
pub mod cookie_jar;
pub mod date;
pub mod dispatcher;
pub mod domain;
pub mod error;
pub mod home;
pub mod html;
pub mod http_bridge;
pub mod imports;
pub mod json;
pub mod manifest;
pub mod memory;
pub mod package;
pub mod resource_table;
pub mod settings;
pub mod state;
pub mod value;
pub mod varint;

pub use abi::{AbiMode, AbiResult};
pub use config::RuntimeConfig;
pub use dispatcher::{Capabilities, Plugin};
pub use domain::{
    Chapter, ContentRating, Filter, FilterValue, GenreDefault, HomeComponent, HomeComponentValue, HomeLayout,
    ImageRequestResult, ImageResponse, Listing, ListingKind, Manga, MangaPageResult, MangaStatus, MangaUpdate, Page,
    PageEntry, SortDefault,
};
pub use error::{HostError, Result};
pub use http_bridge::{BridgeError, BridgeRequest, BridgeResponse, HttpBridge};
pub use manifest::{ManifestFilter, ManifestListing, PluginConfigSection, PluginInfo, PluginManifest};
pub use package::PluginPackage;
pub use resource_table::{ResourceKind, ResourcePayload, ResourceTable, Rid};
pub use settings::{NullSettingsStore, SettingsGetter, SettingsSetter};
pub use state::HostState;
pub use value::{TypeTag, Value};
