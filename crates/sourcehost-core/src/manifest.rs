//! Plugin manifest (`source.json`) parsing and validation.
//!
//! A content-source package ships its manifest as JSON — the format is
//! prescribed by the package producer (an external collaborator), not by
//! us — so parsing goes through `serde_json` rather than `toml`.

use serde::{Deserialize, Serialize};

use crate::error::{HostError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginManifest {
    pub info: PluginInfo,

    #[serde(default)]
    pub listings: Vec<ManifestListing>,

    #[serde(default)]
    pub filters: Vec<ManifestFilter>,

    #[serde(default)]
    pub config: PluginConfigSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginInfo {
    pub id: String,
    pub name: String,
    pub lang: String,
    pub version: String,
    #[serde(default)]
    pub urls: Vec<String>,
    #[serde(default)]
    pub languages: Vec<String>,
    #[serde(default = "default_content_rating")]
    pub content_rating: String,
}

fn default_content_rating() -> String {
    "safe".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestListing {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub kind: String,
}

/// Raw filter descriptor as it appears in JSON; converted to
/// [`crate::domain::Filter`] by the dispatcher once the manifest is
/// accepted. Kept loosely typed here because `source.json` filter shapes
/// vary more than the ABI's fixed wire tags admit, and the manifest itself
/// is never sent over the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestFilter {
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(default)]
    pub can_exclude: bool,
    #[serde(default)]
    pub can_ascend: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginConfigSection {
    #[serde(default)]
    pub hides_filters_while_searching: bool,
    #[serde(default)]
    pub supports_author_search: bool,
    #[serde(default)]
    pub supports_tag_search: bool,
    #[serde(default)]
    pub allows_base_url_select: bool,
    #[serde(default)]
    pub language_select_type: Option<String>,
}

impl PluginManifest {
    pub fn parse(content: &str) -> Result<Self> {
        serde_json::from_str(content)
            .map_err(|e| HostError::invalid_manifest("unknown", format!("failed to parse source.json: {e}")))
    }

    pub fn validate(&self) -> Result<()> {
        if self.info.id.is_empty() {
            return Err(HostError::invalid_manifest(&self.info.id, "plugin id cannot be empty"));
        }
        if !self.info.id.chars().all(|c| c.is_alphanumeric() || c == '-' || c == '_' || c == '.') {
            return Err(HostError::invalid_manifest(
                &self.info.id,
                "plugin id may only contain alphanumeric characters, hyphens, underscores, and dots",
            ));
        }
        if semver::Version::parse(&self.info.version).is_err() {
            return Err(HostError::invalid_manifest(
                &self.info.id,
                format!("invalid semver version: {}", self.info.version),
            ));
        }
        Ok(())
    }

    /// Merge `filters.json` into this manifest, but only if it doesn't
    /// already carry filters of its own (spec.md §5, plugin package
    /// extraction rule).
    pub fn merge_filters_if_absent(&mut self, filters: Vec<ManifestFilter>) {
        if self.filters.is_empty() {
            self.filters = filters;
        }
    }

    pub fn has_listings(&self) -> bool {
        !self.listings.is_empty()
    }
}
