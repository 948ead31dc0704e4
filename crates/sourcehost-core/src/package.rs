//! Already-extracted plugin package discovery (spec.md §1 Non-goals, §6).
//!
//! A package on disk is a directory, not an archive: this module never opens
//! a zip file, matching the Non-goal that zip extraction is an embedder
//! concern, not the host's.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{HostError, Result};
use crate::manifest::{ManifestFilter, PluginManifest};

/// The layout spec.md §6 names: a `Payload/` directory carrying the compiled
/// module, the manifest, and two optional sidecar files.
pub struct PluginPackage {
    pub manifest: PluginManifest,
    pub wasm_path: PathBuf,
}

impl PluginPackage {
    /// Discover a package rooted at `dir` (the directory containing
    /// `Payload/`), reading `main.wasm` and `source.json`, and merging
    /// `filters.json` into the manifest only if it carries no filters of its
    /// own (spec.md §5 extraction rule).
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let payload = dir.join("Payload");

        let wasm_path = payload.join("main.wasm");
        if !wasm_path.is_file() {
            return Err(HostError::missing_module("unknown", wasm_path.display().to_string()));
        }

        let manifest_path = payload.join("source.json");
        let manifest_json = fs::read_to_string(&manifest_path)?;
        let mut manifest = PluginManifest::parse(&manifest_json)?;
        manifest.validate()?;

        let filters_path = payload.join("filters.json");
        if filters_path.is_file() {
            let filters_json = fs::read_to_string(&filters_path)?;
            if let Ok(filters) = serde_json::from_str::<Vec<ManifestFilter>>(&filters_json) {
                manifest.merge_filters_if_absent(filters);
            } else {
                tracing::warn!(path = %filters_path.display(), "failed to parse filters.json, ignoring");
            }
        }

        Ok(Self { manifest, wasm_path })
    }

    pub fn read_wasm_bytes(&self) -> Result<Vec<u8>> {
        Ok(fs::read(&self.wasm_path)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn sample_manifest() -> &'static str {
        r#"{
            "info": {
                "id": "sample-source",
                "name": "Sample Source",
                "lang": "en",
                "version": "1.0.0",
                "urls": ["https://example.com"],
                "languages": ["en"],
                "contentRating": "safe"
            }
        }"#
    }

    fn write_package(root: &Path, filters: Option<&str>) {
        let payload = root.join("Payload");
        fs::create_dir_all(&payload).unwrap();
        fs::write(payload.join("main.wasm"), b"\0asm\x01\0\0\0").unwrap();
        let mut manifest_file = fs::File::create(payload.join("source.json")).unwrap();
        manifest_file.write_all(sample_manifest().as_bytes()).unwrap();
        if let Some(filters) = filters {
            fs::write(payload.join("filters.json"), filters).unwrap();
        }
    }

    #[test]
    fn opens_a_well_formed_package_and_reads_its_wasm_bytes() {
        let dir = tempfile::tempdir().unwrap();
        write_package(dir.path(), None);
        let package = PluginPackage::open(dir.path()).unwrap();
        assert_eq!(package.manifest.info.id, "sample-source");
        let bytes = package.read_wasm_bytes().unwrap();
        assert!(bytes.starts_with(b"\0asm"));
    }

    #[test]
    fn merges_sidecar_filters_when_manifest_has_none() {
        let dir = tempfile::tempdir().unwrap();
        let filters_json = r#"[{"type": "title", "name": "Title"}]"#;
        write_package(dir.path(), Some(filters_json));
        let package = PluginPackage::open(dir.path()).unwrap();
        assert_eq!(package.manifest.filters.len(), 1);
    }

    #[test]
    fn missing_module_is_reported_as_a_host_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("Payload")).unwrap();
        assert!(matches!(PluginPackage::open(dir.path()), Err(HostError::MissingModule { .. })));
    }
}
