//! Declared manifest parsing and manifest synthesis.
//!
//! The project's `manifest.json` declares the package identity plus any
//! extra fields. [`synthesize`] combines it with the discovered
//! [`ProjectLayout`] into the manifest that ships in the archive, pointing
//! every discovered page at the exact archive paths the unit builder emits.

use crate::layout::ProjectLayout;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::{
    fs,
    path::{Path, PathBuf},
};
use thiserror::Error;

/// Archive name of the main bundle.
pub const MAIN_SCRIPT: &str = "main.js";
/// Archive name of the synthesized manifest.
pub const MANIFEST_OUTPUT: &str = "manifest.json";
/// Archive directory holding page templates and scripts.
pub const PAGES_OUTPUT_DIR: &str = "pages";

/// Archive path of a page's template: `pages/<page>.html`.
pub fn page_template_path(page: &str) -> String {
    format!("{PAGES_OUTPUT_DIR}/{page}.html")
}

/// Archive path of a page's script: `pages/<page>.js`.
pub fn page_script_path(page: &str) -> String {
    format!("{PAGES_OUTPUT_DIR}/{page}.js")
}

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("couldn't read `{}`", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("`{}` is not a valid manifest", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("manifest field `{field}` is invalid: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("couldn't serialize manifest")]
    Serialize(#[source] serde_json::Error),
}

/// Package identity used to name the archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageMetadata {
    pub name: String,
    pub version: Option<String>,
}

/// Manifest entry for a discovered page, naming its archive outputs.
///
/// Hand-written entries are never parsed into this shape; they ship as
/// declared.
#[derive(Debug, Clone, PartialEq)]
pub struct PageEntry {
    pub template: String,
    pub scripts: Vec<String>,
}

impl PageEntry {
    pub fn for_page(page: &str) -> Self {
        Self {
            template: page_template_path(page),
            scripts: vec![page_script_path(page)],
        }
    }

    pub fn to_value(&self) -> Value {
        json!({ "template": self.template, "scripts": self.scripts })
    }
}

/// The project's `manifest.json` as written by its authors.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DeclaredManifest {
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default, rename = "mainScript")]
    pub main_script: Option<String>,
    /// Hand-written page entries, if the authors declared any. Their
    /// contents are opaque.
    #[serde(default)]
    pub pages: Option<Map<String, Value>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
    /// Top-level keys in the order the authors wrote them.
    #[serde(skip)]
    pub key_order: Vec<String>,
}

impl DeclaredManifest {
    /// Read and parse the declared manifest.
    ///
    /// # Errors
    /// Any failure here is fatal for the run: without a manifest the
    /// package has no identity.
    pub fn read(path: &Path) -> Result<Self, ManifestError> {
        let content = fs::read(path).map_err(|source| ManifestError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let parse_err = |source| ManifestError::Parse {
            path: path.to_path_buf(),
            source,
        };

        let document: Map<String, Value> = serde_json::from_slice(&content).map_err(parse_err)?;
        let key_order = document.keys().cloned().collect();
        let mut declared: Self =
            serde_json::from_value(Value::Object(document)).map_err(parse_err)?;
        declared.key_order = key_order;

        declared.validate()?;
        Ok(declared)
    }

    /// Name and version end up in a file name, so they must be plain segments.
    fn validate(&self) -> Result<(), ManifestError> {
        check_segment("name", &self.name)?;
        if let Some(version) = self.archive_version() {
            check_segment("version", version)?;
        }
        Ok(())
    }

    /// The version as it appears in the archive name. Blank counts as absent.
    fn archive_version(&self) -> Option<&str> {
        self.version.as_deref().filter(|v| !v.trim().is_empty())
    }

    pub fn metadata(&self) -> PackageMetadata {
        PackageMetadata {
            name: self.name.clone(),
            version: self.archive_version().map(str::to_owned),
        }
    }
}

fn check_segment(field: &'static str, value: &str) -> Result<(), ManifestError> {
    let reason = if value.trim().is_empty() {
        "must not be empty"
    } else if value.contains(['/', '\\']) || value == "." || value == ".." {
        "must not contain path separators"
    } else {
        return Ok(());
    };

    Err(ManifestError::Invalid {
        field,
        reason: reason.into(),
    })
}

/// The manifest shipped in the archive.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Manifest {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(rename = "mainScript", skip_serializing_if = "Option::is_none")]
    pub main_script: Option<String>,
    pub pages: Map<String, Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
    /// Declared top-level key order; keys the tool adds follow it.
    #[serde(skip)]
    pub key_order: Vec<String>,
}

impl Manifest {
    /// Pretty-printed JSON for `manifest.json`, top-level keys in declared
    /// order.
    pub fn to_json_bytes(&self) -> Result<Vec<u8>, ManifestError> {
        let value = match serde_json::to_value(self).map_err(ManifestError::Serialize)? {
            Value::Object(fields) => Value::Object(in_declared_order(fields, &self.key_order)),
            other => other,
        };
        serde_json::to_vec_pretty(&value).map_err(ManifestError::Serialize)
    }
}

fn in_declared_order(mut fields: Map<String, Value>, order: &[String]) -> Map<String, Value> {
    let mut ordered = Map::new();
    for key in order {
        if let Some(field) = fields.get_mut(key) {
            ordered.insert(key.clone(), field.take());
        }
    }
    for (key, field) in fields {
        if !ordered.contains_key(&key) {
            ordered.insert(key, field);
        }
    }
    ordered
}

/// Derive the shipped manifest from the declared one and the layout.
///
/// - `mainScript` is `main.js` when the layout has a main unit. Without one,
///   a declared value survives only if the authors also declared pages by
///   hand; otherwise it is dropped.
/// - Every discovered page gets an entry naming its archive outputs,
///   replacing any hand-written entry of the same name. Other hand-written
///   entries are kept verbatim.
pub fn synthesize(declared: &DeclaredManifest, layout: &ProjectLayout) -> Manifest {
    let main_script = if layout.has_main_unit() {
        Some(MAIN_SCRIPT.to_owned())
    } else if declared.pages.is_some() {
        declared.main_script.clone()
    } else {
        None
    };

    let mut pages = declared.pages.clone().unwrap_or_default();
    for page in layout.page_names() {
        pages.insert(page.clone(), PageEntry::for_page(page).to_value());
    }

    Manifest {
        name: declared.name.clone(),
        version: declared.version.clone(),
        main_script,
        pages,
        extra: declared.extra.clone(),
        key_order: declared.key_order.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeSet;

    fn declared(value: Value) -> DeclaredManifest {
        serde_json::from_value(value).unwrap()
    }

    fn layout(has_main: bool, pages: &[&str]) -> ProjectLayout {
        ProjectLayout::new("src", has_main, pages.iter().map(|p| p.to_string()).collect())
    }

    #[test]
    fn test_page_paths() {
        assert_eq!(page_template_path("popup"), "pages/popup.html");
        assert_eq!(page_script_path("popup"), "pages/popup.js");
    }

    #[test]
    fn test_synthesize_full_project() {
        let manifest = synthesize(
            &declared(json!({"name": "ext", "version": "1.2.3"})),
            &layout(true, &["options", "popup"]),
        );

        let value = serde_json::to_value(&manifest).unwrap();
        assert_eq!(
            value,
            json!({
                "name": "ext",
                "version": "1.2.3",
                "mainScript": "main.js",
                "pages": {
                    "options": {"template": "pages/options.html", "scripts": ["pages/options.js"]},
                    "popup": {"template": "pages/popup.html", "scripts": ["pages/popup.js"]}
                }
            })
        );
    }

    #[test]
    fn test_page_keys_match_discovered_pages() {
        let pages = ["a", "b", "c"];
        let manifest = synthesize(&declared(json!({"name": "ext"})), &layout(false, &pages));

        let keys: BTreeSet<_> = manifest.pages.keys().map(String::as_str).collect();
        assert_eq!(keys, BTreeSet::from(pages));
    }

    #[test]
    fn test_page_order_does_not_change_content() {
        let base = declared(json!({"name": "ext"}));
        let forward = synthesize(&base, &layout(true, &["options", "popup"]));
        let backward = synthesize(&base, &layout(true, &["popup", "options"]));
        assert_eq!(forward, backward);
    }

    #[test]
    fn test_main_script_tracks_main_unit() {
        let base = declared(json!({"name": "ext", "mainScript": "legacy.js"}));

        assert_eq!(
            synthesize(&base, &layout(true, &[])).main_script.as_deref(),
            Some(MAIN_SCRIPT)
        );
        assert_eq!(synthesize(&base, &layout(false, &[])).main_script, None);
    }

    #[test]
    fn test_main_script_kept_with_manual_pages() {
        let base = declared(json!({
            "name": "ext",
            "mainScript": "background.js",
            "pages": {"about": {"template": "about.html", "scripts": ["about.js"]}}
        }));

        let manifest = synthesize(&base, &layout(false, &[]));
        assert_eq!(manifest.main_script.as_deref(), Some("background.js"));
        assert!(manifest.pages.contains_key("about"));
    }

    #[test]
    fn test_discovered_page_overwrites_manual_entry() {
        let base = declared(json!({
            "name": "ext",
            "pages": {
                "popup": {"template": "old.html", "scripts": ["old.js"], "title": "Old"},
                "about": {"template": "about.html", "scripts": ["about.js"], "title": "About"}
            }
        }));

        let manifest = synthesize(&base, &layout(false, &["popup"]));
        assert_eq!(manifest.pages["popup"], PageEntry::for_page("popup").to_value());
        assert_eq!(manifest.pages["about"]["title"], json!("About"));
    }

    #[test]
    fn test_manual_entry_without_scripts_ships_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.json");
        fs::write(
            &path,
            r#"{"name": "ext", "pages": {"help": {"template": "help.html"}, "raw": "raw.html"}}"#,
        )
        .unwrap();

        let base = DeclaredManifest::read(&path).unwrap();
        let manifest = synthesize(&base, &layout(false, &["popup"]));
        assert_eq!(manifest.pages["help"], json!({"template": "help.html"}));
        assert_eq!(manifest.pages["raw"], json!("raw.html"));
        assert!(manifest.pages.contains_key("popup"));
    }

    #[test]
    fn test_output_keeps_declared_key_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.json");
        fs::write(
            &path,
            r#"{"description": "demo", "version": "1.0.0", "permissions": [], "name": "ext", "author": "me"}"#,
        )
        .unwrap();

        let manifest = synthesize(&DeclaredManifest::read(&path).unwrap(), &layout(true, &["popup"]));
        let shipped: Map<String, Value> =
            serde_json::from_slice(&manifest.to_json_bytes().unwrap()).unwrap();

        let keys: Vec<_> = shipped.keys().map(String::as_str).collect();
        assert_eq!(
            keys,
            ["description", "version", "permissions", "name", "author", "mainScript", "pages"]
        );
    }

    #[test]
    fn test_extra_fields_pass_through() {
        let base = declared(json!({
            "name": "ext",
            "permissions": ["tabs", "storage"],
            "icons": {"48": "icon.png"}
        }));

        let value = serde_json::to_value(synthesize(&base, &layout(false, &[]))).unwrap();
        assert_eq!(value["permissions"], json!(["tabs", "storage"]));
        assert_eq!(value["icons"]["48"], json!("icon.png"));
        assert_eq!(value["pages"], json!({}));
        assert!(value.get("version").is_none());
        assert!(value.get("mainScript").is_none());
    }

    #[test]
    fn test_json_output_is_pretty() {
        let manifest = synthesize(&declared(json!({"name": "ext"})), &layout(true, &[]));
        let text = String::from_utf8(manifest.to_json_bytes().unwrap()).unwrap();
        assert!(text.starts_with("{\n  \"name\": \"ext\""));
    }

    #[test]
    fn test_read_declared_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.json");
        fs::write(&path, r#"{"name": "ext", "version": "0.3.0", "author": "me"}"#).unwrap();

        let declared = DeclaredManifest::read(&path).unwrap();
        assert_eq!(
            declared.metadata(),
            PackageMetadata {
                name: "ext".into(),
                version: Some("0.3.0".into())
            }
        );
        assert_eq!(declared.extra["author"], json!("me"));
    }

    #[test]
    fn test_read_missing_manifest_is_io_error() {
        let err = DeclaredManifest::read(Path::new("/nonexistent/manifest.json")).unwrap_err();
        assert!(matches!(err, ManifestError::Io { .. }));
    }

    #[test]
    fn test_read_malformed_manifest_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.json");

        fs::write(&path, "{ name: ext").unwrap();
        assert!(matches!(
            DeclaredManifest::read(&path),
            Err(ManifestError::Parse { .. })
        ));

        fs::write(&path, r#"{"version": "1.0.0"}"#).unwrap();
        assert!(matches!(
            DeclaredManifest::read(&path),
            Err(ManifestError::Parse { .. })
        ));
    }

    #[test]
    fn test_name_must_be_file_name_safe() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.json");

        fs::write(&path, r#"{"name": "../escape"}"#).unwrap();
        assert!(matches!(
            DeclaredManifest::read(&path),
            Err(ManifestError::Invalid { field: "name", .. })
        ));

        fs::write(&path, r#"{"name": "ext", "version": "1.0/2"}"#).unwrap();
        assert!(matches!(
            DeclaredManifest::read(&path),
            Err(ManifestError::Invalid { field: "version", .. })
        ));
    }

    #[test]
    fn test_blank_version_is_absent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.json");

        for version in ["\"\"", "\"  \""] {
            fs::write(&path, format!(r#"{{"name": "ext", "version": {version}}}"#)).unwrap();
            let declared = DeclaredManifest::read(&path).unwrap();
            assert_eq!(declared.metadata().version, None);
            assert_eq!(
                crate::archive::archive_file_name(&declared.metadata(), crate::compiler::BuildMode::Prod),
                "ext-prod.tar"
            );
        }
    }
}
