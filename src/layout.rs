//! Project structure discovery.
//!
//! A project source directory looks like:
//!
//! ```text
//! src/
//! ├── manifest.json        declared manifest (required)
//! ├── main/index.js        shared main unit (optional)
//! └── pages/
//!     ├── options/
//!     │   ├── index.html
//!     │   └── index.js
//!     └── popup/
//!         ├── index.html
//!         └── index.js
//! ```
//!
//! Discovery only reads. Absence of the main unit or of the pages directory
//! is a fact about the project, logged as a warning and never an error.

use crate::log;
use std::{
    fs,
    path::{Path, PathBuf},
};

pub const MANIFEST_FILE: &str = "manifest.json";
pub const MAIN_DIR: &str = "main";
pub const PAGES_DIR: &str = "pages";
pub const ENTRY_SCRIPT: &str = "index.js";
pub const ENTRY_TEMPLATE: &str = "index.html";

/// What exists on disk for one run.
///
/// Produced once by [`discover`] and passed down; nothing downstream probes
/// the filesystem for structure again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectLayout {
    src: PathBuf,
    has_main_unit: bool,
    page_names: Vec<String>,
}

impl ProjectLayout {
    pub fn new(src: impl Into<PathBuf>, has_main_unit: bool, page_names: Vec<String>) -> Self {
        Self {
            src: src.into(),
            has_main_unit,
            page_names,
        }
    }

    pub const fn has_main_unit(&self) -> bool {
        self.has_main_unit
    }

    /// Page names in stable (sorted) order.
    pub fn page_names(&self) -> &[String] {
        &self.page_names
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.src.join(MANIFEST_FILE)
    }

    pub fn main_entry(&self) -> PathBuf {
        self.src.join(MAIN_DIR).join(ENTRY_SCRIPT)
    }

    pub fn page_dir(&self, page: &str) -> PathBuf {
        self.src.join(PAGES_DIR).join(page)
    }
}

/// Discover the layout of the project rooted at `src`.
///
/// Deterministic for a fixed filesystem state: page names are sorted.
pub fn discover(src: &Path) -> ProjectLayout {
    let has_main_unit = probe_main_unit(src);
    let page_names = list_pages(src);

    log!("layout"; "main: {}, pages: [{}]",
        if has_main_unit { "yes" } else { "no" },
        page_names.join(", "));

    ProjectLayout::new(src, has_main_unit, page_names)
}

/// The main unit exists iff its entry script is a readable file.
fn probe_main_unit(src: &Path) -> bool {
    let entry = src.join(MAIN_DIR).join(ENTRY_SCRIPT);

    match fs::File::open(&entry).and_then(|file| file.metadata()) {
        Ok(meta) if meta.is_file() => true,
        Ok(_) => {
            log!("warn"; "{} is not a file, building without a main script", entry.display());
            false
        }
        Err(e) => {
            log!("warn"; "couldn't read {}: {e}, building without a main script", entry.display());
            false
        }
    }
}

/// Directory names under `pages/`; files are ignored.
fn list_pages(src: &Path) -> Vec<String> {
    let pages_dir = src.join(PAGES_DIR);

    let entries = match fs::read_dir(&pages_dir) {
        Ok(entries) => entries,
        Err(e) => {
            log!("warn"; "couldn't read {}: {e}, building without pages", pages_dir.display());
            return Vec::new();
        }
    };

    let mut names: Vec<String> = entries
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_ok_and(|t| t.is_dir()))
        .filter_map(|entry| match entry.file_name().into_string() {
            Ok(name) => Some(name),
            Err(raw) => {
                log!("warn"; "skipping page with non UTF-8 name {raw:?}");
                None
            }
        })
        .collect();
    names.sort();

    if names.is_empty() {
        log!("warn"; "{} has no page directories", pages_dir.display());
    }

    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn project() -> TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(MANIFEST_FILE), r#"{"name":"ext"}"#).unwrap();
        dir
    }

    fn add_page(src: &Path, name: &str) {
        let page = src.join(PAGES_DIR).join(name);
        fs::create_dir_all(&page).unwrap();
        fs::write(page.join(ENTRY_TEMPLATE), "<html></html>").unwrap();
        fs::write(page.join(ENTRY_SCRIPT), "console.log(1);").unwrap();
    }

    #[test]
    fn test_discover_full_project() {
        let dir = project();
        fs::create_dir_all(dir.path().join(MAIN_DIR)).unwrap();
        fs::write(dir.path().join(MAIN_DIR).join(ENTRY_SCRIPT), "main();").unwrap();
        add_page(dir.path(), "popup");
        add_page(dir.path(), "options");

        let layout = discover(dir.path());
        assert!(layout.has_main_unit());
        assert_eq!(layout.page_names(), ["options", "popup"]);
    }

    #[test]
    fn test_missing_main_is_soft() {
        let dir = project();
        add_page(dir.path(), "popup");

        let layout = discover(dir.path());
        assert!(!layout.has_main_unit());
        assert_eq!(layout.page_names(), ["popup"]);
    }

    #[test]
    fn test_main_dir_without_entry_is_absent() {
        let dir = project();
        fs::create_dir_all(dir.path().join(MAIN_DIR)).unwrap();

        assert!(!discover(dir.path()).has_main_unit());
    }

    #[test]
    fn test_missing_pages_dir_is_empty() {
        let dir = project();
        let layout = discover(dir.path());
        assert!(layout.page_names().is_empty());
    }

    #[test]
    fn test_files_under_pages_are_ignored() {
        let dir = project();
        add_page(dir.path(), "popup");
        fs::write(dir.path().join(PAGES_DIR).join("README.md"), "notes").unwrap();

        assert_eq!(discover(dir.path()).page_names(), ["popup"]);
    }

    #[test]
    fn test_discover_is_deterministic() {
        let dir = project();
        for name in ["zeta", "alpha", "mid"] {
            add_page(dir.path(), name);
        }

        let first = discover(dir.path());
        let second = discover(dir.path());
        assert_eq!(first, second);
        assert_eq!(first.page_names(), ["alpha", "mid", "zeta"]);
    }

    #[test]
    fn test_layout_paths() {
        let layout = ProjectLayout::new("/ext/src", true, vec!["popup".into()]);
        assert_eq!(layout.manifest_path(), Path::new("/ext/src/manifest.json"));
        assert_eq!(layout.main_entry(), Path::new("/ext/src/main/index.js"));
        assert_eq!(layout.page_dir("popup"), Path::new("/ext/src/pages/popup"));
    }
}
