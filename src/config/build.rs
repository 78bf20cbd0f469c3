//! `[build]` section configuration.
//!
//! Source and output locations, source-map style, template minification and
//! the per-command timeout for external tools.

use super::defaults;
use educe::Educe;
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

/// How dev builds carry their source maps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceMapKind {
    /// Separate `<bundle>.map` entry next to the bundle (default).
    #[default]
    External,
    /// Map embedded in the bundle as a data URL.
    Inline,
}

/// `[build]` section in extpack.toml.
///
/// # Example
/// ```toml
/// [build]
/// src = "src"            # Project sources (manifest.json, main/, pages/)
/// output = "dist"        # Archive output directory
/// source_map = "inline"  # Dev source maps embedded in bundles
/// timeout_secs = 60
/// ```
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(default, deny_unknown_fields)]
pub struct BuildConfig {
    /// Project root directory (usually set via CLI `--root`).
    #[serde(default = "defaults::build::root")]
    #[educe(Default = defaults::build::root())]
    pub root: Option<PathBuf>,

    /// Source directory holding `manifest.json`, `main/` and `pages/`.
    #[serde(default = "defaults::build::src")]
    #[educe(Default = defaults::build::src())]
    pub src: PathBuf,

    /// Directory the archive is written to.
    #[serde(default = "defaults::build::output")]
    #[educe(Default = defaults::build::output())]
    pub output: PathBuf,

    #[serde(default)]
    pub source_map: SourceMapKind,

    /// Minify page templates in prod builds.
    #[serde(default = "defaults::r#false")]
    #[educe(Default = false)]
    pub minify_templates: bool,

    /// Upper bound for a single bundler/minifier invocation.
    #[serde(default = "defaults::build::timeout_secs")]
    #[educe(Default = defaults::build::timeout_secs())]
    pub timeout_secs: u64,
}

impl BuildConfig {
    /// Per-command timeout; `timeout_secs = 0` disables it.
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}
