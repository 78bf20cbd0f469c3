//! `[tools]` section configuration.
//!
//! Commands used for the bundler and minifier collaborators.

use super::defaults;
use educe::Educe;
use serde::{Deserialize, Serialize};

/// `[tools]` section in extpack.toml.
///
/// # Example
/// ```toml
/// [tools]
/// bundler = ["npx", "esbuild"]
/// bundler_args = ["--target=chrome110"]
/// main_args = ["--external:events"]
/// minifier = ["npx", "esbuild"]
/// ```
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct ToolsConfig {
    /// Bundler command (esbuild-compatible CLI).
    #[serde(default = "defaults::tools::bundler")]
    #[educe(Default = defaults::tools::bundler())]
    pub bundler: Vec<String>,

    /// Extra arguments appended to every bundler invocation.
    #[serde(default = "defaults::tools::bundler_args")]
    #[educe(Default = defaults::tools::bundler_args())]
    pub bundler_args: Vec<String>,

    /// Extra arguments for the main unit only, after `bundler_args`.
    #[serde(default = "defaults::tools::main_args")]
    #[educe(Default = defaults::tools::main_args())]
    pub main_args: Vec<String>,

    /// Minifier command, fed the bundle on stdin.
    #[serde(default = "defaults::tools::minifier")]
    #[educe(Default = defaults::tools::minifier())]
    pub minifier: Vec<String>,
}
