//! Project configuration from the optional `extpack.toml`.
//!
//! # Sections
//!
//! | Section    | Purpose                                          |
//! |------------|--------------------------------------------------|
//! | `[build]`  | Source/output paths, source maps, timeouts       |
//! | `[tools]`  | Bundler and minifier commands                    |
//! | `[watch]`  | Dev watch loop (debounce)                        |
//!
//! A project without `extpack.toml` builds with the defaults below.
//!
//! # Example
//!
//! ```toml
//! [build]
//! src = "src"
//! output = "dist"
//!
//! [tools]
//! bundler = ["npx", "esbuild"]
//!
//! [watch]
//! debounce_ms = 200
//! ```

mod build;
pub mod defaults;
mod error;
mod tools;
mod watch;

pub use build::SourceMapKind;

use build::BuildConfig;
use error::ConfigError;
use tools::ToolsConfig;
use watch::WatchConfig;

use crate::cli::Cli;
use anyhow::{Context, Result, bail};
use educe::Educe;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

// ============================================================================
// Root Configuration
// ============================================================================

/// Root configuration structure representing extpack.toml
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct PackConfig {
    /// Absolute path to the config file (set after loading, may not exist)
    #[serde(skip)]
    pub config_path: PathBuf,

    #[serde(default)]
    pub build: BuildConfig,

    #[serde(default)]
    pub tools: ToolsConfig,

    #[serde(default)]
    pub watch: WatchConfig,
}

impl PackConfig {
    /// Parse configuration from TOML string
    pub fn from_str(content: &str) -> Result<Self> {
        let config: PackConfig = toml::from_str(content).map_err(ConfigError::from)?;
        Ok(config)
    }

    /// Load configuration from file path
    pub fn from_path(path: &Path) -> Result<Self> {
        let content =
            fs::read_to_string(path).map_err(|err| ConfigError::Io(path.to_path_buf(), err))?;
        Self::from_str(&content).with_context(|| format!("in `{}`", path.display()))
    }

    /// Load the config named on the command line, falling back to defaults
    /// when the file does not exist, then apply CLI overrides and validate.
    pub fn load(cli: &Cli) -> Result<Self> {
        let root = cli.root.as_deref().unwrap_or(Path::new("./"));
        let config_path = root.join(&cli.config);

        let mut config = if config_path.exists() {
            Self::from_path(&config_path)?
        } else {
            Self::default()
        };
        config.update_with_cli(cli);
        config.validate()?;

        Ok(config)
    }

    /// Get the root directory path
    pub fn get_root(&self) -> &Path {
        self.build.root.as_deref().unwrap_or(Path::new("./"))
    }

    /// Set the root directory path
    pub fn set_root(&mut self, path: &Path) {
        self.build.root = Some(path.to_path_buf())
    }

    /// Update configuration with CLI arguments
    pub fn update_with_cli(&mut self, cli: &Cli) {
        Self::update_option(&mut self.build.src, cli.src.as_ref());
        Self::update_option(&mut self.build.output, cli.output.as_ref());

        let root = cli
            .root
            .clone()
            .unwrap_or_else(|| self.get_root().to_owned());
        self.update_path_with_root(&root, &cli.config);
    }

    /// Update config option if CLI value is provided
    fn update_option<T: Clone>(config_option: &mut T, cli_option: Option<&T>) {
        if let Some(option) = cli_option {
            *config_option = option.clone();
        }
    }

    /// Resolve every path against the root and normalize to absolute
    fn update_path_with_root(&mut self, root: &Path, config_name: &Path) {
        let root = Self::normalize_path(&Self::expand_tilde(root));
        self.set_root(&root);

        self.config_path = Self::normalize_path(&root.join(config_name));
        self.build.src = Self::normalize_path(&root.join(Self::expand_tilde(&self.build.src)));
        self.build.output =
            Self::normalize_path(&root.join(Self::expand_tilde(&self.build.output)));
    }

    /// Expand a leading `~` to the home directory.
    fn expand_tilde(path: &Path) -> PathBuf {
        match path.to_str() {
            Some(s) => PathBuf::from(shellexpand::tilde(s).into_owned()),
            None => path.to_path_buf(),
        }
    }

    /// Normalize a path to absolute, using canonicalize if the path exists
    fn normalize_path(path: &Path) -> PathBuf {
        path.canonicalize().unwrap_or_else(|_| {
            if path.is_absolute() {
                path.to_path_buf()
            } else {
                std::env::current_dir()
                    .map(|cwd| cwd.join(path))
                    .unwrap_or_else(|_| path.to_path_buf())
            }
        })
    }

    /// Validate configuration before the first run.
    pub fn validate(&self) -> Result<()> {
        // Archives written inside src would retrigger the watcher forever.
        if self.build.output.starts_with(&self.build.src) {
            bail!(ConfigError::Validation(
                "[build.output] must not be [build.src] or inside it".into()
            ));
        }

        Self::check_command_installed("[tools.bundler]", &self.tools.bundler)?;
        Self::check_command_installed("[tools.minifier]", &self.tools.minifier)?;

        Ok(())
    }

    /// Check if a command is installed and available
    fn check_command_installed(field: &str, command: &[String]) -> Result<()> {
        let Some(cmd) = command.first() else {
            bail!(ConfigError::Validation(format!(
                "{field} must have at least one element"
            )));
        };

        which::which(cmd)
            .with_context(|| format!("`{cmd}` not found. Please install it first."))?;

        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_from_str() {
        let config = PackConfig::from_str(
            r#"
            [build]
            output = "packages"

            [tools]
            minifier = ["terser-compat"]
            "#,
        )
        .unwrap();

        assert_eq!(config.build.output, PathBuf::from("packages"));
        assert_eq!(config.tools.minifier, ["terser-compat"]);
        assert_eq!(config.tools.bundler, ["esbuild"]);
    }

    #[test]
    fn test_from_str_invalid_toml() {
        assert!(PackConfig::from_str("[build\nsrc = ").is_err());
    }

    #[test]
    fn test_unknown_top_level_field_rejection() {
        let err = PackConfig::from_str("[serve]\nport = 8080").unwrap_err();
        assert!(err.downcast_ref::<ConfigError>().is_some());
    }

    #[test]
    fn test_default_config() {
        let config = PackConfig::default();
        assert_eq!(config.get_root(), Path::new("./"));
        assert_eq!(config.build.src, PathBuf::from("src"));
        assert_eq!(config.watch.debounce_ms, 300);
    }

    #[test]
    fn test_from_path_missing_file() {
        let err = PackConfig::from_path(Path::new("/nonexistent/extpack.toml")).unwrap_err();
        assert!(format!("{err}").contains("IO error"));
    }

    #[test]
    fn test_update_with_cli_resolves_paths() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_str().unwrap();
        let cli = Cli::parse_from(["extpack", "--root", root, "--output", "out", "prod"]);

        let mut config = PackConfig::default();
        config.update_with_cli(&cli);

        let root = dir.path().canonicalize().unwrap();
        assert_eq!(config.get_root(), root);
        assert_eq!(config.build.src, root.join("src"));
        assert_eq!(config.build.output, root.join("out"));
        assert_eq!(config.config_path, root.join("extpack.toml"));
    }

    #[test]
    fn test_validate_rejects_empty_tool() {
        let mut config = PackConfig::default();
        config.tools.bundler.clear();
        let err = config.validate().unwrap_err();
        assert!(format!("{err}").contains("[tools.bundler]"));
    }

    #[test]
    fn test_validate_rejects_output_inside_src() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_str().unwrap();

        for output in ["src", "src/dist", "./src/dist/nested"] {
            let cli = Cli::parse_from(["extpack", "--root", root, "--output", output, "prod"]);
            let mut config = PackConfig::default();
            config.update_with_cli(&cli);

            let err = config.validate().unwrap_err();
            assert!(format!("{err}").contains("[build.output]"), "{output}");
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_validate_accepts_sibling_output() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_str().unwrap();
        let cli = Cli::parse_from(["extpack", "--root", root, "--output", "src-dist", "prod"]);

        let mut config = PackConfig::default();
        config.update_with_cli(&cli);
        config.tools.bundler = vec!["sh".into()];
        config.tools.minifier = vec!["sh".into()];
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_missing_tool() {
        let mut config = PackConfig::default();
        config.tools.bundler = vec!["extpack-definitely-missing-tool".into()];
        assert!(config.validate().is_err());
    }
}
