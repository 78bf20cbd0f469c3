//! Unit compilation.
//!
//! A unit is one independently bundled script: the shared main script or a
//! page's script. Compilation goes through two collaborators:
//!
//! - [`Bundler`]: entry point → bundle (+ source map when requested)
//! - [`Minifier`]: bundle → minified bundle
//!
//! [`UnitBuilder`] applies the mode-dependent transforms on top of them.
//!
//! ```text
//! dev:   entry ──bundle(map)──► code + map
//! prod:  entry ──bundle──► code ──minify──► code
//! ```

mod bundler;
mod minifier;
mod unit;

pub use bundler::{Bundle, Bundler, CompileOptions, EsbuildBundler, UnitKind};
pub use minifier::{EsbuildMinifier, Minifier};
pub use unit::{PageOutput, UnitBuilder, UnitError, UnitOutput};

#[cfg(test)]
pub(crate) use unit::tests::{FakeBundler, FakeMinifier};

use std::fmt;

/// Build variant, fixed for a whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum BuildMode {
    /// Source-mapped, unminified.
    Dev,
    /// Minified, no source maps.
    Prod,
}

impl BuildMode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Dev => "dev",
            Self::Prod => "prod",
        }
    }

    pub const fn is_dev(self) -> bool {
        matches!(self, Self::Dev)
    }
}

impl fmt::Display for BuildMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
