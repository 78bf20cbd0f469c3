//! Building units with mode-dependent transforms.

use super::{BuildMode, Bundler, CompileOptions, Minifier, UnitKind};
use crate::{
    config::SourceMapKind,
    layout::{ENTRY_SCRIPT, ENTRY_TEMPLATE},
    manifest::{page_script_path, page_template_path},
    utils::{cancel::CancelToken, minify::minify_template},
};
use std::{
    fs, io,
    path::{Path, PathBuf},
};
use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A unit that could not be built. Any of these fails the whole run.
#[derive(Debug, Error)]
pub enum UnitError {
    #[error("{unit}: entry point `{}` not found", .path.display())]
    MissingEntry { unit: String, path: PathBuf },

    #[error("{unit}: failed to compile")]
    Compile {
        unit: String,
        #[source]
        source: BoxError,
    },

    #[error("{unit}: failed to minify")]
    Minify {
        unit: String,
        #[source]
        source: BoxError,
    },

    #[error("{unit}: bundler returned no source map")]
    MissingSourceMap { unit: String },

    #[error("{unit}: couldn't read template `{}`", .path.display())]
    Template {
        unit: String,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl UnitError {
    /// Name of the unit that failed.
    pub fn unit(&self) -> &str {
        match self {
            Self::MissingEntry { unit, .. }
            | Self::Compile { unit, .. }
            | Self::Minify { unit, .. }
            | Self::MissingSourceMap { unit }
            | Self::Template { unit, .. } => unit,
        }
    }
}

/// One built archive entry, with its source map if it carries one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitOutput {
    pub name: String,
    pub bytes: Vec<u8>,
    pub map: Option<Vec<u8>>,
}

impl UnitOutput {
    /// Archive name of the external source map: `<name>.map`.
    pub fn map_name(&self) -> String {
        format!("{}.map", self.name)
    }
}

/// A built page: its template and its script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageOutput {
    pub template: UnitOutput,
    pub script: UnitOutput,
}

/// Builds units for one run.
///
/// The mode is fixed at construction, so every unit of a run is built the
/// same way.
pub struct UnitBuilder<'a> {
    bundler: &'a dyn Bundler,
    minifier: &'a dyn Minifier,
    mode: BuildMode,
    source_map: SourceMapKind,
    minify_templates: bool,
    cancel: &'a CancelToken,
}

impl<'a> UnitBuilder<'a> {
    pub fn new(
        bundler: &'a dyn Bundler,
        minifier: &'a dyn Minifier,
        mode: BuildMode,
        cancel: &'a CancelToken,
    ) -> Self {
        Self {
            bundler,
            minifier,
            mode,
            source_map: SourceMapKind::default(),
            minify_templates: false,
            cancel,
        }
    }

    pub fn source_map(mut self, kind: SourceMapKind) -> Self {
        self.source_map = kind;
        self
    }

    pub fn minify_templates(mut self, enabled: bool) -> Self {
        self.minify_templates = enabled;
        self
    }

    /// Compile the script at `entry` into the archive entry `output_name`.
    ///
    /// Dev asks the bundler for a source map and passes the bundle through.
    /// Prod asks for none, minifies, and drops any map the bundler returned.
    pub fn build(
        &self,
        entry: &Path,
        output_name: &str,
        kind: UnitKind,
    ) -> Result<UnitOutput, UnitError> {
        let unit = output_name.to_owned();

        if !entry.is_file() {
            return Err(UnitError::MissingEntry {
                unit,
                path: entry.to_path_buf(),
            });
        }

        let options = CompileOptions {
            kind,
            source_map: self.mode.is_dev().then_some(self.source_map),
        };
        let bundle = self
            .bundler
            .compile(entry, output_name, &options, self.cancel)
            .map_err(|e| UnitError::Compile {
                unit: unit.clone(),
                source: e.into(),
            })?;

        let (bytes, map) = match self.mode {
            BuildMode::Dev => match self.source_map {
                SourceMapKind::External => {
                    let map = bundle.map.ok_or_else(|| UnitError::MissingSourceMap {
                        unit: unit.clone(),
                    })?;
                    (bundle.code, Some(map))
                }
                // Embedded in the bundle itself.
                SourceMapKind::Inline => (bundle.code, None),
            },
            BuildMode::Prod => {
                let minified = self
                    .minifier
                    .minify(&bundle.code, self.cancel)
                    .map_err(|e| UnitError::Minify {
                        unit: unit.clone(),
                        source: e.into(),
                    })?;
                (minified, None)
            }
        };

        Ok(UnitOutput {
            name: unit,
            bytes,
            map,
        })
    }

    /// Build a page: `<dir>/index.html` → `pages/<page>.html` and
    /// `<dir>/index.js` → `pages/<page>.js`.
    ///
    /// These are the same names the manifest records for the page.
    pub fn build_page(&self, page_dir: &Path, page: &str) -> Result<PageOutput, UnitError> {
        let template = self.copy_template(&page_dir.join(ENTRY_TEMPLATE), page)?;
        let script = self.build(&page_dir.join(ENTRY_SCRIPT), &page_script_path(page), UnitKind::Page)?;

        Ok(PageOutput { template, script })
    }

    fn copy_template(&self, path: &Path, page: &str) -> Result<UnitOutput, UnitError> {
        let name = page_template_path(page);
        let html = fs::read(path).map_err(|source| UnitError::Template {
            unit: name.clone(),
            path: path.to_path_buf(),
            source,
        })?;

        let minify = self.minify_templates && !self.mode.is_dev();
        let bytes = minify_template(&html, minify).into_owned();

        Ok(UnitOutput {
            name,
            bytes,
            map: None,
        })
    }
}
