//! Bundler collaborator.

use crate::{
    config::SourceMapKind,
    utils::{
        cancel::CancelToken,
        exec::{ExecOptions, exec},
    },
};
use anyhow::{Context, Result};
use std::{
    ffi::OsString,
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

/// Which kind of unit an entry point belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitKind {
    /// The shared main script, loaded by the host as a CommonJS module.
    Main,
    /// A page script, loaded by a `<script>` tag in the page template.
    Page,
}

/// What the bundler is asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompileOptions {
    pub kind: UnitKind,
    /// `None` requests no source map at all.
    pub source_map: Option<SourceMapKind>,
}

/// A compiled unit before any mode-dependent post-processing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bundle {
    pub code: Vec<u8>,
    /// External source map, when one was requested.
    pub map: Option<Vec<u8>>,
}

/// Compiles one entry point into a standalone bundle.
///
/// `output_name` is the bundle's archive name (`main.js`, `pages/popup.js`);
/// implementations use its file name for `sourceMappingURL` comments.
pub trait Bundler: Send + Sync {
    fn compile(
        &self,
        entry: &Path,
        output_name: &str,
        options: &CompileOptions,
        cancel: &CancelToken,
    ) -> Result<Bundle>;
}

/// Bundles through an esbuild-compatible command line.
///
/// The bundle is written into a private temporary directory under the
/// output's file name and read back, together with `<file>.map`.
///
/// The main unit is emitted as CommonJS (`--format=cjs`) so its exports
/// reach the host; pages get a self-executing bundle (`--format=iife`).
/// `extra_args` follow for every unit, then `main_args` for the main one.
pub struct EsbuildBundler {
    command: Vec<String>,
    extra_args: Vec<String>,
    main_args: Vec<String>,
    timeout: Option<Duration>,
}

impl EsbuildBundler {
    pub fn new(command: Vec<String>, extra_args: Vec<String>, timeout: Option<Duration>) -> Self {
        Self {
            command,
            extra_args,
            main_args: Vec::new(),
            timeout,
        }
    }

    pub fn main_args(mut self, args: Vec<String>) -> Self {
        self.main_args = args;
        self
    }

    fn args(&self, entry: &Path, outfile: &Path, options: &CompileOptions) -> Vec<OsString> {
        let mut outfile_arg = OsString::from("--outfile=");
        outfile_arg.push(outfile);

        let mut args = vec![
            entry.as_os_str().to_owned(),
            "--bundle".into(),
            "--log-level=warning".into(),
            outfile_arg,
        ];
        match options.kind {
            UnitKind::Main => args.push("--format=cjs".into()),
            UnitKind::Page => args.push("--format=iife".into()),
        }
        match options.source_map {
            Some(SourceMapKind::External) => args.push("--sourcemap".into()),
            Some(SourceMapKind::Inline) => args.push("--sourcemap=inline".into()),
            None => {}
        }
        args.extend(self.extra_args.iter().map(OsString::from));
        if options.kind == UnitKind::Main {
            args.extend(self.main_args.iter().map(OsString::from));
        }
        args
    }
}

impl Bundler for EsbuildBundler {
    fn compile(
        &self,
        entry: &Path,
        output_name: &str,
        options: &CompileOptions,
        cancel: &CancelToken,
    ) -> Result<Bundle> {
        let file_name = Path::new(output_name)
            .file_name()
            .with_context(|| format!("output name `{output_name}` has no file name"))?;

        let workdir = tempfile::tempdir().context("Failed to create bundler work directory")?;
        let outfile = workdir.path().join(file_name);

        let exec_options = ExecOptions {
            root: entry.parent(),
            timeout: self.timeout,
            ..Default::default()
        };
        exec(&self.command, &self.args(entry, &outfile, options), &exec_options, cancel)?;

        let code = fs::read(&outfile)
            .with_context(|| format!("bundler produced no output for {}", entry.display()))?;

        let map = match options.source_map {
            Some(SourceMapKind::External) => {
                let map_path = map_path(&outfile);
                Some(fs::read(&map_path).with_context(|| {
                    format!("bundler produced no source map for {}", entry.display())
                })?)
            }
            _ => None,
        };

        Ok(Bundle { code, map })
    }
}

fn map_path(outfile: &Path) -> PathBuf {
    let mut path = outfile.as_os_str().to_owned();
    path.push(".map");
    PathBuf::from(path)
}
