//! Pipeline orchestration.
//!
//! One run turns the project sources into one archive:
//!
//! ```text
//! Idle ─► Discovering ─► Synthesizing ─► Building ─► Assembling ─► Done
//!              │               │             │            │
//!              └───────────────┴─────────────┴────────────┴──► Failed
//! ```
//!
//! Units (main script + one per page) build in parallel on rayon's pool.
//! The first unit error cancels the run's token, so siblings still waiting
//! on an external tool are torn down, and assembly never starts.

use crate::{
    archive::{self, ArchiveAssembler},
    compiler::{
        BuildMode, Bundler, EsbuildBundler, EsbuildMinifier, Minifier, UnitBuilder, UnitError, UnitKind,
        UnitOutput,
    },
    config::{PackConfig, SourceMapKind},
    error::BuildError,
    layout::{self, ProjectLayout},
    log,
    manifest::{self, DeclaredManifest, MAIN_SCRIPT},
    utils::{cancel::CancelToken, log::ProgressBars},
};
use parking_lot::Mutex;
use rayon::prelude::*;
use std::{
    path::PathBuf,
    sync::atomic::{AtomicBool, Ordering},
};

/// Where a run currently is. `Done` and `Failed` are terminal for a run;
/// the next [`Pipeline::run`] starts again from `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    Discovering,
    Synthesizing,
    Building,
    Assembling,
    Done,
    Failed,
}

/// One unit to build.
enum Job<'a> {
    Main,
    Page(&'a str),
}

pub struct Pipeline {
    src: PathBuf,
    output: PathBuf,
    source_map: SourceMapKind,
    minify_templates: bool,
    bundler: Box<dyn Bundler>,
    minifier: Box<dyn Minifier>,
    stage: Stage,
}

impl Pipeline {
    pub fn new(
        src: impl Into<PathBuf>,
        output: impl Into<PathBuf>,
        bundler: Box<dyn Bundler>,
        minifier: Box<dyn Minifier>,
    ) -> Self {
        Self {
            src: src.into(),
            output: output.into(),
            source_map: SourceMapKind::default(),
            minify_templates: false,
            bundler,
            minifier,
            stage: Stage::Idle,
        }
    }

    /// Pipeline driving the configured esbuild-compatible tools.
    pub fn from_config(config: &PackConfig) -> Self {
        let timeout = config.build.timeout();
        let bundler = EsbuildBundler::new(
            config.tools.bundler.clone(),
            config.tools.bundler_args.clone(),
            timeout,
        )
        .main_args(config.tools.main_args.clone());
        let minifier = EsbuildMinifier::new(config.tools.minifier.clone(), timeout);

        Self::new(
            &config.build.src,
            &config.build.output,
            Box::new(bundler),
            Box::new(minifier),
        )
        .source_map(config.build.source_map)
        .minify_templates(config.build.minify_templates)
    }

    pub fn source_map(mut self, kind: SourceMapKind) -> Self {
        self.source_map = kind;
        self
    }

    pub fn minify_templates(mut self, enabled: bool) -> Self {
        self.minify_templates = enabled;
        self
    }

    pub const fn stage(&self) -> Stage {
        self.stage
    }

    /// Execute one full run and return the archive path.
    ///
    /// A failed run leaves no archive under its final name. The pipeline
    /// stays usable: the next call starts a fresh, independent run.
    pub fn run(&mut self, mode: BuildMode, cancel: &CancelToken) -> Result<PathBuf, BuildError> {
        self.stage = Stage::Idle;

        match self.try_run(mode, cancel) {
            Ok(path) => {
                self.stage = Stage::Done;
                log!("archive"; "{}", path.display());
                Ok(path)
            }
            Err(e) => {
                self.stage = Stage::Failed;
                log!("error"; "{} error: {}", e.kind(), e.report());
                Err(e)
            }
        }
    }

    fn try_run(&mut self, mode: BuildMode, cancel: &CancelToken) -> Result<PathBuf, BuildError> {
        self.stage = Stage::Discovering;
        let layout = layout::discover(&self.src);

        self.stage = Stage::Synthesizing;
        let declared = DeclaredManifest::read(&layout.manifest_path())?;
        archive::check_layout_names(&layout)?;
        let manifest = manifest::synthesize(&declared, &layout).to_json_bytes()?;
        log!("manifest"; "{} pages", layout.page_names().len());

        self.stage = Stage::Building;
        let units = self.build_units(&layout, mode, cancel)?;

        self.stage = Stage::Assembling;
        if cancel.is_cancelled() {
            return Err(BuildError::Cancelled);
        }
        let path = ArchiveAssembler::new(&self.output).assemble(
            &manifest,
            &units,
            mode,
            &declared.metadata(),
        )?;

        Ok(path)
    }

    /// Fan out over every unit and fan back in, in archive order.
    fn build_units(
        &self,
        layout: &ProjectLayout,
        mode: BuildMode,
        cancel: &CancelToken,
    ) -> Result<Vec<UnitOutput>, BuildError> {
        let jobs: Vec<Job> = layout
            .has_main_unit()
            .then_some(Job::Main)
            .into_iter()
            .chain(layout.page_names().iter().map(|page| Job::Page(page)))
            .collect();

        log!("build"; "{mode}: {} units", jobs.len());

        let run_cancel = cancel.child();
        let builder = UnitBuilder::new(self.bundler.as_ref(), self.minifier.as_ref(), mode, &run_cancel)
            .source_map(self.source_map)
            .minify_templates(self.minify_templates);

        let progress = ProgressBars::new(&[("units", jobs.len())]);
        let has_error = AtomicBool::new(false);
        let first_error = Mutex::new(None);

        let outputs: Vec<Option<Vec<UnitOutput>>> = jobs
            .par_iter()
            .map(|job| {
                if has_error.load(Ordering::Relaxed) || run_cancel.is_cancelled() {
                    return None;
                }
                match build_job(&builder, layout, job) {
                    Ok(outputs) => {
                        progress.inc_by_name("units");
                        Some(outputs)
                    }
                    Err(e) => {
                        if !has_error.swap(true, Ordering::Relaxed) {
                            run_cancel.cancel();
                            *first_error.lock() = Some(e);
                        }
                        None
                    }
                }
            })
            .collect();

        progress.finish();

        // Units killed by Ctrl+C fail too; report the cancellation instead.
        if cancel.is_cancelled() {
            return Err(BuildError::Cancelled);
        }
        if let Some(e) = first_error.into_inner() {
            return Err(e.into());
        }

        Ok(outputs.into_iter().flatten().flatten().collect())
    }
}

fn build_job(builder: &UnitBuilder, layout: &ProjectLayout, job: &Job) -> Result<Vec<UnitOutput>, UnitError> {
    match job {
        Job::Main => Ok(vec![builder.build(&layout.main_entry(), MAIN_SCRIPT, UnitKind::Main)?]),
        Job::Page(page) => {
            let built = builder.build_page(&layout.page_dir(page), page)?;
            Ok(vec![built.template, built.script])
        }
    }
}
