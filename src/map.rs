//!
//! Invoked by calling:
//! `dehost map <pipeline> <args>`

use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use anyhow::{Context as _, Result};
use log::debug;

use crate::cli;
use crate::config::{split_args, Settings};
use crate::error::Error;
use crate::execute::Executor;
use crate::filter::{FilterByName, FilterMode};
use crate::pipeline::{
    AlignmentPipeline, ClassificationPipeline, CompoundPipeline, Context, Pipeline, Reads, Step,
    WorkspaceLocation,
};
use crate::tools::{AlignerKind, Samtools};

pub use cli::MapOptions;

fn default_threads() -> usize {
    thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

fn alignment_pipeline(
    kind: AlignerKind,
    index: &Path,
    mode: FilterMode,
    options: &MapOptions,
    settings: &Settings,
) -> AlignmentPipeline {
    let args = options
        .aligner_args
        .as_deref()
        .or(settings.aligner_args.as_deref());
    let mut pipeline = AlignmentPipeline::new(kind.aligner(), index)
        .with_mapq(options.mapq.or(settings.mapq).unwrap_or(0))
        .with_mode(mode)
        .with_intermediary(
            options
                .intermediary
                .or(settings.intermediary)
                .unwrap_or_default(),
        )
        .with_options(split_args(args));
    if let Some(program) = &settings.programs.samtools {
        pipeline = pipeline.with_samtools(Samtools::new(program.as_str()));
    }
    if let Some(program) = &settings.programs.filterbyname {
        pipeline = pipeline.with_filter(Box::new(FilterByName::new(program.as_str())));
    }
    pipeline
}

/// Assemble the pipeline named on the command line. Flags take precedence
/// over the settings file.
pub fn build_pipeline(
    options: &MapOptions,
    settings: &Settings,
) -> Result<Box<dyn Pipeline>, Error> {
    let mode = FilterMode::from_keep(options.keep_host);
    let required = |index: &Option<PathBuf>, flag: &str| {
        index.clone().ok_or_else(|| {
            Error::Config(format!(
                "{flag} is required for the {:?} pipeline",
                options.pipeline
            ))
        })
    };

    let mut aligner_indexes =
        [(&options.index, "--index"), (&options.index2, "--index2")].into_iter();
    let mut stages: Vec<Box<dyn Pipeline>> = vec![];
    for step in options.pipeline.steps() {
        match step {
            Step::Classify(kind) => {
                let index = required(&options.classifier_index, "--classifier-index")?;
                let args = options
                    .classifier_args
                    .as_deref()
                    .or(settings.classifier_args.as_deref());
                let pipeline = ClassificationPipeline::new(kind.classifier(), index)
                    .with_mode(mode)
                    .with_options(split_args(args));
                stages.push(Box::new(pipeline));
            }
            Step::Align(kind) => {
                let (index, flag) = aligner_indexes.next().ok_or_else(|| {
                    Error::Config(format!("too many aligners in {:?}", options.pipeline))
                })?;
                let index = required(index, flag)?;
                let pipeline = alignment_pipeline(kind, &index, mode, options, settings);
                stages.push(Box::new(pipeline));
            }
        }
    }

    let mut stages = stages.into_iter();
    match (stages.next(), stages.next()) {
        (Some(first), Some(second)) => Ok(Box::new(CompoundPipeline::new(first, second))),
        (Some(pipeline), None) => Ok(pipeline),
        _ => Err(Error::Config(format!("{:?} has no steps", options.pipeline))),
    }
}

pub fn build_context(options: &MapOptions, settings: &Settings) -> Context {
    let mut executor = Executor::default();
    if let Some(seconds) = options.timeout.or(settings.timeout_secs) {
        executor = executor.with_timeout(Duration::from_secs(seconds));
    }
    let tmp_dir = options.tmp_dir.as_ref().or(settings.temp_dir.as_ref());
    let workspace = match (&options.workdir, tmp_dir) {
        (Some(dir), _) => WorkspaceLocation::External(dir.clone()),
        (None, Some(parent)) => WorkspaceLocation::Within(parent.clone()),
        (None, None) => WorkspaceLocation::System,
    };
    Context::new(executor)
        .with_threads(
            options
                .threads
                .or(settings.threads)
                .unwrap_or_else(default_threads),
        )
        .with_workspace(workspace)
}

/// Execute the `map` subcommand from `dehost` and return the exit code.
pub fn map(options: &MapOptions) -> Result<i32> {
    let settings = Settings::load(options.config.as_deref()).context("unable to load settings")?;
    debug!("Settings: {:?}", settings);
    let input = Reads::from_paths(&options.input)?;
    let output = Reads::from_paths(&options.output)?;
    let pipeline = build_pipeline(options, &settings)?;
    let ctx = build_context(options, &settings);
    Ok(pipeline.run(&ctx, &input, &output))
}
