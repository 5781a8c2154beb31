//!
//! Compose alignment, name extraction and read filtering into host removal
//! runs.
//!
//! Every run gets its own [`Workspace`]. Steps run strictly in sequence and
//! the first failure ends the run.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use clap::ValueEnum;
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use tempfile::{Builder, TempDir};

use crate::bam;
use crate::error::Error;
use crate::execute::{Chain, ChainResult, Executor};
use crate::filter::{filter_reads, FilterByName, FilterCommand, FilterMode, FilterRequest};
use crate::io;
use crate::tools::{Aligner, AlignerKind, Classifier, ClassifierKind, Samtools};

pub const ID_LIST: &str = "ids.list";
pub const CLASSIFICATIONS: &str = "classifications.txt";

/// Single-end or paired-end read files.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Reads {
    Single(PathBuf),
    Paired(PathBuf, PathBuf),
}

impl Reads {
    /// Build from one or two paths given on the command line.
    pub fn from_paths(paths: &[PathBuf]) -> Result<Self, Error> {
        match paths {
            [seq] => Ok(Reads::Single(seq.clone())),
            [seq1, seq2] => Ok(Reads::Paired(seq1.clone(), seq2.clone())),
            _ => Err(Error::Config(format!(
                "expected one or two read files, got {}",
                paths.len()
            ))),
        }
    }

    pub fn first(&self) -> &Path {
        match self {
            Reads::Single(seq) | Reads::Paired(seq, _) => seq.as_path(),
        }
    }

    pub fn second(&self) -> Option<&Path> {
        match self {
            Reads::Single(_) => None,
            Reads::Paired(_, seq2) => Some(seq2.as_path()),
        }
    }

    pub fn is_paired(&self) -> bool {
        matches!(self, Reads::Paired(..))
    }

    fn in_dir(dir: &Path, stem: &str, paired: bool) -> Self {
        let file = |mate: usize| dir.join(format!("{stem}_{mate}.fastq"));
        if paired {
            Reads::Paired(file(1), file(2))
        } else {
            Reads::Single(file(1))
        }
    }

    fn paths(&self) -> Vec<&Path> {
        match self {
            Reads::Single(seq) => vec![seq.as_path()],
            Reads::Paired(seq1, seq2) => vec![seq1.as_path(), seq2.as_path()],
        }
    }
}

fn check_arity(input: &Reads, output: &Reads) -> Result<(), Error> {
    if input.is_paired() == output.is_paired() {
        Ok(())
    } else {
        Err(Error::Config(format!(
            "{} input file(s) but {} output file(s)",
            input.paths().len(),
            output.paths().len()
        )))
    }
}

/// Where a run keeps its intermediate files.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum WorkspaceLocation {
    /// A fresh temporary directory under the system temp location.
    #[default]
    System,
    /// A fresh temporary directory under the given parent.
    Within(PathBuf),
    /// A directory supplied by the caller, left in place afterwards.
    External(PathBuf),
}

/// Directory holding the intermediate files of one run. An owned workspace
/// is removed when dropped.
#[derive(Debug)]
pub enum Workspace {
    Owned(TempDir),
    External(PathBuf),
}

impl Workspace {
    pub fn create(location: &WorkspaceLocation) -> Result<Self, Error> {
        let workspace = match location {
            WorkspaceLocation::System => {
                Workspace::Owned(Builder::new().prefix("dehost-").tempdir()?)
            }
            WorkspaceLocation::Within(parent) => {
                fs::create_dir_all(parent)?;
                Workspace::Owned(Builder::new().prefix("dehost-").tempdir_in(parent)?)
            }
            WorkspaceLocation::External(path) => {
                fs::create_dir_all(path)?;
                Workspace::External(path.clone())
            }
        };
        debug!("Workspace: {}", workspace.path().display());
        Ok(workspace)
    }

    pub fn path(&self) -> &Path {
        match self {
            Workspace::Owned(dir) => dir.path(),
            Workspace::External(path) => path.as_path(),
        }
    }

    pub fn join<P: AsRef<Path>>(&self, name: P) -> PathBuf {
        self.path().join(name)
    }

    /// A directory inside this workspace, removed along with its parent.
    pub fn subdir(&self, name: &str) -> Result<Workspace, Error> {
        let path = self.join(name);
        fs::create_dir_all(&path)?;
        Ok(Workspace::External(path))
    }
}

/// Shared settings for every step of a run.
#[derive(Clone, Debug, Default)]
pub struct Context {
    pub executor: Executor,
    pub threads: usize,
    pub workspace: WorkspaceLocation,
}

impl Context {
    pub fn new(executor: Executor) -> Self {
        Context {
            executor,
            threads: 1,
            workspace: WorkspaceLocation::System,
        }
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads.max(1);
        self
    }

    pub fn with_workspace(mut self, workspace: WorkspaceLocation) -> Self {
        self.workspace = workspace;
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunState {
    Init,
    Aligning,
    Extracting,
    Filtering,
    Classifying,
    Done,
    Failed,
}

#[derive(Clone, Debug)]
pub struct RunReport {
    pub pipeline: String,
    pub state: RunState,
    /// Entries written to the name list, for runs that extract names.
    pub identifiers: Option<usize>,
    pub elapsed: Duration,
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} finished in {:.2}s",
            self.pipeline,
            self.elapsed.as_secs_f64()
        )?;
        if let Some(count) = self.identifiers {
            write!(f, " ({count} read names matched)")?;
        }
        Ok(())
    }
}

struct Progress<'a> {
    pipeline: &'a str,
    state: RunState,
    started: Instant,
}

impl<'a> Progress<'a> {
    fn start(pipeline: &'a str) -> Self {
        info!("Starting {pipeline} pipeline");
        Progress {
            pipeline,
            state: RunState::Init,
            started: Instant::now(),
        }
    }

    fn to(&mut self, next: RunState) {
        debug!("{}: {:?} -> {:?}", self.pipeline, self.state, next);
        self.state = next;
    }

    fn guard<T>(&mut self, result: Result<T, Error>) -> Result<T, Error> {
        if result.is_err() {
            self.to(RunState::Failed);
        }
        result
    }

    fn done(mut self, identifiers: Option<usize>) -> RunReport {
        self.to(RunState::Done);
        RunReport {
            pipeline: self.pipeline.to_string(),
            state: self.state,
            identifiers,
            elapsed: self.started.elapsed(),
        }
    }
}

/// A complete host removal run from input reads to output reads.
pub trait Pipeline {
    fn name(&self) -> String;

    /// Run inside an existing workspace.
    fn execute(
        &self,
        ctx: &Context,
        input: &Reads,
        output: &Reads,
        workspace: &Workspace,
    ) -> Result<RunReport, Error>;

    /// Create a workspace, run, and return a process exit code. The workspace
    /// is removed afterwards unless it was supplied by the caller.
    fn run(&self, ctx: &Context, input: &Reads, output: &Reads) -> i32 {
        let result = check_arity(input, output)
            .and_then(|_| Workspace::create(&ctx.workspace))
            .and_then(|workspace| self.execute(ctx, input, output, &workspace));
        match result {
            Ok(report) => {
                info!("{report}");
                0
            }
            Err(err) => {
                error!("{} pipeline failed: {err}", self.name());
                1
            }
        }
    }
}

/// Intermediate alignment format.
#[derive(ValueEnum, Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Intermediary {
    #[default]
    #[value(name = "SAM", alias = "sam")]
    #[serde(rename = "SAM", alias = "sam")]
    Sam,
    #[value(name = "BAM", alias = "bam")]
    #[serde(rename = "BAM", alias = "bam")]
    Bam,
}

impl Intermediary {
    fn file_name(self) -> &'static str {
        match self {
            Intermediary::Sam => "alignment.sam",
            Intermediary::Bam => "alignment.bam",
        }
    }
}

/// Align, collect the names of reads that hit the host, then filter the
/// input reads by those names.
pub struct AlignmentPipeline {
    aligner: Box<dyn Aligner>,
    index: PathBuf,
    mapq: u8,
    mode: FilterMode,
    intermediary: Intermediary,
    options: Vec<String>,
    samtools: Samtools,
    filter: Box<dyn FilterCommand>,
}

impl AlignmentPipeline {
    pub fn new<P: AsRef<Path>>(aligner: Box<dyn Aligner>, index: P) -> Self {
        AlignmentPipeline {
            aligner,
            index: index.as_ref().to_path_buf(),
            mapq: 0,
            mode: FilterMode::Exclude,
            intermediary: Intermediary::Sam,
            options: vec![],
            samtools: Samtools::default(),
            filter: Box::new(FilterByName::default()),
        }
    }

    pub fn with_mapq(mut self, mapq: u8) -> Self {
        self.mapq = mapq;
        self
    }

    pub fn with_mode(mut self, mode: FilterMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_intermediary(mut self, intermediary: Intermediary) -> Self {
        self.intermediary = intermediary;
        self
    }

    pub fn with_options(mut self, options: Vec<String>) -> Self {
        self.options = options;
        self
    }

    pub fn with_samtools(mut self, samtools: Samtools) -> Self {
        self.samtools = samtools;
        self
    }

    pub fn with_filter(mut self, filter: Box<dyn FilterCommand>) -> Self {
        self.filter = filter;
        self
    }

    fn align_chain(&self, input: &Reads, alignment: &Path, threads: usize) -> Chain {
        match self.intermediary {
            Intermediary::Sam => Chain::single(self.aligner.align(
                &self.index,
                input,
                Some(alignment),
                threads,
                &self.options,
            )),
            Intermediary::Bam => Chain::new(
                vec![
                    self.aligner
                        .align(&self.index, input, None, threads, &self.options),
                    self.samtools.to_bam(alignment, threads),
                ],
                true,
            ),
        }
    }
}

impl Pipeline for AlignmentPipeline {
    fn name(&self) -> String {
        self.aligner.name().to_string()
    }

    fn execute(
        &self,
        ctx: &Context,
        input: &Reads,
        output: &Reads,
        workspace: &Workspace,
    ) -> Result<RunReport, Error> {
        check_arity(input, output)?;
        let name = self.name();
        let mut progress = Progress::start(&name);
        debug!("Input: {:?}", input);
        debug!("Intermediary: {:?}", self.intermediary);

        progress.to(RunState::Aligning);
        info!("Aligning reads with {name}");
        let alignment = workspace.join(self.intermediary.file_name());
        let chain = self.align_chain(input, &alignment, ctx.threads);
        progress.guard(ctx.executor.run(&chain).and_then(ChainResult::check))?;

        progress.to(RunState::Extracting);
        info!("Extracting read names");
        let ids = bam::extract_ids(&alignment, self.mapq, input.is_paired(), ctx.threads);
        let list = workspace.join(ID_LIST);
        progress.guard(io::write_list(&ids, &list).map_err(Error::from))?;

        progress.to(RunState::Filtering);
        let request = progress.guard(FilterRequest::new(
            input.first(),
            input.second(),
            output.first(),
            output.second(),
            &list,
            self.mode,
        ))?;
        progress.guard(filter_reads(&ctx.executor, self.filter.as_ref(), &request))?;

        Ok(progress.done(Some(ids.len())))
    }
}

/// Classify reads and keep either the unclassified (host removed) or the
/// classified reads.
pub struct ClassificationPipeline {
    classifier: Box<dyn Classifier>,
    index: PathBuf,
    mode: FilterMode,
    options: Vec<String>,
}

impl ClassificationPipeline {
    pub fn new<P: AsRef<Path>>(classifier: Box<dyn Classifier>, index: P) -> Self {
        ClassificationPipeline {
            classifier,
            index: index.as_ref().to_path_buf(),
            mode: FilterMode::Exclude,
            options: vec![],
        }
    }

    pub fn with_mode(mut self, mode: FilterMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_options(mut self, options: Vec<String>) -> Self {
        self.options = options;
        self
    }
}

impl Pipeline for ClassificationPipeline {
    fn name(&self) -> String {
        self.classifier.name().to_string()
    }

    fn execute(
        &self,
        ctx: &Context,
        input: &Reads,
        output: &Reads,
        workspace: &Workspace,
    ) -> Result<RunReport, Error> {
        check_arity(input, output)?;
        let name = self.name();
        let mut progress = Progress::start(&name);

        progress.to(RunState::Classifying);
        info!("Classifying reads with {name}");
        let stem = match self.mode {
            FilterMode::Exclude => "unclassified",
            FilterMode::Include => "classified",
        };
        let template = if input.is_paired() {
            workspace.join(format!("{stem}#.fastq"))
        } else {
            workspace.join(format!("{stem}_1.fastq"))
        };
        let (classified, unclassified) = match self.mode {
            FilterMode::Exclude => (None, Some(template.as_path())),
            FilterMode::Include => (Some(template.as_path()), None),
        };
        let command = self.classifier.classify(
            &self.index,
            input,
            classified,
            unclassified,
            ctx.threads,
            &self.options,
        );
        let chain = Chain::single(command).stdout_to(workspace.join(CLASSIFICATIONS));
        progress.guard(ctx.executor.run(&chain).and_then(ChainResult::check))?;

        let produced = Reads::in_dir(workspace.path(), stem, input.is_paired());
        for (from, to) in produced.paths().into_iter().zip(output.paths()) {
            progress.guard(move_file(from, to))?;
        }
        Ok(progress.done(None))
    }
}

fn move_file(from: &Path, to: &Path) -> Result<(), Error> {
    if !from.exists() {
        warn!("{} was not written, creating an empty output", from.display());
        fs::File::create(to)?;
        return Ok(());
    }
    debug!("Moving {} to {}", from.display(), to.display());
    if fs::rename(from, to).is_err() {
        fs::copy(from, to)?;
        fs::remove_file(from)?;
    }
    Ok(())
}

/// Run one pipeline and feed its output reads into a second.
pub struct CompoundPipeline {
    first: Box<dyn Pipeline>,
    second: Box<dyn Pipeline>,
}

impl CompoundPipeline {
    pub fn new(first: Box<dyn Pipeline>, second: Box<dyn Pipeline>) -> Self {
        CompoundPipeline { first, second }
    }
}

impl Pipeline for CompoundPipeline {
    fn name(&self) -> String {
        format!("{}-{}", self.first.name(), self.second.name())
    }

    fn execute(
        &self,
        ctx: &Context,
        input: &Reads,
        output: &Reads,
        workspace: &Workspace,
    ) -> Result<RunReport, Error> {
        check_arity(input, output)?;
        let name = self.name();
        let mut progress = Progress::start(&name);
        let intermediate = Reads::in_dir(workspace.path(), "intermediate", input.is_paired());

        let first = progress.guard(workspace.subdir(&format!("1-{}", self.first.name())))?;
        progress.guard(self.first.execute(ctx, input, &intermediate, &first))?;

        let second = progress.guard(workspace.subdir(&format!("2-{}", self.second.name())))?;
        let report = progress.guard(self.second.execute(ctx, &intermediate, output, &second))?;

        Ok(progress.done(report.identifiers))
    }
}

/// Named pipelines that can be run from the command line.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineKind {
    #[value(name = "bowtie2")]
    Bowtie2,
    #[value(name = "bwa-mem2")]
    BwaMem2,
    #[value(name = "hisat2")]
    Hisat2,
    #[value(name = "minimap2")]
    Minimap2,
    #[value(name = "bbmap")]
    BBMap,
    #[value(name = "kraken2")]
    Kraken2,
    #[value(name = "bowtie2-bowtie2")]
    Bowtie2Bowtie2,
    #[value(name = "bowtie2-hisat2")]
    Bowtie2Hisat2,
    #[value(name = "kraken2-bowtie2")]
    Kraken2Bowtie2,
    #[value(name = "kraken2-bwa-mem2")]
    Kraken2BwaMem2,
    #[value(name = "kraken2-hisat2")]
    Kraken2Hisat2,
    #[value(name = "kraken2-minimap2")]
    Kraken2Minimap2,
}

/// One sub-pipeline of a named pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Step {
    Classify(ClassifierKind),
    Align(AlignerKind),
}

impl PipelineKind {
    /// The steps of this pipeline, in run order.
    pub fn steps(self) -> Vec<Step> {
        use PipelineKind::*;
        use Step::{Align, Classify};
        match self {
            Bowtie2 => vec![Align(AlignerKind::Bowtie2)],
            BwaMem2 => vec![Align(AlignerKind::BwaMem2)],
            Hisat2 => vec![Align(AlignerKind::Hisat2)],
            Minimap2 => vec![Align(AlignerKind::Minimap2)],
            BBMap => vec![Align(AlignerKind::BBMap)],
            Kraken2 => vec![Classify(ClassifierKind::Kraken2)],
            Bowtie2Bowtie2 => vec![Align(AlignerKind::Bowtie2), Align(AlignerKind::Bowtie2)],
            Bowtie2Hisat2 => vec![Align(AlignerKind::Bowtie2), Align(AlignerKind::Hisat2)],
            Kraken2Bowtie2 => vec![Classify(ClassifierKind::Kraken2), Align(AlignerKind::Bowtie2)],
            Kraken2BwaMem2 => vec![Classify(ClassifierKind::Kraken2), Align(AlignerKind::BwaMem2)],
            Kraken2Hisat2 => vec![Classify(ClassifierKind::Kraken2), Align(AlignerKind::Hisat2)],
            Kraken2Minimap2 => {
                vec![Classify(ClassifierKind::Kraken2), Align(AlignerKind::Minimap2)]
            }
        }
    }
}
