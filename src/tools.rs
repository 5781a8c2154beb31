//!
//! Argument templates for the external aligners and classifiers.
//!
//! Each tool only knows how to build its own argv. Running the commands and
//! interpreting their output is left to [`crate::pipeline`].

use std::path::Path;

use clap::ValueEnum;

use crate::execute::Command;
use crate::pipeline::Reads;

mod bbmap;
mod bowtie2;
mod bwa_mem2;
mod hisat2;
mod kraken2;
mod minimap2;
mod samtools;

pub use bbmap::BBMap;
pub use bowtie2::Bowtie2;
pub use bwa_mem2::BwaMem2;
pub use hisat2::Hisat2;
pub use kraken2::Kraken2;
pub use minimap2::Minimap2;
pub use samtools::Samtools;

fn thread_arg(threads: usize) -> String {
    threads.max(1).to_string()
}

/// A read aligner that writes SAM.
pub trait Aligner: Send + Sync {
    fn name(&self) -> &'static str;

    /// Commands that build an index from `fasta`, run in order.
    fn build_index(
        &self,
        fasta: &Path,
        index: &Path,
        threads: usize,
        options: &[String],
    ) -> Vec<Command>;

    /// Align `reads` against `index`. SAM goes to `output`, or to stdout when
    /// `output` is `None` so it can be piped into a converter.
    fn align(
        &self,
        index: &Path,
        reads: &Reads,
        output: Option<&Path>,
        threads: usize,
        options: &[String],
    ) -> Command;
}

/// A read classifier that writes classified and unclassified reads to
/// separate files.
pub trait Classifier: Send + Sync {
    fn name(&self) -> &'static str;

    fn build_index(
        &self,
        fasta: &Path,
        index: &Path,
        threads: usize,
        options: &[String],
    ) -> Vec<Command>;

    /// Paired output paths contain a `#` that the tool replaces with the mate
    /// number.
    fn classify(
        &self,
        index: &Path,
        reads: &Reads,
        classified: Option<&Path>,
        unclassified: Option<&Path>,
        threads: usize,
        options: &[String],
    ) -> Command;
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum AlignerKind {
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
}

impl AlignerKind {
    pub fn aligner(self) -> Box<dyn Aligner> {
        match self {
            AlignerKind::Bowtie2 => Box::new(Bowtie2),
            AlignerKind::BwaMem2 => Box::new(BwaMem2),
            AlignerKind::Hisat2 => Box::new(Hisat2),
            AlignerKind::Minimap2 => Box::new(Minimap2),
            AlignerKind::BBMap => Box::new(BBMap),
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClassifierKind {
    #[value(name = "kraken2")]
    Kraken2,
}

impl ClassifierKind {
    pub fn classifier(self) -> Box<dyn Classifier> {
        match self {
            ClassifierKind::Kraken2 => Box::new(Kraken2),
        }
    }
}

/// Any tool that can build an index, as named on the command line.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ToolKind {
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
}

impl ToolKind {
    pub fn index_commands(
        self,
        fasta: &Path,
        index: &Path,
        threads: usize,
        options: &[String],
    ) -> Vec<Command> {
        let aligner = match self {
            ToolKind::Bowtie2 => AlignerKind::Bowtie2,
            ToolKind::BwaMem2 => AlignerKind::BwaMem2,
            ToolKind::Hisat2 => AlignerKind::Hisat2,
            ToolKind::Minimap2 => AlignerKind::Minimap2,
            ToolKind::BBMap => AlignerKind::BBMap,
            ToolKind::Kraken2 => {
                return ClassifierKind::Kraken2
                    .classifier()
                    .build_index(fasta, index, threads, options)
            }
        };
        aligner.aligner().build_index(fasta, index, threads, options)
    }
}
