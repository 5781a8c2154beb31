use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::pipeline::{Intermediary, PipelineKind};
use crate::tools::ToolKind;

/// Top level arguments to `dehost`
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Arguments {
    #[clap(subcommand)]
    pub cmd: SubCommand,
    /// Log debug messages
    #[arg(long, short = 'v', global = true, default_value_t = false)]
    pub verbose: bool,
    /// Only log warnings and errors
    #[arg(long, short = 'q', global = true, default_value_t = false)]
    pub quiet: bool,
}

/// `dehost` subcommands
#[derive(Subcommand, Debug)]
pub enum SubCommand {
    /// Remove host reads by mapping or classifying against a host index.
    /// Called as `dehost map`
    Map(MapOptions),
    /// Build a host index for one of the supported tools.
    /// Called as `dehost index`
    Index(IndexOptions),
}

/// Options to pass to `dehost map`
#[derive(Parser, Debug)]
pub struct MapOptions {
    /// Pipeline to run
    #[arg(value_enum)]
    pub pipeline: PipelineKind,
    /// Path to the aligner index
    #[arg(long, short = 'x', value_name = "INDEX")]
    pub index: Option<PathBuf>,
    /// Path to the index of the second aligner (bowtie2-bowtie2, bowtie2-hisat2)
    #[arg(long = "index2", short = 'y', value_name = "INDEX")]
    pub index2: Option<PathBuf>,
    /// Path to the classifier database (kraken2 pipelines)
    #[arg(long = "classifier-index", short = 'k', value_name = "DB")]
    pub classifier_index: Option<PathBuf>,
    /// Input FASTQ file(s), one for single-end or two for paired-end reads
    #[arg(long, short = 'i', value_name = "FASTQ", num_args = 1..=2, required = true)]
    pub input: Vec<PathBuf>,
    /// Output FASTQ file(s), matching the number of inputs
    #[arg(long, short = 'o', value_name = "FASTQ", num_args = 1..=2, required = true)]
    pub output: Vec<PathBuf>,
    /// Number of threads passed to each tool
    #[arg(long, short = 't')]
    pub threads: Option<usize>,
    /// Keep alignments with mapping quality above this value
    #[arg(long, short = 'm')]
    pub mapq: Option<u8>,
    /// Intermediate alignment format
    #[arg(long, short = 'r', value_enum)]
    pub intermediary: Option<Intermediary>,
    /// Keep the host reads instead of removing them
    #[arg(long = "keep-host", short = 'f', default_value_t = false)]
    pub keep_host: bool,
    /// Extra options for the aligner, passed through verbatim
    #[arg(long = "aligner-args", value_name = "ARGS", allow_hyphen_values = true)]
    pub aligner_args: Option<String>,
    /// Extra options for the classifier, passed through verbatim
    #[arg(long = "classifier-args", value_name = "ARGS", allow_hyphen_values = true)]
    pub classifier_args: Option<String>,
    /// Create the temporary workspace under this directory
    #[arg(long = "tmp-dir", value_name = "DIR", conflicts_with = "workdir")]
    pub tmp_dir: Option<PathBuf>,
    /// Use this directory as the workspace and keep it afterwards
    #[arg(long, value_name = "DIR")]
    pub workdir: Option<PathBuf>,
    /// Kill tools still running after this many seconds
    #[arg(long, value_name = "SECONDS")]
    pub timeout: Option<u64>,
    /// Path to a YAML settings file
    #[arg(long, short = 'c', value_name = "YAML")]
    pub config: Option<PathBuf>,
}

/// Options to pass to `dehost index`
#[derive(Parser, Debug)]
pub struct IndexOptions {
    /// Tool to build an index for
    #[arg(value_enum)]
    pub tool: ToolKind,
    /// Host reference FASTA file
    #[arg(long, short = 'i', value_name = "FASTA")]
    pub input: PathBuf,
    /// Output index path or prefix
    #[arg(long, short = 'o', value_name = "INDEX")]
    pub output: PathBuf,
    /// Number of threads passed to the tool
    #[arg(long, short = 't', default_value_t = 1)]
    pub threads: usize,
    /// Extra options for the index builder, passed through verbatim
    #[arg(long, value_name = "ARGS", allow_hyphen_values = true)]
    pub args: Option<String>,
}

pub fn parse() -> Arguments {
    Arguments::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_paired_map() {
        let args = Arguments::try_parse_from([
            "dehost",
            "map",
            "kraken2-bowtie2",
            "-x",
            "host",
            "-k",
            "db",
            "-i",
            "r1.fq",
            "r2.fq",
            "-o",
            "o1.fq",
            "o2.fq",
            "--aligner-args",
            "--local -N 1",
            "-v",
        ])
        .unwrap();
        assert!(args.verbose);
        match args.cmd {
            SubCommand::Map(options) => {
                assert_eq!(options.pipeline, PipelineKind::Kraken2Bowtie2);
                assert_eq!(options.input.len(), 2);
                assert_eq!(options.output.len(), 2);
                assert_eq!(options.aligner_args.as_deref(), Some("--local -N 1"));
                assert!(!options.keep_host);
            }
            other => panic!("unexpected subcommand {other:?}"),
        }
    }

    #[test]
    fn rejects_three_inputs() {
        assert!(Arguments::try_parse_from([
            "dehost", "map", "bowtie2", "-x", "host", "-i", "a", "b", "c", "-o", "o",
        ])
        .is_err());
    }

    #[test]
    fn parses_index() {
        let args = Arguments::try_parse_from([
            "dehost", "index", "bwa-mem2", "-i", "host.fa", "-o", "idx/host", "-t", "4",
        ])
        .unwrap();
        match args.cmd {
            SubCommand::Index(options) => {
                assert_eq!(options.tool, ToolKind::BwaMem2);
                assert_eq!(options.threads, 4);
            }
            other => panic!("unexpected subcommand {other:?}"),
        }
    }
}
