//! `dehost` removes host contamination from sequencing reads by chaining
//! external aligners and classifiers and filtering the reads they match.

/// Functions for reading alignment files.
pub mod bam;

/// The dehost Command Line Interface.
pub mod cli;

/// Optional YAML settings.
pub mod config;

/// Error types.
pub mod error;

/// Run chains of external processes.
pub mod execute;

/// Filter FASTQ files based on a list of read names.
pub mod filter;

/// Build host indexes.
pub mod index;

/// Functions for file IO.
pub mod io;

/// Run a host removal pipeline.
pub mod map;

/// Compose tools into host removal pipelines.
pub mod pipeline;

/// Command dispatch.
pub mod run;

/// External tool argument templates.
pub mod tools;

/// Utility functions.
pub mod utils;
