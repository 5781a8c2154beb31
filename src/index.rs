//!
//! Invoked by calling:
//! `dehost index <tool> <args>`

use std::fs;

use log::info;

use crate::cli;
use crate::config::split_args;
use crate::error::Error;
use crate::execute::{Chain, Executor};
use crate::utils::styled_progress_bar;

pub use cli::IndexOptions;

/// Execute the `index` subcommand from `dehost`.
/// Build commands run one after another and the first failure stops the build.
pub fn index(options: &IndexOptions, executor: &Executor) -> Result<(), Error> {
    if !options.input.is_file() {
        return Err(Error::Config(format!(
            "reference FASTA {} not found",
            options.input.display()
        )));
    }
    if let Some(parent) = options.output.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let args = split_args(options.args.as_deref());
    let commands = options
        .tool
        .index_commands(&options.input, &options.output, options.threads, &args);

    let progress_bar = styled_progress_bar(commands.len(), "Building index");
    for command in commands {
        info!("Running {command}");
        executor.run(&Chain::single(command))?.check()?;
        progress_bar.inc(1);
    }
    progress_bar.finish_and_clear();
    info!("Index written to {}", options.output.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ToolKind;

    #[test]
    fn missing_reference_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let options = IndexOptions {
            tool: ToolKind::Bowtie2,
            input: dir.path().join("missing.fa"),
            output: dir.path().join("idx/host"),
            threads: 1,
            args: None,
        };
        let err = index(&options, &Executor::default()).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(!dir.path().join("idx").exists());
    }
}
