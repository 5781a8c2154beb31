use std::path::Path;

use super::{thread_arg, Aligner};
use crate::execute::Command;
use crate::pipeline::Reads;

/// BBMap takes `key=value` arguments and writes to stdout with `out=stdout.sam`.
#[derive(Clone, Copy, Debug, Default)]
pub struct BBMap;

impl Aligner for BBMap {
    fn name(&self) -> &'static str {
        "bbmap"
    }

    fn build_index(
        &self,
        fasta: &Path,
        index: &Path,
        threads: usize,
        options: &[String],
    ) -> Vec<Command> {
        vec![Command::new("bbmap.sh")
            .arg(format!("threads={}", thread_arg(threads)))
            .arg(format!("ref={}", fasta.display()))
            .arg(format!("path={}", index.display()))
            .args(options.iter().cloned())]
    }

    fn align(
        &self,
        index: &Path,
        reads: &Reads,
        output: Option<&Path>,
        threads: usize,
        options: &[String],
    ) -> Command {
        let out = match output {
            Some(path) => format!("out={}", path.display()),
            None => "out=stdout.sam".to_string(),
        };
        let mut command = Command::new("bbmap.sh")
            .arg(format!("threads={}", thread_arg(threads)))
            .arg(format!("path={}", index.display()))
            .arg(out)
            .arg(format!("in={}", reads.first().display()));
        if let Some(seq2) = reads.second() {
            command = command.arg(format!("in2={}", seq2.display()));
        }
        command.args(options.iter().cloned())
    }
}
