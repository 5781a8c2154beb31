use std::path::Path;

use super::{thread_arg, Aligner};
use crate::execute::Command;
use crate::pipeline::Reads;

#[derive(Clone, Copy, Debug, Default)]
pub struct Hisat2;

impl Aligner for Hisat2 {
    fn name(&self) -> &'static str {
        "hisat2"
    }

    fn build_index(
        &self,
        fasta: &Path,
        index: &Path,
        threads: usize,
        options: &[String],
    ) -> Vec<Command> {
        vec![Command::new("hisat2-build")
            .arg("-p")
            .arg(thread_arg(threads))
            .args(options.iter().cloned())
            .arg_path(fasta)
            .arg_path(index)]
    }

    fn align(
        &self,
        index: &Path,
        reads: &Reads,
        output: Option<&Path>,
        threads: usize,
        options: &[String],
    ) -> Command {
        let mut command = Command::new("hisat2")
            .arg("-p")
            .arg(thread_arg(threads))
            .arg("-x")
            .arg_path(index)
            .arg("-q");
        command = match reads {
            Reads::Single(seq) => command.arg("-U").arg_path(seq),
            Reads::Paired(seq1, seq2) => command.arg("-1").arg_path(seq1).arg("-2").arg_path(seq2),
        };
        if let Some(path) = output {
            command = command.arg("-S").arg_path(path);
        }
        command.args(options.iter().cloned())
    }
}
