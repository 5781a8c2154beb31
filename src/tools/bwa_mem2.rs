use std::path::Path;

use super::{thread_arg, Aligner};
use crate::execute::Command;
use crate::pipeline::Reads;

#[derive(Clone, Copy, Debug, Default)]
pub struct BwaMem2;

impl Aligner for BwaMem2 {
    fn name(&self) -> &'static str {
        "bwa-mem2"
    }

    fn build_index(
        &self,
        fasta: &Path,
        index: &Path,
        _threads: usize,
        options: &[String],
    ) -> Vec<Command> {
        vec![Command::new("bwa-mem2")
            .arg("index")
            .args(options.iter().cloned())
            .arg("-p")
            .arg_path(index)
            .arg_path(fasta)]
    }

    fn align(
        &self,
        index: &Path,
        reads: &Reads,
        output: Option<&Path>,
        threads: usize,
        options: &[String],
    ) -> Command {
        let mut command = Command::new("bwa-mem2")
            .arg("mem")
            .arg("-t")
            .arg(thread_arg(threads));
        if let Some(path) = output {
            command = command.arg("-o").arg_path(path);
        }
        command = command.arg_path(index).arg_path(reads.first());
        if let Some(seq2) = reads.second() {
            command = command.arg_path(seq2);
        }
        command.args(options.iter().cloned())
    }
}
