use std::path::Path;

use super::{thread_arg, Aligner};
use crate::execute::Command;
use crate::pipeline::Reads;

#[derive(Clone, Copy, Debug, Default)]
pub struct Minimap2;

impl Aligner for Minimap2 {
    fn name(&self) -> &'static str {
        "minimap2"
    }

    fn build_index(
        &self,
        fasta: &Path,
        index: &Path,
        threads: usize,
        options: &[String],
    ) -> Vec<Command> {
        vec![Command::new("minimap2")
            .arg("-t")
            .arg(thread_arg(threads))
            .arg("-d")
            .arg_path(index)
            .args(options.iter().cloned())
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
        let mut command = Command::new("minimap2")
            .arg("-t")
            .arg(thread_arg(threads))
            .arg("-a");
        if let Some(path) = output {
            command = command.arg("-o").arg_path(path);
        }
        command = command
            .args(options.iter().cloned())
            .arg_path(index)
            .arg_path(reads.first());
        match reads.second() {
            Some(seq2) => command.arg_path(seq2),
            None => command,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_precede_positionals() {
        let reads = Reads::Single("reads.fq".into());
        let command = Minimap2.align(
            Path::new("host.mmi"),
            &reads,
            None,
            6,
            &["-x".to_string(), "sr".to_string()],
        );
        assert_eq!(command.to_string(), "minimap2 -t 6 -a -x sr host.mmi reads.fq");
    }

    #[test]
    fn index_command() {
        let commands = Minimap2.build_index(Path::new("host.fa"), Path::new("host.mmi"), 2, &[]);
        assert_eq!(commands[0].to_string(), "minimap2 -t 2 -d host.mmi host.fa");
    }
}
