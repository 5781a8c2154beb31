use std::path::Path;

use super::{thread_arg, Aligner};
use crate::execute::Command;
use crate::pipeline::Reads;

#[derive(Clone, Copy, Debug, Default)]
pub struct Bowtie2;

impl Aligner for Bowtie2 {
    fn name(&self) -> &'static str {
        "bowtie2"
    }

    fn build_index(
        &self,
        fasta: &Path,
        index: &Path,
        threads: usize,
        options: &[String],
    ) -> Vec<Command> {
        vec![Command::new("bowtie2-build")
            .arg("--threads")
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
        let mut command = Command::new("bowtie2")
            .arg("-p")
            .arg(thread_arg(threads))
            .arg("-x")
            .arg_path(index)
            .arg("-q")
            .args(options.iter().cloned());
        command = match reads {
            Reads::Single(seq) => command.arg("-U").arg_path(seq),
            Reads::Paired(seq1, seq2) => command.arg("-1").arg_path(seq1).arg("-2").arg_path(seq2),
        };
        match output {
            Some(path) => command.arg("-S").arg_path(path),
            None => command,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paired_alignment_to_file() {
        let reads = Reads::Paired("r1.fq".into(), "r2.fq".into());
        let command = Bowtie2.align(
            Path::new("host"),
            &reads,
            Some(Path::new("ws/alignment.sam")),
            4,
            &["--local".to_string()],
        );
        assert_eq!(
            command.to_string(),
            "bowtie2 -p 4 -x host -q --local -1 r1.fq -2 r2.fq -S ws/alignment.sam"
        );
    }

    #[test]
    fn single_alignment_to_stdout() {
        let reads = Reads::Single("r1.fq".into());
        let command = Bowtie2.align(Path::new("host"), &reads, None, 1, &[]);
        assert_eq!(command.to_string(), "bowtie2 -p 1 -x host -q -U r1.fq");
    }
}
