use std::path::Path;

use super::{thread_arg, Classifier};
use crate::execute::Command;
use crate::pipeline::Reads;

#[derive(Clone, Copy, Debug, Default)]
pub struct Kraken2;

impl Kraken2 {
    fn build(&self, threads: usize) -> Command {
        Command::new("kraken2-build")
            .arg("--threads")
            .arg(thread_arg(threads))
    }
}

impl Classifier for Kraken2 {
    fn name(&self) -> &'static str {
        "kraken2"
    }

    /// Download the taxonomy, add the host sequences, build and clean up.
    fn build_index(
        &self,
        fasta: &Path,
        index: &Path,
        threads: usize,
        options: &[String],
    ) -> Vec<Command> {
        vec![
            self.build(threads)
                .arg("--download-taxonomy")
                .arg("--db")
                .arg_path(index),
            self.build(threads)
                .arg("--add-to-library")
                .arg_path(fasta)
                .arg("--db")
                .arg_path(index),
            self.build(threads)
                .arg("--build")
                .args(options.iter().cloned())
                .arg("--db")
                .arg_path(index),
            self.build(threads)
                .arg("--clean")
                .arg("--db")
                .arg_path(index),
        ]
    }

    fn classify(
        &self,
        index: &Path,
        reads: &Reads,
        classified: Option<&Path>,
        unclassified: Option<&Path>,
        threads: usize,
        options: &[String],
    ) -> Command {
        let mut command = Command::new("kraken2")
            .arg("--threads")
            .arg(thread_arg(threads))
            .arg("--db")
            .arg_path(index);
        if let Some(path) = classified {
            command = command.arg("--classified-out").arg_path(path);
        }
        if let Some(path) = unclassified {
            command = command.arg("--unclassified-out").arg_path(path);
        }
        command = match reads {
            Reads::Single(seq) => command.arg_path(seq),
            Reads::Paired(seq1, seq2) => command.arg("--paired").arg_path(seq1).arg_path(seq2),
        };
        command.args(options.iter().cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paired_classification() {
        let reads = Reads::Paired("r1.fq".into(), "r2.fq".into());
        let command = Kraken2.classify(
            Path::new("db"),
            &reads,
            None,
            Some(Path::new("ws/unclassified#.fastq")),
            8,
            &[],
        );
        assert_eq!(
            command.to_string(),
            "kraken2 --threads 8 --db db --unclassified-out ws/unclassified#.fastq --paired r1.fq r2.fq"
        );
    }

    #[test]
    fn index_build_has_four_steps() {
        let commands = Kraken2.build_index(Path::new("host.fa"), Path::new("db"), 1, &[]);
        let steps: Vec<_> = commands.iter().map(|c| c.arguments()[2].as_str()).collect();
        assert_eq!(
            steps,
            vec!["--download-taxonomy", "--add-to-library", "--build", "--clean"]
        );
    }
}
