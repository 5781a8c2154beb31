use std::path::Path;

use super::thread_arg;
use crate::execute::Command;

/// Converts SAM on stdin to a BAM file.
#[derive(Clone, Debug)]
pub struct Samtools {
    program: String,
}

impl Default for Samtools {
    fn default() -> Self {
        Samtools {
            program: "samtools".to_string(),
        }
    }
}

impl Samtools {
    pub fn new<S: Into<String>>(program: S) -> Self {
        Samtools {
            program: program.into(),
        }
    }

    pub fn to_bam(&self, output: &Path, threads: usize) -> Command {
        Command::new(self.program.as_str())
            .arg("view")
            .arg("-@")
            .arg(thread_arg(threads))
            .arg("-b")
            .arg("-o")
            .arg_path(output)
            .arg("-")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bam_conversion_reads_stdin() {
        let command = Samtools::default().to_bam(Path::new("ws/alignment.bam"), 2);
        assert_eq!(
            command.to_string(),
            "samtools view -@ 2 -b -o ws/alignment.bam -"
        );
    }
}
