//!
//! Keep or drop reads from FASTQ files based on a list of read names.
//!
//! The rewriting itself is delegated to an external program, by default
//! `filterbyname.sh` from BBTools.

use std::path::{Path, PathBuf};

use log::{debug, info};

use crate::error::Error;
use crate::execute::{Chain, Command, Executor};

/// Whether the listed reads are removed from or kept in the output.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FilterMode {
    #[default]
    Exclude,
    Include,
}

impl FilterMode {
    pub fn from_keep(keep: bool) -> Self {
        if keep {
            FilterMode::Include
        } else {
            FilterMode::Exclude
        }
    }
}

/// Builds the argv that filters one read file against a name list.
pub trait FilterCommand: Send + Sync {
    fn command(&self, input: &Path, output: &Path, names: &Path, mode: FilterMode) -> Command;
}

/// `filterbyname.sh in=<in> out=<out> names=<list> include=<t|f> ow=t`
#[derive(Clone, Debug)]
pub struct FilterByName {
    program: String,
}

impl Default for FilterByName {
    fn default() -> Self {
        FilterByName {
            program: "filterbyname.sh".to_string(),
        }
    }
}

impl FilterByName {
    pub fn new<S: Into<String>>(program: S) -> Self {
        FilterByName {
            program: program.into(),
        }
    }
}

impl FilterCommand for FilterByName {
    fn command(&self, input: &Path, output: &Path, names: &Path, mode: FilterMode) -> Command {
        let include = match mode {
            FilterMode::Include => "t",
            FilterMode::Exclude => "f",
        };
        Command::new(self.program.as_str())
            .arg(format!("in={}", input.display()))
            .arg(format!("out={}", output.display()))
            .arg(format!("names={}", names.display()))
            .arg(format!("include={include}"))
            .arg("ow=t")
    }
}

/// One or two input/output pairs to filter against the same name list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FilterRequest {
    pairs: Vec<(PathBuf, PathBuf)>,
    names: PathBuf,
    mode: FilterMode,
}

impl FilterRequest {
    /// Fails unless `seq2` and `out2` are either both given or both absent.
    pub fn new(
        seq1: &Path,
        seq2: Option<&Path>,
        out1: &Path,
        out2: Option<&Path>,
        names: &Path,
        mode: FilterMode,
    ) -> Result<Self, Error> {
        let mut pairs = vec![(seq1.to_path_buf(), out1.to_path_buf())];
        match (seq2, out2) {
            (Some(seq2), Some(out2)) => pairs.push((seq2.to_path_buf(), out2.to_path_buf())),
            (None, None) => (),
            (Some(_), None) => {
                return Err(Error::Config(
                    "second input file given without a second output file".to_string(),
                ))
            }
            (None, Some(_)) => {
                return Err(Error::Config(
                    "second output file given without a second input file".to_string(),
                ))
            }
        }
        Ok(FilterRequest {
            pairs,
            names: names.to_path_buf(),
            mode,
        })
    }

    pub fn is_paired(&self) -> bool {
        self.pairs.len() == 2
    }

    pub fn commands(&self, tool: &dyn FilterCommand) -> Vec<Command> {
        self.pairs
            .iter()
            .map(|(input, output)| tool.command(input, output, &self.names, self.mode))
            .collect()
    }
}

/// Filter every file in `request`. Both mates are always attempted and the
/// call fails if either invocation fails.
pub fn filter_reads(
    executor: &Executor,
    tool: &dyn FilterCommand,
    request: &FilterRequest,
) -> Result<(), Error> {
    info!(
        "Filtering {} read file(s) ({:?})",
        request.pairs.len(),
        request.mode
    );
    for (input, output) in &request.pairs {
        debug!("{} -> {}", input.display(), output.display());
    }
    let chain = Chain::new(request.commands(tool), false);
    executor.run(&chain)?.check()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(path: &str) -> &Path {
        Path::new(path)
    }

    #[test]
    fn unmatched_second_file_is_rejected() {
        let err = FilterRequest::new(
            p("r1.fq"),
            Some(p("r2.fq")),
            p("o1.fq"),
            None,
            p("ids.list"),
            FilterMode::Exclude,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        let err = FilterRequest::new(
            p("r1.fq"),
            None,
            p("o1.fq"),
            Some(p("o2.fq")),
            p("ids.list"),
            FilterMode::Exclude,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn filterbyname_argv() {
        let request = FilterRequest::new(
            p("r1.fq"),
            Some(p("r2.fq")),
            p("o1.fq"),
            Some(p("o2.fq")),
            p("ids.list"),
            FilterMode::Exclude,
        )
        .unwrap();
        assert!(request.is_paired());
        let commands = request.commands(&FilterByName::default());
        assert_eq!(commands.len(), 2);
        assert_eq!(
            commands[1].to_string(),
            "filterbyname.sh in=r2.fq out=o2.fq names=ids.list include=f ow=t"
        );

        let include = FilterByName::new("/opt/bbmap/filterbyname.sh").command(
            p("r1.fq"),
            p("o1.fq"),
            p("ids.list"),
            FilterMode::Include,
        );
        assert_eq!(include.program(), "/opt/bbmap/filterbyname.sh");
        assert_eq!(include.arguments()[3], "include=t");
    }

    #[test]
    fn failed_mate_is_reported() {
        struct Fails;
        impl FilterCommand for Fails {
            fn command(&self, input: &Path, _: &Path, _: &Path, _: FilterMode) -> Command {
                let code = if input == Path::new("r2.fq") { "2" } else { "0" };
                Command::new("sh").arg("-c").arg(format!("exit {code}"))
            }
        }
        let request = FilterRequest::new(
            p("r1.fq"),
            Some(p("r2.fq")),
            p("o1.fq"),
            Some(p("o2.fq")),
            p("ids.list"),
            FilterMode::Include,
        )
        .unwrap();
        match filter_reads(&Executor::default(), &Fails, &request) {
            Err(Error::ChainFailed(failures)) => {
                assert_eq!(failures.len(), 1);
                assert_eq!(failures[0].stage, 1);
                assert_eq!(failures[0].code, 2);
            }
            other => panic!("expected mate failure, got {other:?}"),
        }
    }

    #[test]
    fn second_mate_runs_after_first_fails() {
        struct FirstFails;
        impl FilterCommand for FirstFails {
            fn command(&self, input: &Path, output: &Path, _: &Path, _: FilterMode) -> Command {
                if input == Path::new("r1.fq") {
                    Command::new("sh").arg("-c").arg("exit 1")
                } else {
                    Command::new("touch").arg_path(output)
                }
            }
        }
        let dir = tempfile::tempdir().unwrap();
        let out1 = dir.path().join("o1.fq");
        let out2 = dir.path().join("o2.fq");
        let request = FilterRequest::new(
            p("r1.fq"),
            Some(p("r2.fq")),
            &out1,
            Some(out2.as_path()),
            p("ids.list"),
            FilterMode::Exclude,
        )
        .unwrap();
        match filter_reads(&Executor::default(), &FirstFails, &request) {
            Err(Error::ChainFailed(failures)) => {
                assert_eq!(failures.len(), 1);
                assert_eq!(failures[0].stage, 0);
                assert_eq!(failures[0].code, 1);
            }
            other => panic!("expected first mate failure, got {other:?}"),
        }
        assert!(out2.exists());
        assert!(!out1.exists());
    }
}
