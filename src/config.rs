use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::pipeline::Intermediary;

/// Program path overrides.
#[derive(Default, Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct Programs {
    pub samtools: Option<String>,
    pub filterbyname: Option<String>,
}

/// Settings read from a YAML file. Every field is optional and command line
/// flags take precedence.
#[derive(Default, Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub threads: Option<usize>,
    pub mapq: Option<u8>,
    pub intermediary: Option<Intermediary>,
    pub temp_dir: Option<PathBuf>,
    pub timeout_secs: Option<u64>,
    pub programs: Programs,
    /// Extra aligner options, split on whitespace.
    pub aligner_args: Option<String>,
    /// Extra classifier options, split on whitespace.
    pub classifier_args: Option<String>,
}

impl Settings {
    pub fn from_file(path: &Path) -> Result<Self, Error> {
        let file = File::open(path).map_err(|err| {
            Error::Config(format!("unable to open {}: {err}", path.display()))
        })?;
        serde_yaml::from_reader(BufReader::new(file))
            .map_err(|err| Error::Config(format!("{} {err}", path.display())))
    }

    /// Load settings from `path`, or use the defaults when no file is given.
    pub fn load(path: Option<&Path>) -> Result<Self, Error> {
        match path {
            Some(path) => Settings::from_file(path),
            None => Ok(Settings::default()),
        }
    }
}

/// Split free-form tool options on whitespace.
pub fn split_args(args: Option<&str>) -> Vec<String> {
    args.map(|args| args.split_whitespace().map(String::from).collect())
        .unwrap_or_default()
}
