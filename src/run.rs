use anyhow::{Context, Result};

use crate::cli;
use crate::execute::Executor;
use crate::index;
use crate::map;
use crate::utils::init_logger;

/// Dispatch a parsed command line and return the process exit code.
pub fn cmd(args: cli::Arguments) -> Result<i32> {
    init_logger(args.verbose, args.quiet);
    match args.cmd {
        cli::SubCommand::Map(options) => map::map(&options),
        cli::SubCommand::Index(options) => {
            index::index(&options, &Executor::default())
                .with_context(|| format!("unable to build {:?} index", options.tool))?;
            Ok(0)
        }
    }
}
