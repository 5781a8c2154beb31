use std::process;

use dehost::cli;
use dehost::run;

fn main() {
    let args = cli::parse();
    match run::cmd(args) {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("Application error: {e:#}");
            process::exit(1);
        }
    }
}
