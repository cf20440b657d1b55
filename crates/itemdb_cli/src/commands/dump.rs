//! Dump command implementation.

use super::{open_existing, CliResult};
use std::io::Write;
use std::path::Path;

/// Runs the dump command.
pub fn run(path: &Path, output: Option<&Path>) -> CliResult<()> {
    let db = open_existing(path)?;
    match output {
        Some(target) => {
            db.dump_to_path(target)?;
            println!("Dumped {} to {}", db.icn(), target.display());
        }
        None => {
            let stdout = std::io::stdout();
            let mut out = stdout.lock();
            db.dump(&mut out)?;
            out.flush()?;
        }
    }
    db.close();
    Ok(())
}
