//! Local Execution
//!
//! Runs a generated runner command on this machine and reports its outcome.

use std::error::Error;
use std::path::Path;
use std::process::Command;
use std::time::Instant;

use log::{debug, error, info};

/// Runs `command` (executable first) in `working_dir`, streaming its output
/// to the terminal. Fails if the runner cannot be started or exits non-zero.
pub fn run_local(
    command: &[String],
    working_dir: Option<&Path>,
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let (program, args) = command
        .split_first()
        .ok_or("Cannot run an empty command")?;

    let mut cmd = Command::new(program);
    cmd.args(args);
    if let Some(dir) = working_dir {
        cmd.current_dir(dir);
        debug!("Executing in directory: {}", dir.display());
    }

    info!("Running: {}", super::shell_join(command));
    let started = Instant::now();
    let status = cmd
        .status()
        .map_err(|e| format!("Failed to start '{}': {}", program, e))?;
    let elapsed = started.elapsed();

    if status.success() {
        info!("{} finished in {:.1}s", program, elapsed.as_secs_f64());
        Ok(())
    } else {
        error!(
            "{} failed with exit code: {:?} after {:.1}s",
            program,
            status.code(),
            elapsed.as_secs_f64()
        );
        Err(format!("Workflow run with '{}' failed. See logs for details.", program).into())
    }
}
