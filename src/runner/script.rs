//! Runner Command and Script Generation
//!
//! Builds the command line that runs a compiled workflow with a third-party
//! CWL runner, and writes it out as an executable `run.sh`.

use std::error::Error;
use std::fmt;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Local;
use log::info;

/// Name of the generated run script.
pub const RUN_SCRIPT: &str = "run.sh";

/// Third-party CWL runners the compiled document can be handed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CwlRunner {
    #[default]
    Cwltool,
    Toil,
}

impl CwlRunner {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "cwltool" => Some(Self::Cwltool),
            "toil" | "toil-cwl-runner" => Some(Self::Toil),
            _ => None,
        }
    }

    pub fn executable(self) -> &'static str {
        match self {
            Self::Cwltool => "cwltool",
            Self::Toil => "toil-cwl-runner",
        }
    }
}

impl fmt::Display for CwlRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.executable())
    }
}

/// Flags passed through to the runner.
#[derive(Debug, Clone)]
pub struct RunnerOptions {
    pub runner: CwlRunner,
    /// Run independent steps concurrently
    pub parallel: bool,
    pub quiet: bool,
    /// Record a research object under `provenance/<name>`
    pub provenance: bool,
    pub cachedir: Option<PathBuf>,
    /// OCI engine (`docker`, `podman`, `singularity`, or any docker-compatible command)
    pub container_engine: String,
    pub custom_net: Option<String>,
    pub outdir: PathBuf,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self {
            runner: CwlRunner::default(),
            parallel: false,
            quiet: false,
            provenance: true,
            cachedir: Some(PathBuf::from("cachedir")),
            container_engine: "docker".to_string(),
            custom_net: None,
            outdir: PathBuf::from("outdir"),
        }
    }
}

/// Returns the runner invocation for `cwl` with job file `job`, executable first.
pub fn build_command(cwl: &Path, job: &Path, options: &RunnerOptions) -> Vec<String> {
    let mut command = vec![options.runner.executable().to_string()];

    let name = cwl
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "workflow".to_string());

    if options.provenance {
        command.push("--provenance".to_string());
        command.push(format!("provenance/{}", name));
    }

    match options.runner {
        CwlRunner::Cwltool => {
            if options.parallel {
                command.push("--parallel".to_string());
            }
            if options.quiet {
                command.push("--quiet".to_string());
            }
            if let Some(cachedir) = &options.cachedir {
                command.push("--cachedir".to_string());
                command.push(cachedir.display().to_string());
            }
            if let Some(net) = &options.custom_net {
                command.push(format!("--custom-net={}", net));
            }
            match options.container_engine.as_str() {
                "docker" => {}
                "podman" => command.push("--podman".to_string()),
                "singularity" => command.push("--singularity".to_string()),
                other => {
                    command.push("--user-space-docker-cmd".to_string());
                    command.push(other.to_string());
                }
            }
        }
        CwlRunner::Toil => {
            command.push("--jobStore".to_string());
            command.push(format!("file:./jobStore_{}", name));
            command.push("--clean".to_string());
            command.push("always".to_string());
            if options.quiet {
                command.push("--logLevel".to_string());
                command.push("WARNING".to_string());
            }
            if options.container_engine == "singularity" {
                command.push("--singularity".to_string());
            }
        }
    }

    command.push("--outdir".to_string());
    command.push(options.outdir.display().to_string());
    command.push(cwl.display().to_string());
    command.push(job.display().to_string());
    command
}

/// Writes `run.sh` into `dir` and returns its path.
pub fn generate_run_script(
    dir: &Path,
    command: &[String],
) -> Result<PathBuf, Box<dyn Error + Send + Sync>> {
    fs::create_dir_all(dir)?;
    let script_path = dir.join(RUN_SCRIPT);
    let mut file = File::create(&script_path)?;

    writeln!(file, "#!/bin/bash")?;
    writeln!(
        file,
        "# Generated by {} {} on {}",
        crate::APP_NAME,
        crate::VERSION,
        Local::now().format("%Y-%m-%d %H:%M:%S")
    )?;
    writeln!(file, "set -e")?;
    writeln!(file, "{}", shell_join(command))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&script_path, fs::Permissions::from_mode(0o755))?;
    }

    info!("Wrote run script {}", script_path.display());
    Ok(script_path)
}

/// Joins arguments into one shell line, single-quoting those that need it.
pub fn shell_join(command: &[String]) -> String {
    command
        .iter()
        .map(|arg| {
            let plain = !arg.is_empty()
                && arg
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || "-_./=:,+@%".contains(c));
            if plain {
                arg.clone()
            } else {
                format!("'{}'", arg.replace('\'', "'\\''"))
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
