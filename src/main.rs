//! WIC CLI Entry Point
//!
//! Compiles a workflow description into a CWL workflow and its job file.
//!
//! # Usage
//!
//! ```bash
//! # Compile a workflow against a catalog
//! wic align.wic.yml --catalog catalog.yml
//!
//! # With input values and naming-convention tie-breaks
//! wic align.wic.yml --catalog catalog.yml --inputs align_values.yml --naming
//!
//! # Repair with adapters, inline sub-workflows and export a graph
//! wic align.wic.yml --catalog catalog.yml --repair --inline --graphviz
//!
//! # Compile and run with cwltool
//! wic align.wic.yml --catalog catalog.yml --run-local --parallel
//! ```

use std::env;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use colored::Colorize;
use log::{info, warn};

use wic::document::graphviz::{to_dot, GraphOptions};
use wic::document::job::job_inputs;
use wic::runner::{build_command, generate_run_script, run_local, CwlRunner, RunnerOptions};
use wic::workflow::parser::{load_input_values, load_workflow, save_text, workflow_name};
use wic::{compile, load_registry, CompilerConfig, APP_NAME, VERSION};

/// Default catalog file used when none is specified.
const DEFAULT_CATALOG: &str = "catalog.yml";

/// Default output directory for generated files.
const DEFAULT_OUTDIR: &str = "autogenerated";

/// What to write besides the CWL document, and whether to run it.
#[derive(Debug)]
struct OutputOptions {
    outdir: PathBuf,
    graphviz: bool,
    graph: GraphOptions,
    generate_run_script: bool,
    run_local: bool,
    runner: RunnerOptions,
}

impl Default for OutputOptions {
    fn default() -> Self {
        Self {
            outdir: PathBuf::from(DEFAULT_OUTDIR),
            graphviz: false,
            graph: GraphOptions::default(),
            generate_run_script: false,
            run_local: false,
            runner: RunnerOptions::default(),
        }
    }
}

/// Command-line configuration parsed from arguments.
#[derive(Debug, Default)]
struct Config {
    workflow_path: Option<String>,
    catalog_path: Option<String>,
    config_path: Option<String>,
    inputs_path: Option<String>,
    verbose: bool,
    /// Compiler switches given on the command line; applied over the config file
    inference_disabled: bool,
    naming: bool,
    repair: bool,
    inline: bool,
    ignore_validation_errors: bool,
    adapters: Option<Vec<String>>,
    output: OutputOptions,
}

impl Config {
    /// Compiler configuration: the config file if given, then CLI overrides.
    fn compiler_config(&self) -> wic::Result<CompilerConfig> {
        let mut config = match &self.config_path {
            Some(path) => CompilerConfig::load(path)?,
            None => CompilerConfig::default(),
        };
        config.inference_disabled |= self.inference_disabled;
        config.naming_convention_tiebreak |= self.naming;
        config.insertion_repair_enabled |= self.repair;
        config.inline_subworkflows |= self.inline;
        if self.ignore_validation_errors {
            config.strict_validation = false;
        }
        if let Some(adapters) = &self.adapters {
            config.adapter_whitelist = Some(adapters.clone());
        }
        Ok(config)
    }
}

/// Configures the logging system with appropriate formatting.
fn setup_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format(|buf, record| {
            use std::io::Write;

            match record.level() {
                log::Level::Warn | log::Level::Error => {
                    writeln!(buf, "[{}] {}", record.level(), record.args())
                }
                _ => writeln!(buf, "{}", record.args()),
            }
        })
        .init();
}

/// Prints the application banner with version information.
fn print_banner() {
    println!();
    println!("{} v{}", APP_NAME.bold(), VERSION);
    println!("Workflow Inference Compiler");
    println!();
}

/// Prints usage information.
fn print_usage() {
    println!("Usage: wic [OPTIONS] <WORKFLOW_FILE>");
    println!();
    println!("Arguments:");
    println!("  <WORKFLOW_FILE>            Path to workflow YAML file");
    println!();
    println!("Options:");
    println!("  --catalog PATH             Tool catalog (default: {})", DEFAULT_CATALOG);
    println!("  --config PATH              JSON compiler configuration");
    println!("  --inputs PATH              YAML values for the workflow inputs");
    println!("  --outdir PATH              Output directory (default: {})", DEFAULT_OUTDIR);
    println!("  --inference-disable        Use explicit bindings only");
    println!("  --naming                   Break inference ties by naming conventions");
    println!("  --repair                   Insert adapter steps for unresolved inputs");
    println!("  --adapters A,B             Adapters eligible for repair, in order");
    println!("  --inline                   Inline sub-workflows before emission");
    println!("  --ignore-validation-errors Downgrade ambiguous/failed inference to warnings");
    println!("  --graphviz                 Also write a Graphviz DOT file");
    println!("  --graph-label-edges        Label graph edges with port names");
    println!("  --graph-label-stepname     Show the tool next to each step");
    println!("  --graph-show-inputs        Draw workflow input nodes");
    println!("  --graph-show-outputs       Draw workflow output nodes");
    println!("  --graph-dark-theme         Dark graph colors");
    println!("  --graph-inline-depth N     Sub-workflow nesting drawn as clusters");
    println!("  --generate-run-script      Write run.sh and exit");
    println!("  --run-local                Run the compiled workflow after compiling");
    println!("  --cwl-runner NAME          cwltool or toil-cwl-runner (default: cwltool)");
    println!("  --parallel                 Run independent steps concurrently");
    println!("  --quiet                    Pass --quiet to the runner");
    println!("  --no-provenance            Do not record provenance");
    println!("  --cachedir PATH            Runner cache directory (default: cachedir)");
    println!("  --container-engine NAME    docker, podman, singularity, ... (default: docker)");
    println!("  --custom-net NAME          Container network passed to cwltool");
    println!("  --verbose                  Enable debug logging");
    println!("  --help                     Show this help message");
    println!("  --version                  Show version information");
    println!();
    println!("Examples:");
    println!("  wic align.wic.yml --catalog catalog.yml");
    println!("  wic align.wic.yml --inputs values.yml --repair --graphviz");
}

/// Returns the value following option `name`.
fn option_value(args: &[String], i: &mut usize, name: &str) -> Result<String, String> {
    *i += 1;
    args.get(*i)
        .cloned()
        .ok_or_else(|| format!("{} requires an argument", name))
}

/// Parses command-line arguments into a Config struct.
fn parse_arguments(args: &[String]) -> Result<Config, String> {
    let mut config = Config::default();
    let mut i = 1; // Skip program name

    while i < args.len() {
        let arg = &args[i];

        match arg.as_str() {
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("{} {}", APP_NAME, VERSION);
                std::process::exit(0);
            }
            "--verbose" | "-v" => config.verbose = true,
            "--catalog" => config.catalog_path = Some(option_value(args, &mut i, arg)?),
            "--config" => config.config_path = Some(option_value(args, &mut i, arg)?),
            "--inputs" => config.inputs_path = Some(option_value(args, &mut i, arg)?),
            "--outdir" => config.output.outdir = PathBuf::from(option_value(args, &mut i, arg)?),
            "--inference-disable" => config.inference_disabled = true,
            "--naming" => config.naming = true,
            "--repair" => config.repair = true,
            "--inline" => config.inline = true,
            "--ignore-validation-errors" => config.ignore_validation_errors = true,
            "--adapters" => {
                let list = option_value(args, &mut i, arg)?;
                config.adapters = Some(
                    list.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect(),
                );
            }
            "--graphviz" => config.output.graphviz = true,
            "--graph-label-edges" => config.output.graph.label_edges = true,
            "--graph-label-stepname" => config.output.graph.label_stepname = true,
            "--graph-show-inputs" => config.output.graph.show_inputs = true,
            "--graph-show-outputs" => config.output.graph.show_outputs = true,
            "--graph-dark-theme" => config.output.graph.dark_theme = true,
            "--graph-inline-depth" => {
                let value = option_value(args, &mut i, arg)?;
                config.output.graph.inline_depth = value
                    .parse()
                    .map_err(|_| format!("Invalid inline depth: {}", value))?;
            }
            "--generate-run-script" => config.output.generate_run_script = true,
            "--run-local" => config.output.run_local = true,
            "--cwl-runner" => {
                let value = option_value(args, &mut i, arg)?;
                config.output.runner.runner = CwlRunner::from_name(&value)
                    .ok_or_else(|| format!("Unknown CWL runner: {}", value))?;
            }
            "--parallel" => config.output.runner.parallel = true,
            "--quiet" => config.output.runner.quiet = true,
            "--no-provenance" => config.output.runner.provenance = false,
            "--cachedir" => {
                config.output.runner.cachedir = Some(PathBuf::from(option_value(args, &mut i, arg)?))
            }
            "--container-engine" => {
                config.output.runner.container_engine = option_value(args, &mut i, arg)?
            }
            "--custom-net" => config.output.runner.custom_net = Some(option_value(args, &mut i, arg)?),
            arg if arg.starts_with('-') => {
                return Err(format!("Unknown option: {}", arg));
            }
            _ => {
                if config.workflow_path.is_some() {
                    return Err(format!("Unexpected argument: {}", arg));
                }
                config.workflow_path = Some(arg.clone());
            }
        }
        i += 1;
    }

    if config.output.generate_run_script && config.output.run_local {
        return Err("--generate-run-script and --run-local are mutually exclusive".to_string());
    }
    Ok(config)
}

/// Main application entry point.
fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    // Parse arguments
    let config = parse_arguments(&args).map_err(|e| {
        eprintln!("{} {}", "Error:".red().bold(), e);
        eprintln!();
        print_usage();
        e
    })?;
    let workflow_path = config
        .workflow_path
        .clone()
        .ok_or("No workflow file given. See --help.")?;

    setup_logging(config.verbose);
    print_banner();

    let compiler_config = config.compiler_config()?;
    let registry = load_registry(config.catalog_path.as_deref().unwrap_or(DEFAULT_CATALOG))?;

    info!("Loading workflow: {}", workflow_path);
    let description = load_workflow(&workflow_path)?;
    let name = workflow_name(&workflow_path);

    let compilation = compile(&registry, &compiler_config, &name, &description)?;
    for diagnostic in &compilation.diagnostics {
        eprintln!("{} {}", "warning:".yellow().bold(), diagnostic);
    }

    // Write outputs
    let output = &config.output;
    let cwl_path = output.outdir.join(format!("{}.cwl", name));
    save_text(&cwl_path, &compilation.to_yaml()?)?;
    info!("Wrote {}", cwl_path.display());

    let supplied = match &config.inputs_path {
        Some(path) => load_input_values(path)?,
        None => Default::default(),
    };
    let job = job_inputs(&compilation.graph.inputs, &supplied);
    let job_path = output.outdir.join(format!("{}_inputs.yml", name));
    save_text(&job_path, &job.to_yaml()?)?;
    info!("Wrote {}", job_path.display());
    if !job.missing.is_empty() {
        warn!("Job file is missing required inputs: {}", job.missing.join(", "));
    }

    if output.graphviz {
        let dot_path = output.outdir.join(format!("{}.gv", name));
        save_text(&dot_path, &to_dot(&compilation.graph, &output.graph))?;
        info!("Wrote {}", dot_path.display());
    }

    if output.generate_run_script || output.run_local {
        run_compiled(output, &cwl_path, &job_path)?;
    }

    println!();
    println!(
        "{} {} ({} steps)",
        "Compiled".green().bold(),
        cwl_path.display(),
        compilation.graph.len()
    );
    Ok(())
}

/// Generates `run.sh` or runs the compiled workflow locally.
fn run_compiled(
    output: &OutputOptions,
    cwl_path: &Path,
    job_path: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let command = build_command(cwl_path, job_path, &output.runner);
    if output.generate_run_script {
        generate_run_script(Path::new("."), &command).map_err(|e| e.to_string())?;
    } else {
        if !job_path.exists() {
            return Err(format!("Job file not found: {}", job_path.display()).into());
        }
        run_local(&command, None).map_err(|e| e.to_string())?;
    }
    Ok(())
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!();
            eprintln!("{} {}", "Error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}
