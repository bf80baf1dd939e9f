//! Command-line driver
//!
//! `unveil analyze <input.js>` deobfuscates one file, optionally writing
//! the cleaned source and the JSON analysis export. Warnings are logged
//! and never affect the exit code; fatal errors exit non-zero.

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use unveil_ir::pipeline::config::PipelineConfig;
use unveil_ir::pipeline::job::{run_job, JobInput};
use unveil_ir::pipeline::pass::{CancelToken, WarningKind};
use unveil_ir::shared::models::ExecutionTrace;

#[derive(Parser)]
#[command(name = "unveil", version, about = "JavaScript deobfuscator")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Analyze one file and emit deobfuscated source
    Analyze {
        /// Input JavaScript file
        input: PathBuf,

        /// Where to write the deobfuscated source (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Write the JSON analysis export here
        #[arg(long)]
        export: Option<PathBuf>,

        /// Sandbox execution trace (JSON) for decoder lifting
        #[arg(long)]
        trace: Option<PathBuf>,

        /// Pipeline configuration overrides (JSON)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Keep going past fatal pass errors
        #[arg(long)]
        best_effort: bool,

        /// Emit source-map mappings in the export
        #[arg(long)]
        source_maps: bool,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Analyze {
            input,
            output,
            export,
            trace,
            config,
            best_effort,
            source_maps,
        } => analyze(input, output, export, trace, config, best_effort, source_maps),
    }
}

fn analyze(
    input: PathBuf,
    output: Option<PathBuf>,
    export_path: Option<PathBuf>,
    trace_path: Option<PathBuf>,
    config_path: Option<PathBuf>,
    best_effort: bool,
    source_maps: bool,
) -> ExitCode {
    let source = match fs::read_to_string(&input) {
        Ok(s) => s,
        Err(e) => {
            error!("cannot read {}: {e}", input.display());
            return ExitCode::FAILURE;
        }
    };

    let mut config = match config_path {
        Some(path) => match fs::read_to_string(&path)
            .map_err(|e| e.to_string())
            .and_then(|text| PipelineConfig::from_json(&text).map_err(|e| e.to_string()))
        {
            Ok(c) => c,
            Err(e) => {
                error!("invalid configuration {}: {e}", path.display());
                return ExitCode::FAILURE;
            }
        },
        None => PipelineConfig::default(),
    };
    config.best_effort = best_effort;
    config.source_maps = source_maps;

    let trace = match trace_path {
        Some(path) => match fs::read_to_string(&path)
            .map_err(|e| e.to_string())
            .and_then(|text| {
                serde_json::from_str::<ExecutionTrace>(&text).map_err(|e| e.to_string())
            }) {
            Ok(t) => Some(t),
            Err(e) => {
                error!("invalid trace {}: {e}", path.display());
                return ExitCode::FAILURE;
            }
        },
        None => None,
    };

    let name = input.display().to_string();
    let mut job = JobInput::new(name, source).with_config(config);
    if let Some(trace) = trace {
        job = job.with_trace(trace);
    }

    let cancel = CancelToken::new();
    let result = match run_job(&job, &cancel) {
        Ok(export) => export,
        Err(e) => {
            error!("analysis failed: {e}");
            return ExitCode::FAILURE;
        }
    };

    for warning in &result.metadata.warnings {
        match warning.kind {
            WarningKind::Suggestion => {
                info!(code = %warning.code, "{} (proposed: {})",
                    warning.message,
                    warning.proposed.as_deref().unwrap_or("-"))
            }
            WarningKind::Warning => warn!(code = %warning.code, "{}", warning.message),
        }
    }
    let mut by_code: Vec<(&str, usize)> =
        result.metadata.warnings_by_code().into_iter().collect();
    by_code.sort();
    for (code, count) in by_code {
        info!(code, count, "diagnostics");
    }

    match &output {
        Some(path) => {
            if let Err(e) = fs::write(path, &result.final_source) {
                error!("cannot write {}: {e}", path.display());
                return ExitCode::FAILURE;
            }
            info!(
                "wrote {} ({} bytes, {} passes)",
                path.display(),
                result.final_source.len(),
                result.passes.len()
            );
        }
        None => print!("{}", result.final_source),
    }

    if let Some(path) = export_path {
        let json = match result.to_json() {
            Ok(j) => j,
            Err(e) => {
                error!("export serialization failed: {e}");
                return ExitCode::FAILURE;
            }
        };
        if let Err(e) = fs::write(&path, json) {
            error!("cannot write {}: {e}", path.display());
            return ExitCode::FAILURE;
        }
    }

    ExitCode::SUCCESS
}
