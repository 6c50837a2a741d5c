//! Command handlers. Each returns the process exit code.

use super::commands::{BackendArgs, ConsultArgs, StepsArgs, SummarizeArgs};
use super::console::{ConsoleHandler, ConsoleMode};
use super::output::{parse_run_record, OutputFormat, OutputFormatter};
use crate::config::{ConfigError, ConsiliumConfig, Provider};
use crate::llm::{select_llm_client, Attachment};
use crate::progress::{LoggingHandler, ProgressHandler};
use crate::workflow::{Case, EngineConfig, StepRegistry, WorkflowEngine, WorkflowState};
use anyhow::{bail, Context, Result};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FAILURE: i32 = 1;
pub const EXIT_CANCELLED: i32 = 130;

/// Environment configuration with command-line overrides applied
pub fn build_config(
    backend: &BackendArgs,
    aggregate_on_cancel: bool,
) -> Result<ConsiliumConfig, ConfigError> {
    let defaults = ConsiliumConfig::default();

    let provider = match backend.provider.as_deref() {
        Some(name) => Provider::parse(name)?,
        None => defaults.provider,
    };
    let model = match (&backend.model, backend.provider.is_some()) {
        (Some(model), _) => model.clone(),
        (None, true) if provider != defaults.provider => provider.default_model().to_string(),
        (None, _) => defaults.model.clone(),
    };

    let config = ConsiliumConfig {
        provider,
        model,
        request_timeout_secs: backend.timeout.unwrap_or(defaults.request_timeout_secs),
        steps_file: backend.steps.clone().or(defaults.steps_file.clone()),
        aggregate_on_cancel: aggregate_on_cancel || defaults.aggregate_on_cancel,
        ..defaults
    };
    config.validate()?;
    Ok(config)
}

/// Reads the case report from a file, or from stdin for `None` and `-`
pub fn read_report(path: Option<&Path>) -> Result<String> {
    let report = match path {
        Some(p) if p != Path::new("-") => fs::read_to_string(p)
            .with_context(|| format!("Failed to read report: {}", p.display()))?,
        _ => {
            let mut buffer = String::new();
            std::io::stdin()
                .read_to_string(&mut buffer)
                .context("Failed to read report from stdin")?;
            buffer
        }
    };

    if report.trim().is_empty() {
        bail!("Case report is empty");
    }
    Ok(report)
}

pub fn load_attachments(paths: &[PathBuf]) -> Result<Vec<Attachment>> {
    paths
        .iter()
        .map(|path| {
            let attachment = Attachment::from_path(path)
                .with_context(|| format!("Failed to read image: {}", path.display()))?;
            if !attachment.is_image() {
                warn!(
                    file = %attachment.name,
                    mime = %attachment.mime_type,
                    "Attachment does not look like an image"
                );
            }
            Ok(attachment)
        })
        .collect()
}

fn write_output(output: &str, path: Option<&Path>, quiet: bool) -> Result<()> {
    match path {
        Some(file) => {
            fs::write(file, output)
                .with_context(|| format!("Failed to write output to {}", file.display()))?;
            info!("Output written to: {}", file.display());
            if !quiet {
                eprintln!("Output written to: {}", file.display());
            }
        }
        None => println!("{}", output),
    }
    Ok(())
}

fn progress_handler(stream: bool, quiet: bool) -> Arc<dyn ProgressHandler> {
    let interactive = atty::is(atty::Stream::Stderr);
    match ConsoleMode::select(stream, quiet, interactive) {
        ConsoleMode::Silent if !quiet => Arc::new(LoggingHandler),
        mode => Arc::new(ConsoleHandler::new(mode)),
    }
}

fn print_backend_hints(provider: Provider) {
    eprintln!("\nPossible solutions:");
    match provider {
        Provider::Http => {
            eprintln!("  - Set CONSILIUM_API_URL to the streaming endpoint");
            eprintln!("  - Set CONSILIUM_API_TOKEN if the endpoint requires a bearer token");
        }
        Provider::GenAI(kind) => match kind.default_key_env_name() {
            Some(key) => eprintln!("  - Set {} environment variable", key),
            None => {
                eprintln!("  - Ensure Ollama is running: ollama serve");
                eprintln!("  - Check OLLAMA_HOST environment variable (default: http://localhost:11434)");
            }
        },
    }
    eprintln!("  - Try a different provider: --provider openai, --provider claude, etc.");
}

pub async fn handle_consult(args: &ConsultArgs, quiet: bool, cancel: CancellationToken) -> i32 {
    info!("Starting consultation");

    let config = match build_config(&args.backend, args.aggregate_on_cancel) {
        Ok(c) => c,
        Err(e) => {
            error!("Configuration error: {}", e);
            eprintln!("\nPlease check your environment variables and command-line arguments.");
            return EXIT_FAILURE;
        }
    };
    debug!("{}", config);

    let registry = match config.load_registry() {
        Ok(r) => Arc::new(r),
        Err(e) => {
            error!("{}", e);
            return EXIT_FAILURE;
        }
    };

    let case = match read_report(args.report.as_deref())
        .and_then(|report| Ok(Case::with_attachments(report, load_attachments(&args.images)?)))
    {
        Ok(c) => c,
        Err(e) => {
            error!("{:#}", e);
            return EXIT_FAILURE;
        }
    };

    let selected = match select_llm_client(&config).await {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to initialize backend: {}", e);
            print_backend_hints(config.provider);
            return EXIT_FAILURE;
        }
    };
    info!("Using backend: {}", selected.description);

    let engine = match WorkflowEngine::new(selected.client, registry.clone()) {
        Ok(engine) => engine
            .with_progress_handler(progress_handler(args.stream, quiet))
            .with_config(EngineConfig::new().with_aggregate_on_cancel(config.aggregate_on_cancel)),
        Err(e) => {
            error!("Failed to build workflow engine: {}", e);
            return EXIT_FAILURE;
        }
    };

    let state = match engine.run(case, &cancel).await {
        Ok(state) => state,
        Err(e) => {
            error!("Workflow failed: {}", e);
            return EXIT_FAILURE;
        }
    };

    if let Err(e) = finish_consult(args, quiet, &state, &registry) {
        error!("{:#}", e);
        return EXIT_FAILURE;
    }

    if state.is_cancelled() {
        EXIT_CANCELLED
    } else {
        EXIT_SUCCESS
    }
}

fn finish_consult(
    args: &ConsultArgs,
    quiet: bool,
    state: &WorkflowState,
    registry: &StepRegistry,
) -> Result<()> {
    if let Some(run_file) = &args.save_run {
        let json = serde_json::to_string_pretty(&state.to_record())
            .context("Failed to serialize run record")?;
        fs::write(run_file, json)
            .with_context(|| format!("Failed to save run to {}", run_file.display()))?;
        info!("Run saved to: {}", run_file.display());
    }

    let formatter = OutputFormatter::new(OutputFormat::from(args.format));
    let output = formatter.format_run(state, registry)?;
    write_output(&output, args.output.as_deref(), quiet)
}

pub async fn handle_summarize(args: &SummarizeArgs, quiet: bool, cancel: CancellationToken) -> i32 {
    info!("Regenerating summary from {}", args.run_file.display());

    let config = match build_config(&args.backend, false) {
        Ok(c) => c,
        Err(e) => {
            error!("Configuration error: {}", e);
            return EXIT_FAILURE;
        }
    };

    let registry = match config.load_registry() {
        Ok(r) => Arc::new(r),
        Err(e) => {
            error!("{}", e);
            return EXIT_FAILURE;
        }
    };

    let mut state = match load_run(&args.run_file, &registry) {
        Ok(s) => s,
        Err(e) => {
            error!("{:#}", e);
            return EXIT_FAILURE;
        }
    };

    let selected = match select_llm_client(&config).await {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to initialize backend: {}", e);
            print_backend_hints(config.provider);
            return EXIT_FAILURE;
        }
    };

    let engine = match WorkflowEngine::new(selected.client, registry.clone()) {
        Ok(engine) => engine.with_progress_handler(progress_handler(false, quiet)),
        Err(e) => {
            error!("Failed to build workflow engine: {}", e);
            return EXIT_FAILURE;
        }
    };

    let Some(report) = engine.regenerate_summary(&mut state, &cancel).await else {
        warn!("Summary regeneration cancelled");
        return EXIT_CANCELLED;
    };

    let formatter = OutputFormatter::new(OutputFormat::from(args.format));
    match formatter
        .format_summary(&registry, Some(&report))
        .and_then(|output| write_output(&output, args.output.as_deref(), quiet))
    {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            EXIT_FAILURE
        }
    }
}

/// Loads a saved run; step ids unknown to `registry` are rejected
pub fn load_run(path: &Path, registry: &StepRegistry) -> Result<WorkflowState> {
    let json = fs::read_to_string(path)
        .with_context(|| format!("Failed to read run file: {}", path.display()))?;
    let record = parse_run_record(&json)?;
    let state = WorkflowState::from_record(record, registry)
        .with_context(|| format!("Run file {} does not match the step universe", path.display()))?;
    Ok(state)
}

pub fn handle_steps(args: &StepsArgs) -> i32 {
    let registry = match &args.steps {
        Some(path) => StepRegistry::from_file(path),
        None => StepRegistry::builtin(),
    };
    let registry = match registry {
        Ok(r) => r,
        Err(e) => {
            error!("Invalid step universe: {}", e);
            return EXIT_FAILURE;
        }
    };

    match OutputFormatter::new(OutputFormat::from(args.format)).format_steps(&registry) {
        Ok(output) => {
            println!("{}", output);
            EXIT_SUCCESS
        }
        Err(e) => {
            error!("{:#}", e);
            EXIT_FAILURE
        }
    }
}
