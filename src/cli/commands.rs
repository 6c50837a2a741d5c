use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Multi-expert case consultation driven by LLM workflows
#[derive(Parser, Debug)]
#[command(
    name = "consilium",
    about = "Multi-expert case consultation driven by LLM workflows",
    version,
    author,
    long_about = "consilium runs a triage step over a case report, dispatches the expert steps \
                  the triage asks for, and synthesizes their analyses into one final report. \
                  It supports multiple AI backends (Ollama, OpenAI, Claude, Gemini, Grok, Groq) \
                  and an NDJSON streaming HTTP endpoint."
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, global = true, value_name = "LEVEL", help = "Set logging level")]
    pub log_level: Option<String>,

    #[arg(short = 'v', long, global = true, help = "Enable debug logging")]
    pub verbose: bool,

    #[arg(
        short = 'q',
        long,
        global = true,
        conflicts_with = "verbose",
        help = "Quiet mode - suppress non-error output"
    )]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(
        about = "Run a consultation over a case report",
        long_about = "Runs triage, every required expert step and the final synthesis.\n\n\
                      Examples:\n  \
                      consilium consult report.txt\n  \
                      consilium consult report.txt --image scan.png --stream\n  \
                      cat report.txt | consilium consult --format json --save-run run.json\n  \
                      consilium consult report.txt --provider claude --model claude-3-5-sonnet-latest"
    )]
    Consult(ConsultArgs),

    #[command(
        about = "Regenerate the final report of a saved run",
        long_about = "Reloads a run saved with --save-run and re-invokes only the synthesis step.\n\n\
                      Examples:\n  \
                      consilium summarize run.json\n  \
                      consilium summarize run.json --format json --output summary.json"
    )]
    Summarize(SummarizeArgs),

    #[command(
        about = "Validate and list the step universe",
        long_about = "Loads the built-in step universe, or the one given with --steps, \
                      validates it and lists its steps in dispatch order.\n\n\
                      Examples:\n  \
                      consilium steps\n  \
                      consilium steps --steps custom.yaml --format yaml"
    )]
    Steps(StepsArgs),
}

/// Backend selection shared by commands that generate text
#[derive(Parser, Debug, Clone, Default)]
pub struct BackendArgs {
    #[arg(
        short = 'p',
        long,
        value_name = "PROVIDER",
        help = "Backend provider: ollama, openai, claude, gemini, grok, groq, http"
    )]
    pub provider: Option<String>,

    #[arg(short = 'm', long, value_name = "MODEL", help = "Model name to use")]
    pub model: Option<String>,

    #[arg(long, value_name = "SECONDS", help = "Request timeout in seconds")]
    pub timeout: Option<u64>,

    #[arg(
        long,
        value_name = "FILE",
        help = "Step universe YAML (defaults to the built-in universe)"
    )]
    pub steps: Option<PathBuf>,
}

#[derive(Parser, Debug, Clone)]
pub struct ConsultArgs {
    #[arg(
        value_name = "REPORT",
        help = "Case report file (reads stdin when omitted or '-')"
    )]
    pub report: Option<PathBuf>,

    #[arg(long = "image", value_name = "PATH", help = "Attach an image (repeatable)")]
    pub images: Vec<PathBuf>,

    #[arg(
        short = 'f',
        long,
        value_enum,
        default_value = "human",
        help = "Output format"
    )]
    pub format: OutputFormatArg,

    #[arg(
        short = 'o',
        long,
        value_name = "FILE",
        help = "Write output to file instead of stdout"
    )]
    pub output: Option<PathBuf>,

    #[arg(long, value_name = "FILE", help = "Save the run record as JSON")]
    pub save_run: Option<PathBuf>,

    #[arg(long, help = "Print step output to stderr as it streams")]
    pub stream: bool,

    #[arg(long, help = "Synthesize whatever finished when cancelled with Ctrl-C")]
    pub aggregate_on_cancel: bool,

    #[command(flatten)]
    pub backend: BackendArgs,
}

#[derive(Parser, Debug, Clone)]
pub struct SummarizeArgs {
    #[arg(value_name = "RUN_FILE", help = "Run record saved with --save-run")]
    pub run_file: PathBuf,

    #[arg(
        short = 'f',
        long,
        value_enum,
        default_value = "human",
        help = "Output format"
    )]
    pub format: OutputFormatArg,

    #[arg(
        short = 'o',
        long,
        value_name = "FILE",
        help = "Write output to file instead of stdout"
    )]
    pub output: Option<PathBuf>,

    #[command(flatten)]
    pub backend: BackendArgs,
}

#[derive(Parser, Debug, Clone)]
pub struct StepsArgs {
    #[arg(long, value_name = "FILE", help = "Step universe YAML to validate")]
    pub steps: Option<PathBuf>,

    #[arg(
        short = 'f',
        long,
        value_enum,
        default_value = "human",
        help = "Output format"
    )]
    pub format: OutputFormatArg,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormatArg {
    Json,
    Yaml,
    Human,
}

impl From<OutputFormatArg> for super::output::OutputFormat {
    fn from(arg: OutputFormatArg) -> Self {
        match arg {
            OutputFormatArg::Json => super::output::OutputFormat::Json,
            OutputFormatArg::Yaml => super::output::OutputFormat::Yaml,
            OutputFormatArg::Human => super::output::OutputFormat::Human,
        }
    }
}
