use consilium::cli::commands::{CliArgs, Commands};
use consilium::cli::handlers::{handle_consult, handle_steps, handle_summarize};
use consilium::util::logging;
use consilium::{NAME, VERSION};

use clap::Parser;
use std::process;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

#[tokio::main]
async fn main() {
    let args = CliArgs::parse();
    init_logging_from_args(&args);

    debug!("{} v{} starting", NAME, VERSION);
    debug!("Arguments: {:?}", args);

    let cancel = CancellationToken::new();
    spawn_interrupt_listener(cancel.clone());

    let exit_code = match &args.command {
        Commands::Consult(consult_args) => handle_consult(consult_args, args.quiet, cancel).await,
        Commands::Summarize(summarize_args) => {
            handle_summarize(summarize_args, args.quiet, cancel).await
        }
        Commands::Steps(steps_args) => handle_steps(steps_args),
    };

    process::exit(exit_code);
}

fn init_logging_from_args(args: &CliArgs) {
    let level = if args.log_level.is_some() {
        args.log_level.as_deref()
    } else if args.verbose {
        Some("debug")
    } else if args.quiet {
        Some("error")
    } else {
        None
    };
    logging::init_with_level(level);
}

/// First Ctrl-C cancels the run cooperatively; a second one exits immediately
fn spawn_interrupt_listener(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        warn!("Interrupt received, cancelling run");
        cancel.cancel();

        if tokio::signal::ctrl_c().await.is_ok() {
            process::exit(consilium::cli::handlers::EXIT_CANCELLED);
        }
    });
}
