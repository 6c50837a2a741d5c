pub mod commands;
pub mod console;
pub mod handlers;
pub mod output;

pub use commands::{BackendArgs, CliArgs, Commands, ConsultArgs, StepsArgs, SummarizeArgs};
pub use console::{ConsoleHandler, ConsoleMode};
pub use output::{OutputFormat, OutputFormatter};
