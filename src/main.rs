mod common;
mod ui;
mod video;

use std::io::IsTerminal;
use std::path::PathBuf;

use clap::Parser;

use crate::ui::prelude::{Level, OutputFormat, emit};
use crate::video::VideoCommands;

/// Vidstory main parser
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Activate debug mode
    #[arg(short, long, global = true)]
    debug: bool,

    /// Output format for status messages
    #[arg(long, value_enum, global = true, default_value_t = OutputFormat::Text)]
    output: OutputFormat,

    /// Project directory holding vidstory.json (defaults to the current directory)
    #[arg(short = 'C', long, global = true, value_hint = clap::ValueHint::DirPath)]
    project: Option<PathBuf>,

    #[command(subcommand)]
    command: VideoCommands,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    ui::init(cli.output, std::io::stdout().is_terminal());
    ui::set_debug_mode(cli.debug);
    if cli.debug {
        emit(Level::Debug, "debug.enabled", "Debug mode is on", None);
    }

    let project_dir = cli.project.unwrap_or_else(|| PathBuf::from("."));

    if let Err(e) = video::handle_video_command(cli.command, &project_dir).await {
        emit(Level::Error, "command.failed", &format!("{e:#}"), None);
        std::process::exit(1);
    }
}
