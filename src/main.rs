mod cli;
mod core;
mod terminal;
mod tui;

use clap::Parser;
use cli::{
    Cli, Commands, handle_chat_command, handle_config_command, handle_errors_command,
    handle_history_command, handle_routine_command, handle_scan_command,
};
use crate::core::models::DataPath;
use std::io;

#[tokio::main]
async fn main() -> io::Result<()> {
    // Quiet by default so log lines do not tear the scanner UI.
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    let data_path = DataPath::new(cli.data_path)?;

    match &cli.command {
        Commands::Scan { image, headless } => {
            handle_scan_command(&data_path, image, *headless).await
        }
        Commands::Chat { message } => handle_chat_command(&data_path, message).await,
        Commands::Routine {
            skin_type,
            concerns,
            include_actives,
        } => handle_routine_command(&data_path, *skin_type, concerns, *include_actives).await,
        Commands::History { kind } => handle_history_command(&data_path, kind).await,
        Commands::Config { command } => handle_config_command(&data_path, command),
        Commands::Errors { command } => handle_errors_command(&data_path, command),
    }
}
