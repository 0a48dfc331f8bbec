use crate::core::{
    analysis::{provider_from_config, skincare_focus},
    assistant::{Assistant, AssistantReply},
    backend::{FunctionsClient, HistoryBackend, HistoryKind, RoutineRequest},
    camera::{CameraSource, SimulatedCamera, StillImageCamera},
    config::{AppConfig, CONFIG_KEYS, ConfigService},
    errors::ErrorLogReader,
    models::{DataPath, ScanResults, SkinConcern, SkinType},
    products::ProductExtractor,
    session::ScanSession,
};
use crate::terminal::{StdTerminal, Terminal};
use clap::{Parser, Subcommand};
use log::{error, info, warn};
use std::io;
use std::ops::ControlFlow;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "skinscan")]
#[command(about = "Skin scanning and skincare assistant in your terminal.", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Sets a custom data path
    #[arg(long, value_name = "DIR")]
    pub data_path: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Scan your skin with the camera or an uploaded photo
    Scan {
        /// Use a photo instead of the simulated camera
        #[arg(long, value_name = "PATH")]
        image: Option<PathBuf>,
        /// Run without the terminal UI and print results
        #[arg(long)]
        headless: bool,
    },
    /// Ask the skincare assistant a question
    Chat {
        /// The question (optional - if not provided, starts an interactive prompt)
        message: Option<String>,
    },
    /// Generate a skincare routine
    Routine {
        /// normal, dry, oily, combination or sensitive
        #[arg(long)]
        skin_type: SkinType,
        /// Skin concern, repeatable (acne, aging, dryness, redness, hyperpigmentation, sensitivity)
        #[arg(long = "concern", value_name = "CONCERN")]
        concerns: Vec<SkinConcern>,
        /// Include active ingredients such as retinoids and acids
        #[arg(long)]
        include_actives: bool,
    },
    /// Show saved chats or scans
    History {
        #[command(subcommand)]
        kind: HistoryCommands,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
    /// Inspect the backend error log
    Errors {
        #[command(subcommand)]
        command: ErrorsCommands,
    },
}

#[derive(Subcommand)]
pub enum HistoryCommands {
    /// Saved assistant conversations
    Chat,
    /// Saved scan results
    Scan,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Get a configuration value
    Get {
        /// The key to get
        key: String,
    },
    /// Set a configuration value
    Set {
        /// The key to set
        key: String,
        /// The value to set
        value: String,
    },
}

#[derive(Subcommand)]
pub enum ErrorsCommands {
    /// List recent errors, newest first
    List {
        /// Maximum number of entries
        #[arg(long, default_value_t = 20)]
        limit: usize,
        /// Only show errors from this service
        #[arg(long)]
        service: Option<String>,
    },
    /// Error counts per service
    Stats,
    /// Delete the error log
    Clear,
}

/// History client for the signed-in user, if there is one.
fn history_client(config: &AppConfig, data_path: &DataPath) -> Option<Arc<FunctionsClient>> {
    if !config.backend.has_user_session() {
        info!("No access_token configured, history saves are disabled");
        return None;
    }
    match FunctionsClient::new(&config.backend, Some(data_path.error_log_path())) {
        Ok(client) => Some(Arc::new(client)),
        Err(e) => {
            warn!("History disabled: {e}");
            None
        }
    }
}

fn functions_client(config: &AppConfig, data_path: &DataPath) -> io::Result<Arc<FunctionsClient>> {
    FunctionsClient::new(&config.backend, Some(data_path.error_log_path()))
        .map(Arc::new)
        .inspect_err(|_| {
            println!("❌ The skincare assistant is not configured.");
            println!("\nTo get started:");
            println!("• skinscan config set functions_url https://<project>.supabase.co");
            println!("• skinscan config set anon_key <key>");
            println!("• Optionally: skinscan config set access_token <token> to save history");
        })
}

fn build_assistant(config: &AppConfig, data_path: &DataPath) -> io::Result<Assistant> {
    let client = functions_client(config, data_path)?;
    let extractor = ProductExtractor::from_config(&config.extraction);
    let assistant = Assistant::new(client.clone(), extractor);
    Ok(if client.is_enabled() {
        assistant.with_history(client)
    } else {
        assistant
    })
}

fn print_results(results: &ScanResults) {
    println!("Analysis Results");
    println!("{}", "=".repeat(20));
    println!("Skin Type:      {}", results.skin_type);
    println!("Skin Issues:    {}", results.skin_issues);
    println!("Sun Damage:     {}", results.sun_damage);
    println!("Unique Feature: {}", results.unique_feature);
    println!("Skin Tone:      {}", results.skin_tone);
    println!();
    println!("Skincare Focus: {}", skincare_focus(results.skin_type));
}

fn write_reply<T: Terminal>(terminal: &mut T, reply: &AssistantReply) -> io::Result<()> {
    terminal.write_line(&reply.text)?;
    if !reply.products.is_empty() {
        terminal.write_line("")?;
        terminal.write_line(&format!("Products ({}):", reply.products.len()))?;
        for product in &reply.products {
            match &product.link {
                Some(link) => terminal.write_line(&format!("• {} - {link}", product.name))?,
                None => terminal.write_line(&format!("• {}", product.name))?,
            }
        }
    }
    if reply.saved {
        terminal.write_line("✅ Saved to your history")?;
    }
    terminal.flush()
}

pub async fn handle_scan_command(
    data_path: &DataPath,
    image: &Option<PathBuf>,
    headless: bool,
) -> io::Result<()> {
    let config = ConfigService::load_config(data_path)?;

    let camera: Box<dyn CameraSource> = match image {
        Some(path) => match StillImageCamera::open(path, config.scan.max_upload_bytes) {
            Ok(camera) => Box::new(camera),
            Err(e) => {
                println!("❌ {e}");
                return Err(e);
            }
        },
        None => Box::new(SimulatedCamera::default()),
    };

    let provider = provider_from_config(
        &config.scan,
        Duration::from_secs(config.backend.timeout_secs),
        Some(data_path.error_log_path()),
    )?;
    let frame_interval = Duration::from_millis(config.scan.frame_interval_ms.max(1));
    let mut session = ScanSession::new(provider).with_frame_interval(frame_interval);
    if let Some(history) = history_client(&config, data_path) {
        session = session.with_history(history);
    }

    if headless {
        return run_headless_scan(&mut session, camera.as_ref()).await;
    }

    use crate::tui::Scanner;
    let mut scanner = Scanner::new(session, camera, frame_interval);
    match scanner.run().await? {
        Some(results) => print_results(&results),
        None => println!("No scan completed."),
    }
    Ok(())
}

async fn run_headless_scan(session: &mut ScanSession, camera: &dyn CameraSource) -> io::Result<()> {
    if let Err(e) = session.start_camera(camera).await {
        println!("❌ Could not access camera: {e}");
        return Err(e);
    }
    if let Some(resolution) = session.camera_resolution() {
        println!(
            "Camera: {} ({}x{})",
            camera.name(),
            resolution.width,
            resolution.height
        );
    }
    println!(
        "Scanning, this takes about {:.1}s",
        session.stages().total_duration().as_secs_f64()
    );

    let mut last_stage: Option<usize> = None;
    let outcome = session
        .capture_and_analyze(|state| {
            if last_stage != Some(state.stage_index) {
                last_stage = Some(state.stage_index);
                println!(
                    "[{:>3.0}%] {}",
                    state.percent_complete, state.current_stage
                );
            }
            ControlFlow::Continue(())
        })
        .await;

    let result = match outcome {
        Ok(results) => {
            println!("[100%] Scan complete\n");
            print_results(&results);
            Ok(())
        }
        Err(e) => {
            error!("Scan failed: {e}");
            println!("❌ Scan failed: {e}");
            Err(e)
        }
    };
    session.stop_camera();
    result
}

pub async fn handle_chat_command(data_path: &DataPath, message: &Option<String>) -> io::Result<()> {
    let config = ConfigService::load_config(data_path)?;
    let mut assistant = build_assistant(&config, data_path)?;
    let mut terminal = StdTerminal;

    match message {
        Some(message) => match assistant.chat(message).await {
            Ok(reply) => write_reply(&mut terminal, &reply),
            Err(e) => {
                println!("❌ Failed to get response. Please try again. ({e})");
                Err(e)
            }
        },
        None => run_chat_loop(&mut terminal, &mut assistant).await,
    }
}

/// Interactive prompt: one question per line until an empty line or EOF.
pub async fn run_chat_loop<T: Terminal>(
    terminal: &mut T,
    assistant: &mut Assistant,
) -> io::Result<()> {
    terminal.write_line("Ask about your skin. '/last' repeats the previous answer.")?;
    terminal.write_line("Empty line, 'exit' or Ctrl-D to quit.")?;
    loop {
        let Some(line) = terminal.prompt("you> ")? else {
            break;
        };
        if line.is_empty() || line == "exit" || line == "quit" {
            break;
        }
        if line == "/last" {
            match assistant.last_chat() {
                Some(reply) => write_reply(terminal, reply)?,
                None => terminal.write_line("No answer yet.")?,
            }
            continue;
        }

        match assistant.chat(&line).await {
            Ok(reply) => write_reply(terminal, &reply)?,
            Err(e) => {
                terminal.write_line(&format!("❌ Failed to get response. Please try again. ({e})"))?
            }
        }
    }
    Ok(())
}

pub async fn handle_routine_command(
    data_path: &DataPath,
    skin_type: SkinType,
    concerns: &[SkinConcern],
    include_actives: bool,
) -> io::Result<()> {
    let config = ConfigService::load_config(data_path)?;
    let mut assistant = build_assistant(&config, data_path)?;

    let request = RoutineRequest {
        skin_type,
        concerns: concerns.to_vec(),
        include_actives,
    };
    println!("Generating routine for {skin_type} skin...\n");
    match assistant.routine(&request).await {
        Ok(reply) => write_reply(&mut StdTerminal, &reply),
        Err(e) => {
            println!("❌ Failed to generate routine. Please try again. ({e})");
            Err(e)
        }
    }
}

pub async fn handle_history_command(data_path: &DataPath, kind: &HistoryCommands) -> io::Result<()> {
    let config = ConfigService::load_config(data_path)?;
    let client = functions_client(&config, data_path)?;
    if !client.is_enabled() {
        println!("History needs a signed-in user.");
        println!("Use 'skinscan config set access_token <token>' first.");
        return Ok(());
    }

    let kind = match kind {
        HistoryCommands::Chat => HistoryKind::Chat,
        HistoryCommands::Scan => HistoryKind::Scan,
    };
    let entries = client.get_history(kind).await?;
    if entries.is_empty() {
        println!("No saved history.");
        return Ok(());
    }

    println!("History ({}):", entries.len());
    println!("{}", "=".repeat(20));
    for entry in &entries {
        let rendered = serde_json::to_string_pretty(entry).map_err(io::Error::other)?;
        println!("{rendered}");
    }
    Ok(())
}

pub fn handle_config_command(
    data_path: &DataPath,
    command: &Option<ConfigCommands>,
) -> io::Result<()> {
    match command {
        Some(ConfigCommands::Get { key }) => {
            let config = ConfigService::load_config(data_path)?;
            let value = ConfigService::get_value(&config, key)?;
            println!("{key}: {value}");
            println!("Config file: {}", data_path.config_path().display());
        }
        Some(ConfigCommands::Set { key, value }) => {
            let mut config = ConfigService::load_config(data_path)?;
            if let Err(e) = ConfigService::set_value(&mut config, key, value) {
                error!("Invalid configuration value for {key}: {e}");
                return Err(e);
            }
            ConfigService::save_config(&config, data_path)?;
            info!("Updated {key} configuration");
            println!("{key} set to: {}", ConfigService::get_value(&config, key)?);
            println!("Config file: {}", data_path.config_path().display());
        }
        None => {
            let config = ConfigService::load_config(data_path)?;
            println!("Current Configuration:");
            println!("======================");
            for key in CONFIG_KEYS {
                println!("{key}: {}", ConfigService::get_value(&config, key)?);
            }
            println!();
            println!("Config file: {}", data_path.config_path().display());
        }
    }
    Ok(())
}

pub fn handle_errors_command(data_path: &DataPath, command: &ErrorsCommands) -> io::Result<()> {
    let reader = ErrorLogReader::new(data_path.error_log_path());

    match command {
        ErrorsCommands::List { limit, service } => {
            let errors = reader.read_recent_errors(*limit, service.as_deref())?;
            if errors.is_empty() {
                println!("No errors recorded.");
                return Ok(());
            }
            for e in &errors {
                println!(
                    "{} [{}] {} {}: {}",
                    e.timestamp, e.service, e.operation, e.error_type, e.error_message
                );
                if let Some(url) = &e.request_url {
                    match e.status_code {
                        Some(status) => println!("    {url} (HTTP {status})"),
                        None => println!("    {url}"),
                    }
                }
            }
        }
        ErrorsCommands::Stats => {
            let stats = reader.get_error_stats()?;
            if stats.is_empty() {
                println!("No errors recorded.");
                return Ok(());
            }
            let mut services: Vec<_> = stats.iter().collect();
            services.sort_by(|a, b| a.0.cmp(b.0));
            for (service, stat) in services {
                println!("{service}: {} error(s)", stat.total_errors);
                let mut types: Vec<_> = stat.error_types.iter().collect();
                types.sort_by(|a, b| b.1.cmp(a.1).then(a.0.cmp(b.0)));
                for (error_type, count) in types {
                    println!("    {error_type}: {count}");
                }
                if let Some(last) = &stat.last_error_time {
                    println!("    last: {last}");
                }
            }
        }
        ErrorsCommands::Clear => {
            if reader.clear()? {
                println!("Error log cleared.");
            } else {
                println!("No error log to clear.");
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::backend::AiBackend;
    use crate::terminal::MockTerminal;
    use async_trait::async_trait;

    struct EchoAi;

    #[async_trait]
    impl AiBackend for EchoAi {
        async fn chat(&self, message: &str) -> io::Result<String> {
            if message == "fail" {
                return Err(io::Error::other("Connection error: refused"));
            }
            Ok(format!(
                "**Gentle Foaming Cleanser** for '{message}' https://www.amazon.com/dp/B0TEST"
            ))
        }

        async fn generate_routine(&self, _request: &RoutineRequest) -> io::Result<String> {
            Ok(String::new())
        }
    }

    #[tokio::test]
    async fn test_chat_loop_prints_replies_until_exit() {
        let mut assistant = Assistant::new(Arc::new(EchoAi), ProductExtractor::default());
        let mut terminal = MockTerminal::new(vec!["oily skin", "fail", "exit", "never read"]);

        run_chat_loop(&mut terminal, &mut assistant).await.unwrap();

        let output = terminal.output();
        assert!(output.contains("Gentle Foaming Cleanser for 'oily skin'"));
        assert!(output.contains("• Gentle Foaming Cleanser for 'oily skin' - https://www.amazon.com/dp/B0TEST"));
        assert!(output.contains("Failed to get response"));
        assert!(!output.contains("never read"));
        assert_eq!(terminal.inputs.len(), 4);
    }

    #[tokio::test]
    async fn test_chat_loop_repeats_last_answer_after_failure() {
        let mut assistant = Assistant::new(Arc::new(EchoAi), ProductExtractor::default());
        let mut terminal = MockTerminal::new(vec!["/last", "dry skin", "fail", "/last", ""]);

        run_chat_loop(&mut terminal, &mut assistant).await.unwrap();

        let output = terminal.output();
        assert!(output.contains("No answer yet."));
        assert!(output.contains("Failed to get response"));
        assert_eq!(
            output
                .matches("• Gentle Foaming Cleanser for 'dry skin' - https://www.amazon.com/dp/B0TEST")
                .count(),
            2
        );
    }

    #[tokio::test]
    async fn test_chat_loop_stops_at_end_of_input() {
        let mut assistant = Assistant::new(Arc::new(EchoAi), ProductExtractor::default());
        let mut terminal = MockTerminal::new(vec![]);
        run_chat_loop(&mut terminal, &mut assistant).await.unwrap();
        assert!(assistant.last_chat().is_none());
    }
}
