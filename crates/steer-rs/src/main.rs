//! Run the steering pipeline from the command line.
//!
//! Reads the API key from `STEER_API_KEY` (or `OPENAI_API_KEY`) unless the
//! config file sets one. `--offline` uses the rule classifier and template
//! rendering and never touches the network.
//!
//! # Examples
//!
//! ```sh
//! # One turn over a saved transcript, printed as JSON
//! steer turn --transcript chat.json
//!
//! # Interactive session with the directive shown after each reply
//! steer --offline chat --show-directive
//!
//! # Summarize a finished module
//! steer summary --transcript chat.json --label Lighting
//!
//! # Print the state, strategy, and frame tables
//! steer catalog
//! ```

use clap::{Parser, Subcommand};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process;
use steer_rs::api::{Backend, BackendError, BackendErrorKind, FnBackend};
use steer_rs::catalog::{Frame, State, StrategyName};
use steer_rs::config::{RenderMode, SteerConfig};
use steer_rs::events::LoggingHandler;
use steer_rs::inference::RuleClassifier;
use steer_rs::pipeline::{Pipeline, TurnOutcome};
use steer_rs::transcript::Transcript;
use steer_rs::ChatClient;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "steer", version)]
struct Cli {
    /// JSON config file; missing keys take their defaults
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Hidden target to steer toward
    #[arg(long, global = true)]
    target: Option<String>,

    /// Open goal shared with the user
    #[arg(long, global = true)]
    goal: Option<String>,

    /// Rule classifier and template rendering, no network
    #[arg(long, global = true)]
    offline: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one turn over a transcript file and print directive and utterance
    Turn {
        /// JSON array of {"role", "text"} messages
        #[arg(long)]
        transcript: PathBuf,

        /// Turn index; defaults to the number of user messages minus one
        #[arg(long)]
        turn: Option<u32>,
    },
    /// Interactive session on stdin. `/summary` summarizes, `/quit` exits
    Chat {
        /// Print each turn's directive to stderr
        #[arg(long)]
        show_directive: bool,

        /// Module label used by `/summary`
        #[arg(long, default_value = "Scene")]
        label: String,
    },
    /// Summarize a transcript file into a finalized description
    Summary {
        #[arg(long)]
        transcript: PathBuf,

        #[arg(long, default_value = "Scene")]
        label: String,
    },
    /// Print the state, strategy, and frame tables
    Catalog,
}

// ── Helpers ────────────────────────────────────────────────────────

fn load_config(cli: &Cli) -> Result<SteerConfig, String> {
    let mut config = match &cli.config {
        Some(path) => SteerConfig::from_json_file(path).map_err(|e| e.to_string())?,
        None => SteerConfig::default(),
    };
    if let Some(target) = &cli.target {
        config = config.with_hidden_target(target);
    }
    if let Some(goal) = &cli.goal {
        config = config.with_open_goal(goal);
    }
    if cli.offline {
        config = config.with_render_mode(RenderMode::TemplateOnly);
    }
    Ok(config)
}

fn load_transcript(path: &Path) -> Result<Transcript, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read transcript '{}': {e}", path.display()))?;
    serde_json::from_str(&content)
        .map_err(|e| format!("failed to parse transcript '{}': {e}", path.display()))
}

fn build_backend(config: &SteerConfig, offline: bool) -> Result<Box<dyn Backend>, String> {
    if offline {
        let backend = FnBackend::failing(BackendError::new(
            BackendErrorKind::Network,
            "offline mode has no model backend",
        ))
        .with_label("offline");
        return Ok(Box::new(backend));
    }
    let client = ChatClient::from_config(config).map_err(|e| e.to_string())?;
    Ok(Box::new(client))
}

fn default_turn_index(transcript: &Transcript) -> u32 {
    transcript.user_turns().saturating_sub(1)
}

fn outcome_json(outcome: &TurnOutcome) -> serde_json::Value {
    serde_json::json!({
        "directive": outcome.directive,
        "utterance": outcome.utterance,
        "fallback": outcome.is_fallback(),
    })
}

fn summary_error(err: &BackendError) -> String {
    format!("{} ({err})", err.user_message())
}

fn print_catalog() {
    println!("States:");
    for s in State::ALL {
        println!("  {:<4} {}", s.as_str(), s.description());
    }
    println!("\nStrategies:");
    for s in StrategyName::ALL {
        println!("  {:<28} {}", s.as_str(), s.description());
    }
    println!("\nFrames:");
    for f in Frame::ALL {
        println!("  {:<16} {}", f.as_str(), f.term());
    }
}

// ── Commands ───────────────────────────────────────────────────────

async fn chat_loop(
    pipeline: &Pipeline<'_>,
    show_directive: bool,
    label: &str,
) -> Result<(), String> {
    let config = pipeline.config();
    let mut transcript = Transcript::new();
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    eprintln!("  Type a message. /summary to summarize, /quit to exit.");
    loop {
        print!("> ");
        stdout.flush().map_err(|e| format!("failed to write prompt: {e}"))?;

        let mut line = String::new();
        let read = stdin
            .lock()
            .read_line(&mut line)
            .map_err(|e| format!("failed to read stdin: {e}"))?;
        if read == 0 {
            return Ok(());
        }
        let line = line.trim();
        match line {
            "" => continue,
            "/quit" => return Ok(()),
            "/summary" => {
                match pipeline.run_summary(transcript.messages(), label).await {
                    Ok(text) => println!("{text}"),
                    Err(e) => eprintln!("Error: {}", summary_error(&e)),
                }
                continue;
            }
            _ => {}
        }

        transcript.push_user(line);
        let turn = default_turn_index(&transcript);
        let outcome = pipeline
            .run_turn(
                transcript.messages(),
                &config.hidden_target,
                &config.open_goal,
                turn,
            )
            .await;
        if show_directive {
            eprintln!(
                "  [{}] {}",
                outcome.directive.state,
                outcome.directive.to_wire()
            );
        }
        println!("{}", outcome.utterance.text);
        transcript.push_assistant(outcome.utterance.text);
    }
}

async fn run(cli: &Cli) -> Result<(), String> {
    if let Command::Catalog = cli.command {
        print_catalog();
        return Ok(());
    }

    let config = load_config(cli)?;
    let backend = build_backend(&config, cli.offline)?;
    let rules = RuleClassifier::new(config.early_turn_threshold);
    let handler = LoggingHandler;

    let mut pipeline = Pipeline::new(backend.as_ref(), config.clone()).with_event_handler(&handler);
    if cli.offline {
        pipeline = pipeline.with_classifier(&rules);
    }

    match &cli.command {
        Command::Turn { transcript, turn } => {
            let transcript = load_transcript(transcript)?;
            let turn = turn.unwrap_or_else(|| default_turn_index(&transcript));
            let outcome = pipeline
                .run_turn(
                    transcript.messages(),
                    &config.hidden_target,
                    &config.open_goal,
                    turn,
                )
                .await;
            let json = serde_json::to_string_pretty(&outcome_json(&outcome))
                .map_err(|e| format!("failed to serialize outcome: {e}"))?;
            println!("{json}");
            Ok(())
        }
        Command::Chat {
            show_directive,
            label,
        } => chat_loop(&pipeline, *show_directive, label).await,
        Command::Summary { transcript, label } => {
            let transcript = load_transcript(transcript)?;
            let text = pipeline
                .run_summary(transcript.messages(), label)
                .await
                .map_err(|e| summary_error(&e))?;
            println!("{text}");
            Ok(())
        }
        Command::Catalog => Ok(()),
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("steer_rs=info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(&cli).await {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}
