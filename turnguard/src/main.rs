//! Offline turn checks over transcript files.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::debug;

use turnguard::classify::ClassifierClient;
use turnguard::core::context_window::{NARROW_WINDOW, WIDE_WINDOW, build_context_window};
use turnguard::core::types::Classification;
use turnguard::escalation::EscalationController;
use turnguard::exit_codes;
use turnguard::host::StaticHost;
use turnguard::io::completion::CommandCompletion;
use turnguard::io::config::{DEFAULT_CONFIG_FILE, TurnguardConfig, load_config};
use turnguard::io::models::ConfigModelResolver;
use turnguard::io::transcript::load_transcript;
use turnguard::logging;

#[derive(Parser)]
#[command(
    name = "turnguard",
    version,
    about = "Detect agent turns that stopped before finishing the work"
)]
struct Cli {
    /// Config file (missing file means defaults).
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the context window a classification pass would see.
    Context {
        #[arg(long)]
        transcript: PathBuf,
        /// Number of recent user/assistant entries.
        #[arg(long, default_value_t = NARROW_WINDOW)]
        recent: usize,
    },
    /// Run one classification pass and print the label.
    Classify {
        #[arg(long)]
        transcript: PathBuf,
        /// Use the wide (second pass) window.
        #[arg(long)]
        wide: bool,
    },
    /// Run the full turn-end protocol; exits 2 when a nudge is enqueued.
    Check {
        #[arg(long)]
        transcript: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    logging::init();
    match run().await {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{err:#}");
            std::process::exit(exit_codes::INVALID);
        }
    }
}

async fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Context { transcript, recent } => cmd_context(&transcript, recent),
        Command::Classify { transcript, wide } => cmd_classify(&cli.config, &transcript, wide).await,
        Command::Check { transcript } => cmd_check(&cli.config, &transcript).await,
    }
}

fn cmd_context(transcript: &Path, recent: usize) -> Result<i32> {
    let messages = load_transcript(transcript)?;
    let context = build_context_window(&messages, recent);
    if !context.is_empty() {
        println!("{context}");
    }
    Ok(exit_codes::OK)
}

async fn cmd_classify(config: &Path, transcript: &Path, wide: bool) -> Result<i32> {
    let cfg = load_config(config).context("load config")?;
    let messages = load_transcript(transcript)?;
    let recent = if wide { WIDE_WINDOW } else { NARROW_WINDOW };
    let context = build_context_window(&messages, recent);
    if context.is_empty() {
        debug!("empty context window, nothing to classify");
        println!("{}", Classification::Done);
        return Ok(exit_codes::OK);
    }

    let active = cfg.active.as_ref().map(|active| active.to_model());
    let verdict = classifier(cfg).classify(&context, active.as_ref()).await;
    println!("{verdict}");
    Ok(exit_codes::OK)
}

async fn cmd_check(config: &Path, transcript: &Path) -> Result<i32> {
    let cfg = load_config(config).context("load config")?;
    let messages = load_transcript(transcript)?;

    let enabled = cfg.enabled;
    let host = Arc::new(StaticHost::new(
        cfg.active.as_ref().map(|active| active.to_model()),
    ));
    let controller = EscalationController::new(classifier(cfg), host.clone(), enabled);

    let outcome = controller.on_turn_end(&messages).await;
    println!("{outcome}");
    for follow_up in host.follow_ups() {
        println!("follow-up: {}", follow_up.content);
    }

    Ok(if outcome.is_nudge() {
        exit_codes::NUDGE
    } else {
        exit_codes::OK
    })
}

fn classifier(cfg: TurnguardConfig) -> ClassifierClient<CommandCompletion, ConfigModelResolver> {
    ClassifierClient::new(
        CommandCompletion::new(cfg.backend),
        ConfigModelResolver::new(cfg.models),
        cfg.classifier,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_context_defaults_to_narrow_window() {
        let cli = Cli::parse_from(["turnguard", "context", "--transcript", "t.json"]);
        assert_eq!(cli.config, PathBuf::from(DEFAULT_CONFIG_FILE));
        assert!(matches!(
            cli.command,
            Command::Context { recent: NARROW_WINDOW, .. }
        ));
    }

    #[test]
    fn parse_global_config_after_subcommand() {
        let cli = Cli::parse_from([
            "turnguard",
            "check",
            "--transcript",
            "t.json",
            "--config",
            "alt.toml",
        ]);
        assert_eq!(cli.config, PathBuf::from("alt.toml"));
        assert!(matches!(cli.command, Command::Check { .. }));
    }

    #[test]
    fn parse_classify_wide() {
        let cli = Cli::parse_from(["turnguard", "classify", "--transcript", "t.json", "--wide"]);
        assert!(matches!(cli.command, Command::Classify { wide: true, .. }));
    }
}
