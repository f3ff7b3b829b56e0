//! `warden`: run the guarded generation gateway and inspect its policy.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use warden_core::{GuardrailInput, HeuristicPolicy, PolicyPack, DEFAULT_CHANNEL};
use warden_runtime::{
    generator_from_config, CachedFormReview, FormReviewAdapter, FormReviewRequest, ReviewCache,
    RuntimeConfig,
};

mod server;

#[derive(Parser, Debug)]
#[command(name = "warden", version, about = "Guardrail-enforced generation gateway")]
struct Cli {
    #[arg(short, long, global = true, help = "Log at debug level unless RUST_LOG is set")]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Serve the form-review HTTP API.
    Serve {
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long, default_value = "127.0.0.1:8080")]
        bind: SocketAddr,
    },
    /// Screen text with the heuristic policy and print the decision.
    Screen {
        prompt: String,
        #[arg(long, default_value = DEFAULT_CHANNEL)]
        channel: String,
        #[arg(long, help = "Screen this as generated text (response stage)")]
        response: Option<String>,
        #[arg(long, help = "Policy pack to use instead of the built-in one")]
        policy: Option<PathBuf>,
    },
    /// Run one form review and print the suggestions.
    Review {
        #[arg(long)]
        request: PathBuf,
        #[arg(long)]
        config: Option<PathBuf>,
    },
    Policy {
        #[command(subcommand)]
        command: PolicyCommands,
    },
}

#[derive(Subcommand, Debug)]
enum PolicyCommands {
    /// Check a policy pack file.
    Validate { file: PathBuf },
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<RuntimeConfig> {
    let mut config = match path {
        Some(path) => RuntimeConfig::from_yaml_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => RuntimeConfig::default(),
    };
    config
        .apply_env_overrides()
        .context("invalid environment override")?;
    Ok(config)
}

fn form_review(config: &RuntimeConfig) -> Result<CachedFormReview> {
    let generator = generator_from_config(config).context("failed to build gateway")?;
    let cache = config
        .cache
        .enabled
        .then(|| ReviewCache::from_config(&config.cache));
    Ok(CachedFormReview::new(
        FormReviewAdapter::new(Arc::new(generator)),
        cache,
    ))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Serve { config, bind } => {
            let config = load_config(config.as_deref())?;
            let state = server::AppState::new(form_review(&config)?);
            server::serve(state, bind).await
        }
        Commands::Screen {
            prompt,
            channel,
            response,
            policy,
        } => {
            let pack = match policy {
                Some(path) => PolicyPack::from_file(&path)
                    .with_context(|| format!("failed to load policy {}", path.display()))?,
                None => PolicyPack::builtin(),
            };
            let input = GuardrailInput::builder(prompt).channel(channel).build()?;
            let decision = HeuristicPolicy::new(pack).evaluate(&input, response.as_deref());
            println!("{}", serde_json::to_string_pretty(&decision)?);
            Ok(())
        }
        Commands::Review { request, config } => {
            let config = load_config(config.as_deref())?;
            let raw = std::fs::read_to_string(&request)
                .with_context(|| format!("failed to read {}", request.display()))?;
            let request: FormReviewRequest =
                serde_json::from_str(&raw).context("invalid review request")?;

            let suggestions = form_review(&config)?.review(&request).await;
            println!("{}", serde_json::to_string_pretty(&suggestions)?);
            Ok(())
        }
        Commands::Policy {
            command: PolicyCommands::Validate { file },
        } => {
            let pack = PolicyPack::from_file(&file)
                .with_context(|| format!("invalid policy {}", file.display()))?;
            println!(
                "Policy '{}' is valid: {} detector rules, {} phrase rules, {} channel overrides",
                pack.name,
                pack.detector_rules.len(),
                pack.phrase_rules.len(),
                pack.channels.len()
            );
            Ok(())
        }
    }
}
