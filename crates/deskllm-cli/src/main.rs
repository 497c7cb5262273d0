use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use deskllm_runtime::GenerateParams;

mod commands;
mod config;

use config::load_config;

/// deskllm: download, load and run local GGUF models
#[derive(Debug, Parser)]
#[command(name = "deskllm", version, about, long_about = None, arg_required_else_help = true)]
struct Cli {
    /// Path to a custom configuration file (TOML).
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log format: "pretty" (default) or "json".
    #[arg(long, global = true, default_value = "pretty", value_name = "FORMAT")]
    log_format: String,

    /// Print each operation's result as JSON.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// List catalog models and which are downloaded.
    List,

    /// Download a catalog model.
    Pull {
        /// Catalog id (e.g. `qwen2.5-0.5b-instruct`).
        model_id: String,
    },

    /// Check a downloaded model's file; undersized files are quarantined.
    Verify {
        model_id: String,
    },

    /// Delete a downloaded model.
    Delete {
        model_id: String,
    },

    /// Rank catalog models for this machine, smallest first.
    Recommend,

    /// Show the detected hardware profile.
    Hardware,

    /// Load a model and stream a completion to stdout.
    Run {
        /// Catalog id of the model to load.
        #[arg(long, short = 'm')]
        model: String,

        /// Prompt text.
        #[arg(long)]
        prompt: String,

        /// Maximum number of new tokens to generate.
        #[arg(long)]
        max_tokens: Option<usize>,

        /// Sampling temperature; 0 selects greedy decoding.
        #[arg(long)]
        temperature: Option<f64>,

        /// Top-p nucleus sampling threshold (0.0 to 1.0).
        #[arg(long)]
        top_p: Option<f64>,

        /// Random seed for reproducible sampling.
        #[arg(long)]
        seed: Option<u64>,

        /// Context length; defaults to the model's trained context.
        #[arg(long)]
        context_length: Option<usize>,

        /// Never offload layers to an accelerator.
        #[arg(long)]
        cpu: bool,

        /// Print timing and throughput stats after generation.
        #[arg(long)]
        stats: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_tracing(&cli.log_format);

    let cfg = load_config(cli.config.as_ref()).context("Failed to load configuration")?;
    let json = cli.json;

    match cli.command {
        Commands::Hardware => commands::hardware::run(json)?,
        Commands::List => {
            let runtime = commands::build_runtime(&cfg, false)?;
            commands::list::run(&runtime, json)?;
        }
        Commands::Pull { model_id } => {
            let runtime = commands::build_runtime(&cfg, false)?;
            commands::pull::run(&runtime, &model_id, json).await?;
        }
        Commands::Verify { model_id } => {
            let runtime = commands::build_runtime(&cfg, false)?;
            commands::verify::run(&runtime, &model_id, json)?;
        }
        Commands::Delete { model_id } => {
            let runtime = commands::build_runtime(&cfg, false)?;
            commands::delete::run(&runtime, &model_id, json)?;
        }
        Commands::Recommend => {
            let runtime = commands::build_runtime(&cfg, false)?;
            commands::recommend::run(&runtime, json)?;
        }
        Commands::Run { model, prompt, max_tokens, temperature, top_p, seed, context_length, cpu, stats } => {
            let runtime = commands::build_runtime(&cfg, cpu)?;
            let params = GenerateParams {
                max_tokens,
                temperature: temperature.or(cfg.inference.temperature),
                top_p: top_p.or(cfg.inference.top_p),
                seed,
                ..GenerateParams::new(prompt)
            };
            commands::run::run(&runtime, &model, params, context_length, stats, json).await?;
        }
    }

    Ok(())
}

fn init_tracing(log_format: &str) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));

    // stdout is reserved for generated text and JSON.
    let registry = tracing_subscriber::registry().with(env_filter);

    if log_format == "json" {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().pretty().with_writer(std::io::stderr))
            .init();
    }
}
