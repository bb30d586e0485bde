//! RagBuddy - Main CLI Entry Point

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use ragbuddy::{
    cli::{Args, Commands, Config, Provider, QueryOverrides, Verbosity},
    context::{estimator_for_model, TokenEstimator},
    doctor::Doctor,
    execution::{answer_query, AnswerOptions},
    rag::reranking::CandleCrossEncoder,
    rag::retrieval::WeaviateClient,
    rag::{PromptAssembler, RagPipeline},
    repl::{DisplayManager, ReplSession},
    streaming::{CompletionClient, OllamaClient, OpenAiClient},
    telemetry::{TelemetryCollector, TelemetryDisplay},
};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let verbosity = args.verbosity();
    init_tracing(verbosity);

    let config = Config::load(args.config.clone())?;

    match &args.command {
        Commands::Ask { question, overrides } => {
            run_ask(&config, verbosity, &question.join(" "), overrides).await?;
        }
        Commands::Start { overrides } => {
            run_repl(&config, verbosity, overrides).await?;
        }
        Commands::Classes => {
            list_classes(&config).await?;
        }
        Commands::Doctor => {
            run_doctor(&config).await?;
        }
        Commands::Config => {
            show_config(&args, &config)?;
        }
    }

    Ok(())
}

/// RUST_LOG wins over the -v/-q flags
fn init_tracing(verbosity: Verbosity) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(verbosity.log_filter()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn search_client(config: &Config) -> Result<WeaviateClient> {
    let api_key = Config::api_key(&config.search.api_key_env);
    Ok(WeaviateClient::new(&config.search.endpoint, api_key)?)
}

fn completion_client(config: &Config) -> Result<Arc<dyn CompletionClient>> {
    let generation = &config.generation;
    let timeout = Duration::from_secs(generation.request_timeout_secs);
    let client: Arc<dyn CompletionClient> = match generation.provider {
        Provider::OpenAi => {
            let api_key = Config::api_key(&generation.api_key_env);
            if api_key.is_none() {
                tracing::warn!(env = %generation.api_key_env, "no API key set for the completion service");
            }
            Arc::new(
                OpenAiClient::with_config(config.generation_url(), &generation.model, api_key)?
                    .with_timeout(timeout)?
                    .with_system_message(generation.system_message.clone()),
            )
        }
        Provider::Ollama => Arc::new(
            OllamaClient::with_config(config.generation_url(), &generation.model)?.with_timeout(timeout)?,
        ),
    };
    Ok(client)
}

/// Wire every collaborator the pipeline needs from the configuration
fn build_pipeline(config: &Config, telemetry: TelemetryCollector) -> Result<RagPipeline> {
    let search = Arc::new(search_client(config)?);

    let encoder = CandleCrossEncoder::load(&config.rerank.model, config.rerank.max_length)
        .with_context(|| format!("loading cross-encoder {}", config.rerank.model))?;

    let estimator: Arc<dyn TokenEstimator> = Arc::from(estimator_for_model(
        config.tokenizer_model(),
        config.budget.tokenizer_repo.as_deref(),
    ));

    let assembler = PromptAssembler::new(
        config.prompt.template.clone(),
        config.prompt.block_template.clone(),
    )?;

    let pipeline = RagPipeline::new(search, Arc::new(encoder), estimator, completion_client(config)?)
        .with_config(config.rag_config())?
        .with_assembler(assembler)
        .with_telemetry(telemetry);

    Ok(pipeline)
}

fn answer_options(config: &Config, verbosity: Verbosity) -> AnswerOptions {
    AnswerOptions {
        empty_context: config.budget.empty_context,
        deadline: config.generation.stream_deadline_secs.map(Duration::from_secs),
        show_sources: false,
        show_prompt: verbosity.show_prompt(),
    }
}

async fn run_ask(config: &Config, verbosity: Verbosity, question: &str, overrides: &QueryOverrides) -> Result<()> {
    overrides.validate().map_err(anyhow::Error::msg)?;

    let telemetry = TelemetryCollector::new();
    let pipeline = build_pipeline(config, telemetry.clone())?;
    let mut display = DisplayManager::with_progress(verbosity.show_progress());

    answer_query(
        &pipeline,
        question,
        &overrides.to_params(),
        &answer_options(config, verbosity),
        &mut display,
    )
    .await?;

    TelemetryDisplay::new(telemetry, verbosity).display_summary();
    Ok(())
}

async fn run_repl(config: &Config, verbosity: Verbosity, overrides: &QueryOverrides) -> Result<()> {
    overrides.validate().map_err(anyhow::Error::msg)?;

    let telemetry = TelemetryCollector::new();
    let pipeline = build_pipeline(config, telemetry.clone())?;

    let mut session = ReplSession::with_history(
        Config::history_path(),
        overrides.clone(),
        verbosity.show_progress(),
    )?;

    let class_name = overrides
        .class_name
        .as_deref()
        .unwrap_or(&config.search.class_name);
    session.show_welcome(env!("CARGO_PKG_VERSION"), pipeline.completion().model(), class_name);

    session.run(&pipeline, answer_options(config, verbosity)).await?;

    TelemetryDisplay::new(telemetry, verbosity).display_summary();
    Ok(())
}

async fn list_classes(config: &Config) -> Result<()> {
    let client = search_client(config)?;

    match client.show_classes().await {
        Ok(classes) if classes.is_empty() => {
            println!("No classes in the index at {}", client.base_url());
        }
        Ok(classes) => {
            println!("Classes at {}:", client.base_url());
            for class in classes {
                let marker = if class == config.search.class_name { " (configured)" } else { "" };
                println!("  • {}{}", class, marker.green());
            }
        }
        Err(e) => {
            eprintln!("{} {}", "Error:".red().bold(), e);
            eprintln!("\nIs the search service running at {}?", client.base_url());
            std::process::exit(1);
        }
    }

    Ok(())
}

async fn run_doctor(config: &Config) -> Result<()> {
    let mut doctor = Doctor::new(
        search_client(config)?,
        completion_client(config)?,
        config.search.class_name.clone(),
        config.tokenizer_model().to_string(),
    );

    match config.generation.provider {
        Provider::OpenAi => {
            let env_var = &config.generation.api_key_env;
            doctor = doctor.with_credential(env_var, Config::api_key(env_var).is_some());
        }
        Provider::Ollama => {
            let ollama = OllamaClient::with_config(config.generation_url(), &config.generation.model)?;
            match ollama.list_models().await {
                Ok(models) => doctor = doctor.with_installed_models(models),
                Err(e) => tracing::debug!(error = %e, "could not list installed models"),
            }
        }
    }

    let checks = doctor.run_diagnostics().await;
    Doctor::display_results(&checks);

    std::process::exit(if Doctor::overall_status(&checks) { 0 } else { 1 });
}

fn show_config(args: &Args, config: &Config) -> Result<()> {
    let source = match &args.config {
        Some(path) => path.display().to_string(),
        None if Config::default_path().exists() => Config::default_path().display().to_string(),
        None => "built-in defaults".to_string(),
    };

    println!("\n{}", "RagBuddy Configuration".bold().cyan());
    println!("Source: {}\n", source);

    let rendered = toml::to_string_pretty(config).context("rendering configuration")?;
    println!("{}", rendered);

    Ok(())
}
