//! CLI subcommand handlers.

use crate::Commands;
use crate::ConfigAction;
use ragbench_core::{
    ChatModel, ChunkingConfig, Embedder, EmbeddingModel, HeuristicDetector, LanguageDetector,
    LlmProvider, PromptSet, RagChain, RagConfig, SourceRecord, VectorStore, chunk_documents,
    list_providers, load_config, load_directory,
};
use ragbench_eval::tracker::TrackingBackend;
use ragbench_eval::{
    CrossLingualProbe, CrossLingualTestCase, ExperimentTracker, FailurePolicy, FileBackend,
    FullEvaluationOptions, ProbeConfiguration, index_corpus, run_full_evaluation,
};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Handle a CLI subcommand.
pub async fn handle_command(command: Commands, workspace: &Path) -> anyhow::Result<()> {
    match command {
        Commands::Ask {
            question,
            docs,
            k,
            stream,
        } => handle_ask(&question, &docs, k, stream, workspace).await,
        Commands::Eval {
            docs,
            questions,
            experiment,
            run_name,
            chunk_size,
            chunk_overlap,
            k,
            skip_failures,
        } => {
            let mut config = load(workspace)?;
            if chunk_size.is_some() || chunk_overlap.is_some() {
                config.chunking = ChunkingConfig::new(
                    chunk_size.unwrap_or(config.chunking.chunk_size),
                    chunk_overlap.unwrap_or(config.chunking.chunk_overlap),
                )?
                .with_separators(config.chunking.separators.clone());
            }
            if let Some(k) = k {
                config.retrieval.k = k;
            }
            config.validate()?;
            let mut options = FullEvaluationOptions::new(docs, questions);
            options.config = config;
            options.run_name = run_name;
            if skip_failures {
                options.failure_policy = FailurePolicy::SkipAndRecord;
            }
            handle_eval(options, experiment, workspace).await
        }
        Commands::Probe { docs, output } => handle_probe(&docs, &output, workspace).await,
        Commands::Runs { experiment } => handle_runs(experiment.as_deref(), workspace),
        Commands::Providers => {
            for provider in list_providers() {
                let key = if provider.requires_api_key {
                    "API key required"
                } else {
                    "no API key"
                };
                println!(
                    "{:<10} {:<30} {}",
                    provider.name, provider.default_model, key
                );
            }
            Ok(())
        }
        Commands::Config { action } => handle_config(action, workspace),
    }
}

fn load(workspace: &Path) -> anyhow::Result<RagConfig> {
    load_config(Some(workspace), None)
        .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))
}

fn embedder(config: &RagConfig) -> anyhow::Result<Arc<dyn Embedder>> {
    Ok(Arc::new(EmbeddingModel::from_settings(&config.embedding)?))
}

fn chat_model(config: &RagConfig) -> anyhow::Result<Arc<dyn LlmProvider>> {
    Ok(Arc::new(ChatModel::from_settings(&config.llm)?))
}

fn tracking_root(config: &RagConfig, workspace: &Path) -> PathBuf {
    if config.tracking.root.is_absolute() {
        config.tracking.root.clone()
    } else {
        workspace.join(&config.tracking.root)
    }
}

fn print_sources(sources: &[SourceRecord]) {
    if sources.is_empty() {
        return;
    }
    println!("\nSources:");
    for (i, source) in sources.iter().enumerate() {
        let name = source
            .metadata
            .get("source")
            .and_then(|v| v.as_str())
            .unwrap_or("Unknown");
        println!("  [{}] {}", i + 1, name);
    }
}

async fn handle_ask(
    question: &str,
    docs: &Path,
    k: Option<usize>,
    stream: bool,
    workspace: &Path,
) -> anyhow::Result<()> {
    let config = load(workspace)?;
    let llm = chat_model(&config)?;
    let store = build_index(&config, docs).await?;

    let language = HeuristicDetector.detect(question);
    let chain = RagChain::new(Arc::new(store), llm)
        .with_k(k.unwrap_or(config.retrieval.k))
        .with_prompts(PromptSet::for_language(&language))
        .with_generation(config.llm.temperature, Some(config.llm.max_tokens));

    if stream {
        let mut answer = chain.stream(question, false).await?;
        let mut stdout = std::io::stdout();
        while let Some(fragment) = answer.next().await {
            print!("{}", fragment?);
            stdout.flush()?;
        }
        println!();
        print_sources(answer.sources());
    } else {
        let answer = chain.invoke(question, false).await?;
        println!("{}", answer.answer);
        print_sources(&answer.sources);
    }
    Ok(())
}

/// Load and chunk `docs` into the configured store, replacing its previous contents.
async fn build_index(config: &RagConfig, docs: &Path) -> anyhow::Result<VectorStore> {
    let documents = load_directory(docs, None)?;
    if documents.is_empty() {
        anyhow::bail!("No supported documents found in {}", docs.display());
    }
    let chunks = chunk_documents(&documents, &config.chunking);
    let store = VectorStore::from_config(&config.retrieval, embedder(config)?)?;
    store.replace_documents(&chunks).await?;
    tracing::debug!(chunks = chunks.len(), collection = store.collection(), "Indexed documents");
    Ok(store)
}

async fn handle_eval(
    options: FullEvaluationOptions,
    experiment: Option<String>,
    workspace: &Path,
) -> anyhow::Result<()> {
    let config = &options.config;
    let root = tracking_root(config, workspace);
    tracing::debug!(root = %root.display(), "Using file tracking backend");
    let backend = Arc::new(FileBackend::new(root)?);
    let experiment = experiment.unwrap_or_else(|| config.tracking.experiment_name.clone());
    let mut tracker = ExperimentTracker::new(backend, &experiment)?;

    let outcome =
        run_full_evaluation(&mut tracker, chat_model(config)?, embedder(config)?, &options)
            .await?;

    println!("Evaluation results ({experiment})");
    println!("{}", "-".repeat(60));
    for (i, result) in outcome.results.iter().enumerate() {
        println!(
            "{:>3}. relevance {:.2}  faithfulness {:.2}  {:.2}s  {}",
            i + 1,
            result.relevance_score.unwrap_or_default(),
            result.faithfulness_score.unwrap_or_default(),
            result.latency_seconds,
            result.question
        );
    }
    for failure in &outcome.failures {
        println!("  ! question {} failed: {}", failure.index + 1, failure.error);
    }
    if let Some(summary) = outcome.summary() {
        println!("{}", "-".repeat(60));
        println!("Total queries:       {}", summary.total_queries);
        println!("Avg latency:         {:.2}s", summary.avg_latency_seconds);
        println!("Avg relevance:       {:.3}", summary.avg_relevance_score);
        println!("Avg faithfulness:    {:.3}", summary.avg_faithfulness_score);
    }
    Ok(())
}

async fn handle_probe(docs: &Path, output: &Path, workspace: &Path) -> anyhow::Result<()> {
    let config = load(workspace)?;
    let embedder = embedder(&config)?;
    let configuration = ProbeConfiguration::reference(embedder.model_name());
    let store = index_corpus(docs, embedder, &configuration.chunking()?).await?;

    let probe = CrossLingualProbe::new(CrossLingualTestCase::reference_battery(), configuration)?;
    let report = probe.run(&store).await?;

    for result in &report.results {
        let status = if result.cross_lingual_success {
            "OK"
        } else {
            "MISS"
        };
        println!("Test {}: [{status}] {}", result.test_id, result.description);
        println!("    Query ({}): {}", result.detected_lang, result.query);
        println!("    Retrieved: {:?}", result.retrieved_sources);
    }
    println!();
    println!(
        "Success rate: {:.1}% ({}/{})",
        report.metrics.success_rate, report.metrics.successes, report.metrics.total_tests
    );
    println!("{}", report.finding);
    println!("{}", report.detail);
    if let Some(limitation) = &report.limitation {
        println!("Limitation: {limitation}");
    }

    let output = if output.is_absolute() {
        output.to_path_buf()
    } else {
        workspace.join(output)
    };
    report.write_json(&output)?;
    println!("Results saved: {}", output.display());
    Ok(())
}

fn handle_runs(experiment: Option<&str>, workspace: &Path) -> anyhow::Result<()> {
    let config = load(workspace)?;
    let root = tracking_root(&config, workspace);
    if !root.exists() {
        println!("No runs recorded under {}", root.display());
        return Ok(());
    }
    let backend = FileBackend::new(root)?;

    for exp in backend.list_experiments()? {
        if experiment.is_some_and(|name| name != exp.name) {
            continue;
        }
        let runs = backend.list_runs(&exp.id)?;
        println!("{} ({} runs)", exp.name, runs.len());
        for run in runs {
            let metrics = backend.run_metrics(&run.run_id)?;
            let latest = |key: &str| {
                metrics
                    .iter()
                    .rev()
                    .find(|m| m.key == key)
                    .map(|m| format!("{:.3}", m.value))
                    .unwrap_or_else(|| "-".to_string())
            };
            println!(
                "  {}  {:<8}  {}  {:<16}  relevance {}  faithfulness {}",
                run.run_id,
                run.status,
                run.start_time.format("%Y-%m-%d %H:%M:%S"),
                run.run_name.as_deref().unwrap_or("-"),
                latest("avg_relevance_score"),
                latest("avg_faithfulness_score"),
            );
        }
    }
    Ok(())
}

fn handle_config(action: ConfigAction, workspace: &Path) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init => {
            let config_dir = workspace.join(".ragbench");
            std::fs::create_dir_all(&config_dir)?;

            let config_path = config_dir.join("config.toml");
            if config_path.exists() {
                println!(
                    "Configuration file already exists at: {}",
                    config_path.display()
                );
                return Ok(());
            }

            let toml_str = ragbench_core::config::to_toml(&RagConfig::default())?;
            std::fs::write(&config_path, &toml_str)?;
            println!(
                "Created default configuration at: {}",
                config_path.display()
            );
            Ok(())
        }
        ConfigAction::Show => {
            let config = load(workspace)?;
            println!("{}", ragbench_core::config::to_toml(&config)?);
            Ok(())
        }
    }
}
