use clap::Parser;
use serde_json::Value;
use skill_canon::core::enrich::TaxonomyEnricher;
use skill_canon::core::export::{self, ValidationStatistics};
use skill_canon::core::merge::{build_jobs, load_inventory};
use skill_canon::core::merge_validator::MergeResultValidator;
use skill_canon::domain::model::SkillRequest;
use skill_canon::domain::ports::Storage;
use skill_canon::utils::error::ErrorCategory;
use skill_canon::utils::{logger, validation::Validate};
use skill_canon::{
    BatchJobRunner, BatchSummary, CancellationFlag, CliConfig, Command, GeminiClient,
    JsonlInteractionStore, LocalStorage, MergeStep, Result, RunConfig, SkillCanonicaliser,
    Taxonomy,
};
use std::path::Path;
use std::sync::Arc;

#[tokio::main]
async fn main() {
    let cli = CliConfig::parse();

    // 初始化日誌
    if cli.json_logs {
        logger::init_json_logger(cli.verbose);
    } else {
        logger::init_cli_logger(cli.verbose);
    }

    tracing::info!("Starting skill-canon CLI");
    if cli.verbose {
        tracing::debug!("CLI config: {:?}", cli);
    }

    if let Err(e) = run(cli).await {
        tracing::error!("❌ skill-canon failed: {} (Category: {:?})", e, e.category());
        tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

        eprintln!("❌ {}", e.user_friendly_message());
        eprintln!("💡 建議: {}", e.recovery_suggestion());

        // 配置錯誤 1，執行期錯誤 2
        let exit_code = match e.category() {
            ErrorCategory::Configuration => 1,
            _ => 2,
        };
        std::process::exit(exit_code);
    }
}

async fn run(cli: CliConfig) -> Result<()> {
    let config = RunConfig::from_file(&cli.config)?;
    if let Err(e) = config.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        return Err(e);
    }

    let taxonomy = Arc::new(Taxonomy::from_file(&config.taxonomy.path)?);
    tracing::info!(
        "📚 Loaded taxonomy {} ({} domains, {} clusters)",
        taxonomy.version(),
        taxonomy.domain_count(),
        taxonomy.cluster_count()
    );

    let storage = LocalStorage::new(config.output.path.clone());
    let store = JsonlInteractionStore::new(&config.store.path);

    match cli.command {
        Command::Validate { input, output } => {
            run_validate(&config, taxonomy, store, &storage, &input, &output).await
        }
        Command::Merge {
            inventory,
            max_jobs,
        } => run_merge(&config, &taxonomy, store, &storage, &inventory, max_jobs).await,
        Command::Export { latest, output } => {
            let records = export::historical_records(&store, &taxonomy, latest).await?;
            let rows = TaxonomyEnricher::new(&taxonomy).enrich(&records);
            storage
                .write_file(&output, export::validation_csv(&rows)?.as_bytes())
                .await?;

            println!("✅ Exported {} records", rows.len());
            println!("📁 Output saved to: {}/{}", storage.base_path(), output);
            Ok(())
        }
        Command::Stats { latest } => {
            let records = export::historical_records(&store, &taxonomy, latest).await?;
            let stats = ValidationStatistics::from_records(&records);
            println!("{}", serde_json::to_string_pretty(&stats)?);
            Ok(())
        }
    }
}

fn build_client(config: &RunConfig) -> Result<GeminiClient> {
    let client = GeminiClient::new(config.generation.endpoint.clone(), config.api_key()?)?;
    Ok(match config.request_timeout() {
        Some(timeout) => client.with_timeout(timeout),
        None => client,
    })
}

async fn run_validate(
    config: &RunConfig,
    taxonomy: Arc<Taxonomy>,
    store: JsonlInteractionStore,
    storage: &LocalStorage,
    input: &Path,
    output: &str,
) -> Result<()> {
    let raw = tokio::fs::read_to_string(input).await?;
    let value: Value = serde_json::from_str(&raw)?;
    let request = SkillRequest::from_json(&value)?;

    let canonicaliser = SkillCanonicaliser::new(
        build_client(config)?,
        store,
        config.validation_prompt()?,
        Arc::clone(&taxonomy),
    );
    let outcome = canonicaliser.canonicalise(&request).await?;

    for rejected in &outcome.parse.rejected {
        tracing::warn!("⚠️ Record {} rejected: {}", rejected.index, rejected.reason);
    }

    let rows = TaxonomyEnricher::new(&taxonomy).enrich(&outcome.parse.records);
    storage
        .write_file(output, export::validation_csv(&rows)?.as_bytes())
        .await?;

    let stats = ValidationStatistics::from_records(&outcome.parse.records);
    tracing::info!(
        "📊 {} skills: {} valid, {} invalid, {} need review",
        stats.total_skills,
        stats.valid_skills,
        stats.invalid_skills,
        stats.review_needed
    );

    println!("✅ Validated {} skills", request.len());
    println!("📁 Output saved to: {}/{}", storage.base_path(), output);
    Ok(())
}

async fn run_merge(
    config: &RunConfig,
    taxonomy: &Taxonomy,
    store: JsonlInteractionStore,
    storage: &LocalStorage,
    inventory: &Path,
    max_jobs: Option<usize>,
) -> Result<()> {
    let inventory = load_inventory(&tokio::fs::read_to_string(inventory).await?)?;
    let mut jobs = build_jobs(taxonomy, &inventory, config.batch.max_skills_per_job);
    if let Some(max_jobs) = max_jobs {
        jobs.truncate(max_jobs);
    }

    if jobs.is_empty() {
        tracing::warn!("⚠️ No clusters with valid skills, nothing to merge");
        return Ok(());
    }

    let step = MergeStep::new(build_client(config)?, store, config.merge_prompt()?)
        .with_validator(MergeResultValidator::new(config.batch.reject_unknown_ids));

    let cancellation = CancellationFlag::new();
    let signal_flag = cancellation.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("🛑 Interrupt received, stopping after the current job");
            signal_flag.cancel();
        }
    });

    let runner = BatchJobRunner::new(step)
        .with_inter_job_delay(config.inter_job_delay())
        .with_cancellation(cancellation);
    let report = runner.run(&jobs).await;

    for (entry, records) in report.successes() {
        let csv = export::merge_csv(records)?;
        storage
            .write_file(&entry.output_filename(), csv.as_bytes())
            .await?;
    }
    storage
        .write_file(
            "batch_report.json",
            serde_json::to_string_pretty(&report)?.as_bytes(),
        )
        .await?;

    let summary = BatchSummary::from_report(&report);
    summary.log();

    println!(
        "✅ Merge batch finished: {}/{} clusters succeeded",
        summary.succeeded, summary.total_jobs
    );
    println!("📁 Output saved to: {}", storage.base_path());
    if report.interrupted {
        println!("⏹️ Batch interrupted; remaining clusters were not attempted");
    }
    Ok(())
}
