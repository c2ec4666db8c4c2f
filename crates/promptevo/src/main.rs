mod config;

use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use colored::Colorize;

use config::{ExperimentConfig, ResolvedRole, CONFIG_FILE_NAME};
use promptevo_core::{ConvergenceReason, Mutator, OptimizationRun, Optimizer};
use promptevo_fitness::{CriterionKind, FitnessEvaluator};
use promptevo_logging::{init_tracing, LogFormat, Logger, ProgressSink};
use promptevo_providers::{
    CommandGenerator, GenerateOptions, Generator, GeneratorKind, KeywordRetriever, Pacer,
    RateLimitedGenerator,
};

#[derive(Parser, Debug)]
#[command(
    name = "promptevo",
    about = "Genetic prompt optimization with hybrid retrieval and judge scoring",
    version,
    author
)]
struct Cli {
    /// Experiment file (default: ./promptevo.toml)
    #[arg(short, long, default_value = CONFIG_FILE_NAME)]
    config: PathBuf,

    /// Directory of documents to retrieve from (overrides `corpus` in the file)
    #[arg(long)]
    corpus: Option<PathBuf>,

    /// Agent to use for every role
    #[arg(short, long, value_enum)]
    agent: Option<AgentChoice>,

    /// Model to use for every role (if the agent supports it)
    #[arg(short, long)]
    model: Option<String>,

    /// Model to use for the judge only
    #[arg(long)]
    judge_model: Option<String>,

    /// Seed for a reproducible search
    #[arg(long)]
    seed: Option<u64>,

    /// Generations to breed after the initial one
    #[arg(short = 'n', long)]
    max_generations: Option<usize>,

    /// Candidates per generation
    #[arg(short, long)]
    population_size: Option<usize>,

    /// Candidates evaluated at once
    #[arg(long)]
    concurrency: Option<usize>,

    /// Log output format
    #[arg(long, value_enum, default_value = "pretty")]
    log_format: LogFormatChoice,

    /// Mirror progress events to a JSONL file
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Output final result as JSON
    #[arg(long)]
    json_output: bool,

    /// Dry run: show the resolved experiment without calling any model
    #[arg(long)]
    dry_run: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum AgentChoice {
    Claude,
    Opencode,
    Custom,
}

impl AgentChoice {
    fn as_str(self) -> &'static str {
        match self {
            AgentChoice::Claude => "claude",
            AgentChoice::Opencode => "opencode",
            AgentChoice::Custom => "custom",
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormatChoice {
    Pretty,
    Json,
    Compact,
}

impl From<LogFormatChoice> for LogFormat {
    fn from(choice: LogFormatChoice) -> Self {
        match choice {
            LogFormatChoice::Pretty => LogFormat::Pretty,
            LogFormatChoice::Json => LogFormat::Json,
            LogFormatChoice::Compact => LogFormat::Compact,
        }
    }
}

/// Roles after CLI overrides and file precedence are applied
struct Roles {
    generator: ResolvedRole,
    judge: ResolvedRole,
    rewriter: Option<ResolvedRole>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_format: LogFormat = cli.log_format.into();
    init_tracing("warn", log_format);

    let mut experiment = ExperimentConfig::load(&cli.config)?;
    apply_overrides(&cli, &mut experiment);

    let request = experiment.request();
    request
        .validate()
        .with_context(|| format!("Invalid experiment in {}", cli.config.display()))?;
    experiment
        .optimizer
        .validate()
        .context("Invalid [optimizer] settings")?;

    let agent = cli.agent.map(AgentChoice::as_str);
    let model = cli.model.as_deref();
    let roles = Roles {
        generator: experiment.resolve_role(&experiment.generator, agent, model)?,
        judge: experiment.resolve_role(
            &experiment.judge,
            agent,
            cli.judge_model.as_deref().or(model),
        )?,
        rewriter: experiment
            .rewriter
            .as_ref()
            .map(|role| experiment.resolve_role(role, agent, model))
            .transpose()?,
    };
    let corpus = resolve_corpus(&cli, &experiment)?;

    if cli.dry_run {
        print_dry_run(&experiment, &roles, &corpus);
        return Ok(());
    }

    let retriever = KeywordRetriever::from_dir(&corpus)
        .with_context(|| format!("Failed to load corpus from {}", corpus.display()))?;
    if retriever.is_empty() {
        anyhow::bail!("Corpus {} contains no documents", corpus.display());
    }

    // One pacer for all roles
    let pacer = Pacer::new(experiment.rate_limit.to_rate_limit());
    let generator = build_generator(&roles.generator, "Generator").await?;
    let judge = build_generator(&roles.judge, "Judge").await?;

    let evaluator = FitnessEvaluator::new(
        Arc::new(retriever),
        Arc::new(RateLimitedGenerator::with_pacer(generator, pacer.clone())),
        Arc::new(RateLimitedGenerator::with_pacer(judge, pacer.clone())),
    )
    .with_options(experiment.evaluation.clone());

    let mut mutator = Mutator::new();
    if let Some(role) = &roles.rewriter {
        let rewriter = build_generator(role, "Rewriter").await?;
        mutator = mutator
            .with_rewriter(Arc::new(RateLimitedGenerator::with_pacer(rewriter, pacer.clone())))
            .with_options(GenerateOptions::default())
            .with_cost_per_1k_tokens(experiment.evaluation.cost_per_1k_tokens);
    }

    let logger = match &cli.log_file {
        Some(path) => Logger::with_file(log_format, path)
            .with_context(|| format!("Failed to open log file {}", path.display()))?,
        None => Logger::new(log_format),
    };
    let sink: Arc<dyn ProgressSink> = Arc::new(logger);
    let optimizer = Optimizer::new(&evaluator, sink).with_mutator(mutator);

    // Handle Ctrl+C gracefully
    let interrupt_handle = optimizer.interrupt_handle();
    ctrlc::set_handler(move || {
        eprintln!("\nInterrupted. Finishing current generation...");
        interrupt_handle.store(true, Ordering::SeqCst);
    })
    .context("Failed to set Ctrl+C handler")?;

    let run = optimizer.optimize(&request, &experiment.optimizer).await?;

    if cli.json_output {
        let json = serde_json::to_string_pretty(&run.clone().without_archive())?;
        println!("{}", json);
    } else {
        print_outcome(&run);
    }

    std::process::exit(run.exit_code());
}

fn apply_overrides(cli: &Cli, experiment: &mut ExperimentConfig) {
    let optimizer = &mut experiment.optimizer;
    if let Some(seed) = cli.seed {
        optimizer.seed = Some(seed);
    }
    if let Some(max) = cli.max_generations {
        optimizer.max_generations = max;
    }
    if let Some(size) = cli.population_size {
        optimizer.population_size = size;
    }
    if let Some(concurrency) = cli.concurrency {
        optimizer.evaluation_concurrency = concurrency;
    }
}

/// CLI corpus wins; the file's corpus is relative to the experiment file
fn resolve_corpus(cli: &Cli, experiment: &ExperimentConfig) -> Result<PathBuf> {
    if let Some(corpus) = &cli.corpus {
        return Ok(corpus.clone());
    }
    let Some(corpus) = &experiment.corpus else {
        anyhow::bail!(
            "No corpus configured. Use --corpus or set `corpus` in {}",
            cli.config.display()
        );
    };
    if corpus.is_absolute() {
        return Ok(corpus.clone());
    }
    let base = cli.config.parent().unwrap_or(Path::new("."));
    Ok(base.join(corpus))
}

async fn build_generator(role: &ResolvedRole, label: &str) -> Result<Arc<dyn Generator>> {
    let mut generator = match (&role.kind, &role.command) {
        (GeneratorKind::Custom, Some(command)) => {
            let (binary, args) = command
                .split_first()
                .context("Custom agent command is empty")?;
            CommandGenerator::custom(binary, args.to_vec())
        }
        (kind, _) => CommandGenerator::for_kind(*kind),
    };
    if let Some(model) = &role.model {
        generator = generator.with_model(model);
    }
    if let Some(timeout) = role.timeout {
        generator = generator.with_timeout(timeout);
    }

    if !generator.is_available().await {
        anyhow::bail!(
            "{} agent '{}' is not available. Make sure it's installed and in PATH.",
            label,
            generator.name()
        );
    }
    Ok(Arc::new(generator))
}

fn describe_role(role: &ResolvedRole) -> String {
    let mut description = role.kind.to_string();
    if let Some(model) = &role.model {
        description.push_str(&format!(" (model: {})", model));
    }
    if let Some(timeout) = role.timeout {
        description.push_str(&format!(", timeout {}s", timeout.as_secs()));
    }
    description
}

fn print_dry_run(experiment: &ExperimentConfig, roles: &Roles, corpus: &Path) {
    let optimizer = &experiment.optimizer;
    let base = experiment.base_prompt.to_template();

    println!("=== Dry Run ===");
    println!("Base prompt slots:");
    for component in base.components() {
        let preview: String = component.template.chars().take(80).collect();
        println!("  {}: {}", component.name, preview.replace('\n', " "));
    }
    println!("Test cases: {}", experiment.test_cases.len());
    println!("Criteria:");
    for criterion in &experiment.criteria {
        let kind = match &criterion.kind {
            CriterionKind::Retrieval { metric } => format!("retrieval ({:?})", metric),
            CriterionKind::LlmJudged { dimensions, .. } => {
                format!("llm-judged ({})", dimensions.join(", "))
            }
        };
        println!("  {} = {:.2} [{}]", criterion.name, criterion.weight, kind);
    }
    println!("Corpus: {}", corpus.display());
    println!("Generator: {}", describe_role(&roles.generator));
    println!("Judge: {}", describe_role(&roles.judge));
    match &roles.rewriter {
        Some(role) => println!("Rewriter: {}", describe_role(role)),
        None => println!("Rewriter: local rewrites"),
    }
    println!(
        "Population: {}, generations: {}, mutation: {}, crossover: {}, elitism: {}",
        optimizer.population_size,
        optimizer.max_generations,
        optimizer.mutation_rate,
        optimizer.crossover_rate,
        optimizer.elitism_fraction
    );
    println!(
        "Target: {}, stagnation limit: {}, tournament: {}, concurrency: {}",
        optimizer.target_score,
        optimizer.max_stagnation,
        optimizer.tournament_size,
        optimizer.evaluation_concurrency
    );
    if let Some(budget) = optimizer.cost_budget {
        println!("Cost budget: {}", budget);
    }
    if let Some(budget) = optimizer.time_budget_secs {
        println!("Time budget: {}s", budget);
    }
    match optimizer.seed {
        Some(seed) => println!("Seed: {}", seed),
        None => println!("Seed: random"),
    }
}

fn print_outcome(run: &OptimizationRun) {
    let banner = match run.convergence_reason {
        ConvergenceReason::TargetReached => "=== TARGET REACHED ===".green().bold(),
        ConvergenceReason::Interrupted => "=== INTERRUPTED ===".yellow().bold(),
        ConvergenceReason::BudgetExceeded => "=== BUDGET EXCEEDED ===".yellow().bold(),
        ConvergenceReason::Stagnation => "=== STAGNATED ===".cyan().bold(),
        ConvergenceReason::MaxGenerations => "=== GENERATION LIMIT ===".cyan().bold(),
    };

    eprintln!();
    eprintln!("{}", banner);
    eprintln!("{}", run.summary());
    eprintln!();
    eprintln!("{}", "Best prompt:".bold());
    for component in run.best_candidate.prompt.components() {
        eprintln!("[{}]", component.name.dimmed());
        eprintln!("{}", component.template);
    }
}
