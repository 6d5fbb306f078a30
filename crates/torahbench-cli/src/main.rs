use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{ArgAction, Parser, Subcommand};
use tabled::settings::Style;
use tabled::{Table, Tabled};
use tracing::{info, Level};

use torahbench_core::telemetry::{init_tracing, level_for_verbosity};
use torahbench_core::{
	convert_csv_to_examples, get_scorers, list_scorers, run_evaluation, Implementation, PluginLoader, RunOptions,
	TorahBenchConfig, TorahEvalInput,
};
use torahbench_store::Store;
use torahbench_types::truncate;

#[derive(Debug, Parser)]
#[command(name = "torahbench", version, about = "Discover and run Torah Q&A evaluations")]
struct Cli {
	/// Root of the packages tree (holds `evals/` and `implementations/`)
	#[arg(long, global = true, env = "TORAHBENCH_PACKAGES")]
	packages: Option<PathBuf>,

	/// YAML config file (defaults to ./torahbench.yaml when present)
	#[arg(long, global = true)]
	config: Option<PathBuf>,

	/// Emit logs as JSON lines
	#[arg(long, global = true, action = ArgAction::SetTrue)]
	log_json: bool,

	/// More log output; repeat for more
	#[arg(short, long, global = true, action = ArgAction::Count)]
	verbose: u8,

	#[command(subcommand)]
	command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
	/// List all available evaluation packages
	ListEvaluations,
	/// List all available implementation packages
	ListImplementations {
		/// Only show implementations of this evaluation
		#[arg(long)]
		evaluation: Option<String>,
	},
	/// Show how to run a specific evaluation/implementation pair
	Info {
		/// Evaluation name (e.g. toraheval)
		evaluation: String,
		/// Implementation name (e.g. sofer-ai)
		implementation: String,
	},
	/// Run an evaluation with an implementation
	Run(RunArgs),
	/// List the available scorers
	Scorers,
	/// Convert a questions CSV into an examples JSON file
	ConvertDataset {
		csv_path: PathBuf,
		json_path: PathBuf,
		/// Keep only rows of this query type
		#[arg(long, default_value = "1")]
		query_type: String,
	},
	/// List experiments saved with `run --store`
	Experiments {
		#[arg(long, default_value = "torahbench.db")]
		store: PathBuf,
	},
}

#[derive(Debug, Clone, Parser)]
struct RunArgs {
	/// Evaluation to run (e.g. toraheval)
	evaluation: String,
	/// Implementation to use (e.g. sofer-ai)
	implementation: String,

	/// Dataset file overriding the evaluation's own (.csv, .jsonl or .json)
	#[arg(long)]
	csv_path: Option<PathBuf>,

	/// Evaluate at most this many questions
	#[arg(long)]
	limit: Option<usize>,

	/// Ask a single question instead of running the dataset
	#[arg(long)]
	question: Option<String>,

	/// Context for the single question
	#[arg(long, default_value = "")]
	context: String,

	/// Type of the single question
	#[arg(long, default_value = "general")]
	question_type: String,

	/// Language of the single question
	#[arg(long, default_value = "english")]
	language: String,

	/// Only use CSV rows of this query type
	#[arg(long)]
	query_type: Option<String>,

	/// Comma-separated scorer names, e.g. `levenshtein:0.8,correctness`
	#[arg(long, value_delimiter = ',')]
	scorers: Vec<String>,

	/// Cases in flight
	#[arg(long)]
	concurrency: Option<usize>,

	/// Write the full result as JSON
	#[arg(long)]
	json_out: Option<PathBuf>,

	/// Save the run to this SQLite database
	#[arg(long)]
	store: Option<PathBuf>,

	/// Experiment name prefix used with --store; a UTC timestamp is appended
	#[arg(long)]
	experiment_prefix: Option<String>,
}

#[derive(Tabled)]
struct EvaluationRow {
	#[tabled(rename = "Name")]
	name: String,
	#[tabled(rename = "Version")]
	version: String,
	#[tabled(rename = "Description")]
	description: String,
}

#[derive(Tabled)]
struct ImplementationRow {
	#[tabled(rename = "Service")]
	service: String,
	#[tabled(rename = "Evaluation")]
	evaluation: String,
	#[tabled(rename = "Version")]
	version: String,
	#[tabled(rename = "Description")]
	description: String,
}

#[derive(Tabled)]
struct ExperimentRow {
	#[tabled(rename = "ID")]
	id: i64,
	#[tabled(rename = "Name")]
	name: String,
	#[tabled(rename = "Evaluation")]
	evaluation: String,
	#[tabled(rename = "Implementation")]
	implementation: String,
	#[tabled(rename = "Created")]
	created: String,
	#[tabled(rename = "Pass rate")]
	pass_rate: String,
}

fn render<R: Tabled>(title: &str, rows: Vec<R>) -> String {
	let mut table = Table::new(rows);
	table.with(Style::rounded());
	format!("{title}\n{table}")
}

#[tokio::main]
async fn main() -> Result<()> {
	dotenvy::dotenv().ok();
	let cli = Cli::parse();
	init_tracing(cli.log_json, level_for_verbosity(Level::WARN, cli.verbose));

	let mut config = TorahBenchConfig::load(cli.config.as_deref())?;
	if let Some(root) = cli.packages {
		config.packages_root = root;
	}
	let mut loader = PluginLoader::from_config(config);

	match cli.command {
		Commands::ListEvaluations => list_evaluations(&loader),
		Commands::ListImplementations { evaluation } => list_implementations(&loader, evaluation.as_deref()),
		Commands::Info {
			evaluation,
			implementation,
		} => info_cmd(&loader, &evaluation, &implementation)?,
		Commands::Run(args) => run(&mut loader, args).await?,
		Commands::Scorers => {
			for name in list_scorers() {
				println!("{name}");
			}
		}
		Commands::ConvertDataset {
			csv_path,
			json_path,
			query_type,
		} => {
			let written = convert_csv_to_examples(&csv_path, &json_path, Some(&query_type)).await?;
			println!("Wrote {written} examples to {}", json_path.display());
		}
		Commands::Experiments { store } => list_experiments(&store)?,
	}
	Ok(())
}

fn list_evaluations(loader: &PluginLoader) {
	let evaluations = loader.discovery().list_evaluations();
	if evaluations.is_empty() {
		println!("No evaluation packages found.");
		return;
	}
	let rows = evaluations
		.into_iter()
		.map(|e| EvaluationRow {
			name: e.name,
			version: e.version,
			description: e.description,
		})
		.collect();
	println!("{}", render("Available Evaluations", rows));
}

fn list_implementations(loader: &PluginLoader, evaluation: Option<&str>) {
	let implementations = loader.discovery().list_implementations(evaluation);
	if implementations.is_empty() {
		let filter = evaluation
			.map(|e| format!(" for evaluation '{e}'"))
			.unwrap_or_default();
		println!("No implementation packages found{filter}.");
		return;
	}
	let rows = implementations
		.into_iter()
		.map(|i| ImplementationRow {
			service: i.service_name,
			evaluation: i.evaluation_name,
			version: i.version,
			description: i.description,
		})
		.collect();
	println!("{}", render("Available Implementations", rows));
}

fn not_found(evaluation: &str, implementation: &str) {
	println!("Implementation '{implementation}' not found for evaluation '{evaluation}'");
}

fn info_cmd(loader: &PluginLoader, evaluation: &str, implementation: &str) -> Result<()> {
	let Some(found) = loader.discovery().find_implementation(evaluation, implementation)? else {
		not_found(evaluation, implementation);
		return Ok(());
	};

	println!("Evaluation: {evaluation}");
	println!("Implementation: {implementation}");
	println!("Version: {}", found.version);
	println!("Description: {}", found.description);
	println!("Location: {}", found.location.display());
	println!();
	println!("To run this evaluation:");
	println!("  torahbench run {evaluation} {implementation}");
	println!();
	println!("To ask a single question:");
	println!("  torahbench run {evaluation} {implementation} --question \"What is the first word of the Torah?\"");
	Ok(())
}

async fn run(loader: &mut PluginLoader, args: RunArgs) -> Result<()> {
	let evaluation = args.evaluation.as_str();
	let implementation = args.implementation.as_str();
	if loader.discovery().find_implementation(evaluation, implementation)?.is_none() {
		not_found(evaluation, implementation);
		return Ok(());
	}

	println!("Running {evaluation} with {implementation}...");
	let module = loader.load_implementation_module(evaluation, implementation)?;

	if let Some(question) = args.question.clone() {
		let input = TorahEvalInput::new(question)
			.context(args.context.clone())
			.question_type(args.question_type.clone())
			.language(args.language.clone());
		return ask_one(module.as_ref(), &input).await;
	}

	if !module.supports_dataset_runs() {
		println!("Implementation does not support dataset runs. Please use --question for single tests.");
		return Ok(());
	}

	let eval_module = loader.load_evaluation_module(evaluation)?;
	let config = loader.config();
	let scorer_names = if args.scorers.is_empty() {
		config.run.scorers.clone()
	} else {
		args.scorers.clone()
	};
	let scorers = get_scorers(scorer_names.as_slice(), &config.judge)?;
	let options = RunOptions {
		data_path: args.csv_path.clone(),
		query_type: args.query_type.clone(),
		limit: args.limit,
		concurrency: args.concurrency.unwrap_or(config.run.concurrency),
		scorers,
	};

	info!(evaluation, implementation, scorers = ?scorer_names, "starting dataset run");
	let result = run_evaluation(eval_module.as_ref(), module, options)
		.await
		.with_context(|| format!("running {evaluation} with {implementation}"))?;
	println!("{}", result.summary_table());
	println!("Evaluation completed! Processed {} questions.", result.summary.total);

	if let Some(path) = &args.json_out {
		let json = serde_json::to_string_pretty(&result)?;
		tokio::fs::write(path, json)
			.await
			.with_context(|| format!("writing {}", path.display()))?;
	}

	if let Some(path) = &args.store {
		let name = experiment_name(&args, Utc::now());
		let id = Store::open(path)?.save_experiment(&name, evaluation, implementation, &result)?;
		println!("Saved experiment '{name}' (id {id}) to {}", path.display());
	}
	Ok(())
}

/// `<prefix>-<YYYYmmdd-HHMMSS>`, the prefix defaulting to `<implementation>-<evaluation>`.
fn experiment_name(args: &RunArgs, at: DateTime<Utc>) -> String {
	let prefix = args
		.experiment_prefix
		.clone()
		.unwrap_or_else(|| format!("{}-{}", args.implementation, args.evaluation));
	format!("{}-{}", prefix, at.format("%Y%m%d-%H%M%S"))
}

async fn ask_one(module: &dyn Implementation, input: &TorahEvalInput) -> Result<()> {
	println!("Question: {}", input.question);
	println!("Implementation: {}", module.implementation_name());
	println!();

	let output = module.evaluate(input).await?;
	println!("Result:");
	println!("Answer: {}", output.answer);
	println!("Confidence: {}", output.confidence);
	if let Some(reasoning) = &output.reasoning {
		println!("Reasoning: {reasoning}");
	}
	if !output.sources_used.is_empty() {
		println!("Sources: {}", output.sources_used.join(", "));
	}
	Ok(())
}

fn list_experiments(path: &Path) -> Result<()> {
	let experiments = Store::open(path)?.list_experiments()?;
	if experiments.is_empty() {
		println!("No experiments saved in {}.", path.display());
		return Ok(());
	}
	let rows = experiments
		.into_iter()
		.map(|e| ExperimentRow {
			id: e.id,
			name: truncate(&e.name, 40),
			evaluation: e.evaluation,
			implementation: e.implementation,
			created: e.created_at.format("%Y-%m-%d %H:%M").to_string(),
			pass_rate: e
				.summary
				.map(|s| format!("{:.1}%", s.pass_rate * 100.0))
				.unwrap_or_default(),
		})
		.collect();
	println!("{}", render("Experiments", rows));
	Ok(())
}
