//! torahbench-core: package discovery, plugin loading and the evaluation runner
//! behind the `torahbench` CLI.
//!
//! A packages tree holds `evals/<evaluation>/` and
//! `implementations/<service>/<evaluation>/` directories, each optionally
//! carrying a descriptor. [`Discovery`] enumerates them, [`PluginLoader`]
//! turns them into live [`EvaluationModule`] / [`Implementation`] handles, and
//! [`Eval`] runs an implementation over a dataset with scorers.

pub mod anthropic;
pub mod config;
pub mod datasource;
pub mod descriptor;
pub mod discovery;
pub mod error;
pub mod loader;
pub mod module;
pub mod packages;
pub mod runner;
pub mod scorer;
pub mod task;
pub mod telemetry;
pub mod testing;
pub mod trace;

pub mod scorers {
    pub mod contains;
    pub mod exact;
    pub mod levenshtein;
    pub mod llm_judge;
}

pub use config::TorahBenchConfig;
pub use datasource::{
    convert_csv_to_examples, data_source_for_path, data_source_for_path_with_query_type, CsvDataSource, DataSource, ExamplesJsonDataSource,
    JsonlDataSource, VecDataSource,
};
pub use descriptor::{parse_descriptor, read_descriptor, PackageMetadata};
pub use discovery::{Discovery, EvaluationDescriptor, ImplementationDescriptor};
pub use error::{DiscoveryError, DiscoveryResult, PackageKind};
pub use loader::{PluginContext, PluginLoader, PluginRegistry};
pub use module::{EvaluationModule, Implementation};
pub use runner::{run_evaluation, Eval, EvalBuilder, RunOptions};
pub use scorer::{get_scorers, list_scorers, Scorer};
pub use scorers::{
    contains::ContainsScorer,
    exact::ExactMatchScorer,
    levenshtein::LevenshteinScorer,
    llm_judge::{Criterion, LlmJudgeScorer},
};
pub use task::from_async_fn;
pub use torahbench_types::{
    truncate, CaseResult, EvalResult, EvalSummary, Score, TestCase, TokenUsage, TorahEvalInput, TorahEvalOutput,
    Trace,
};
