use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Result};
use futures::stream::{self, StreamExt};
use tracing::{debug, info};

use torahbench_types::{CaseResult, EvalResult, Score, TestCase};

use crate::datasource::{data_source_for_path_with_query_type, DataSource};
use crate::module::{EvaluationModule, Implementation};
use crate::scorer::Scorer;
use crate::trace::scope_traces;

pub struct EvalBuilder {
	data_source: Option<Arc<dyn DataSource>>,
	implementation: Option<Arc<dyn Implementation>>,
	scorers: Vec<Arc<dyn Scorer>>,
	concurrency: usize,
	limit: Option<usize>,
}

impl EvalBuilder {
	pub fn new() -> Self {
		Self {
			data_source: None,
			implementation: None,
			scorers: Vec::new(),
			concurrency: 4,
			limit: None,
		}
	}

	pub fn data_source(mut self, data_source: Arc<dyn DataSource>) -> Self {
		self.data_source = Some(data_source);
		self
	}

	pub fn implementation(mut self, implementation: Arc<dyn Implementation>) -> Self {
		self.implementation = Some(implementation);
		self
	}

	pub fn scorers<I>(mut self, scorers: I) -> Self
	where
		I: IntoIterator<Item = Arc<dyn Scorer>>,
	{
		self.scorers = scorers.into_iter().collect();
		self
	}

	pub fn add_scorer(mut self, scorer: Arc<dyn Scorer>) -> Self {
		self.scorers.push(scorer);
		self
	}

	pub fn concurrency(mut self, n: usize) -> Self {
		self.concurrency = n.max(1);
		self
	}

	/// Evaluate at most `n` cases, taken from the start of the dataset.
	pub fn limit(mut self, n: Option<usize>) -> Self {
		self.limit = n;
		self
	}

	pub fn build(self) -> Result<Eval> {
		Ok(Eval {
			data_source: self.data_source.ok_or_else(|| anyhow::anyhow!("data_source must be set"))?,
			implementation: self.implementation.ok_or_else(|| anyhow::anyhow!("implementation must be set"))?,
			scorers: self.scorers,
			concurrency: self.concurrency,
			limit: self.limit,
		})
	}
}

impl Default for EvalBuilder {
	fn default() -> Self {
		Self::new()
	}
}

pub struct Eval {
	data_source: Arc<dyn DataSource>,
	implementation: Arc<dyn Implementation>,
	scorers: Vec<Arc<dyn Scorer>>,
	concurrency: usize,
	limit: Option<usize>,
}

impl Eval {
	pub fn builder() -> EvalBuilder {
		EvalBuilder::new()
	}

	pub async fn run(&self) -> Result<EvalResult> {
		let mut cases = self.data_source.load().await?;
		if let Some(limit) = self.limit {
			cases.truncate(limit);
		}
		info!(
			implementation = self.implementation.implementation_name(),
			cases = cases.len(),
			"running evaluation"
		);

		let results = self.run_cases(cases).await;
		let summary = EvalResult::summarize(&results);
		Ok(EvalResult {
			implementation: self.implementation.implementation_name().to_string(),
			cases: results,
			summary,
		})
	}

	async fn run_cases(&self, cases: Vec<TestCase>) -> Vec<CaseResult> {
		let implementation = self.implementation.clone();
		let scorers = self.scorers.clone();
		let stream = stream::iter(cases.into_iter().enumerate()).map(move |(idx, case)| {
			let implementation = implementation.clone();
			let scorers = scorers.clone();
			async move {
				let (answered, mut traces) = scope_traces(implementation.evaluate(&case.input)).await;
				let result = match answered {
					Ok(output) => {
						let (scores, judge_traces) = scope_traces(score_case(&scorers, &case, &output)).await;
						traces.extend(judge_traces);
						CaseResult {
							case,
							output: Some(output),
							error: None,
							scores,
							traces,
						}
					}
					Err(err) => {
						debug!("case {} failed: {:#}", idx + 1, err);
						CaseResult {
							case,
							output: None,
							error: Some(format!("{err:#}")),
							scores: Vec::new(),
							traces,
						}
					}
				};
				(idx, result)
			}
		});

		let mut results: Vec<(usize, CaseResult)> = stream
			.buffer_unordered(self.concurrency)
			.collect()
			.await;
		results.sort_by_key(|(idx, _)| *idx);
		results.into_iter().map(|(_, r)| r).collect()
	}
}

async fn score_case(scorers: &[Arc<dyn Scorer>], case: &TestCase, output: &torahbench_types::TorahEvalOutput) -> Vec<Score> {
	let mut scores = Vec::with_capacity(scorers.len());
	for s in scorers {
		match s.score(case, output).await {
			Ok(score) => scores.push(score),
			Err(err) => scores.push(Score::failed(s.name(), format!("{err:#}"))),
		}
	}
	scores
}

/// Options for a full-dataset run.
pub struct RunOptions {
	/// Dataset file overriding the evaluation's own (`.csv`, `.jsonl`, `.json`)
	pub data_path: Option<PathBuf>,
	/// Only keep CSV rows of this query type
	pub query_type: Option<String>,
	pub limit: Option<usize>,
	pub concurrency: usize,
	pub scorers: Vec<Arc<dyn Scorer>>,
}

impl Default for RunOptions {
	fn default() -> Self {
		Self {
			data_path: None,
			query_type: None,
			limit: None,
			concurrency: 4,
			scorers: Vec::new(),
		}
	}
}

/// Run `implementation` over a whole dataset: the file in `options` if given,
/// else the evaluation's default one.
pub async fn run_evaluation(
	evaluation: &dyn EvaluationModule,
	implementation: Arc<dyn Implementation>,
	options: RunOptions,
) -> Result<EvalResult> {
	if !implementation.supports_dataset_runs() {
		bail!(
			"implementation '{}' does not support dataset runs",
			implementation.implementation_name()
		);
	}

	let query_type = options.query_type.as_deref();
	let data: Arc<dyn DataSource> = match options.data_path {
		Some(path) => data_source_for_path_with_query_type(path, query_type)?,
		None => evaluation.dataset_for_query_type(query_type)?,
	};

	Eval::builder()
		.data_source(data)
		.implementation(implementation)
		.scorers(options.scorers)
		.concurrency(options.concurrency)
		.limit(options.limit)
		.build()?
		.run()
		.await
}
