use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;

use torahbench_types::{Score, TestCase, TorahEvalOutput};

use crate::config::JudgeConfig;
use crate::scorers::{
    contains::ContainsScorer,
    exact::ExactMatchScorer,
    levenshtein::LevenshteinScorer,
    llm_judge::{Criterion, LlmJudgeScorer},
};

#[async_trait]
pub trait Scorer: Send + Sync {
    fn name(&self) -> &str;
    async fn score(&self, case: &TestCase, output: &TorahEvalOutput) -> Result<Score>;
}

const DEFAULT_LEVENSHTEIN: f64 = 0.6;

/// Names accepted by [`get_scorers`]. `levenshtein` and `contains` take an
/// optional argument after a colon (`levenshtein:0.8`, `contains:Bereshit`).
pub fn list_scorers() -> Vec<&'static str> {
    let mut names = vec!["exact_match", "contains", "levenshtein"];
    names.extend(Criterion::ALL.iter().map(|c| c.name()));
    names
}

/// Build scorers by name. Unknown names are an error listing what is available.
pub fn get_scorers<S: AsRef<str>>(names: &[S], judge: &JudgeConfig) -> Result<Vec<Arc<dyn Scorer>>> {
    names.iter().map(|n| scorer_by_name(n.as_ref().trim(), judge)).collect()
}

fn scorer_by_name(entry: &str, judge: &JudgeConfig) -> Result<Arc<dyn Scorer>> {
    let (name, arg) = match entry.split_once(':') {
        Some((name, arg)) => (name, Some(arg)),
        None => (entry, None),
    };

    let scorer: Arc<dyn Scorer> = match (name, arg) {
        ("exact_match", None) => Arc::new(ExactMatchScorer),
        ("contains", None) => Arc::new(ContainsScorer::expected_answer()),
        ("contains", Some(substring)) => Arc::new(ContainsScorer::case_insensitive(substring)),
        ("levenshtein", arg) => {
            let threshold = match arg {
                Some(raw) => raw
                    .parse::<f64>()
                    .with_context(|| format!("Invalid levenshtein threshold '{raw}'"))?,
                None => DEFAULT_LEVENSHTEIN,
            };
            Arc::new(LevenshteinScorer::new(threshold))
        }
        (name, None) => match Criterion::from_name(name) {
            Some(criterion) => Arc::new(LlmJudgeScorer::from_config(criterion, judge)?),
            None => return Err(unknown(entry)),
        },
        _ => return Err(unknown(entry)),
    };
    Ok(scorer)
}

fn unknown(entry: &str) -> anyhow::Error {
    anyhow!("Evaluator '{}' not found. Available: {}", entry, list_scorers().join(", "))
}
