use anyhow::Result;
use async_trait::async_trait;
use strsim::normalized_levenshtein;

use torahbench_types::{Score, TestCase, TorahEvalOutput};

use crate::scorer::Scorer;

/// Character-level similarity between answer and reference, normalised to `0.0..=1.0`.
pub struct LevenshteinScorer {
    pub min_similarity: f64,
}

impl LevenshteinScorer {
    pub fn new(min_similarity: f64) -> Self {
        Self { min_similarity }
    }
}

#[async_trait]
impl Scorer for LevenshteinScorer {
    fn name(&self) -> &str {
        "levenshtein"
    }

    async fn score(&self, case: &TestCase, output: &TorahEvalOutput) -> Result<Score> {
        let similarity = normalized_levenshtein(case.expected.trim(), output.answer.trim());
        Ok(Score {
            name: self.name().to_string(),
            value: similarity,
            passed: similarity >= self.min_similarity,
            details: Some(serde_json::json!({ "threshold": self.min_similarity })),
        })
    }
}
