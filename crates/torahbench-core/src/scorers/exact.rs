use anyhow::Result;
use async_trait::async_trait;

use torahbench_types::{Score, TestCase, TorahEvalOutput};

use crate::scorer::Scorer;

/// Answer equals the reference, ignoring surrounding whitespace.
pub struct ExactMatchScorer;

#[async_trait]
impl Scorer for ExactMatchScorer {
	fn name(&self) -> &str {
		"exact_match"
	}

	async fn score(&self, case: &TestCase, output: &TorahEvalOutput) -> Result<Score> {
		let passed = case.expected.trim() == output.answer.trim();
		Ok(Score::boolean(self.name(), passed))
	}
}
