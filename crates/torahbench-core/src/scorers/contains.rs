use anyhow::Result;
use async_trait::async_trait;

use torahbench_types::{Score, TestCase, TorahEvalOutput};

use crate::scorer::Scorer;

/// Checks that the answer contains a substring: a fixed one, or the case's
/// reference answer.
pub struct ContainsScorer {
    needle: Option<String>,
    case_sensitive: bool,
}

impl ContainsScorer {
    /// Case-sensitive check for a fixed substring.
    pub fn new(substring: impl Into<String>) -> Self {
        Self {
            needle: Some(substring.into()),
            case_sensitive: true,
        }
    }

    /// Case-insensitive check for a fixed substring.
    pub fn case_insensitive(substring: impl Into<String>) -> Self {
        Self {
            needle: Some(substring.into()),
            case_sensitive: false,
        }
    }

    /// Case-insensitive check for each case's reference answer.
    pub fn expected_answer() -> Self {
        Self {
            needle: None,
            case_sensitive: false,
        }
    }
}

#[async_trait]
impl Scorer for ContainsScorer {
    fn name(&self) -> &str {
        "contains"
    }

    async fn score(&self, case: &TestCase, output: &TorahEvalOutput) -> Result<Score> {
        let needle = self.needle.as_deref().unwrap_or(case.expected.trim());

        let contains = if self.case_sensitive {
            output.answer.contains(needle)
        } else {
            output.answer.to_lowercase().contains(&needle.to_lowercase())
        };

        Ok(Score {
            details: Some(serde_json::json!({
                "substring": needle,
                "case_sensitive": self.case_sensitive,
                "found": contains
            })),
            ..Score::boolean(self.name(), contains)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use torahbench_types::TorahEvalInput;

    fn fixture(answer: &str) -> (TestCase, TorahEvalOutput) {
        let input = TorahEvalInput::new("Who led the Exodus?");
        let output = TorahEvalOutput::answer_for(&input, answer, 1.0);
        (TestCase::new(input, "Moshe"), output)
    }

    #[tokio::test]
    async fn fixed_substring_found() {
        let (case, output) = fixture("It was Moshe Rabbenu");
        let score = ContainsScorer::new("Rabbenu").score(&case, &output).await.unwrap();
        assert!(score.passed);
        assert_eq!(score.value, 1.0);
    }

    #[tokio::test]
    async fn case_sensitive_miss() {
        let (case, output) = fixture("It was Moshe Rabbenu");
        let score = ContainsScorer::new("RABBENU").score(&case, &output).await.unwrap();
        assert!(!score.passed);
        assert_eq!(score.value, 0.0);
    }

    #[tokio::test]
    async fn case_insensitive_hit() {
        let (case, output) = fixture("It was Moshe Rabbenu");
        let score = ContainsScorer::case_insensitive("RABBENU").score(&case, &output).await.unwrap();
        assert!(score.passed);
    }

    #[tokio::test]
    async fn reference_answer_mode() {
        let (case, output) = fixture("Clearly MOSHE led them.");
        assert!(ContainsScorer::expected_answer().score(&case, &output).await.unwrap().passed);

        let (case, output) = fixture("Aharon spoke for him.");
        let score = ContainsScorer::expected_answer().score(&case, &output).await.unwrap();
        assert!(!score.passed);
        assert_eq!(score.details.unwrap()["substring"], "Moshe");
    }
}
