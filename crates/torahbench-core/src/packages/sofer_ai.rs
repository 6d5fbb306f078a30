//! Mock Sofer.AI backend.

use anyhow::Result;
use async_trait::async_trait;
use torahbench_types::{TorahEvalInput, TorahEvalOutput};

use crate::module::Implementation;

pub const NAME: &str = "sofer-ai";

const SHABBAT_ANSWER: &str = "Shabbat is a weekly day of rest and spiritual renewal in Jewish practice, \
observed from Friday evening to Saturday evening. It commemorates God's rest after the six days of \
creation and represents a fundamental pillar of Jewish life, providing time for prayer, family, and \
reflection while abstaining from work.";

pub struct SoferAi;

#[async_trait]
impl Implementation for SoferAi {
    fn implementation_name(&self) -> &str {
        NAME
    }

    async fn evaluate(&self, input: &TorahEvalInput) -> Result<TorahEvalOutput> {
        let answer = if input.question.to_lowercase().contains("shabbat") {
            SHABBAT_ANSWER.to_string()
        } else {
            format!(
                "This is a mock response to the question: {}. In a real implementation, this would be \
                 answered by the Sofer.AI model using Torah knowledge and sources.",
                input.question
            )
        };

        Ok(TorahEvalOutput::answer_for(input, answer, 0.8)
            .reasoning("Generated using mock Sofer.AI implementation")
            .meta("implementation", "sofer-ai-mock")
            .meta("version", env!("CARGO_PKG_VERSION")))
    }

    fn supports_dataset_runs(&self) -> bool {
        true
    }
}
