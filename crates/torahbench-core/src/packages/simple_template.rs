//! Keyword-template baseline.

use anyhow::Result;
use async_trait::async_trait;
use torahbench_types::{TorahEvalInput, TorahEvalOutput};

use crate::module::Implementation;

pub const NAME: &str = "simple-template";

const TEMPLATES: &[(&[&str], &str)] = &[
    (
        &["divrei yoel", "divrey yoel"],
        "This question relates to Divrei Yoel, a collection of Hasidic teachings. I would need to \
         consult the specific text to provide an accurate answer.",
    ),
    (
        &["moses", "moshe"],
        "This question concerns Moses (Moshe Rabbenu), the greatest of the prophets and leader of \
         the Jewish people.",
    ),
    (
        &["prayer", "tefillah"],
        "This relates to Jewish prayer and spiritual practice. Prayer is a fundamental aspect of \
         Jewish worship.",
    ),
];

const FALLBACK: &str = "This appears to be a Torah-related question that would require careful study \
of the relevant sources to answer properly.";

pub struct SimpleTemplate;

pub fn template_answer(question: &str) -> &'static str {
    let question = question.to_lowercase();
    TEMPLATES
        .iter()
        .find(|(keywords, _)| keywords.iter().any(|k| question.contains(k)))
        .map(|(_, answer)| *answer)
        .unwrap_or(FALLBACK)
}

#[async_trait]
impl Implementation for SimpleTemplate {
    fn implementation_name(&self) -> &str {
        NAME
    }

    async fn evaluate(&self, input: &TorahEvalInput) -> Result<TorahEvalOutput> {
        Ok(TorahEvalOutput::answer_for(input, template_answer(&input.question), 0.3)
            .meta("implementation", "keyword-template"))
    }

    fn supports_dataset_runs(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keywords_pick_templates_in_order() {
        assert!(template_answer("What does Divrei Yoel say about Moshe?").contains("Divrei Yoel"));
        assert!(template_answer("Tell me about MOSHE rabbenu").contains("Moshe Rabbenu"));
        assert!(template_answer("laws of tefillah").contains("prayer"));
        assert_eq!(template_answer("Who was Hillel?"), FALLBACK);
    }
}
