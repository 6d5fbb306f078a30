//! Deterministic stand-in for the Dicta backend until its API is wired.

use anyhow::Result;
use async_trait::async_trait;
use torahbench_types::{TorahEvalInput, TorahEvalOutput};

use crate::module::Implementation;

pub const NAME: &str = "dicta";

pub struct Dicta;

#[async_trait]
impl Implementation for Dicta {
    fn implementation_name(&self) -> &str {
        NAME
    }

    async fn evaluate(&self, input: &TorahEvalInput) -> Result<TorahEvalOutput> {
        Ok(TorahEvalOutput::answer_for(
            input,
            format!("[DICTA stub] Answer to: \"{}\"", input.question),
            1.0,
        )
        .reasoning("Stubbed, API not wired yet.")
        .meta("note", "stub-implementation")
        .meta("specializes_in", "hebrew_aramaic"))
    }
}
