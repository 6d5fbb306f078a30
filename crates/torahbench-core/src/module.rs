//! Contracts that loaded packages satisfy.

use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use torahbench_types::{TorahEvalInput, TorahEvalOutput};

use crate::datasource::DataSource;

/// An answer-generation backend bound to one evaluation and one service.
#[async_trait]
pub trait Implementation: Send + Sync {
    fn implementation_name(&self) -> &str;

    async fn evaluate(&self, input: &TorahEvalInput) -> Result<TorahEvalOutput>;

    async fn evaluate_batch(&self, inputs: &[TorahEvalInput]) -> Result<Vec<TorahEvalOutput>> {
        let mut outputs = Vec::with_capacity(inputs.len());
        for input in inputs {
            outputs.push(self.evaluate(input).await?);
        }
        Ok(outputs)
    }

    /// Whether full-dataset runs are offered. Stubs answer single questions only.
    fn supports_dataset_runs(&self) -> bool {
        false
    }
}

/// A named question set.
pub trait EvaluationModule: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    /// Dataset used when a run does not name one explicitly.
    fn dataset(&self) -> Arc<dyn DataSource>;

    /// The default dataset restricted to one query type. Evaluations that
    /// cannot filter refuse instead of running every row.
    fn dataset_for_query_type(&self, query_type: Option<&str>) -> Result<Arc<dyn DataSource>> {
        match query_type {
            None => Ok(self.dataset()),
            Some(query_type) => bail!(
                "evaluation '{}' cannot filter its dataset by query type '{}'",
                self.name(),
                query_type
            ),
        }
    }
}
