use std::future::Future;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use torahbench_types::{TorahEvalInput, TorahEvalOutput};

use crate::module::Implementation;

/// Wrap an async closure as an `Implementation`. Closure implementations
/// support dataset runs.
pub fn from_async_fn<F, Fut>(name: impl Into<String>, f: F) -> Arc<dyn Implementation>
where
	F: Send + Sync + 'static + Fn(&TorahEvalInput) -> Fut,
	Fut: Future<Output = Result<TorahEvalOutput>> + Send + 'static,
{
	struct ClosureImplementation<F> {
		name: String,
		f: F,
	}

	#[async_trait]
	impl<F, Fut> Implementation for ClosureImplementation<F>
	where
		F: Send + Sync + 'static + Fn(&TorahEvalInput) -> Fut,
		Fut: Future<Output = Result<TorahEvalOutput>> + Send + 'static,
	{
		fn implementation_name(&self) -> &str {
			&self.name
		}

		async fn evaluate(&self, input: &TorahEvalInput) -> Result<TorahEvalOutput> {
			(self.f)(input).await
		}

		fn supports_dataset_runs(&self) -> bool {
			true
		}
	}

	Arc::new(ClosureImplementation { name: name.into(), f })
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn closure_implementation_answers() {
		let echo = from_async_fn("echo", |input| {
			let input = input.clone();
			async move { Ok(TorahEvalOutput::answer_for(&input, input.question.to_uppercase(), 0.5)) }
		});
		assert_eq!(echo.implementation_name(), "echo");
		assert!(echo.supports_dataset_runs());

		let out = echo.evaluate(&TorahEvalInput::new("shalom")).await.unwrap();
		assert_eq!(out.answer, "SHALOM");

		let batch = echo
			.evaluate_batch(&[TorahEvalInput::new("a"), TorahEvalInput::new("b")])
			.await
			.unwrap();
		assert_eq!(batch.iter().map(|o| o.answer.as_str()).collect::<Vec<_>>(), vec!["A", "B"]);
	}
}
