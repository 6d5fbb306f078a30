//! Threshold assertions for use inside `#[tokio::test]` functions.
//!
//! ```ignore
//! let result = Eval::builder()
//!     .data_source(data)
//!     .implementation(implementation)
//!     .scorers(scorers)
//!     .build()?
//!     .run()
//!     .await?;
//! assert_eval_pass_rate(&result, 0.8)?;
//! ```

use anyhow::Result;
use torahbench_types::EvalResult;

pub fn assert_eval_pass_rate(result: &EvalResult, min_pass_rate: f64) -> Result<()> {
	if result.summary.pass_rate < min_pass_rate {
		anyhow::bail!(
			"{}: pass rate {:.1}% is below threshold {:.1}%\n{}",
			result.implementation,
			result.summary.pass_rate * 100.0,
			min_pass_rate * 100.0,
			result.summary_table()
		);
	}
	Ok(())
}

pub fn assert_eval_avg_score(result: &EvalResult, min_avg_score: f64) -> Result<()> {
	if result.summary.avg_score < min_avg_score {
		anyhow::bail!(
			"{}: avg score {:.3} is below threshold {:.3}\n{}",
			result.implementation,
			result.summary.avg_score,
			min_avg_score,
			result.summary_table()
		);
	}
	Ok(())
}

/// Every case answered without error and passed all of its scorers.
pub fn assert_eval_all_passed(result: &EvalResult) -> Result<()> {
	if result.summary.passed != result.summary.total {
		anyhow::bail!(
			"{}: {}/{} cases passed ({} errored)\n{}",
			result.implementation,
			result.summary.passed,
			result.summary.total,
			result.summary.errored,
			result.summary_table()
		);
	}
	Ok(())
}
