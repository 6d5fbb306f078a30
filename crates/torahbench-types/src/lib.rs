use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::SystemTime;
use tabled::Tabled;

/// A single question posed to an implementation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TorahEvalInput {
    pub question: String,

    #[serde(default)]
    pub context: String,

    /// Free-form category, e.g. "general" or "source_finding"
    #[serde(default = "default_question_type")]
    pub question_type: String,

    #[serde(default = "default_language")]
    pub language: String,

    /// Sources the question refers to, passed through to the answer
    #[serde(default)]
    pub sources: Vec<String>,
}

fn default_question_type() -> String {
    "general".to_string()
}

fn default_language() -> String {
    "english".to_string()
}

impl TorahEvalInput {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            context: String::new(),
            question_type: default_question_type(),
            language: default_language(),
            sources: Vec::new(),
        }
    }

    pub fn context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }

    pub fn question_type(mut self, question_type: impl Into<String>) -> Self {
        self.question_type = question_type.into();
        self
    }

    pub fn language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn sources(mut self, sources: Vec<String>) -> Self {
        self.sources = sources;
        self
    }
}

/// The answer an implementation produces for a [`TorahEvalInput`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TorahEvalOutput {
    pub answer: String,

    /// Self-reported confidence, always within `0.0..=1.0`
    pub confidence: f64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,

    #[serde(default)]
    pub sources_used: Vec<String>,

    pub language: String,

    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl TorahEvalOutput {
    /// Build an answer for `input`, carrying over its sources and language.
    pub fn answer_for(input: &TorahEvalInput, answer: impl Into<String>, confidence: f64) -> Self {
        Self {
            answer: answer.into(),
            confidence: confidence.clamp(0.0, 1.0),
            reasoning: None,
            sources_used: input.sources.clone(),
            language: input.language.clone(),
            metadata: Map::new(),
        }
    }

    /// Answer-shaped payload for a failed upstream call. The run keeps going with it.
    pub fn degraded(input: &TorahEvalInput, message: impl Into<String>) -> Self {
        let message = message.into();
        let mut out = Self::answer_for(input, message.clone(), 0.0);
        out.metadata.insert("error".to_string(), Value::String(message));
        out
    }

    pub fn reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = Some(reasoning.into());
        self
    }

    pub fn meta(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn is_degraded(&self) -> bool {
        self.metadata.contains_key("error")
    }
}

/// Trace data for a single upstream call made while answering a case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trace {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    pub start: SystemTime,

    pub end: SystemTime,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,

    /// Model or endpoint that served the call
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    pub input: Value,

    pub output: Value,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub total_tokens: u32,
}

impl TokenUsage {
    pub fn new(input_tokens: u32, output_tokens: u32) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens: input_tokens + output_tokens,
        }
    }
}

impl Trace {
    pub fn start_now() -> TraceBuilder {
        TraceBuilder {
            start: SystemTime::now(),
            id: None,
            model: None,
            metadata: None,
        }
    }
}

pub struct TraceBuilder {
    start: SystemTime,
    id: Option<String>,
    model: Option<String>,
    metadata: Option<Value>,
}

impl TraceBuilder {
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    fn elapsed(&self) -> (SystemTime, Option<u64>) {
        let end = SystemTime::now();
        let duration_ms = end
            .duration_since(self.start)
            .ok()
            .map(|d| d.as_millis() as u64);
        (end, duration_ms)
    }

    pub fn finish(self, input: Value, output: Value, usage: Option<TokenUsage>) -> Trace {
        let (end, duration_ms) = self.elapsed();
        Trace {
            id: self.id,
            start: self.start,
            end,
            duration_ms,
            model: self.model,
            input,
            output,
            usage,
            metadata: self.metadata,
            error: None,
        }
    }

    pub fn finish_with_error(self, input: Value, error: String) -> Trace {
        let (end, duration_ms) = self.elapsed();
        Trace {
            id: self.id,
            start: self.start,
            end,
            duration_ms,
            model: self.model,
            input,
            output: Value::Null,
            usage: None,
            metadata: self.metadata,
            error: Some(error),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
	pub id: Option<String>,
	pub input: TorahEvalInput,
	/// Reference answer the output is scored against
	pub expected: String,
}

impl TestCase {
	pub fn new(input: TorahEvalInput, expected: impl Into<String>) -> Self {
		Self { id: None, input, expected: expected.into() }
	}

	pub fn with_id(id: impl Into<String>, input: TorahEvalInput, expected: impl Into<String>) -> Self {
		Self { id: Some(id.into()), input, expected: expected.into() }
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Score {
	pub name: String,
	pub value: f64,
	pub passed: bool,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub details: Option<Value>,
}

impl Score {
	pub fn boolean(name: impl Into<String>, passed: bool) -> Self {
		Self {
			name: name.into(),
			value: if passed { 1.0 } else { 0.0 },
			passed,
			details: None,
		}
	}

	pub fn failed(name: impl Into<String>, error: impl std::fmt::Display) -> Self {
		Self {
			name: name.into(),
			value: 0.0,
			passed: false,
			details: Some(serde_json::json!({ "error": error.to_string() })),
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseResult {
	pub case: TestCase,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub output: Option<TorahEvalOutput>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
	pub scores: Vec<Score>,
	#[serde(skip_serializing_if = "Vec::is_empty", default)]
	pub traces: Vec<Trace>,
}

impl CaseResult {
	pub fn passed(&self) -> bool {
		!self.scores.is_empty() && self.scores.iter().all(|s| s.passed)
	}

	pub fn avg_score(&self) -> f64 {
		if self.scores.is_empty() {
			return 0.0;
		}
		let sum: f64 = self.scores.iter().map(|s| s.value).sum();
		sum / (self.scores.len() as f64)
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalSummary {
	pub total: usize,
	pub passed: usize,
	pub errored: usize,
	pub pass_rate: f64,
	pub avg_score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalResult {
	pub implementation: String,
	pub cases: Vec<CaseResult>,
	pub summary: EvalSummary,
}

#[derive(Debug, Clone, Serialize, Deserialize, Tabled)]
struct SummaryRow {
	id: String,
	passed: String,
	avg_score: String,
	question: String,
	answer: String,
	expected: String,
}

impl EvalResult {
	pub fn summarize(cases: &[CaseResult]) -> EvalSummary {
		let total = cases.len();
		let mut passed = 0usize;
		let mut errored = 0usize;
		let mut score_sum = 0.0f64;
		let mut score_count = 0usize;

		for cr in cases {
			if cr.passed() {
				passed += 1;
			}
			if cr.error.is_some() || cr.output.as_ref().is_some_and(|o| o.is_degraded()) {
				errored += 1;
			}
			for s in &cr.scores {
				score_sum += s.value;
				score_count += 1;
			}
		}

		let pass_rate = if total == 0 { 0.0 } else { passed as f64 / total as f64 };
		let avg_score = if score_count == 0 { 0.0 } else { score_sum / score_count as f64 };

		EvalSummary { total, passed, errored, pass_rate, avg_score }
	}

	pub fn summary_table(&self) -> String {
        use tabled::Table;
		let rows: Vec<SummaryRow> = self.cases.iter().enumerate().map(|(idx, cr)| {
			let id = cr.case.id.clone().unwrap_or_else(|| (idx + 1).to_string());
			let answer = match (&cr.output, &cr.error) {
				(Some(out), _) => out.answer.clone(),
				(None, Some(err)) => format!("error: {err}"),
				(None, None) => String::new(),
			};

			SummaryRow {
				id,
				passed: if cr.passed() { "✓" } else { " " }.to_string(),
				avg_score: format!("{:.3}", cr.avg_score()),
				question: truncate(&cr.case.input.question, 48),
				answer: truncate(&answer, 64),
				expected: truncate(&cr.case.expected, 48),
			}
		}).collect();

		let table = Table::new(rows);

		let summary_text = format!(
			"Implementation: {}  Total: {}  Passed: {}  Errors: {}  Pass rate: {:.1}%  Avg score: {:.3}",
			self.implementation,
			self.summary.total,
			self.summary.passed,
			self.summary.errored,
			self.summary.pass_rate * 100.0,
			self.summary.avg_score
		);

		format!("{}\n\n{}\n", table, summary_text)
	}
}

pub fn truncate(s: &str, max_len: usize) -> String {
	let flat = s.replace('\n', " ");
	if flat.chars().count() <= max_len {
		return flat;
	}
	let mut truncated = flat.chars().take(max_len.saturating_sub(1)).collect::<String>();
	truncated.push('…');
	truncated
}

#[cfg(test)]
mod tests {
	use super::*;

	fn case_result(scores: Vec<Score>) -> CaseResult {
		let input = TorahEvalInput::new("Who led the Exodus?");
		CaseResult {
			output: Some(TorahEvalOutput::answer_for(&input, "Moshe", 0.9)),
			case: TestCase::new(input, "Moshe Rabbenu"),
			error: None,
			scores,
			traces: Vec::new(),
		}
	}

	#[test]
	fn answer_for_clamps_confidence_and_carries_input_fields() {
		let input = TorahEvalInput::new("q")
			.language("hebrew")
			.sources(vec!["Bereshit 1:1".to_string()]);
		let out = TorahEvalOutput::answer_for(&input, "a", 1.7);
		assert_eq!(out.confidence, 1.0);
		assert_eq!(out.language, "hebrew");
		assert_eq!(out.sources_used, vec!["Bereshit 1:1".to_string()]);
		assert!(!out.is_degraded());
	}

	#[test]
	fn degraded_output_is_flagged() {
		let input = TorahEvalInput::new("q");
		let out = TorahEvalOutput::degraded(&input, "Error: boom");
		assert_eq!(out.answer, "Error: boom");
		assert_eq!(out.confidence, 0.0);
		assert!(out.is_degraded());
	}

	#[test]
	fn input_defaults_when_deserialized() {
		let input: TorahEvalInput = serde_json::from_str(r#"{"question":"q"}"#).unwrap();
		assert_eq!(input.question_type, "general");
		assert_eq!(input.language, "english");
		assert!(input.sources.is_empty());
	}

	#[test]
	fn summarize_counts_passes_and_errors() {
		let mut errored = case_result(Vec::new());
		errored.output = None;
		errored.error = Some("timeout".to_string());
		let cases = vec![
			case_result(vec![Score::boolean("exact_match", true)]),
			case_result(vec![Score::boolean("exact_match", true), Score::boolean("contains", false)]),
			errored,
		];

		let summary = EvalResult::summarize(&cases);
		assert_eq!(summary.total, 3);
		assert_eq!(summary.passed, 1);
		assert_eq!(summary.errored, 1);
		assert!((summary.avg_score - 2.0 / 3.0).abs() < 1e-9);
	}

	#[test]
	fn summary_table_mentions_implementation() {
		let cases = vec![case_result(vec![Score::boolean("exact_match", true)])];
		let result = EvalResult {
			implementation: "sofer-ai".to_string(),
			summary: EvalResult::summarize(&cases),
			cases,
		};
		let table = result.summary_table();
		assert!(table.contains("Implementation: sofer-ai"));
		assert!(table.contains("Pass rate: 100.0%"));
	}

	#[test]
	fn truncate_respects_char_boundaries() {
		let s = "בראשית ברא אלהים את השמים ואת הארץ";
		let t = truncate(s, 10);
		assert_eq!(t.chars().count(), 10);
		assert!(t.ends_with('…'));
	}
}
