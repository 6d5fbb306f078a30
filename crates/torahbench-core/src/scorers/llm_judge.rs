//! LLM-as-judge scoring through the Anthropic Messages API.
//!
//! Each criterion is a prompt template with `{inputs}`, `{outputs}` and
//! `{reference_outputs}` slots. The judge must answer with a
//! `SCORE: true|false` line and may add a `COMMENT:` line.

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use serde_json::json;

use torahbench_types::{Score, TestCase, TorahEvalOutput, Trace};

use crate::anthropic::AnthropicClient;
use crate::config::JudgeConfig;
use crate::scorer::Scorer;
use crate::trace::report_trace;

const SOURCE_CORRECTNESS_PROMPT: &str = "\
You are evaluating whether the response contains the exact source that is expected.

QUESTION:
{inputs}

RESPONSE:
{outputs}

EXPECTED SOURCE (from reference answer):
{reference_outputs}

Evaluate ONLY whether the response contains the exact source that appears in the expected answer.
Look for the specific book name, section, and reference details that match the expected source,
and at the content of the response to see if it comes from the expected source. Citations may
differ slightly because of different splitting or editions; decide whether it is the same source.

- true: the response contains the exact source from the expected answer, even if additional
  context is present, some text is missing, or the format is slightly different
- false: the response does not contain the exact source, or cites a different source

SCORE: [true/false]
COMMENT: [Brief explanation of whether the exact source was found or not]
";

const HELPFULNESS_PROMPT: &str = "\
You are evaluating how well a response addresses the question that was asked.

QUESTION:
{inputs}

RESPONSE:
{outputs}

A helpful response answers the question directly, stays on topic, and gives the reader
something they can act on or verify. It does not need to match any reference answer.

SCORE: [true/false]
COMMENT: [Your explanation here]
";

const TORAH_CITATION_PROMPT: &str = "\
You are evaluating whether a Torah scholarship answer properly cites sources and follows scholarly conventions.

INPUT:
{inputs}

OUTPUT:
{outputs}

Evaluate the output on the following criteria:
1. Does it cite specific sources when making claims?
2. Does it use proper Hebrew/Aramaic terminology?
3. Does it demonstrate knowledge of Torah scholarship conventions?
4. Are the citations accurate and properly formatted?

SCORE: [true/false]
COMMENT: [Your explanation here]
";

const HEBREW_HANDLING_PROMPT: &str = "\
You are evaluating whether a response properly handles Hebrew text and Jewish religious concepts.

INPUT:
{inputs}

OUTPUT:
{outputs}

Evaluate the output on the following criteria:
1. Does it correctly interpret Hebrew/Aramaic text when present?
2. Does it show understanding of Jewish religious concepts?
3. Does it handle transliteration appropriately?
4. Does it respect the religious context of the material?

SCORE: [true/false]
COMMENT: [Your explanation here]
";

const DEPTH_ANALYSIS_PROMPT: &str = "\
You are evaluating the depth and sophistication of Torah scholarship analysis.

INPUT:
{inputs}

OUTPUT:
{outputs}

Evaluate the output on the following criteria:
1. Does it provide deep, nuanced analysis rather than surface-level answers?
2. Does it consider multiple perspectives or interpretations?
3. Does it demonstrate knowledge of commentaries and secondary sources?
4. Does it show awareness of the broader context and implications?

SCORE: [true/false]
COMMENT: [Your explanation here]
";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Criterion {
    Correctness,
    Helpfulness,
    TorahCitations,
    HebrewHandling,
    DepthAnalysis,
}

impl Criterion {
    pub const ALL: [Criterion; 5] = [
        Criterion::Correctness,
        Criterion::Helpfulness,
        Criterion::TorahCitations,
        Criterion::HebrewHandling,
        Criterion::DepthAnalysis,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Criterion::Correctness => "correctness",
            Criterion::Helpfulness => "helpfulness",
            Criterion::TorahCitations => "torah_citations",
            Criterion::HebrewHandling => "hebrew_handling",
            Criterion::DepthAnalysis => "depth_analysis",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.name() == name)
    }

    fn template(self) -> &'static str {
        match self {
            Criterion::Correctness => SOURCE_CORRECTNESS_PROMPT,
            Criterion::Helpfulness => HELPFULNESS_PROMPT,
            Criterion::TorahCitations => TORAH_CITATION_PROMPT,
            Criterion::HebrewHandling => HEBREW_HANDLING_PROMPT,
            Criterion::DepthAnalysis => DEPTH_ANALYSIS_PROMPT,
        }
    }

    /// Fill the template slots in a single pass, so slot markers inside the
    /// substituted text are left as written.
    pub fn render(self, case: &TestCase, output: &TorahEvalOutput) -> String {
        let slots = [
            ("{inputs}", case.input.question.as_str()),
            ("{outputs}", output.answer.as_str()),
            ("{reference_outputs}", case.expected.as_str()),
        ];
        let mut rest = self.template();
        let mut rendered = String::with_capacity(rest.len());
        while let Some(at) = rest.find('{') {
            rendered.push_str(&rest[..at]);
            rest = &rest[at..];
            match slots.iter().find(|(marker, _)| rest.starts_with(marker)) {
                Some((marker, value)) => {
                    rendered.push_str(value);
                    rest = &rest[marker.len()..];
                }
                None => {
                    rendered.push('{');
                    rest = &rest[1..];
                }
            }
        }
        rendered.push_str(rest);
        rendered
    }
}

/// The judge's decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub passed: bool,
    pub comment: Option<String>,
}

/// Parse `SCORE:` / `COMMENT:` lines out of a judge reply.
pub fn parse_verdict(reply: &str) -> Result<Verdict> {
    let field = |label: &str| {
        reply.lines().find_map(|line| {
            let line = line.trim().trim_start_matches(['*', '#', ' ']);
            let (head, rest) = line.split_once(':')?;
            head.trim().eq_ignore_ascii_case(label).then(|| rest.trim().to_string())
        })
    };

    let raw = field("SCORE").ok_or_else(|| anyhow!("judge reply has no SCORE line"))?;
    let token = raw
        .trim_matches(|c: char| c == '[' || c == ']' || c == '*' || c.is_whitespace())
        .to_ascii_lowercase();
    let passed = match token.as_str() {
        "true" | "yes" | "1" => true,
        "false" | "no" | "0" => false,
        other => bail!("judge SCORE is neither true nor false: '{other}'"),
    };

    Ok(Verdict {
        passed,
        comment: field("COMMENT").filter(|c| !c.is_empty()),
    })
}

pub struct LlmJudgeScorer {
    criterion: Criterion,
    model: String,
    max_tokens: u32,
    api_key_env: String,
    client: Option<AnthropicClient>,
}

impl LlmJudgeScorer {
    /// A missing API key is not an error here; scoring reports it per case.
    pub fn from_config(criterion: Criterion, config: &JudgeConfig) -> Result<Self> {
        let client = config.api_key().map(AnthropicClient::new).transpose()?;
        Ok(Self {
            criterion,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            api_key_env: config.api_key_env.clone(),
            client,
        })
    }

    pub fn with_client(criterion: Criterion, model: impl Into<String>, client: AnthropicClient) -> Self {
        Self {
            criterion,
            model: model.into(),
            max_tokens: 1024,
            api_key_env: String::new(),
            client: Some(client),
        }
    }
}

#[async_trait]
impl Scorer for LlmJudgeScorer {
    fn name(&self) -> &str {
        self.criterion.name()
    }

    async fn score(&self, case: &TestCase, output: &TorahEvalOutput) -> Result<Score> {
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| anyhow!("{} is not set; cannot run the {} judge", self.api_key_env, self.name()))?;

        let prompt = self.criterion.render(case, output);
        let started = Trace::start_now().model(self.model.clone()).id(self.name());
        let completion = client.complete(&self.model, None, &prompt, self.max_tokens).await?;
        report_trace(started.finish(
            json!({ "criterion": self.name() }),
            json!({ "reply": completion.text }),
            Some(completion.usage),
        ));

        let verdict = parse_verdict(&completion.text)?;
        Ok(Score {
            details: verdict.comment.map(|c| json!({ "comment": c })),
            ..Score::boolean(self.name(), verdict.passed)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use torahbench_types::TorahEvalInput;

    #[test]
    fn parses_plain_and_decorated_verdicts() {
        let v = parse_verdict("SCORE: true\nCOMMENT: Cites Bereshit 1:1").unwrap();
        assert!(v.passed);
        assert_eq!(v.comment.as_deref(), Some("Cites Bereshit 1:1"));

        let v = parse_verdict("Some preamble\n**Score:** [FALSE]\n").unwrap();
        assert!(!v.passed);
        assert_eq!(v.comment, None);
    }

    #[test]
    fn rejects_replies_without_a_decision() {
        assert!(parse_verdict("I think it is fine").is_err());
        assert!(parse_verdict("SCORE: maybe").is_err());
    }

    #[test]
    fn render_fills_every_slot() {
        let input = TorahEvalInput::new("Where is the verse about Shabbat?");
        let case = TestCase::new(input.clone(), "Shemot 20:8");
        let out = TorahEvalOutput::answer_for(&input, "Exodus 20:8", 1.0);
        let prompt = Criterion::Correctness.render(&case, &out);
        assert!(prompt.contains("Where is the verse about Shabbat?"));
        assert!(prompt.contains("Exodus 20:8"));
        assert!(prompt.contains("Shemot 20:8"));
        assert!(!prompt.contains('{'));
    }

    #[test]
    fn render_leaves_markers_inside_answers_alone() {
        let input = TorahEvalInput::new("Explain the {outputs} placeholder");
        let case = TestCase::new(input.clone(), "see {inputs}");
        let out = TorahEvalOutput::answer_for(&input, "Bereishit 1:1", 1.0);
        let prompt = Criterion::Correctness.render(&case, &out);
        assert!(prompt.contains("QUESTION:\nExplain the {outputs} placeholder\n"));
        assert!(prompt.contains("RESPONSE:\nBereishit 1:1\n"));
        assert!(prompt.contains("see {inputs}"));
        assert_eq!(prompt.matches("Bereishit 1:1").count(), 1);
    }

    #[test]
    fn criteria_round_trip_by_name() {
        for c in Criterion::ALL {
            assert_eq!(Criterion::from_name(c.name()), Some(c));
        }
        assert_eq!(Criterion::from_name("exact_match"), None);
    }

    #[tokio::test]
    async fn missing_key_fails_the_score_not_the_build() {
        let config = JudgeConfig {
            api_key_env: "TORAHBENCH_TEST_UNSET_KEY".to_string(),
            ..JudgeConfig::default()
        };
        let scorer = LlmJudgeScorer::from_config(Criterion::Helpfulness, &config).unwrap();
        let input = TorahEvalInput::new("q");
        let case = TestCase::new(input.clone(), "e");
        let err = scorer
            .score(&case, &TorahEvalOutput::answer_for(&input, "a", 1.0))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("TORAHBENCH_TEST_UNSET_KEY"));
    }
}
