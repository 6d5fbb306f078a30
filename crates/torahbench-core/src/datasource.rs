use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use torahbench_types::{TestCase, TorahEvalInput};

#[async_trait]
pub trait DataSource: Send + Sync {
    async fn load(&self) -> Result<Vec<TestCase>>;
}

pub struct VecDataSource {
    cases: Vec<TestCase>,
}

impl VecDataSource {
    pub fn new(cases: Vec<TestCase>) -> Self {
        Self { cases }
    }
}

#[async_trait]
impl DataSource for VecDataSource {
    async fn load(&self) -> Result<Vec<TestCase>> {
        Ok(self.cases.clone())
    }
}

/// Pick a data source by file extension: `.csv`, `.jsonl` or `.json`.
pub fn data_source_for_path(path: impl Into<PathBuf>) -> Result<Arc<dyn DataSource>> {
    let path = path.into();
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("csv") => Ok(Arc::new(CsvDataSource::new(path))),
        Some("jsonl") => Ok(Arc::new(JsonlDataSource::new(path))),
        Some("json") => Ok(Arc::new(ExamplesJsonDataSource::new(path))),
        _ => bail!("Unsupported dataset format {:?} (expected .csv, .jsonl or .json)", path),
    }
}

/// Like [`data_source_for_path`], keeping only rows of `query_type`.
/// Only CSV sheets carry a query type column.
pub fn data_source_for_path_with_query_type(
    path: impl Into<PathBuf>,
    query_type: Option<&str>,
) -> Result<Arc<dyn DataSource>> {
    let path = path.into();
    let Some(query_type) = query_type else {
        return data_source_for_path(path);
    };
    let is_csv = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("csv"));
    if !is_csv {
        bail!("Query type filter '{query_type}' needs a .csv dataset, got {:?}", path);
    }
    Ok(Arc::new(CsvDataSource::new(path).only_query_type(query_type)))
}

/// Read JSONL where each line is
/// `{"id"?: "...", "question": "...", "expected": "...", "context"?, "question_type"?, "language"?, "sources"?}`
pub struct JsonlDataSource {
    path: PathBuf,
}

impl JsonlDataSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[derive(Deserialize)]
struct JsonlLine {
    id: Option<String>,
    #[serde(flatten)]
    input: TorahEvalInput,
    expected: String,
}

#[async_trait]
impl DataSource for JsonlDataSource {
    async fn load(&self) -> Result<Vec<TestCase>> {
        let content = read_to_string(&self.path).await?;
        let mut cases = Vec::new();
        for (idx, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let parsed: JsonlLine = serde_json::from_str(line)
                .with_context(|| format!("Line {}: invalid test case", idx + 1))?;
            cases.push(TestCase {
                id: parsed.id,
                input: parsed.input,
                expected: parsed.expected,
            });
        }
        Ok(cases)
    }
}

/// A dataset example in the hosted-dataset export format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Example {
    pub inputs: ExampleInputs,
    pub outputs: ExampleOutputs,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExampleInputs {
    pub question: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExampleOutputs {
    pub answer: String,
}

/// Read a JSON array of `{"inputs": {"question": ...}, "outputs": {"answer": ...}}`.
pub struct ExamplesJsonDataSource {
    path: PathBuf,
}

impl ExamplesJsonDataSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl DataSource for ExamplesJsonDataSource {
    async fn load(&self) -> Result<Vec<TestCase>> {
        let content = read_to_string(&self.path).await?;
        let value: Value = serde_json::from_str(&content)
            .with_context(|| format!("Invalid JSON in {:?}", self.path))?;
        let items = value
            .as_array()
            .ok_or_else(|| anyhow!("{:?}: expected a JSON array of examples", self.path))?;

        items
            .iter()
            .enumerate()
            .map(|(idx, item)| {
                let example: Example = serde_json::from_value(item.clone())
                    .with_context(|| format!("Example {}: expected inputs.question and outputs.answer", idx + 1))?;
                Ok(TestCase::with_id(
                    (idx + 1).to_string(),
                    TorahEvalInput::new(example.inputs.question),
                    example.outputs.answer,
                ))
            })
            .collect()
    }
}

const QUESTION_COLUMNS: &[&str] = &["question", "Original Query"];
const EXPECTED_COLUMNS: &[&str] = &["expected", "answer", "Target Text"];
const SOURCE_COLUMNS: &[&str] = &["source", "Source"];
const QUERY_TYPE_COLUMNS: &[&str] = &["question_type", "Query Type"];

/// Read a CSV question sheet.
///
/// Recognised headers (surrounding whitespace ignored): a question column
/// (`question` / `Original Query`), an expected-answer column (`expected`,
/// `answer` or `Target Text`), and optionally `Source`, `Query Type`, `id`,
/// `context`, `language`. When a source is present it is appended to the
/// expected answer after a blank line. Rows without a question or an
/// expected answer are skipped.
pub struct CsvDataSource {
    path: PathBuf,
    query_type: Option<String>,
}

impl CsvDataSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            query_type: None,
        }
    }

    /// Keep only rows whose query type equals `query_type`.
    pub fn only_query_type(mut self, query_type: impl Into<String>) -> Self {
        self.query_type = Some(query_type.into());
        self
    }
}

#[async_trait]
impl DataSource for CsvDataSource {
    async fn load(&self) -> Result<Vec<TestCase>> {
        let content = read_to_string(&self.path).await?;
        parse_csv(&content, self.query_type.as_deref())
            .with_context(|| format!("Invalid CSV dataset {:?}", self.path))
    }
}

fn parse_csv(content: &str, query_type: Option<&str>) -> Result<Vec<TestCase>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(content.as_bytes());

    let headers = reader.headers()?.clone();
    let column = |names: &[&str]| {
        headers
            .iter()
            .position(|h| names.iter().any(|n| h.eq_ignore_ascii_case(n)))
    };
    let question_col = column(QUESTION_COLUMNS)
        .ok_or_else(|| anyhow!("missing a question column (one of {:?})", QUESTION_COLUMNS))?;
    let expected_col = column(EXPECTED_COLUMNS)
        .ok_or_else(|| anyhow!("missing an expected answer column (one of {:?})", EXPECTED_COLUMNS))?;
    let source_col = column(SOURCE_COLUMNS);
    let type_col = column(QUERY_TYPE_COLUMNS);
    let id_col = column(&["id"]);
    let context_col = column(&["context"]);
    let language_col = column(&["language"]);

    let mut cases = Vec::new();
    for (idx, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("Row {}", idx + 2))?;
        let field = |col: Option<usize>| col.and_then(|c| record.get(c)).filter(|v| !v.is_empty());

        let (Some(question), Some(target)) = (field(Some(question_col)), field(Some(expected_col))) else {
            debug!("skipping CSV row {}: no question or expected answer", idx + 2);
            continue;
        };
        let row_type = field(type_col);
        if let Some(wanted) = query_type {
            if row_type != Some(wanted) {
                continue;
            }
        }

        let expected = match field(source_col) {
            Some(source) => format!("{target}\n\n{source}"),
            None => target.to_string(),
        };

        let mut input = TorahEvalInput::new(question);
        if let Some(t) = row_type {
            input = input.question_type(t);
        }
        if let Some(c) = field(context_col) {
            input = input.context(c);
        }
        if let Some(l) = field(language_col) {
            input = input.language(l);
        }

        cases.push(TestCase {
            id: Some(field(id_col).map(str::to_string).unwrap_or_else(|| (cases.len() + 1).to_string())),
            input,
            expected,
        });
    }
    Ok(cases)
}

/// Convert a CSV question sheet into the hosted-dataset JSON export format.
/// Returns the number of examples written.
pub async fn convert_csv_to_examples(csv_path: &Path, json_path: &Path, query_type: Option<&str>) -> Result<usize> {
    let content = read_to_string(csv_path).await?;
    let cases = parse_csv(&content, query_type)
        .with_context(|| format!("Invalid CSV dataset {:?}", csv_path))?;
    let examples: Vec<Example> = cases
        .into_iter()
        .map(|case| Example {
            inputs: ExampleInputs { question: case.input.question },
            outputs: ExampleOutputs { answer: case.expected },
        })
        .collect();
    let json = serde_json::to_string_pretty(&examples)?;
    tokio::fs::write(json_path, json)
        .await
        .with_context(|| format!("Failed to write {:?}", json_path))?;
    Ok(examples.len())
}

async fn read_to_string(path: &Path) -> Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {:?}", path))
}
