//! The `toraheval` question set.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;

use torahbench_types::{TestCase, TorahEvalInput};

use crate::datasource::{CsvDataSource, DataSource, VecDataSource};
use crate::module::EvaluationModule;

pub const NAME: &str = "toraheval";

/// Question sheet looked up inside the package directory.
pub const DATASET_FILE: &str = "data/questions.csv";

pub struct TorahEval {
    dataset_path: Option<PathBuf>,
}

impl TorahEval {
    /// Use the package's question sheet when it ships one, else the golden set.
    pub fn for_package(package_dir: &Path) -> Self {
        let path = package_dir.join(DATASET_FILE);
        Self {
            dataset_path: path.is_file().then_some(path),
        }
    }

    pub fn golden() -> Self {
        Self { dataset_path: None }
    }
}

pub fn golden_cases() -> Vec<TestCase> {
    vec![
        TestCase::with_id(
            "first-word",
            TorahEvalInput::new("What is the first word of the Torah?").question_type("source_finding"),
            "בראשית",
        ),
        TestCase::with_id(
            "five-books",
            TorahEvalInput::new("How many books are in the Torah?"),
            "Five",
        ),
        TestCase::with_id(
            "shabbat",
            TorahEvalInput::new("What is the significance of Shabbat in Jewish practice?"),
            "Shabbat is the weekly day of rest commemorating the completion of creation.",
        ),
    ]
}

impl EvaluationModule for TorahEval {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        "Torah knowledge and source-finding questions"
    }

    fn dataset(&self) -> Arc<dyn DataSource> {
        match &self.dataset_path {
            Some(path) => Arc::new(CsvDataSource::new(path.clone())),
            None => Arc::new(VecDataSource::new(golden_cases())),
        }
    }

    fn dataset_for_query_type(&self, query_type: Option<&str>) -> Result<Arc<dyn DataSource>> {
        let Some(query_type) = query_type else {
            return Ok(self.dataset());
        };
        Ok(match &self.dataset_path {
            Some(path) => Arc::new(CsvDataSource::new(path.clone()).only_query_type(query_type)),
            None => Arc::new(VecDataSource::new(
                golden_cases()
                    .into_iter()
                    .filter(|case| case.input.question_type == query_type)
                    .collect(),
            )),
        })
    }
}
