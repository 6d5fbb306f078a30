//! Local experiment history: every `torahbench run --store <db>` appends one
//! experiment with its per-case answers, scores and upstream traces.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OpenFlags, Transaction};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use torahbench_types::{CaseResult, EvalResult, EvalSummary, Score};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store connection lock was poisoned")]
    Poisoned,
    #[error("experiment {0} not found")]
    UnknownExperiment(i64),
}

#[derive(Debug, Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentEntity {
    pub id: i64,
    pub name: String,
    pub evaluation: String,
    pub implementation: String,
    pub created_at: DateTime<Utc>,
    pub summary: Option<EvalSummary>,
}

/// One stored case with its scores.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredResult {
    pub case_id: Option<String>,
    pub question: String,
    pub answer: Option<String>,
    pub expected: String,
    pub error: Option<String>,
    pub scores: Vec<Score>,
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS experiments (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    evaluation TEXT NOT NULL,
    implementation TEXT NOT NULL,
    created_at TEXT NOT NULL,
    summary TEXT
);
CREATE TABLE IF NOT EXISTS results (
    id INTEGER PRIMARY KEY,
    experiment_id INTEGER NOT NULL,
    case_id TEXT,
    question TEXT NOT NULL,
    input TEXT NOT NULL,
    answer TEXT,
    output TEXT,
    expected TEXT NOT NULL,
    error TEXT,
    FOREIGN KEY(experiment_id) REFERENCES experiments(id)
);
CREATE TABLE IF NOT EXISTS scores (
    id INTEGER PRIMARY KEY,
    result_id INTEGER NOT NULL,
    name TEXT NOT NULL,
    value REAL NOT NULL,
    passed BOOLEAN NOT NULL,
    details TEXT,
    FOREIGN KEY(result_id) REFERENCES results(id)
);
CREATE TABLE IF NOT EXISTS traces (
    id INTEGER PRIMARY KEY,
    result_id INTEGER NOT NULL,
    model TEXT,
    duration_ms INTEGER,
    input TEXT,
    output TEXT,
    tokens_in INTEGER,
    tokens_out INTEGER,
    error TEXT,
    FOREIGN KEY(result_id) REFERENCES results(id)
);
";

impl Store {
    /// Open (or create) the database at `path`, e.g. `torahbench.db`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE | OpenFlags::SQLITE_OPEN_URI,
        )
        .with_context(|| format!("opening store {}", path.display()))?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA).context("creating store schema")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Save a whole run in one transaction and return the experiment id.
    pub fn save_experiment(
        &self,
        name: &str,
        evaluation: &str,
        implementation: &str,
        result: &EvalResult,
    ) -> Result<i64> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT INTO experiments (name, evaluation, implementation, created_at, summary)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                name,
                evaluation,
                implementation,
                Utc::now().to_rfc3339(),
                serde_json::to_string(&result.summary)?
            ],
        )?;
        let experiment_id = tx.last_insert_rowid();

        for case in &result.cases {
            insert_case(&tx, experiment_id, case)?;
        }

        tx.commit()?;
        Ok(experiment_id)
    }

    /// Newest first.
    pub fn list_experiments(&self) -> Result<Vec<ExperimentEntity>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, name, evaluation, implementation, created_at, summary
             FROM experiments ORDER BY id DESC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, Option<String>>(5)?,
            ))
        })?;

        let mut experiments = Vec::new();
        for row in rows {
            let (id, name, evaluation, implementation, created_at, summary) = row?;
            experiments.push(ExperimentEntity {
                id,
                name,
                evaluation,
                implementation,
                created_at: DateTime::parse_from_rfc3339(&created_at)
                    .with_context(|| format!("bad created_at on experiment {id}"))?
                    .with_timezone(&Utc),
                summary: summary.as_deref().map(serde_json::from_str).transpose()?,
            });
        }
        Ok(experiments)
    }

    /// Cases of one experiment in the order they were run.
    pub fn experiment_results(&self, experiment_id: i64) -> Result<Vec<StoredResult>> {
        let conn = self.lock()?;
        let known: i64 = conn.query_row(
            "SELECT COUNT(*) FROM experiments WHERE id = ?1",
            params![experiment_id],
            |row| row.get(0),
        )?;
        if known == 0 {
            return Err(StoreError::UnknownExperiment(experiment_id).into());
        }

        let mut stmt = conn.prepare(
            "SELECT id, case_id, question, answer, expected, error
             FROM results WHERE experiment_id = ?1 ORDER BY id",
        )?;
        let rows = stmt
            .query_map(params![experiment_id], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    StoredResult {
                        case_id: row.get(1)?,
                        question: row.get(2)?,
                        answer: row.get(3)?,
                        expected: row.get(4)?,
                        error: row.get(5)?,
                        scores: Vec::new(),
                    },
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut score_stmt =
            conn.prepare("SELECT name, value, passed, details FROM scores WHERE result_id = ?1 ORDER BY id")?;
        let mut results = Vec::with_capacity(rows.len());
        for (result_id, mut stored) in rows {
            let scores = score_stmt
                .query_map(params![result_id], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, f64>(1)?,
                        row.get::<_, bool>(2)?,
                        row.get::<_, Option<String>>(3)?,
                    ))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            for (name, value, passed, details) in scores {
                stored.scores.push(Score {
                    name,
                    value,
                    passed,
                    details: details.as_deref().map(serde_json::from_str).transpose()?,
                });
            }
            results.push(stored);
        }
        Ok(results)
    }
}

fn insert_case(tx: &Transaction<'_>, experiment_id: i64, case: &CaseResult) -> Result<()> {
    tx.execute(
        "INSERT INTO results (experiment_id, case_id, question, input, answer, output, expected, error)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            experiment_id,
            case.case.id,
            case.case.input.question,
            serde_json::to_string(&case.case.input)?,
            case.output.as_ref().map(|o| o.answer.as_str()),
            case.output.as_ref().map(serde_json::to_string).transpose()?,
            case.case.expected,
            case.error
        ],
    )?;
    let result_id = tx.last_insert_rowid();

    for score in &case.scores {
        tx.execute(
            "INSERT INTO scores (result_id, name, value, passed, details)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                result_id,
                score.name,
                score.value,
                score.passed,
                score.details.as_ref().map(|d| d.to_string())
            ],
        )?;
    }

    for trace in &case.traces {
        tx.execute(
            "INSERT INTO traces (result_id, model, duration_ms, input, output, tokens_in, tokens_out, error)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                result_id,
                trace.model,
                trace.duration_ms.map(|d| d as i64),
                trace.input.to_string(),
                trace.output.to_string(),
                trace.usage.map(|u| u.input_tokens),
                trace.usage.map(|u| u.output_tokens),
                trace.error
            ],
        )?;
    }
    Ok(())
}
