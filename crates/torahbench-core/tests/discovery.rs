use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;
use torahbench_core::{
    run_evaluation, Discovery, DiscoveryError, ExactMatchScorer, Implementation, PluginLoader, PluginRegistry,
    RunOptions, TorahBenchConfig, TorahEvalInput,
};

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn sample_tree() -> TempDir {
    let tmp = TempDir::new().unwrap();
    write(
        tmp.path(),
        "evals/sample/pyproject.toml",
        "[project]\nname = \"sample\"\ndescription = \"Sample eval\"\nversion = \"0.2.0\"\n",
    );
    write(tmp.path(), "implementations/acme/sample/pyproject.toml", "[project]\nname = \"sample-acme\"\n");
    fs::create_dir_all(tmp.path().join("evals/no-descriptor")).unwrap();
    tmp
}

fn shipped_packages() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../../packages")
}

#[test]
fn sample_evaluation_is_listed_with_its_metadata() {
    let tmp = sample_tree();
    let evaluations = Discovery::new(tmp.path()).list_evaluations();

    assert_eq!(evaluations.len(), 1);
    assert_eq!(evaluations[0].name, "sample");
    assert_eq!(evaluations[0].description, "Sample eval");
    assert_eq!(evaluations[0].version, "0.2.0");
}

#[test]
fn sample_implementation_is_found_by_pair() {
    let tmp = sample_tree();
    let discovery = Discovery::new(tmp.path());

    let found = discovery.find_implementation("sample", "acme").unwrap().unwrap();
    assert_eq!(found.service_name, "acme");
    assert_eq!(found.evaluation_name, "sample");
    assert_eq!(found.version, "0.1.0");
    assert_eq!(found.description, "acme implementation for sample");

    assert!(discovery.find_implementation("sample", "missing").unwrap().is_none());
}

#[test]
fn loader_reports_missing_and_unregistered_packages() {
    let tmp = sample_tree();
    let mut loader = PluginLoader::new(
        Discovery::new(tmp.path()),
        PluginRegistry::builtin(),
        TorahBenchConfig::default(),
    );

    let err = loader.load_implementation_module("sample", "missing").err().unwrap();
    assert!(err.is_not_found());

    let err = loader.load_implementation_module("sample", "acme").err().unwrap();
    assert!(matches!(err, DiscoveryError::LoadFailed { .. }));
    assert!(format!("{:#}", anyhow::Error::from(err)).contains("sample_acme"));
}

#[test]
fn shipped_tree_lists_every_bundled_implementation() {
    let discovery = Discovery::new(shipped_packages());
    let services: Vec<String> = discovery
        .list_implementations(Some("toraheval"))
        .into_iter()
        .map(|i| i.service_name)
        .collect();
    assert_eq!(services, vec!["anthropic", "anthropic-api", "dicta", "ituria-api", "simple-template", "sofer-ai"]);
    assert_eq!(discovery.list_evaluations()[0].name, "toraheval");
}

#[test]
fn shipped_config_parses() {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../torahbench.yaml");
    let config = TorahBenchConfig::load(Some(&path)).unwrap();
    assert_eq!(config.targets.ituria_api.timeout_secs, 1200);
    assert_eq!(config.run.scorers, vec!["levenshtein"]);
    assert_eq!(config.anthropic.model_id(), "claude-3-5-sonnet-20241022");
}

#[tokio::test]
async fn direct_anthropic_loads_and_degrades_without_a_key() {
    let mut config = TorahBenchConfig {
        packages_root: shipped_packages(),
        ..TorahBenchConfig::default()
    };
    config.anthropic.model = "haiku".to_string();
    config.anthropic.api_key_env = "TORAHBENCH_DISCOVERY_UNSET_KEY".to_string();
    let mut loader = PluginLoader::from_config(config);

    let direct = loader.load_implementation_module("toraheval", "anthropic").unwrap();
    assert_eq!(direct.implementation_name(), "anthropic");
    assert!(direct.supports_dataset_runs());

    let out = direct.evaluate(&TorahEvalInput::new("What is Shabbat?")).await.unwrap();
    assert!(out.is_degraded());
    assert_eq!(out.metadata["model"], "claude-3-haiku-20240307");
}

#[tokio::test]
async fn shipped_tree_runs_end_to_end() {
    let mut loader = PluginLoader::new(
        Discovery::new(shipped_packages()),
        PluginRegistry::builtin(),
        TorahBenchConfig::default(),
    );
    let evaluation = loader.load_evaluation_module("toraheval").unwrap();
    let template: Arc<dyn Implementation> = loader.load_implementation_module("toraheval", "simple-template").unwrap();

    let single = template
        .evaluate(&TorahEvalInput::new("Who was Moses?"))
        .await
        .unwrap();
    assert!(!single.answer.is_empty());

    let result = run_evaluation(
        evaluation.as_ref(),
        template.clone(),
        RunOptions {
            limit: Some(2),
            scorers: vec![Arc::new(ExactMatchScorer)],
            ..RunOptions::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(result.implementation, "simple-template");
    assert_eq!(result.summary.total, 2);
    assert!(result.cases[0].case.input.question.starts_with("What is the first word"));
    // the sheet's Source column is appended to the reference answer
    assert!(result.cases[0].case.expected.contains("Bereshit 1:1"));

    let again = loader.load_implementation_module("toraheval", "simple-template").unwrap();
    assert!(Arc::ptr_eq(&template, &again));
}

#[tokio::test]
async fn query_type_filter_applies_to_override_sheets() {
    let csv = shipped_packages().join("evals/toraheval/data/questions.csv");
    let mut loader = PluginLoader::from_config(TorahBenchConfig {
        packages_root: shipped_packages(),
        ..TorahBenchConfig::default()
    });
    let evaluation = loader.load_evaluation_module("toraheval").unwrap();
    let sofer = loader.load_implementation_module("toraheval", "sofer-ai").unwrap();

    let result = run_evaluation(
        evaluation.as_ref(),
        sofer,
        RunOptions {
            data_path: Some(csv),
            query_type: Some("2".to_string()),
            ..RunOptions::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(result.summary.total, 1);
    assert!(result.cases[0].case.input.question.contains("Chanukah"));
}

#[tokio::test]
async fn query_type_filter_applies_to_the_package_sheet() {
    let mut loader = PluginLoader::from_config(TorahBenchConfig {
        packages_root: shipped_packages(),
        ..TorahBenchConfig::default()
    });
    let evaluation = loader.load_evaluation_module("toraheval").unwrap();
    let sofer = loader.load_implementation_module("toraheval", "sofer-ai").unwrap();

    let result = run_evaluation(
        evaluation.as_ref(),
        sofer,
        RunOptions {
            query_type: Some("2".to_string()),
            ..RunOptions::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(result.summary.total, 1);
    assert!(result.cases[0].case.input.question.contains("Chanukah"));
}
