//! Package descriptor reading.
//!
//! A descriptor is a TOML file (`package.toml`, `pyproject.toml`, ...) that
//! carries a `description` and a `version`. Fields are looked up in the usual
//! package tables first; text that is not valid TOML still gets a best-effort
//! scan for `description = "..."` / `version = "..."` assignments.

use std::path::Path;

use toml::{Table, Value};
use tracing::debug;

use crate::error::{DiscoveryError, DiscoveryResult};

pub const DEFAULT_VERSION: &str = "0.1.0";

/// Tables searched, in order, before falling back to a depth-first walk.
const PREFERRED_TABLES: &[&[&str]] = &[&["project"], &["package"], &["tool", "poetry"], &[]];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageMetadata {
    pub description: Option<String>,
    pub version: Option<String>,
}

impl PackageMetadata {
    pub fn version_or_default(&self) -> String {
        self.version
            .clone()
            .unwrap_or_else(|| DEFAULT_VERSION.to_string())
    }

    pub fn description_or(&self, fallback: impl FnOnce() -> String) -> String {
        self.description.clone().unwrap_or_else(fallback)
    }
}

/// Read and parse the descriptor at `path`.
pub fn read_descriptor(path: &Path) -> DiscoveryResult<PackageMetadata> {
    let text = std::fs::read_to_string(path).map_err(|e| DiscoveryError::io(path, e))?;
    Ok(parse_descriptor(&text))
}

/// Extract metadata from descriptor text. Never fails; missing or malformed
/// fields come back as `None`.
pub fn parse_descriptor(text: &str) -> PackageMetadata {
    match toml::from_str::<Table>(text) {
        Ok(table) => PackageMetadata {
            description: find_string(&table, "description"),
            version: find_string(&table, "version"),
        },
        Err(err) => {
            debug!("descriptor is not valid TOML, scanning text: {}", err.message());
            PackageMetadata {
                description: scan_assignment(text, "description"),
                version: scan_assignment(text, "version"),
            }
        }
    }
}

fn find_string(table: &Table, key: &str) -> Option<String> {
    PREFERRED_TABLES
        .iter()
        .filter_map(|path| table_at(table, path))
        .find_map(|t| non_empty_str(t.get(key)))
        .or_else(|| find_nested(table, key))
}

fn table_at<'a>(root: &'a Table, path: &[&str]) -> Option<&'a Table> {
    path.iter()
        .try_fold(root, |t, segment| t.get(*segment).and_then(Value::as_table))
}

fn find_nested(table: &Table, key: &str) -> Option<String> {
    table.values().filter_map(Value::as_table).find_map(|t| {
        non_empty_str(t.get(key)).or_else(|| find_nested(t, key))
    })
}

fn non_empty_str(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Value of the first `key = "<value>"` in `text`, up to the next quote.
fn scan_assignment(text: &str, key: &str) -> Option<String> {
    let marker = format!("{key} = \"");
    let start = text.find(&marker)? + marker.len();
    let len = text[start..].find('"')?;
    (len > 0).then(|| text[start..start + len].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_project_table() {
        let meta = parse_descriptor(
            r#"
[project]
name = "toraheval"
version = "1.2.3"
description = "Foo Bar"
"#,
        );
        assert_eq!(meta.description.as_deref(), Some("Foo Bar"));
        assert_eq!(meta.version.as_deref(), Some("1.2.3"));
    }

    #[test]
    fn project_table_wins_over_dependency_versions() {
        let meta = parse_descriptor(
            r#"
[dependencies.anthropic]
version = "9.9.9"

[project]
version = "0.2.0"
"#,
        );
        assert_eq!(meta.version.as_deref(), Some("0.2.0"));
    }

    #[test]
    fn falls_back_to_nested_tables() {
        let meta = parse_descriptor(
            r#"
[tool.custom.meta]
description = "deep"
"#,
        );
        assert_eq!(meta.description.as_deref(), Some("deep"));
        assert_eq!(meta.version, None);
    }

    #[test]
    fn scans_text_that_is_not_toml() {
        let meta = parse_descriptor("garbage {{ description = \"Foo Bar\" and version = \"1.2.3\" }}");
        assert_eq!(meta.description.as_deref(), Some("Foo Bar"));
        assert_eq!(meta.version.as_deref(), Some("1.2.3"));
    }

    #[test]
    fn missing_fields_use_defaults() {
        let meta = parse_descriptor("[project]\nname = \"x\"\n");
        assert_eq!(meta, PackageMetadata::default());
        assert_eq!(meta.version_or_default(), DEFAULT_VERSION);
        assert_eq!(meta.description_or(|| "Evaluation package".into()), "Evaluation package");
    }

    #[test]
    fn non_string_and_empty_values_count_as_missing() {
        let meta = parse_descriptor("version = 3\ndescription = \"\"\n");
        assert_eq!(meta, PackageMetadata::default());
    }

    #[test]
    fn unterminated_value_in_text_is_missing() {
        let meta = parse_descriptor("not toml: description = \"never closed");
        assert_eq!(meta.description, None);
    }

    #[test]
    fn read_descriptor_reports_missing_file() {
        let err = read_descriptor(Path::new("/definitely/not/here/package.toml")).unwrap_err();
        assert!(matches!(err, DiscoveryError::Io { .. }));
    }
}
