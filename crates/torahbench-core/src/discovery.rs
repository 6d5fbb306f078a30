//! Package discovery.
//!
//! Layout under the packages root:
//!
//! ```text
//! evals/<evaluation>/package.toml
//! implementations/<service>/<evaluation>/package.toml
//! ```
//!
//! A directory is a package only if it holds one of the configured descriptor
//! files. Scans never fail as a whole: unreadable candidates are logged and
//! skipped. Direct lookups distinguish "not there" (`Ok(None)`) from "there but
//! unreadable" (`Err`).

use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, warn};

use crate::descriptor::{read_descriptor, PackageMetadata};
use crate::error::DiscoveryResult;

pub const EVALS_DIR: &str = "evals";
pub const IMPLEMENTATIONS_DIR: &str = "implementations";
pub const DEFAULT_DESCRIPTOR_FILES: &[&str] = &["package.toml", "pyproject.toml"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EvaluationDescriptor {
    pub name: String,
    pub location: PathBuf,
    pub description: String,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImplementationDescriptor {
    pub service_name: String,
    pub evaluation_name: String,
    pub location: PathBuf,
    pub description: String,
    pub version: String,
}

#[derive(Debug, Clone)]
pub struct Discovery {
    root: PathBuf,
    descriptor_files: Vec<String>,
}

impl Discovery {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            descriptor_files: DEFAULT_DESCRIPTOR_FILES.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Override the descriptor file names checked in each package, in priority order.
    pub fn with_descriptor_files<I, S>(mut self, files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let files: Vec<String> = files.into_iter().map(Into::into).collect();
        if !files.is_empty() {
            self.descriptor_files = files;
        }
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn evaluation_dir(&self, evaluation: &str) -> PathBuf {
        self.root.join(EVALS_DIR).join(evaluation)
    }

    /// `implementations/<implementation>/<evaluation>`
    pub fn implementation_dir(&self, evaluation: &str, implementation: &str) -> PathBuf {
        self.root
            .join(IMPLEMENTATIONS_DIR)
            .join(implementation)
            .join(evaluation)
    }

    pub fn list_evaluations(&self) -> Vec<EvaluationDescriptor> {
        let mut found: Vec<EvaluationDescriptor> = subdirectories(&self.root.join(EVALS_DIR))
            .into_iter()
            .filter_map(|(name, dir)| match self.evaluation_at(&name, &dir) {
                Ok(Some(info)) => Some(info),
                Ok(None) => {
                    debug!("skipping {}: no descriptor", dir.display());
                    None
                }
                Err(err) => {
                    warn!("skipping evaluation '{}': {}", name, err);
                    None
                }
            })
            .collect();
        found.sort_by(|a, b| a.name.cmp(&b.name));
        found
    }

    pub fn find_evaluation(&self, evaluation: &str) -> DiscoveryResult<Option<EvaluationDescriptor>> {
        if !is_plain_name(evaluation) {
            return Ok(None);
        }
        let dir = self.evaluation_dir(evaluation);
        if !dir.is_dir() {
            return Ok(None);
        }
        self.evaluation_at(evaluation, &dir)
    }

    /// All implementations, optionally only those bound to `evaluation` (exact match).
    pub fn list_implementations(&self, evaluation: Option<&str>) -> Vec<ImplementationDescriptor> {
        let mut found = Vec::new();
        for (service, service_dir) in subdirectories(&self.root.join(IMPLEMENTATIONS_DIR)) {
            for (eval_name, dir) in subdirectories(&service_dir) {
                if evaluation.is_some_and(|wanted| wanted != eval_name) {
                    continue;
                }
                match self.implementation_at(&service, &eval_name, &dir) {
                    Ok(Some(info)) => found.push(info),
                    Ok(None) => debug!("skipping {}: no descriptor", dir.display()),
                    Err(err) => warn!("skipping implementation '{}/{}': {}", service, eval_name, err),
                }
            }
        }
        found.sort_by(|a, b| {
            (&a.service_name, &a.evaluation_name).cmp(&(&b.service_name, &b.evaluation_name))
        });
        found
    }

    /// Direct lookup of `implementations/<implementation>/<evaluation>`, no scan.
    pub fn find_implementation(
        &self,
        evaluation: &str,
        implementation: &str,
    ) -> DiscoveryResult<Option<ImplementationDescriptor>> {
        if !is_plain_name(evaluation) || !is_plain_name(implementation) {
            return Ok(None);
        }
        let dir = self.implementation_dir(evaluation, implementation);
        if !dir.is_dir() {
            return Ok(None);
        }
        self.implementation_at(implementation, evaluation, &dir)
    }

    fn descriptor_in(&self, dir: &Path) -> Option<PathBuf> {
        self.descriptor_files
            .iter()
            .map(|f| dir.join(f))
            .find(|p| p.is_file())
    }

    fn metadata_in(&self, dir: &Path) -> DiscoveryResult<Option<PackageMetadata>> {
        match self.descriptor_in(dir) {
            Some(path) => read_descriptor(&path).map(Some),
            None => Ok(None),
        }
    }

    fn evaluation_at(&self, name: &str, dir: &Path) -> DiscoveryResult<Option<EvaluationDescriptor>> {
        Ok(self.metadata_in(dir)?.map(|meta| EvaluationDescriptor {
            name: name.to_string(),
            location: dir.to_path_buf(),
            description: meta.description_or(|| "Evaluation package".to_string()),
            version: meta.version_or_default(),
        }))
    }

    fn implementation_at(
        &self,
        service: &str,
        evaluation: &str,
        dir: &Path,
    ) -> DiscoveryResult<Option<ImplementationDescriptor>> {
        Ok(self.metadata_in(dir)?.map(|meta| ImplementationDescriptor {
            service_name: service.to_string(),
            evaluation_name: evaluation.to_string(),
            location: dir.to_path_buf(),
            description: meta.description_or(|| format!("{service} implementation for {evaluation}")),
            version: meta.version_or_default(),
        }))
    }
}

/// Named subdirectories of `dir`, sorted by name. A missing `dir` is empty.
fn subdirectories(dir: &Path) -> Vec<(String, PathBuf)> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Vec::new(),
        Err(err) => {
            warn!("cannot list {}: {}", dir.display(), err);
            return Vec::new();
        }
    };

    let mut dirs: Vec<(String, PathBuf)> = entries
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry.path()),
            Err(err) => {
                warn!("cannot read entry in {}: {}", dir.display(), err);
                None
            }
        })
        .filter(|path| path.is_dir())
        .filter_map(|path| {
            let name = path.file_name()?.to_str()?.to_string();
            Some((name, path))
        })
        .collect();
    dirs.sort_by(|a, b| a.0.cmp(&b.0));
    dirs
}

fn is_plain_name(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains(['/', '\\'])
}
