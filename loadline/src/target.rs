use std::{fs, path::Path, sync::Arc};

use rand::Rng;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::ConfigError;

/// One operation against the server under test.
#[derive(Debug, Clone, PartialEq)]
pub struct Target {
    /// Path the target was declared with, e.g. `/work/cpu`.
    pub operation: String,
    pub endpoint: Url,
    /// JSON body posted on every request.
    pub payload: Value,
}

/// Declaration of a target before it is resolved against a base URL.
///
/// This is also the element type of a `--targets` file:
///
/// ```json
/// [{ "path": "/work/cpu", "payload": { "payloadSize": 1000, "iterations": 2 } }]
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetSpec {
    pub path: String,
    #[serde(default = "empty_object")]
    pub payload: Value,
}

fn empty_object() -> Value {
    json!({})
}

impl TargetSpec {
    pub fn new(path: impl Into<String>, payload: Value) -> Self {
        Self {
            path: path.into(),
            payload,
        }
    }
}

/// Immutable, non-empty set of targets shared read-only by every worker.
#[derive(Debug, Clone)]
pub struct TargetSet {
    targets: Vec<Arc<Target>>,
}

impl TargetSet {
    /// Resolve `specs` against `base_url`. An absolute URL in `path` wins over
    /// the base.
    pub fn new(base_url: &str, specs: Vec<TargetSpec>) -> Result<Self, ConfigError> {
        if specs.is_empty() {
            return Err(ConfigError::NoTargets);
        }
        let base = Url::parse(base_url).map_err(|e| ConfigError::InvalidUrl {
            url: base_url.to_string(),
            reason: e.to_string(),
        })?;

        let targets = specs
            .into_iter()
            .map(|spec| {
                let endpoint = base.join(&spec.path).map_err(|e| ConfigError::InvalidUrl {
                    url: spec.path.clone(),
                    reason: e.to_string(),
                })?;
                Ok(Arc::new(Target {
                    operation: spec.path,
                    endpoint,
                    payload: spec.payload,
                }))
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;

        Ok(Self { targets })
    }

    /// Mixed CPU / file / image workload of the reference server.
    pub fn defaults(base_url: &str) -> Result<Self, ConfigError> {
        Self::new(base_url, default_specs())
    }

    /// Load target declarations from a JSON file.
    pub fn from_file(base_url: &str, path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::TargetsFile {
            path: path.to_path_buf(),
            source,
        })?;
        let specs: Vec<TargetSpec> =
            serde_json::from_str(&content).map_err(|source| ConfigError::TargetsFormat {
                path: path.to_path_buf(),
                source,
            })?;
        Self::new(base_url, specs)
    }

    /// Single target given on the command line as `--url` and `--body`.
    pub fn single(base_url: &str, url: &str, body: Option<&str>) -> Result<Self, ConfigError> {
        let payload = match body {
            Some(raw) => serde_json::from_str(raw).map_err(ConfigError::InvalidBody)?,
            None => empty_object(),
        };
        Self::new(base_url, vec![TargetSpec::new(url, payload)])
    }

    /// Uniform pick. Each worker passes its own generator.
    pub fn pick<R: Rng + ?Sized>(&self, rng: &mut R) -> Arc<Target> {
        let idx = rng.random_range(0..self.targets.len());
        Arc::clone(&self.targets[idx])
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Target> {
        self.targets.iter().map(|t| t.as_ref())
    }
}

fn default_specs() -> Vec<TargetSpec> {
    vec![
        TargetSpec::new(
            "/work/cpu",
            json!({ "payloadSize": 100_000, "iterations": 10 }),
        ),
        TargetSpec::new("/work/files", json!({ "payloadSize": 5, "fileSize": 10_000 })),
        TargetSpec::new(
            "/work/image-compress",
            json!({ "payloadSize": 5, "iterations": 1 }),
        ),
    ]
}
