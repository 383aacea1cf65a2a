use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::RunPath;
use crate::{MergeError, MergeResult};

pub const DEFAULT_CONFIG: &str = "merge-config.toml";
pub const DEFAULT_STORE: &str = "runs";

fn default_store() -> PathBuf {
    PathBuf::from(DEFAULT_STORE)
}

/// Which runs to merge and where they live.
///
/// ```toml
/// entity = "djhenny"
/// project = "nanochat"
/// runs = ["url355b1", "h9whxpg8", "jla51cre"]
/// store = "runs"
/// # name = "d20-merged"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeConfig {
    #[serde(default)]
    pub entity: String,
    #[serde(default)]
    pub project: String,
    /// Source run ids in resume order; the last one supplies the config and name.
    #[serde(default, rename = "runs")]
    pub run_ids: Vec<String>,
    #[serde(default = "default_store")]
    pub store: PathBuf,
    /// Destination run name; defaults to `<last run name>-merged`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Default for MergeConfig {
    fn default() -> Self {
        MergeConfig {
            entity: String::new(),
            project: String::new(),
            run_ids: Vec::new(),
            store: default_store(),
            name: None,
        }
    }
}

/// Values from flags or the environment that take precedence over the file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub entity: Option<String>,
    pub project: Option<String>,
    pub runs: Vec<String>,
    pub store: Option<PathBuf>,
    pub name: Option<String>,
}

impl MergeConfig {
    pub fn new(
        entity: impl Into<String>,
        project: impl Into<String>,
        run_ids: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        MergeConfig {
            entity: entity.into(),
            project: project.into(),
            run_ids: run_ids.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// Parse a TOML config file.
    pub fn load(path: &Path) -> MergeResult<Self> {
        let s = std::fs::read_to_string(path)
            .map_err(|e| MergeError::Config(format!("{}: {e}", path.display())))?;
        toml::from_str(&s).map_err(|e| MergeError::Config(format!("{}: {e}", path.display())))
    }

    /// Load `path` if given (it must exist), else `merge-config.toml` if present,
    /// else an empty config to be filled by overrides.
    pub fn load_or_default(path: Option<&Path>) -> MergeResult<Self> {
        match path {
            Some(p) => Self::load(p),
            None => {
                let default_path = Path::new(DEFAULT_CONFIG);
                if default_path.exists() {
                    Self::load(default_path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn with_overrides(mut self, overrides: ConfigOverrides) -> Self {
        if let Some(entity) = overrides.entity {
            self.entity = entity;
        }
        if let Some(project) = overrides.project {
            self.project = project;
        }
        if !overrides.runs.is_empty() {
            self.run_ids = overrides.runs;
        }
        if let Some(store) = overrides.store {
            self.store = store;
        }
        if overrides.name.is_some() {
            self.name = overrides.name;
        }
        self
    }

    pub fn validate(&self) -> MergeResult<()> {
        if self.entity.trim().is_empty() {
            return Err(MergeError::Config("entity is not set".into()));
        }
        if self.project.trim().is_empty() {
            return Err(MergeError::Config("project is not set".into()));
        }
        if self.run_ids.is_empty() {
            return Err(MergeError::Config("no runs to merge".into()));
        }
        for (i, id) in self.run_ids.iter().enumerate() {
            if id.trim().is_empty() || id.contains('/') {
                return Err(MergeError::Config(format!("invalid run id '{id}'")));
            }
            if self.run_ids[..i].contains(id) {
                return Err(MergeError::Config(format!("run '{id}' listed more than once")));
            }
        }
        Ok(())
    }

    /// Source runs in merge order.
    pub fn run_paths(&self) -> Vec<RunPath> {
        self.run_ids
            .iter()
            .map(|id| RunPath::new(&self.entity, &self.project, id))
            .collect()
    }
}
