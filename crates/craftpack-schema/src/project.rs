use crate::part::PartDecl;
use crate::SchemaError;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;

/// Name of the project file looked up in the project directory.
pub const PROJECT_FILE: &str = "craftpack.yaml";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProjectType {
    Charm,
    Bundle,
}

impl fmt::Display for ProjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProjectType::Charm => write!(f, "charm"),
            ProjectType::Bundle => write!(f, "bundle"),
        }
    }
}

/// A base the artifact is built for.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct BaseConfig {
    pub name: String,
    pub channel: String,
    #[serde(default)]
    pub architectures: Vec<String>,
}

impl BaseConfig {
    /// `<name>-<channel>-<arch>`, used in artifact names and work sub-directories.
    pub fn tag(&self, arch: &str) -> String {
        format!("{}-{}-{arch}", self.name, self.channel)
    }
}

/// Parsed `craftpack.yaml`.
///
/// Parts are kept in declaration order; the order breaks ties in the build plan.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct ProjectConfig {
    #[serde(rename = "type")]
    pub project_type: ProjectType,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub bases: Vec<BaseConfig>,
    /// Extra prime patterns for the implicit `bundle` part.
    #[serde(default)]
    pub prime: Vec<String>,
    #[serde(default)]
    pub parts: IndexMap<String, PartDecl>,
}

pub fn parse_project_str(input: &str) -> Result<ProjectConfig, SchemaError> {
    Ok(serde_yaml::from_str(input)?)
}

pub fn parse_project_file(path: impl AsRef<Path>) -> Result<ProjectConfig, SchemaError> {
    let content = fs::read_to_string(path)?;
    parse_project_str(&content)
}

/// Load `craftpack.yaml` from a project directory.
pub fn load_project(project_dir: &Path) -> Result<ProjectConfig, SchemaError> {
    let path = project_dir.join(PROJECT_FILE);
    if !path.is_file() {
        return Err(SchemaError::ProjectFileNotFound(path));
    }
    parse_project_file(&path)
}
