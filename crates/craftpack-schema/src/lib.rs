//! Project file parsing, part model, file-selection patterns, and build planning for craftpack.
//!
//! This crate defines the schema layer: YAML project parsing (`ProjectConfig`),
//! raw part declarations (`PartDecl`) and their validated form (`PartSpec`),
//! the stage/prime pattern matcher (`Pattern`, `SelectionRule`), implicit
//! default part synthesis for bundles, bases selection, target architecture
//! resolution, and the dependency-ordered `BuildPlan`.

pub mod arch;
pub mod bases;
pub mod bundle;
pub mod defaults;
pub mod part;
pub mod pattern;
pub mod plan;
pub mod project;
pub mod types;

pub use arch::{host_architecture, resolve_build_for};
pub use bases::{select_bases, validate_bases_indices};
pub use bundle::{load_bundle_name, BUNDLE_FILE};
pub use defaults::{mandatory_files, synthesize_default_parts, BUNDLE_MANDATORY_FILES};
pub use part::{PartDecl, PartSpec};
pub use pattern::{Pattern, Selection, SelectionRule};
pub use plan::{build_plan, BuildPlan};
pub use project::{
    load_project, parse_project_file, parse_project_str, BaseConfig, ProjectConfig, ProjectType,
    PROJECT_FILE,
};
pub use types::{PartName, PluginName};

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("failed to read project file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse project file: {0}")]
    ParseYaml(#[from] serde_yaml::Error),
    #[error("Project file not found: '{}'.", .0.display())]
    ProjectFileNotFound(PathBuf),
    #[error("Project declares no 'name'.")]
    MissingName,
    #[error("Project declares no parts.")]
    NoParts,
    #[error("Invalid part name '{0}': must be a single path segment other than '.' or '..'.")]
    InvalidPartName(String),
    #[error("Part '{0}' is declared more than once.")]
    DuplicatePart(String),
    #[error("Invalid pattern '{pattern}': {reason}.")]
    InvalidPattern { pattern: String, reason: String },
    #[error("Part '{part}' declares a dependency on undefined part '{dependency}'.")]
    UnknownDependency { part: String, dependency: String },
    #[error("A circular dependency chain was detected: {}.", format_cycle(.0))]
    DependencyCycle(Vec<String>),
    #[error("Bases index '{0}' is invalid (must be >= 0 and fit in configured bases).")]
    InvalidBasesIndex(i64),
    #[error("Missing or invalid main bundle file: '{}'.", .0.display())]
    InvalidBundleFile(PathBuf),
    #[error(
        "Invalid bundle config; missing a 'name' field indicating the bundle's name in file '{}'.",
        .0.display()
    )]
    MissingBundleName(PathBuf),
}

fn format_cycle(chain: &[String]) -> String {
    chain
        .iter()
        .map(|name| format!("'{name}'"))
        .collect::<Vec<_>>()
        .join(" -> ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bases_index_message_is_stable() {
        let e = SchemaError::InvalidBasesIndex(-1);
        assert_eq!(
            e.to_string(),
            "Bases index '-1' is invalid (must be >= 0 and fit in configured bases)."
        );
    }

    #[test]
    fn cycle_message_names_the_chain() {
        let e = SchemaError::DependencyCycle(vec!["a".to_owned(), "b".to_owned(), "a".to_owned()]);
        assert_eq!(
            e.to_string(),
            "A circular dependency chain was detected: 'a' -> 'b' -> 'a'."
        );
    }

    #[test]
    fn bundle_errors_quote_the_path() {
        let e = SchemaError::InvalidBundleFile(PathBuf::from("/p/bundle.yaml"));
        assert_eq!(
            e.to_string(),
            "Missing or invalid main bundle file: '/p/bundle.yaml'."
        );
        let e = SchemaError::MissingBundleName(PathBuf::from("/p/bundle.yaml"));
        assert!(e.to_string().ends_with("in file '/p/bundle.yaml'."));
    }
}
