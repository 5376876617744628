use crate::pattern::SelectionRule;
use crate::types::{PartName, PluginName};
use crate::SchemaError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// A part as written in the project file, before defaults and validation.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct PartDecl {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugin: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stage: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub prime: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub after: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub plugin_options: BTreeMap<String, String>,
}

/// A validated part, ready for planning and execution.
///
/// The serialized form is part of every step fingerprint, so any change to
/// the declaration invalidates the part's cached steps.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PartSpec {
    pub name: PartName,
    pub plugin: PluginName,
    pub source: Option<PathBuf>,
    pub stage: SelectionRule,
    pub prime: SelectionRule,
    pub after: Vec<PartName>,
    pub plugin_options: BTreeMap<String, String>,
}

impl PartDecl {
    /// Validate the declaration and resolve defaults.
    ///
    /// A missing plugin defaults to the part name. Relative sources are
    /// resolved against `project_dir`.
    pub fn normalize(&self, name: &str, project_dir: &Path) -> Result<PartSpec, SchemaError> {
        let name = name.trim();
        if name.is_empty() || name == "." || name == ".." || name.contains('/') {
            return Err(SchemaError::InvalidPartName(name.to_owned()));
        }

        let plugin = self
            .plugin
            .as_deref()
            .map_or(name, str::trim)
            .to_owned();

        let source = self.source.as_deref().map(|s| {
            let path = Path::new(s.trim());
            if path.is_absolute() {
                path.to_path_buf()
            } else {
                project_dir.join(path)
            }
        });

        let mut after: Vec<PartName> = Vec::with_capacity(self.after.len());
        for dep in &self.after {
            let dep = PartName::new(dep.trim());
            if !after.contains(&dep) {
                after.push(dep);
            }
        }

        Ok(PartSpec {
            name: PartName::new(name),
            plugin: PluginName::new(plugin),
            source,
            stage: SelectionRule::new(&self.stage)?,
            prime: SelectionRule::new(&self.prime)?,
            after,
            plugin_options: self.plugin_options.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plugin_defaults_to_part_name() {
        let spec = PartDecl::default()
            .normalize("dump", Path::new("/proj"))
            .unwrap();
        assert_eq!(spec.plugin, "dump");
    }

    #[test]
    fn relative_source_resolves_against_project() {
        let decl = PartDecl {
            plugin: Some("dump".to_owned()),
            source: Some("lib/".to_owned()),
            ..PartDecl::default()
        };
        let spec = decl.normalize("lib", Path::new("/proj")).unwrap();
        assert_eq!(spec.source, Some(PathBuf::from("/proj/lib/")));
    }

    #[test]
    fn absolute_source_is_kept() {
        let decl = PartDecl {
            source: Some("/srv/data".to_owned()),
            ..PartDecl::default()
        };
        let spec = decl.normalize("data", Path::new("/proj")).unwrap();
        assert_eq!(spec.source, Some(PathBuf::from("/srv/data")));
    }

    #[test]
    fn duplicate_after_entries_collapse() {
        let decl = PartDecl {
            after: vec!["a".to_owned(), "a".to_owned(), "b".to_owned()],
            ..PartDecl::default()
        };
        let spec = decl.normalize("c", Path::new("/proj")).unwrap();
        assert_eq!(spec.after, vec![PartName::from("a"), PartName::from("b")]);
    }

    #[test]
    fn invalid_pattern_is_a_configuration_error() {
        let decl = PartDecl {
            prime: vec!["../outside".to_owned()],
            ..PartDecl::default()
        };
        let err = decl.normalize("p", Path::new("/proj")).unwrap_err();
        assert!(matches!(err, SchemaError::InvalidPattern { .. }));
    }

    #[test]
    fn rejects_bad_part_names() {
        assert!(PartDecl::default()
            .normalize("", Path::new("/proj"))
            .is_err());
        assert!(PartDecl::default()
            .normalize("a/b", Path::new("/proj"))
            .is_err());
        for dots in [".", ".."] {
            let err = PartDecl::default()
                .normalize(dots, Path::new("/proj"))
                .unwrap_err();
            assert!(matches!(err, SchemaError::InvalidPartName(ref n) if n == dots));
        }
    }

    #[test]
    fn kebab_case_keys_parse() {
        let decl: PartDecl = serde_yaml::from_str(
            "plugin: dump\nsource: .\nplugin-options:\n  mode: fast\n",
        )
        .unwrap();
        assert_eq!(decl.plugin_options.get("mode").map(String::as_str), Some("fast"));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(serde_yaml::from_str::<PartDecl>("plugin: dump\nbogus: 1\n").is_err());
    }
}
