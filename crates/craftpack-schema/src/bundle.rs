use crate::SchemaError;
use std::fs;
use std::path::Path;

/// Main bundle file, required at the root of every bundle project.
pub const BUNDLE_FILE: &str = "bundle.yaml";

/// Read the bundle name from `bundle.yaml` in the project directory.
///
/// The file must exist and hold a YAML mapping with a non-empty `name`.
pub fn load_bundle_name(project_dir: &Path) -> Result<String, SchemaError> {
    let path = project_dir.join(BUNDLE_FILE);
    let content =
        fs::read_to_string(&path).map_err(|_| SchemaError::InvalidBundleFile(path.clone()))?;
    let doc: serde_yaml::Value =
        serde_yaml::from_str(&content).map_err(|_| SchemaError::InvalidBundleFile(path.clone()))?;
    let serde_yaml::Value::Mapping(map) = doc else {
        return Err(SchemaError::InvalidBundleFile(path));
    };

    match map.get("name").and_then(serde_yaml::Value::as_str) {
        Some(name) if !name.trim().is_empty() => Ok(name.trim().to_owned()),
        _ => Err(SchemaError::MissingBundleName(path)),
    }
}
