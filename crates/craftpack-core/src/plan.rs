use crate::CoreError;
use craftpack_plugins::PluginRegistry;
use craftpack_schema::{
    build_plan, synthesize_default_parts, BuildPlan, PartSpec, ProjectConfig, SchemaError,
};
use std::path::Path;
use tracing::debug;

/// Turn the project's declared parts into a validated execution plan.
///
/// Implicit parts are synthesized first, then every part is normalized,
/// ordered by its `after` declarations and checked against the registry.
pub fn prepare_plan(
    project: &ProjectConfig,
    project_dir: &Path,
    registry: &PluginRegistry,
) -> Result<BuildPlan, CoreError> {
    let declared = synthesize_default_parts(
        project.project_type,
        &project.parts,
        &project.prime,
        project_dir,
    );
    let specs = declared
        .iter()
        .map(|(name, decl)| decl.normalize(name, project_dir))
        .collect::<Result<Vec<PartSpec>, _>>()?;

    let plan = build_plan(specs)?;
    if plan.is_empty() {
        return Err(SchemaError::NoParts.into());
    }
    registry.validate(plan.iter())?;

    debug!(
        "plan: {}",
        plan.iter()
            .map(|p| p.name.as_str())
            .collect::<Vec<_>>()
            .join(" -> ")
    );
    Ok(plan)
}
