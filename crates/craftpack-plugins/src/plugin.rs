use crate::PluginError;
use craftpack_schema::PartSpec;
use std::path::Path;

/// Everything a plugin may read or write for one part.
///
/// `src_dir` and `install_dir` are empty when `pull` and `build` are called.
#[derive(Debug, Clone, Copy)]
pub struct PluginContext<'a> {
    pub part: &'a PartSpec,
    pub project_dir: &'a Path,
    pub src_dir: &'a Path,
    pub install_dir: &'a Path,
    /// Shared stage tree, holding the output of every dependency.
    pub stage_dir: &'a Path,
    /// Top-level source names a pull must not copy.
    pub ignore: &'a [String],
    pub build_for: &'a str,
}

/// Result of a successful build.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildOutput {
    /// Relative paths written under the install area, sorted.
    pub produced: Vec<String>,
}

pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;

    /// Reject plugin options this plugin does not understand.
    fn validate_options(&self, part: &PartSpec) -> Result<(), PluginError> {
        match part.plugin_options.keys().next() {
            Some(option) => Err(PluginError::InvalidOption {
                plugin: self.name().to_owned(),
                option: option.clone(),
            }),
            None => Ok(()),
        }
    }

    fn pull(&self, ctx: &PluginContext<'_>) -> Result<(), PluginError>;

    fn build(&self, ctx: &PluginContext<'_>) -> Result<BuildOutput, PluginError>;
}
