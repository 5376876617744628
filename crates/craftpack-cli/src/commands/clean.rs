use super::{json_pretty, CliError, EXIT_SUCCESS};
use crate::OutputFormat;
use craftpack_core::{Packer, TracingReporter};
use std::path::Path;

pub fn run(
    project_dir: &Path,
    work_dir: Option<&Path>,
    format: OutputFormat,
) -> Result<u8, CliError> {
    let reporter = TracingReporter;
    let removed = Packer::new(&reporter).clean(project_dir, work_dir)?;

    match format {
        OutputFormat::Json => {
            let removed = removed.as_ref().map(|p| p.display().to_string());
            println!("{}", json_pretty(&serde_json::json!({ "removed": removed }))?);
        }
        OutputFormat::Text => match removed {
            Some(path) => println!("removed {}", path.display()),
            None => println!("nothing to clean"),
        },
    }
    Ok(EXIT_SUCCESS)
}
