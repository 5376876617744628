use super::{json_pretty, CliError, EXIT_SUCCESS};
use crate::OutputFormat;
use craftpack_core::{Packer, TracingReporter};
use craftpack_schema::{BuildPlan, PartName};
use serde::Serialize;
use std::path::Path;

#[derive(Debug, Serialize)]
struct PlannedPart<'a> {
    name: &'a str,
    plugin: &'a str,
    after: Vec<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    source: Option<String>,
}

pub fn run(project_dir: &Path, format: OutputFormat) -> Result<u8, CliError> {
    let reporter = TracingReporter;
    let plan = Packer::new(&reporter).plan(project_dir)?;
    let parts = planned_parts(&plan);

    match format {
        OutputFormat::Json => {
            println!("{}", json_pretty(&serde_json::json!({ "parts": parts }))?);
        }
        OutputFormat::Text => {
            let dim = console::Style::new().dim();
            for (i, part) in parts.iter().enumerate() {
                println!("{:>3}. {} {}", i + 1, part.name, dim.apply_to(part.plugin));
                if !part.after.is_empty() {
                    println!("     after: {}", part.after.join(", "));
                }
            }
        }
    }
    Ok(EXIT_SUCCESS)
}

fn planned_parts(plan: &BuildPlan) -> Vec<PlannedPart<'_>> {
    plan.iter()
        .map(|part| PlannedPart {
            name: part.name.as_str(),
            plugin: part.plugin.as_str(),
            after: part.after.iter().map(PartName::as_str).collect(),
            source: part.source.as_ref().map(|s| s.display().to_string()),
        })
        .collect()
}
