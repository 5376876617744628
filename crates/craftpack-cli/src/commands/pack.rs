use super::{json_pretty, spin_fail, spin_ok, spinner, CliError, CliReporter, EXIT_SUCCESS};
use crate::OutputFormat;
use craftpack_core::{CancelFlag, Measurements, PackOptions, PackResult, Packer};
use craftpack_schema::ProjectType;
use std::fs;
use std::path::{Path, PathBuf};

pub fn run(
    options: &PackOptions,
    cancel: CancelFlag,
    format: OutputFormat,
    measure: Option<&Path>,
) -> Result<u8, CliError> {
    // An interactive shell cannot share the terminal with a ticking spinner.
    let interactive = options.shell || options.shell_after || options.debug;
    let progress = (format == OutputFormat::Text && !interactive).then(|| spinner("packing..."));
    let reporter = CliReporter::new(progress.clone());
    let measurements = Measurements::new();
    let packer = Packer::new(&reporter)
        .with_cancel_flag(cancel)
        .with_measurements(measurements.clone());

    let packed = packer.pack(options);
    if let Some(path) = measure {
        let dumped = dump_measurements(&measurements, path);
        match (&packed, dumped) {
            (Ok(_), Err(e)) => return Err(e.into()),
            (Err(_), Err(e)) => tracing::warn!("{e}"),
            (_, Ok(())) => tracing::debug!("measurements written to {}", path.display()),
        }
    }
    let result = match packed {
        Ok(result) => result,
        Err(e) => {
            if let Some(pb) = &progress {
                spin_fail(pb, "packing failed");
            }
            return Err(e.into());
        }
    };
    if let Some(pb) = &progress {
        if result.archives.is_empty() {
            pb.finish_and_clear();
        } else {
            spin_ok(pb, "packed");
        }
    }

    match format {
        OutputFormat::Json => println!("{}", json_pretty(&json_summary(&result))?),
        OutputFormat::Text => {
            for line in text_summary(&result) {
                println!("{line}");
            }
        }
    }
    Ok(EXIT_SUCCESS)
}

fn dump_measurements(measurements: &Measurements, path: &Path) -> Result<(), String> {
    let json = json_pretty(measurements)?;
    fs::write(path, json + "\n")
        .map_err(|e| format!("failed to write measurements to '{}': {e}", path.display()))
}

fn json_summary(result: &PackResult) -> serde_json::Value {
    let key = match result.project_type {
        ProjectType::Bundle => "bundles",
        ProjectType::Charm => "charms",
    };
    let mut summary = serde_json::Map::new();
    summary.insert(key.to_owned(), display_paths(&result.archives).into());
    serde_json::Value::Object(summary)
}

fn text_summary(result: &PackResult) -> Vec<String> {
    if result.archives.is_empty() {
        return Vec::new();
    }
    match result.project_type {
        ProjectType::Bundle => display_paths(&result.archives)
            .into_iter()
            .map(|p| format!("Created '{p}'."))
            .collect(),
        ProjectType::Charm => std::iter::once("Charms packed:".to_owned())
            .chain(
                display_paths(&result.archives)
                    .into_iter()
                    .map(|p| format!("    {p}")),
            )
            .collect(),
    }
}

fn display_paths(paths: &[PathBuf]) -> Vec<String> {
    paths.iter().map(|p| p.display().to_string()).collect()
}
