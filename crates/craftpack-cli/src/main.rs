mod commands;

use clap::{Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use commands::CliError;
use craftpack_core::{install_signal_handler, CancelFlag, PackOptions};
use craftpack_store::ArchiveFormat;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "craftpack",
    version,
    about = "Build project parts through their lifecycle and pack the result"
)]
struct Cli {
    /// Output format for command results.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text, global = true)]
    format: OutputFormat,

    /// Enable verbose (debug) logging output.
    #[arg(short, long, default_value_t = false, global = true)]
    verbose: bool,

    /// Enable trace-level logging (more detailed than --verbose).
    #[arg(long, default_value_t = false, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run every part through pull, build, stage and prime, then pack the result.
    Pack {
        /// Directory containing craftpack.yaml.
        #[arg(long, short = 'p', default_value = ".")]
        project_dir: PathBuf,
        /// Work directory for part state and intermediate trees.
        #[arg(long, env = "CRAFTPACK_WORK_DIR")]
        work_dir: Option<PathBuf>,
        /// Index of a declared base to build for (repeatable).
        #[arg(long = "bases-index", allow_negative_numbers = true)]
        bases_index: Vec<i64>,
        /// Open a shell in the work directory if packing fails.
        #[arg(long, default_value_t = false)]
        debug: bool,
        /// Open a shell in the work directory instead of packing.
        #[arg(long, default_value_t = false, conflicts_with_all = ["shell_after", "debug"])]
        shell: bool,
        /// Open a shell in the prime directory once the lifecycle finished.
        #[arg(long, default_value_t = false)]
        shell_after: bool,
        /// Number of parts built concurrently; 0 uses every available CPU.
        #[arg(long, short = 'j', env = "CRAFTPACK_JOBS", default_value_t = 1)]
        jobs: usize,
        /// Archive path (single target) or output directory (several targets).
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
        /// Archive container: zip, charm or tar.gz.
        #[arg(long)]
        archive_format: Option<ArchiveFormat>,
        /// Keep building parts that do not depend on a failed part.
        #[arg(long, default_value_t = false)]
        keep_going: bool,
        /// Target architecture, or a '-'-joined list of candidates.
        #[arg(long)]
        build_for: Option<String>,
        /// Write step timings as JSON to this file.
        #[arg(long, value_name = "FILE")]
        measure: Option<PathBuf>,
    },
    /// Print the order in which parts would run.
    Plan {
        /// Directory containing craftpack.yaml.
        #[arg(long, short = 'p', default_value = ".")]
        project_dir: PathBuf,
    },
    /// Remove the work directory and every recorded step.
    Clean {
        /// Directory containing craftpack.yaml.
        #[arg(long, short = 'p', default_value = ".")]
        project_dir: PathBuf,
        /// Work directory to remove.
        #[arg(long, env = "CRAFTPACK_WORK_DIR")]
        work_dir: Option<PathBuf>,
    },
    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        #[arg(value_enum)]
        shell: Shell,
    },
    /// Generate man pages.
    ManPages {
        /// Output directory for man pages.
        #[arg(default_value = "man")]
        dir: PathBuf,
    },
}

fn main() -> ExitCode {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let msg = info.to_string();
        if msg.contains("Broken pipe")
            || msg.contains("broken pipe")
            || msg.contains("os error 32")
            || msg.contains("failed printing to stdout")
        {
            std::process::exit(0);
        }
        default_hook(info);
    }));

    let cli = Cli::parse();

    let default_level = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("CRAFTPACK_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    let cancel = CancelFlag::new();
    install_signal_handler(&cancel);

    let format = cli.format;
    let result: Result<u8, CliError> = match cli.command {
        Commands::Pack {
            project_dir,
            work_dir,
            bases_index,
            debug,
            shell,
            shell_after,
            jobs,
            output,
            archive_format,
            keep_going,
            build_for,
            measure,
        } => {
            let options = PackOptions {
                work_dir,
                bases_indices: bases_index,
                output,
                archive_format,
                jobs: commands::resolve_jobs(jobs),
                keep_going,
                debug,
                shell,
                shell_after,
                build_for,
                ..PackOptions::new(project_dir)
            };
            commands::pack::run(&options, cancel, format, measure.as_deref())
        }
        Commands::Plan { project_dir } => commands::plan::run(&project_dir, format),
        Commands::Clean {
            project_dir,
            work_dir,
        } => commands::clean::run(&project_dir, work_dir.as_deref(), format),
        Commands::Completions { shell } => commands::completions::run::<Cli>(shell),
        Commands::ManPages { dir } => commands::man_pages::run::<Cli>(&dir),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            eprintln!("error: {}", err.message);
            ExitCode::from(err.code)
        }
    }
}
