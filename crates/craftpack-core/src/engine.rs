use crate::assemble::{assemble, check_mandatory_files, Manifest};
use crate::concurrency::{CancelFlag, WorkLock};
use crate::executor::{ExecutionReport, Executor, ExecutorOptions};
use crate::measure::{MeasureId, Measurements};
use crate::plan::prepare_plan;
use crate::report::{Level, Reporter};
use crate::shell::{ShellLauncher, SystemShell};
use crate::CoreError;
use craftpack_plugins::PluginRegistry;
use craftpack_schema::{
    host_architecture, load_bundle_name, load_project, mandatory_files, resolve_build_for,
    select_bases, BaseConfig, BuildPlan, ProjectConfig, ProjectType, SchemaError, PROJECT_FILE,
};
use craftpack_store::{remove_path, ArchiveFormat, WorkLayout};
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, warn};

/// Work directory used when none is given, relative to the project.
pub const DEFAULT_WORK_DIR: &str = ".craftpack";

static SYSTEM_SHELL: SystemShell = SystemShell;

#[derive(Debug, Clone)]
pub struct PackOptions {
    pub project_dir: PathBuf,
    /// Relative paths are resolved against the project directory.
    pub work_dir: Option<PathBuf>,
    pub bases_indices: Vec<i64>,
    /// Archive path for a single target, or the directory receiving several.
    pub output: Option<PathBuf>,
    pub archive_format: Option<ArchiveFormat>,
    pub jobs: usize,
    pub keep_going: bool,
    /// Open a shell in the work directory when packing fails.
    pub debug: bool,
    /// Open a shell in the work directory instead of packing.
    pub shell: bool,
    /// Open a shell in the prime tree once the lifecycle has run.
    pub shell_after: bool,
    pub build_for: Option<String>,
}

impl PackOptions {
    pub fn new(project_dir: impl Into<PathBuf>) -> Self {
        Self {
            project_dir: project_dir.into(),
            work_dir: None,
            bases_indices: Vec::new(),
            output: None,
            archive_format: None,
            jobs: 1,
            keep_going: false,
            debug: false,
            shell: false,
            shell_after: false,
            build_for: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackResult {
    pub project_type: ProjectType,
    /// Produced archives, one per target. Empty when `shell` was requested.
    pub archives: Vec<PathBuf>,
}

/// One archive to produce: a base/architecture pair with its own work tree.
#[derive(Debug, Clone)]
struct Target {
    file_name: String,
    layout: WorkLayout,
    arch: String,
    base: Option<BaseConfig>,
}

/// Entry point for packing a project directory.
pub struct Packer<'a> {
    registry: PluginRegistry,
    reporter: &'a dyn Reporter,
    shell: &'a dyn ShellLauncher,
    cancel: CancelFlag,
    measurements: Measurements,
}

impl<'a> Packer<'a> {
    pub fn new(reporter: &'a dyn Reporter) -> Self {
        Self {
            registry: PluginRegistry::new(),
            reporter,
            shell: &SYSTEM_SHELL,
            cancel: CancelFlag::new(),
            measurements: Measurements::new(),
        }
    }

    #[must_use]
    pub fn with_registry(mut self, registry: PluginRegistry) -> Self {
        self.registry = registry;
        self
    }

    #[must_use]
    pub fn with_shell(mut self, shell: &'a dyn ShellLauncher) -> Self {
        self.shell = shell;
        self
    }

    #[must_use]
    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Record run timings into `measurements`.
    #[must_use]
    pub fn with_measurements(mut self, measurements: Measurements) -> Self {
        self.measurements = measurements;
        self
    }

    pub fn cancel_flag(&self) -> &CancelFlag {
        &self.cancel
    }

    /// Load the project and compute its build plan without running anything.
    pub fn plan(&self, project_dir: &Path) -> Result<BuildPlan, CoreError> {
        let project_dir = canonical_project_dir(project_dir)?;
        let project = load_project(&project_dir)?;
        prepare_plan(&project, &project_dir, &self.registry)
    }

    /// Remove the work directory. Returns the removed path, if it existed.
    pub fn clean(
        &self,
        project_dir: &Path,
        work_dir: Option<&Path>,
    ) -> Result<Option<PathBuf>, CoreError> {
        let project_dir = canonical_project_dir(project_dir)?;
        let work_root = resolve_work_dir(&project_dir, work_dir);
        if !work_root.exists() {
            return Ok(None);
        }

        let layout = WorkLayout::new(&work_root);
        {
            let _lock = WorkLock::try_acquire(&layout.lock_file())?
                .ok_or_else(|| CoreError::WorkDirLocked(work_root.clone()))?;
        }
        remove_path(&work_root)?;
        info!("removed {}", work_root.display());
        Ok(Some(work_root))
    }

    /// Run the lifecycle for every target and write one archive per target.
    pub fn pack(&self, options: &PackOptions) -> Result<PackResult, CoreError> {
        let root = self.measurements.start("Whole pack run", None, &[]);
        let result = self.pack_targets(options, &root);
        self.measurements.end(&root);
        result
    }

    fn pack_targets(
        &self,
        options: &PackOptions,
        root: &MeasureId,
    ) -> Result<PackResult, CoreError> {
        let project_dir = canonical_project_dir(&options.project_dir)?;
        let project = load_project(&project_dir)?;
        let project_type = project.project_type;

        let name = match project_type {
            ProjectType::Bundle => load_bundle_name(&project_dir)?,
            ProjectType::Charm => project.name.clone().ok_or(SchemaError::MissingName)?,
        };
        let format = options.archive_format.unwrap_or(match project_type {
            ProjectType::Bundle => ArchiveFormat::Zip,
            ProjectType::Charm => ArchiveFormat::Charm,
        });

        let work_root = resolve_work_dir(&project_dir, options.work_dir.as_deref());
        let targets = plan_targets(
            &project,
            &name,
            format,
            &work_root,
            options.build_for.as_deref(),
            &options.bases_indices,
        )?;
        let outputs = output_paths(&targets, &project_dir, options.output.as_deref());

        let mut ignore: Vec<String> = targets.iter().map(|t| t.file_name.clone()).collect();
        if let Some(top) = top_level_name(&project_dir, &work_root) {
            ignore.push(top);
        }

        let plan = prepare_plan(&project, &project_dir, &self.registry)?;
        let mandatory = mandatory_files(project_type);
        check_mandatory_files(&project_dir, mandatory)?;

        let mut archives = Vec::with_capacity(targets.len());
        for (target, output) in targets.iter().zip(&outputs) {
            fs::create_dir_all(target.layout.root())?;
            let _lock = WorkLock::try_acquire(&target.layout.lock_file())?
                .ok_or_else(|| CoreError::WorkDirLocked(target.layout.root().to_path_buf()))?;

            if options.shell {
                self.launch_shell(target.layout.root())?;
                continue;
            }

            self.reporter.report(
                Level::Info,
                &format!("Packing {} for {}", target.file_name, target.arch),
            );
            let started_at = chrono::Utc::now();
            let measure = self.measurements.start(
                "Pack target",
                Some(root),
                &[("archive", &target.file_name), ("arch", &target.arch)],
            );
            let executor_options = ExecutorOptions {
                jobs: options.jobs.max(1),
                keep_going: options.keep_going,
                build_for: target.arch.clone(),
                ignore: ignore.clone(),
                measurements: self.measurements.clone(),
                measure_parent: Some(measure.clone()),
            };

            let packed = self
                .run_lifecycle(&plan, &project_dir, target, executor_options)
                .and_then(|report| {
                    debug!("{} files primed", report.primed.len());
                    if options.shell_after {
                        self.launch_shell(&target.layout.prime_dir())?;
                    }
                    let mut manifest = Manifest::new(started_at, &target.arch);
                    if let Some(base) = &target.base {
                        manifest = manifest.with_base(base, &target.arch);
                    }
                    let assembling =
                        self.measurements
                            .start("Assemble archive", Some(&measure), &[]);
                    let assembled = assemble(
                        &target.layout.prime_dir(),
                        mandatory,
                        &manifest,
                        format,
                        output,
                    );
                    self.measurements.end(&assembling);
                    assembled
                });
            self.measurements.end(&measure);

            match packed {
                Ok(path) => archives.push(path),
                Err(e) => {
                    if options.debug && !matches!(e, CoreError::Cancelled) {
                        self.reporter.report(Level::Error, &e.to_string());
                        if let Err(shell_err) = self.launch_shell(target.layout.root()) {
                            warn!("{shell_err}");
                        }
                    }
                    return Err(e);
                }
            }
        }

        Ok(PackResult {
            project_type,
            archives,
        })
    }

    fn run_lifecycle(
        &self,
        plan: &BuildPlan,
        project_dir: &Path,
        target: &Target,
        options: ExecutorOptions,
    ) -> Result<ExecutionReport, CoreError> {
        Executor::new(
            plan,
            &self.registry,
            &target.layout,
            project_dir,
            self.reporter,
            &self.cancel,
            options,
        )
        .run()
    }

    fn launch_shell(&self, cwd: &Path) -> Result<(), CoreError> {
        self.reporter
            .report(Level::Info, &format!("Launching shell in {}", cwd.display()));
        self.shell.launch(cwd)
    }
}

fn canonical_project_dir(project_dir: &Path) -> Result<PathBuf, CoreError> {
    project_dir
        .canonicalize()
        .map_err(|_| SchemaError::ProjectFileNotFound(project_dir.join(PROJECT_FILE)).into())
}

fn resolve_work_dir(project_dir: &Path, work_dir: Option<&Path>) -> PathBuf {
    match work_dir {
        Some(dir) if dir.is_absolute() => dir.to_path_buf(),
        Some(dir) => project_dir.join(dir),
        None => project_dir.join(DEFAULT_WORK_DIR),
    }
}

/// First path component of `path` below `root`, when `path` is inside it.
fn top_level_name(root: &Path, path: &Path) -> Option<String> {
    match path.strip_prefix(root).ok()?.components().next()? {
        Component::Normal(name) => Some(name.to_string_lossy().into_owned()),
        _ => None,
    }
}

fn plan_targets(
    project: &ProjectConfig,
    name: &str,
    format: ArchiveFormat,
    work_root: &Path,
    build_for: Option<&str>,
    bases_indices: &[i64],
) -> Result<Vec<Target>, CoreError> {
    let host = host_architecture();
    let ext = format.extension();
    let selected = select_bases(&project.bases, bases_indices)?;

    if project.project_type == ProjectType::Bundle || selected.is_empty() {
        return Ok(vec![Target {
            file_name: format!("{name}.{ext}"),
            layout: WorkLayout::new(work_root),
            arch: resolve_build_for(build_for, host),
            base: None,
        }]);
    }

    let mut targets = Vec::new();
    for (_, base) in selected {
        let archs = if base.architectures.is_empty() {
            vec![host.to_owned()]
        } else {
            base.architectures.clone()
        };
        for arch in archs {
            let tag = base.tag(&arch);
            targets.push(Target {
                file_name: format!("{name}_{tag}.{ext}"),
                layout: WorkLayout::new(work_root).target(&tag),
                arch,
                base: Some(base.clone()),
            });
        }
    }
    Ok(targets)
}

fn output_paths(targets: &[Target], project_dir: &Path, output: Option<&Path>) -> Vec<PathBuf> {
    match output {
        Some(path) if targets.len() == 1 => vec![path.to_path_buf()],
        Some(dir) => targets.iter().map(|t| dir.join(&t.file_name)).collect(),
        None => targets
            .iter()
            .map(|t| project_dir.join(&t.file_name))
            .collect(),
    }
}
