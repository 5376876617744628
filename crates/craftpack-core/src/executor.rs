//! Runs every part of a [`BuildPlan`] through pull, build, stage and prime.
//!
//! Each step is keyed by a blake3 fingerprint of its inputs and skipped when
//! the fingerprint matches the last successful run and its output still
//! exists. The shared stage and prime trees are tracked by ordered ledgers
//! (see [`TreeLedger`](craftpack_store::TreeLedger)); when a ledger stops
//! being a prefix of the current plan the tree is rebuilt from scratch by
//! replaying the parts that are still valid, which keeps last-writer-wins
//! overrides in plan order.
//!
//! Builds may run on a bounded `rayon` pool. Pull, stage and prime always run
//! on the calling thread, and stage and prime strictly in plan order.

use crate::concurrency::CancelFlag;
use crate::lifecycle::{validate_transition, Step};
use crate::measure::{MeasureId, Measurements};
use crate::report::{Level, Reporter};
use crate::CoreError;
use craftpack_plugins::{BuildOutput, Plugin, PluginContext, PluginError, PluginRegistry};
use craftpack_schema::{host_architecture, BuildPlan, PartSpec};
use craftpack_store::{
    collect_tree, copy_into, remove_path, reset_dir, Fingerprint, LifecycleState, PartState,
    StateStore, StoreError, TreeState, WorkLayout,
};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct ExecutorOptions {
    /// Maximum number of concurrent builds. `1` runs everything sequentially.
    pub jobs: usize,
    /// Keep building independent parts after a failure.
    pub keep_going: bool,
    pub build_for: String,
    /// Top-level source names never pulled into a part.
    pub ignore: Vec<String>,
    /// Collector receiving one timing per executed step.
    pub measurements: Measurements,
    /// Measurement the step timings are nested under.
    pub measure_parent: Option<MeasureId>,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self {
            jobs: 1,
            keep_going: false,
            build_for: host_architecture().to_owned(),
            ignore: Vec::new(),
            measurements: Measurements::new(),
            measure_parent: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepRecord {
    pub part: String,
    pub step: Step,
}

/// What a run did, in the order it happened.
#[derive(Debug, Clone, Default)]
pub struct ExecutionReport {
    pub executed: Vec<StepRecord>,
    pub skipped: Vec<StepRecord>,
    /// Relative paths in the prime tree after the run, sorted.
    pub primed: Vec<String>,
}

impl ExecutionReport {
    pub fn steps_run(&self, part: &str) -> Vec<Step> {
        steps_of(&self.executed, part)
    }

    pub fn steps_skipped(&self, part: &str) -> Vec<Step> {
        steps_of(&self.skipped, part)
    }
}

fn steps_of(records: &[StepRecord], part: &str) -> Vec<Step> {
    records
        .iter()
        .filter(|r| r.part == part)
        .map(|r| r.step)
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Waiting,
    Building,
    Built,
    Staged,
    Failed,
    Blocked,
}

impl Slot {
    fn is_dead(self) -> bool {
        matches!(self, Slot::Failed | Slot::Blocked)
    }
}

type BuildResult = (usize, String, Result<BuildOutput, PluginError>);

/// A build step detached from the executor so it can run on a worker.
struct BuildJob<'a> {
    idx: usize,
    fingerprint: String,
    plugin: Arc<dyn Plugin>,
    part: &'a PartSpec,
    project_dir: &'a Path,
    src_dir: PathBuf,
    install_dir: PathBuf,
    stage_dir: PathBuf,
    ignore: Vec<String>,
    build_for: String,
    measurements: Measurements,
    measure_parent: Option<MeasureId>,
}

impl BuildJob<'_> {
    fn run(self, tx: &Sender<BuildResult>) {
        let timing = start_step(
            &self.measurements,
            self.measure_parent.as_ref(),
            &self.part.name,
            Step::Build,
        );
        let result = {
            let ctx = PluginContext {
                part: self.part,
                project_dir: self.project_dir,
                src_dir: &self.src_dir,
                install_dir: &self.install_dir,
                stage_dir: &self.stage_dir,
                ignore: &self.ignore,
                build_for: &self.build_for,
            };
            self.plugin.build(&ctx)
        };
        self.measurements.end(&timing);
        // The receiver outlives every job; a failed send means the run is over.
        let _ = tx.send((self.idx, self.fingerprint, result));
    }
}

pub struct Executor<'a> {
    plan: &'a BuildPlan,
    registry: &'a PluginRegistry,
    layout: &'a WorkLayout,
    project_dir: &'a Path,
    reporter: &'a dyn Reporter,
    cancel: &'a CancelFlag,
    options: ExecutorOptions,
    store: StateStore,
    deps: Vec<Vec<usize>>,
    states: Vec<PartState>,
    trees: TreeState,
    /// Plan indices in the order they were staged.
    stage_order: Vec<usize>,
    report: ExecutionReport,
}

impl<'a> Executor<'a> {
    pub fn new(
        plan: &'a BuildPlan,
        registry: &'a PluginRegistry,
        layout: &'a WorkLayout,
        project_dir: &'a Path,
        reporter: &'a dyn Reporter,
        cancel: &'a CancelFlag,
        options: ExecutorOptions,
    ) -> Self {
        let deps = plan
            .iter()
            .map(|part| {
                part.after
                    .iter()
                    .filter_map(|dep| plan.position(dep))
                    .collect()
            })
            .collect();
        Self {
            plan,
            registry,
            layout,
            project_dir,
            reporter,
            cancel,
            options,
            store: StateStore::new(layout.clone()),
            deps,
            states: Vec::new(),
            trees: TreeState::default(),
            stage_order: Vec::new(),
            report: ExecutionReport::default(),
        }
    }

    /// Run the whole plan. The prime tree is complete when this returns `Ok`.
    pub fn run(mut self) -> Result<ExecutionReport, CoreError> {
        let had_stage = self.layout.stage_dir().is_dir();
        let had_prime = self.layout.prime_dir().is_dir();
        self.layout.initialize()?;

        self.trees = self.store.get_trees();
        if !had_stage {
            self.trees.stage.clear();
        }
        if !had_prime {
            self.trees.prime.clear();
        }

        self.states = self
            .plan
            .iter()
            .map(|part| match self.store.get(&part.name) {
                Ok(Some(state)) => state,
                Ok(None) => PartState::new(part.name.clone()),
                Err(e) => {
                    warn!("discarding state of part '{}': {e}", part.name);
                    PartState::new(part.name.clone())
                }
            })
            .collect();
        self.prune_dropped_parts()?;

        self.run_to_stage()?;
        self.prime_all()?;

        self.report.primed = collect_tree(&self.layout.prime_dir())?
            .into_iter()
            .map(|e| e.rel)
            .collect();
        Ok(self.report)
    }

    /// Forget parts that ran before but are no longer in the plan.
    fn prune_dropped_parts(&self) -> Result<(), CoreError> {
        for name in self.store.recorded_parts()? {
            if self.plan.get(&name).is_some() {
                continue;
            }
            debug!("removing state of dropped part '{name}'");
            self.store.remove(&name)?;
            remove_path(&self.layout.part_dir(&name))?;
        }
        Ok(())
    }

    fn run_to_stage(&mut self) -> Result<(), CoreError> {
        if self.options.jobs > 1 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(self.options.jobs)
                .thread_name(|i| format!("craftpack-build-{i}"))
                .build()
                .map_err(|e| CoreError::Io(std::io::Error::other(e.to_string())))?;
            debug!("building with {} workers", self.options.jobs);
            pool.in_place_scope(|scope| self.schedule(Some(scope)))?;
        } else {
            self.schedule(None)?;
        }

        if self.trees.stage.len() > self.stage_order.len() {
            self.rebuild_stage(self.stage_order.len())?;
        }
        Ok(())
    }

    /// Drive pull, build and stage for every part.
    ///
    /// Without a scope builds run inline, one part at a time in plan order.
    /// With a scope up to `jobs` builds run on the pool; a part is launched
    /// once all of its dependencies are staged.
    fn schedule<'s>(&mut self, scope: Option<&rayon::Scope<'s>>) -> Result<(), CoreError>
    where
        'a: 's,
    {
        let n = self.plan.len();
        let limit = if scope.is_some() {
            self.options.jobs.max(1)
        } else {
            1
        };
        let (tx, rx) = mpsc::channel::<BuildResult>();
        let mut slots = vec![Slot::Waiting; n];
        let mut errors: BTreeMap<usize, CoreError> = BTreeMap::new();
        let mut in_flight = 0usize;
        let mut stop = false;
        let mut cancelled = false;

        loop {
            if !stop {
                self.stage_ready(&mut slots, &mut errors, &mut stop);
            }

            for idx in 0..n {
                if slots[idx] == Slot::Waiting && self.deps[idx].iter().any(|&d| slots[d].is_dead())
                {
                    slots[idx] = Slot::Blocked;
                    self.reporter.report(
                        Level::Warn,
                        &format!(
                            "Skipping part '{}': a part it depends on failed",
                            self.plan.parts()[idx].name
                        ),
                    );
                }
            }

            if !stop && self.cancel.is_cancelled() {
                self.reporter
                    .report(Level::Warn, "Cancelled; waiting for running builds");
                cancelled = true;
                stop = true;
            }

            let mut progressed = false;
            if !stop {
                for idx in 0..n {
                    if in_flight >= limit {
                        break;
                    }
                    if slots[idx] != Slot::Waiting
                        || !self.deps[idx].iter().all(|&d| slots[d] == Slot::Staged)
                    {
                        continue;
                    }
                    progressed = true;
                    match self.prepare_build(idx) {
                        Ok(Some(job)) => {
                            slots[idx] = Slot::Building;
                            in_flight += 1;
                            let tx = tx.clone();
                            match scope {
                                Some(scope) => scope.spawn(move |_| job.run(&tx)),
                                None => job.run(&tx),
                            }
                        }
                        Ok(None) => slots[idx] = Slot::Built,
                        Err(e) => {
                            slots[idx] = Slot::Failed;
                            errors.insert(idx, e);
                            stop = !self.options.keep_going;
                        }
                    }
                    if scope.is_none() || stop {
                        break;
                    }
                }
            }

            if in_flight == 0 {
                if progressed {
                    continue;
                }
                break;
            }

            let (idx, fingerprint, result) = rx.recv().map_err(|_| {
                CoreError::Io(std::io::Error::other("build worker exited unexpectedly"))
            })?;
            in_flight -= 1;
            match self.finish_build(idx, fingerprint, result) {
                Ok(()) => slots[idx] = Slot::Built,
                Err(e) => {
                    slots[idx] = Slot::Failed;
                    errors.insert(idx, e);
                    if !self.options.keep_going {
                        stop = true;
                    }
                }
            }
        }

        if let Some((_, err)) = errors.into_iter().next() {
            return Err(err);
        }
        if cancelled {
            return Err(CoreError::Cancelled);
        }
        Ok(())
    }

    /// Stage built parts whose predecessors in plan order are settled.
    fn stage_ready(
        &mut self,
        slots: &mut [Slot],
        errors: &mut BTreeMap<usize, CoreError>,
        stop: &mut bool,
    ) {
        for idx in 0..slots.len() {
            match slots[idx] {
                Slot::Staged | Slot::Failed | Slot::Blocked => continue,
                Slot::Built => match self.stage_part(idx) {
                    Ok(()) => slots[idx] = Slot::Staged,
                    Err(e) => {
                        slots[idx] = Slot::Failed;
                        errors.insert(idx, e);
                        if !self.options.keep_going {
                            *stop = true;
                            return;
                        }
                    }
                },
                Slot::Waiting | Slot::Building => return,
            }
        }
    }

    fn part(&self, idx: usize) -> &'a PartSpec {
        &self.plan.parts()[idx]
    }

    fn context<'c>(
        &'c self,
        part: &'c PartSpec,
        src: &'c Path,
        install: &'c Path,
        stage: &'c Path,
    ) -> PluginContext<'c> {
        PluginContext {
            part,
            project_dir: self.project_dir,
            src_dir: src,
            install_dir: install,
            stage_dir: stage,
            ignore: &self.options.ignore,
            build_for: &self.options.build_for,
        }
    }

    /// Pull the part and decide whether its build must run.
    fn prepare_build(&mut self, idx: usize) -> Result<Option<BuildJob<'a>>, CoreError> {
        let part = self.part(idx);
        let plugin = self.registry.for_part(part)?;
        let src = self.layout.part_src_dir(&part.name);
        let install = self.layout.part_install_dir(&part.name);
        let stage = self.layout.stage_dir();

        let pull_fp = self.pull_fingerprint(part).map_err(step_io(part, Step::Pull))?;
        if self.states[idx].fingerprints.pull.as_deref() == Some(pull_fp.as_str()) && src.is_dir()
        {
            self.skip(idx, Step::Pull)?;
        } else {
            self.reporter
                .report(Level::Info, &format!("Pulling {}", part.name));
            self.states[idx].fingerprints.pull = None;
            self.states[idx].fingerprints.clear_from_build();
            self.persist(idx)?;
            if let Err(e) = reset_dir(&src) {
                return Err(self.fail(idx, step_io(part, Step::Pull)(e)));
            }
            let timing = self.start_step(part, Step::Pull);
            let pulled = plugin.pull(&self.context(part, &src, &install, &stage));
            self.options.measurements.end(&timing);
            if let Err(source) = pulled {
                return Err(self.fail(
                    idx,
                    CoreError::StepFailed {
                        part: part.name.to_string(),
                        step: Step::Pull,
                        source,
                    },
                ));
            }
            self.states[idx].fingerprints.pull = Some(pull_fp.clone());
            self.executed(idx, Step::Pull)?;
        }

        let build_fp = self.build_fingerprint(idx, &pull_fp).map_err(step_io(part, Step::Build))?;
        if self.states[idx].fingerprints.build.as_deref() == Some(build_fp.as_str())
            && install.is_dir()
        {
            self.skip(idx, Step::Build)?;
            return Ok(None);
        }

        self.reporter
            .report(Level::Info, &format!("Building {}", part.name));
        self.states[idx].fingerprints.clear_from_build();
        self.persist(idx)?;
        if let Err(e) = reset_dir(&install) {
            return Err(self.fail(idx, step_io(part, Step::Build)(e)));
        }

        Ok(Some(BuildJob {
            idx,
            fingerprint: build_fp,
            plugin,
            part,
            project_dir: self.project_dir,
            src_dir: src,
            install_dir: install,
            stage_dir: stage,
            ignore: self.options.ignore.clone(),
            build_for: self.options.build_for.clone(),
            measurements: self.options.measurements.clone(),
            measure_parent: self.options.measure_parent.clone(),
        }))
    }

    fn finish_build(
        &mut self,
        idx: usize,
        fingerprint: String,
        result: Result<BuildOutput, PluginError>,
    ) -> Result<(), CoreError> {
        let part = self.part(idx);
        match result {
            Ok(output) => {
                debug!(
                    "part '{}' produced {} files",
                    part.name,
                    output.produced.len()
                );
                self.states[idx].fingerprints.build = Some(fingerprint);
                self.executed(idx, Step::Build)
            }
            Err(source) => Err(self.fail(
                idx,
                CoreError::StepFailed {
                    part: part.name.to_string(),
                    step: Step::Build,
                    source,
                },
            )),
        }
    }

    fn stage_part(&mut self, idx: usize) -> Result<(), CoreError> {
        let part = self.part(idx);
        let pos = self.stage_order.len();
        let fp = self.stage_fingerprint(idx).map_err(step_io(part, Step::Stage))?;

        if self.trees.stage.is_current(pos, &part.name, &fp)
            && self.states[idx].fingerprints.stage.as_deref() == Some(fp.as_str())
        {
            self.skip(idx, Step::Stage)?;
            self.stage_order.push(idx);
            return Ok(());
        }

        if self.trees.stage.len() > pos {
            if let Err(e) = self.rebuild_stage(pos) {
                return Err(self.fail(idx, e));
            }
        }

        self.reporter
            .report(Level::Info, &format!("Staging {}", part.name));
        let timing = self.start_step(part, Step::Stage);
        let staged = self.apply_stage(idx, false);
        self.options.measurements.end(&timing);
        let staged = match staged {
            Ok(staged) => staged,
            Err(e) => return Err(self.fail(idx, e)),
        };

        let state = &mut self.states[idx];
        state.staged_files = staged;
        state.primed_files.clear();
        state.fingerprints.clear_from_stage();
        state.fingerprints.stage = Some(fp.clone());
        self.trees.stage.record(pos, part.name.clone(), fp);
        self.store.put_trees(&self.trees)?;
        self.executed(idx, Step::Stage)?;
        self.stage_order.push(idx);
        Ok(())
    }

    /// Wipe the stage tree and replay the first `keep` staged parts.
    fn rebuild_stage(&mut self, keep: usize) -> Result<(), CoreError> {
        debug!("rebuilding stage tree from {keep} parts");
        self.trees.stage.clear();
        self.store.put_trees(&self.trees)?;
        reset_dir(&self.layout.stage_dir())?;

        for pos in 0..keep {
            let idx = self.stage_order[pos];
            self.apply_stage(idx, true)?;
            let fp = self.states[idx].fingerprints.stage.clone().unwrap_or_default();
            let name = self.part(idx).name.clone();
            self.trees.stage.record(pos, name, fp);
        }
        self.store.put_trees(&self.trees)?;
        Ok(())
    }

    /// Copy the part's selected install files into the stage tree.
    ///
    /// Files already staged by earlier parts are overwritten.
    fn apply_stage(&self, idx: usize, replay: bool) -> Result<Vec<String>, CoreError> {
        let part = self.part(idx);
        let install = self.layout.part_install_dir(&part.name);
        let stage = self.layout.stage_dir();

        let entries = collect_tree(&install).map_err(step_io(part, Step::Stage))?;
        let selection = part.stage.select(entries.iter().map(|e| e.rel.as_str()));
        if !replay {
            for missing in &selection.missing {
                self.reporter.report(
                    Level::Warn,
                    &format!("Stage pattern '{missing}' of part '{}' matched no file", part.name),
                );
            }
        }

        for rel in &selection.matched {
            let dst = stage.join(rel);
            if !replay && dst.symlink_metadata().is_ok() {
                debug!("part '{}' overrides staged '{rel}'", part.name);
            }
            copy_into(&install.join(rel), &stage, rel).map_err(step_io(part, Step::Stage))?;
        }
        Ok(selection.matched)
    }

    fn prime_all(&mut self) -> Result<(), CoreError> {
        let order = self.stage_order.clone();
        for (pos, &idx) in order.iter().enumerate() {
            if self.cancel.is_cancelled() {
                return Err(CoreError::Cancelled);
            }
            self.prime_part(pos, idx)?;
        }
        if self.trees.prime.len() > order.len() {
            self.rebuild_prime(order.len())?;
        }
        Ok(())
    }

    fn prime_part(&mut self, pos: usize, idx: usize) -> Result<(), CoreError> {
        let part = self.part(idx);
        let fp = self.prime_fingerprint(idx).map_err(step_io(part, Step::Prime))?;

        if self.trees.prime.is_current(pos, &part.name, &fp)
            && self.states[idx].fingerprints.prime.as_deref() == Some(fp.as_str())
        {
            return self.skip(idx, Step::Prime);
        }

        if self.trees.prime.len() > pos {
            if let Err(e) = self.rebuild_prime(pos) {
                return Err(self.fail(idx, e));
            }
        }

        self.reporter
            .report(Level::Info, &format!("Priming {}", part.name));
        let timing = self.start_step(part, Step::Prime);
        let primed = self.apply_prime(idx);
        self.options.measurements.end(&timing);
        let primed = match primed {
            Ok(primed) => primed,
            Err(e) => return Err(self.fail(idx, e)),
        };

        self.states[idx].primed_files = primed;
        self.states[idx].fingerprints.prime = Some(fp.clone());
        self.trees.prime.record(pos, part.name.clone(), fp);
        self.store.put_trees(&self.trees)?;
        self.executed(idx, Step::Prime)
    }

    fn rebuild_prime(&mut self, keep: usize) -> Result<(), CoreError> {
        debug!("rebuilding prime tree from {keep} parts");
        self.trees.prime.clear();
        self.store.put_trees(&self.trees)?;
        reset_dir(&self.layout.prime_dir())?;

        for pos in 0..keep {
            let idx = self.stage_order[pos];
            self.apply_prime(idx)?;
            let fp = self.states[idx].fingerprints.prime.clone().unwrap_or_default();
            let name = self.part(idx).name.clone();
            self.trees.prime.record(pos, name, fp);
        }
        self.store.put_trees(&self.trees)?;
        Ok(())
    }

    /// Copy the part's selected staged files into the prime tree.
    ///
    /// An explicit pattern that matches none of the part's staged files is a
    /// missing input.
    fn apply_prime(&self, idx: usize) -> Result<Vec<String>, CoreError> {
        let part = self.part(idx);
        let stage = self.layout.stage_dir();
        let prime = self.layout.prime_dir();

        let staged = &self.states[idx].staged_files;
        let selection = part.prime.select(staged.iter().map(String::as_str));
        if let Some(missing) = selection.missing.first() {
            return Err(CoreError::MissingPrimeFile(stage.join(missing)));
        }

        for rel in &selection.matched {
            copy_into(&stage.join(rel), &prime, rel).map_err(step_io(part, Step::Prime))?;
        }
        Ok(selection.matched)
    }

    fn pull_fingerprint(&self, part: &PartSpec) -> Result<String, StoreError> {
        let mut fp = Fingerprint::new("pull");
        fp.push_str(&part.name)
            .push_str(&part.plugin)
            .push_json(&part.plugin_options)?
            .push_json(&self.options.ignore)?;
        match part.source.as_deref() {
            Some(source) => {
                fp.push_str(&source.to_string_lossy())
                    .push_tree(source, &self.options.ignore)?;
            }
            None => {
                fp.push_str("");
            }
        }
        Ok(fp.finish())
    }

    fn build_fingerprint(&self, idx: usize, pull_fp: &str) -> Result<String, StoreError> {
        let part = self.part(idx);
        let mut fp = Fingerprint::new("build");
        fp.push_str(pull_fp)
            .push_str(&part.plugin)
            .push_json(&part.plugin_options)?
            .push_str(&self.options.build_for);
        for &dep in &self.deps[idx] {
            fp.push_str(&self.plan.parts()[dep].name)
                .push_str(self.states[dep].fingerprints.stage.as_deref().unwrap_or_default());
        }
        Ok(fp.finish())
    }

    fn stage_fingerprint(&self, idx: usize) -> Result<String, StoreError> {
        let part = self.part(idx);
        let mut fp = Fingerprint::new("stage");
        fp.push_str(self.states[idx].fingerprints.build.as_deref().unwrap_or_default())
            .push_json(&part.stage)?
            .push_tree(&self.layout.part_install_dir(&part.name), &[])?;
        Ok(fp.finish())
    }

    fn prime_fingerprint(&self, idx: usize) -> Result<String, StoreError> {
        let part = self.part(idx);
        let mut fp = Fingerprint::new("prime");
        fp.push_str(self.states[idx].fingerprints.stage.as_deref().unwrap_or_default())
            .push_json(&part.prime)?
            .push_str(&self.trees.stage.digest());
        Ok(fp.finish())
    }

    fn transition(&mut self, idx: usize, step: Step) -> Result<(), CoreError> {
        let state = &mut self.states[idx];
        validate_transition(state.state, step.reached_state())?;
        state.state = step.reached_state();
        state.failure = None;
        self.persist(idx)
    }

    fn start_step(&self, part: &PartSpec, step: Step) -> MeasureId {
        start_step(
            &self.options.measurements,
            self.options.measure_parent.as_ref(),
            &part.name,
            step,
        )
    }

    fn skip(&mut self, idx: usize, step: Step) -> Result<(), CoreError> {
        let name = self.part(idx).name.to_string();
        self.reporter.report(
            Level::Debug,
            &format!("Skipping {step} for part '{name}' (already ran)"),
        );
        self.transition(idx, step)?;
        self.report.skipped.push(StepRecord { part: name, step });
        Ok(())
    }

    fn executed(&mut self, idx: usize, step: Step) -> Result<(), CoreError> {
        self.transition(idx, step)?;
        let part = self.part(idx).name.to_string();
        self.report.executed.push(StepRecord { part, step });
        Ok(())
    }

    fn persist(&mut self, idx: usize) -> Result<(), CoreError> {
        let state = &mut self.states[idx];
        state.updated_at = chrono::Utc::now().to_rfc3339();
        self.store.put(state)?;
        Ok(())
    }

    /// Mark the part failed and hand the error back.
    fn fail(&mut self, idx: usize, err: CoreError) -> CoreError {
        self.reporter.report(Level::Error, &err.to_string());
        let state = &mut self.states[idx];
        state.state = LifecycleState::Failed;
        state.failure = Some(err.to_string());
        if let Err(e) = self.persist(idx) {
            warn!("failed to record failure of part '{}': {e}", self.part(idx).name);
        }
        err
    }
}

fn start_step(
    measurements: &Measurements,
    parent: Option<&MeasureId>,
    part: &str,
    step: Step,
) -> MeasureId {
    let step_name = step.to_string();
    measurements.start(
        &format!("{step} part '{part}'"),
        parent,
        &[("part", part), ("step", &step_name)],
    )
}

fn step_io(part: &PartSpec, step: Step) -> impl FnOnce(StoreError) -> CoreError {
    let part = part.name.to_string();
    move |source| CoreError::StepIo { part, step, source }
}
