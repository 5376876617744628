use crate::plugin::{BuildOutput, Plugin, PluginContext};
use crate::PluginError;
use craftpack_store::copy_tree;
use std::collections::BTreeMap;
use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Test plugin that installs a fixed set of files and records its calls.
///
/// The source, when set, is pulled like `dump` and installed next to the
/// fixed files. Options: `fail` makes the build fail with its value as the
/// message, `delay-ms` sleeps before building.
pub struct MockPlugin {
    name: String,
    files: BTreeMap<String, String>,
    pulls: AtomicUsize,
    builds: AtomicUsize,
    log: Mutex<Vec<String>>,
}

impl MockPlugin {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            files: BTreeMap::new(),
            pulls: AtomicUsize::new(0),
            builds: AtomicUsize::new(0),
            log: Mutex::new(Vec::new()),
        }
    }

    /// Install `content` at `rel` on every build.
    #[must_use]
    pub fn with_file(mut self, rel: impl Into<String>, content: impl Into<String>) -> Self {
        self.files.insert(rel.into(), content.into());
        self
    }

    pub fn pull_count(&self) -> usize {
        self.pulls.load(Ordering::SeqCst)
    }

    pub fn build_count(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }

    /// `<step>:<part>` entries in call order.
    pub fn calls(&self) -> Vec<String> {
        self.log.lock().map(|l| l.clone()).unwrap_or_default()
    }

    fn record(&self, step: &str, part: &str) {
        if let Ok(mut log) = self.log.lock() {
            log.push(format!("{step}:{part}"));
        }
    }
}

impl Plugin for MockPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    fn validate_options(&self, part: &craftpack_schema::PartSpec) -> Result<(), PluginError> {
        match part
            .plugin_options
            .keys()
            .find(|k| !matches!(k.as_str(), "fail" | "delay-ms"))
        {
            Some(option) => Err(PluginError::InvalidOption {
                plugin: self.name.clone(),
                option: option.clone(),
            }),
            None => Ok(()),
        }
    }

    fn pull(&self, ctx: &PluginContext<'_>) -> Result<(), PluginError> {
        self.pulls.fetch_add(1, Ordering::SeqCst);
        self.record("pull", &ctx.part.name);
        if let Some(source) = ctx.part.source.as_deref() {
            if source.is_dir() {
                copy_tree(source, ctx.src_dir, ctx.ignore)?;
            }
        }
        Ok(())
    }

    fn build(&self, ctx: &PluginContext<'_>) -> Result<BuildOutput, PluginError> {
        self.builds.fetch_add(1, Ordering::SeqCst);
        self.record("build", &ctx.part.name);

        let options = &ctx.part.plugin_options;
        if let Some(ms) = options.get("delay-ms").and_then(|v| v.parse::<u64>().ok()) {
            std::thread::sleep(Duration::from_millis(ms));
        }
        if let Some(message) = options.get("fail") {
            return Err(PluginError::BuildFailed {
                part: ctx.part.name.to_string(),
                message: message.clone(),
            });
        }

        let mut produced = copy_tree(ctx.src_dir, ctx.install_dir, &[])?;
        for (rel, content) in &self.files {
            let path = ctx.install_dir.join(rel);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&path, content)?;
            produced.push(rel.clone());
        }
        produced.sort();
        produced.dedup();
        Ok(BuildOutput { produced })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use craftpack_schema::PartDecl;
    use std::path::Path;

    #[test]
    fn mock_installs_files_and_counts_calls() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("src");
        let install = tmp.path().join("install");
        fs::create_dir_all(&src).unwrap();
        fs::create_dir_all(&install).unwrap();

        let part = PartDecl::default().normalize("m", Path::new("/proj")).unwrap();
        let plugin = MockPlugin::new("m").with_file("bin/tool", "#!/bin/sh\n");
        let ctx = PluginContext {
            part: &part,
            project_dir: tmp.path(),
            src_dir: &src,
            install_dir: &install,
            stage_dir: tmp.path(),
            ignore: &[],
            build_for: "amd64",
        };

        plugin.pull(&ctx).unwrap();
        let out = plugin.build(&ctx).unwrap();
        assert_eq!(out.produced, ["bin/tool"]);
        assert!(install.join("bin/tool").is_file());
        assert_eq!(plugin.pull_count(), 1);
        assert_eq!(plugin.build_count(), 1);
        assert_eq!(plugin.calls(), ["pull:m", "build:m"]);
    }

    #[test]
    fn fail_option_fails_build() {
        let tmp = tempfile::tempdir().unwrap();
        let mut part = PartDecl::default().normalize("m", Path::new("/proj")).unwrap();
        part.plugin_options.insert("fail".to_owned(), "boom".to_owned());
        let plugin = MockPlugin::new("m");
        assert!(plugin.validate_options(&part).is_ok());
        let ctx = PluginContext {
            part: &part,
            project_dir: tmp.path(),
            src_dir: tmp.path(),
            install_dir: tmp.path(),
            stage_dir: tmp.path(),
            ignore: &[],
            build_for: "amd64",
        };
        let err = plugin.build(&ctx).unwrap_err();
        assert_eq!(err.to_string(), "Failed to build part 'm': boom");
    }

    #[test]
    fn unknown_option_is_rejected() {
        let mut part = PartDecl::default().normalize("m", Path::new("/proj")).unwrap();
        part.plugin_options.insert("color".to_owned(), "red".to_owned());
        assert!(MockPlugin::new("m").validate_options(&part).is_err());
    }
}
