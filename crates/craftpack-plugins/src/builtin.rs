use crate::plugin::{BuildOutput, Plugin, PluginContext};
use crate::PluginError;
use craftpack_schema::BUNDLE_FILE;
use craftpack_store::copy_tree;
use tracing::debug;

/// Does nothing. Useful for parts that only order others.
pub struct NilPlugin;

impl Plugin for NilPlugin {
    fn name(&self) -> &'static str {
        "nil"
    }

    fn pull(&self, _ctx: &PluginContext<'_>) -> Result<(), PluginError> {
        Ok(())
    }

    fn build(&self, _ctx: &PluginContext<'_>) -> Result<BuildOutput, PluginError> {
        Ok(BuildOutput::default())
    }
}

/// Copies the part source verbatim into the install area.
pub struct DumpPlugin;

impl Plugin for DumpPlugin {
    fn name(&self) -> &'static str {
        "dump"
    }

    fn pull(&self, ctx: &PluginContext<'_>) -> Result<(), PluginError> {
        pull_source(ctx)
    }

    fn build(&self, ctx: &PluginContext<'_>) -> Result<BuildOutput, PluginError> {
        let produced = copy_tree(ctx.src_dir, ctx.install_dir, &[])?;
        Ok(BuildOutput { produced })
    }
}

/// Packs a bundle project directory. The source must carry `bundle.yaml`.
pub struct BundlePlugin;

impl Plugin for BundlePlugin {
    fn name(&self) -> &'static str {
        "bundle"
    }

    fn pull(&self, ctx: &PluginContext<'_>) -> Result<(), PluginError> {
        pull_source(ctx)
    }

    fn build(&self, ctx: &PluginContext<'_>) -> Result<BuildOutput, PluginError> {
        if !ctx.src_dir.join(BUNDLE_FILE).is_file() {
            return Err(PluginError::BuildFailed {
                part: ctx.part.name.to_string(),
                message: format!("source has no '{BUNDLE_FILE}'"),
            });
        }
        let produced = copy_tree(ctx.src_dir, ctx.install_dir, &[])?;
        Ok(BuildOutput { produced })
    }
}

/// Copy the declared source into the source area. A part without a source
/// pulls nothing.
fn pull_source(ctx: &PluginContext<'_>) -> Result<(), PluginError> {
    let Some(source) = ctx.part.source.as_deref() else {
        return Ok(());
    };
    if !source.is_dir() {
        return Err(PluginError::SourceNotFound {
            part: ctx.part.name.to_string(),
            path: source.to_path_buf(),
        });
    }
    let copied = copy_tree(source, ctx.src_dir, ctx.ignore)?;
    debug!("pulled {} files for part '{}'", copied.len(), ctx.part.name);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use craftpack_schema::{PartDecl, PartSpec};
    use std::fs;
    use std::path::Path;

    struct Dirs {
        _tmp: tempfile::TempDir,
        project: std::path::PathBuf,
        src: std::path::PathBuf,
        install: std::path::PathBuf,
        stage: std::path::PathBuf,
    }

    fn dirs() -> Dirs {
        let tmp = tempfile::tempdir().unwrap();
        let project = tmp.path().join("project");
        let src = tmp.path().join("src");
        let install = tmp.path().join("install");
        let stage = tmp.path().join("stage");
        for d in [&project, &src, &install, &stage] {
            fs::create_dir_all(d).unwrap();
        }
        Dirs {
            _tmp: tmp,
            project,
            src,
            install,
            stage,
        }
    }

    fn spec(name: &str, plugin: &str, source: Option<&str>, project: &Path) -> PartSpec {
        PartDecl {
            plugin: Some(plugin.to_owned()),
            source: source.map(str::to_owned),
            ..PartDecl::default()
        }
        .normalize(name, project)
        .unwrap()
    }

    fn ctx<'a>(d: &'a Dirs, part: &'a PartSpec, ignore: &'a [String]) -> PluginContext<'a> {
        PluginContext {
            part,
            project_dir: &d.project,
            src_dir: &d.src,
            install_dir: &d.install,
            stage_dir: &d.stage,
            ignore,
            build_for: "amd64",
        }
    }

    #[test]
    fn dump_pulls_and_installs_source() {
        let d = dirs();
        fs::create_dir_all(d.project.join("lib/sub")).unwrap();
        fs::write(d.project.join("lib/sub/a.txt"), "a").unwrap();
        let part = spec("lib", "dump", Some("lib"), &d.project);
        let c = ctx(&d, &part, &[]);

        DumpPlugin.pull(&c).unwrap();
        assert!(d.src.join("sub/a.txt").is_file());
        let out = DumpPlugin.build(&c).unwrap();
        assert_eq!(out.produced, ["sub/a.txt"]);
        assert_eq!(fs::read_to_string(d.install.join("sub/a.txt")).unwrap(), "a");
    }

    #[test]
    fn pull_honors_ignore_list() {
        let d = dirs();
        fs::write(d.project.join("keep"), "k").unwrap();
        fs::write(d.project.join("out.zip"), "z").unwrap();
        let part = spec("p", "dump", Some("."), &d.project);
        let ignore = vec!["out.zip".to_owned()];
        DumpPlugin.pull(&ctx(&d, &part, &ignore)).unwrap();
        assert!(d.src.join("keep").exists());
        assert!(!d.src.join("out.zip").exists());
    }

    #[test]
    fn missing_source_is_reported() {
        let d = dirs();
        let part = spec("p", "dump", Some("nope"), &d.project);
        let err = DumpPlugin.pull(&ctx(&d, &part, &[])).unwrap_err();
        assert!(matches!(err, PluginError::SourceNotFound { .. }));
    }

    #[test]
    fn no_source_pulls_nothing() {
        let d = dirs();
        let part = spec("p", "dump", None, &d.project);
        DumpPlugin.pull(&ctx(&d, &part, &[])).unwrap();
        assert!(fs::read_dir(&d.src).unwrap().next().is_none());
    }

    #[test]
    fn bundle_requires_bundle_file() {
        let d = dirs();
        fs::write(d.project.join("README.md"), "r").unwrap();
        let part = spec("bundle", "bundle", Some("."), &d.project);
        let c = ctx(&d, &part, &[]);
        BundlePlugin.pull(&c).unwrap();
        assert!(matches!(
            BundlePlugin.build(&c),
            Err(PluginError::BuildFailed { .. })
        ));

        fs::write(d.src.join(BUNDLE_FILE), "name: b\n").unwrap();
        let out = BundlePlugin.build(&c).unwrap();
        assert_eq!(out.produced, ["README.md", "bundle.yaml"]);
    }

    #[test]
    fn nil_produces_nothing() {
        let d = dirs();
        let part = spec("n", "nil", None, &d.project);
        let c = ctx(&d, &part, &[]);
        NilPlugin.pull(&c).unwrap();
        assert!(NilPlugin.build(&c).unwrap().produced.is_empty());
    }

    #[test]
    fn builtins_reject_options() {
        let d = dirs();
        let mut part = spec("n", "nil", None, &d.project);
        part.plugin_options.insert("mode".to_owned(), "x".to_owned());
        assert!(matches!(
            NilPlugin.validate_options(&part),
            Err(PluginError::InvalidOption { .. })
        ));
    }
}
