//! Implicit part synthesis applied once before planning, so the plan and the
//! executor never special-case the project type.

use crate::bundle::BUNDLE_FILE;
use crate::part::PartDecl;
use crate::project::ProjectType;
use indexmap::IndexMap;
use std::path::Path;

/// Files every bundle archive must contain, in the order they are checked.
pub const BUNDLE_MANDATORY_FILES: &[&str] = &[BUNDLE_FILE, "README.md"];

const BUNDLE_PART: &str = "bundle";
const BUNDLE_PLUGIN: &str = "bundle";

pub fn mandatory_files(project_type: ProjectType) -> &'static [&'static str] {
    match project_type {
        ProjectType::Bundle => BUNDLE_MANDATORY_FILES,
        ProjectType::Charm => &[],
    }
}

/// Fill in the implicit `bundle` part.
///
/// `extra_prime` holds the project-level prime patterns; they come before the
/// mandatory bundle files.
///
/// - A bundle with no parts gets a single `bundle` part packing the project
///   directory, primed with `extra_prime` and the mandatory bundle files.
/// - A declared `bundle` part with no plugin (or the `bundle` plugin) gets the
///   same plugin and source; its own prime rules stay first.
/// - Everything else is returned untouched.
pub fn synthesize_default_parts(
    project_type: ProjectType,
    declared: &IndexMap<String, PartDecl>,
    extra_prime: &[String],
    project_dir: &Path,
) -> IndexMap<String, PartDecl> {
    if project_type != ProjectType::Bundle {
        return declared.clone();
    }

    let source = project_dir.to_string_lossy().into_owned();
    let mandatory = extra_prime
        .iter()
        .cloned()
        .chain(BUNDLE_MANDATORY_FILES.iter().map(|f| (*f).to_owned()));

    if declared.is_empty() {
        let mut parts = IndexMap::new();
        parts.insert(
            BUNDLE_PART.to_owned(),
            PartDecl {
                plugin: Some(BUNDLE_PLUGIN.to_owned()),
                source: Some(source),
                prime: mandatory.collect(),
                ..PartDecl::default()
            },
        );
        return parts;
    }

    let mut parts = declared.clone();
    if let Some(part) = parts.get_mut(BUNDLE_PART) {
        if part.plugin.as_deref().map_or(true, |p| p == BUNDLE_PLUGIN) {
            part.plugin = Some(BUNDLE_PLUGIN.to_owned());
            part.source = Some(source);
            part.prime.extend(mandatory);
        }
    }
    parts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::parse_project_str;

    fn synth(yaml: &str) -> IndexMap<String, PartDecl> {
        let project = parse_project_str(yaml).unwrap();
        synthesize_default_parts(
            project.project_type,
            &project.parts,
            &project.prime,
            Path::new("/proj"),
        )
    }

    #[test]
    fn bundle_without_parts_gets_implicit_part() {
        let parts = synth("type: bundle");
        assert_eq!(parts.len(), 1);
        let bundle = &parts["bundle"];
        assert_eq!(bundle.plugin.as_deref(), Some("bundle"));
        assert_eq!(bundle.source.as_deref(), Some("/proj"));
        assert_eq!(bundle.prime, ["bundle.yaml", "README.md"]);
    }

    #[test]
    fn declared_bundle_part_keeps_extra_prime_first() {
        let parts = synth(
            "type: bundle\nparts:\n  bundle:\n    prime:\n      - my_extra_file.txt\n",
        );
        let bundle = &parts["bundle"];
        assert_eq!(bundle.plugin.as_deref(), Some("bundle"));
        assert_eq!(bundle.source.as_deref(), Some("/proj"));
        assert_eq!(
            bundle.prime,
            ["my_extra_file.txt", "bundle.yaml", "README.md"]
        );
    }

    #[test]
    fn project_prime_comes_before_mandatory_files() {
        let parts = synth("type: bundle\nprime: [f2.txt, f1.txt]\n");
        assert_eq!(
            parts["bundle"].prime,
            ["f2.txt", "f1.txt", "bundle.yaml", "README.md"]
        );
    }

    #[test]
    fn declared_prime_precedes_project_prime() {
        let parts =
            synth("type: bundle\nprime: ['*.txt']\nparts:\n  bundle:\n    prime: [a.md]\n");
        assert_eq!(
            parts["bundle"].prime,
            ["a.md", "*.txt", "bundle.yaml", "README.md"]
        );
    }

    #[test]
    fn explicit_bundle_plugin_is_filled_in() {
        let parts = synth("type: bundle\nparts:\n  bundle:\n    plugin: bundle\n");
        assert_eq!(parts["bundle"].prime, ["bundle.yaml", "README.md"]);
    }

    #[test]
    fn other_parts_are_untouched() {
        let parts = synth("type: bundle\nparts:\n  foo:\n    plugin: nil\n");
        assert_eq!(parts.len(), 1);
        assert_eq!(
            parts["foo"],
            PartDecl {
                plugin: Some("nil".to_owned()),
                ..PartDecl::default()
            }
        );
    }

    #[test]
    fn bundle_part_with_other_plugin_is_untouched() {
        let parts = synth("type: bundle\nparts:\n  bundle:\n    plugin: nil\n");
        assert_eq!(parts["bundle"].plugin.as_deref(), Some("nil"));
        assert!(parts["bundle"].source.is_none());
        assert!(parts["bundle"].prime.is_empty());
    }

    #[test]
    fn charm_parts_pass_through() {
        let parts = synth("type: charm\nparts:\n  bundle:\n    source: x\n");
        assert!(parts["bundle"].plugin.is_none());
        assert_eq!(parts["bundle"].source.as_deref(), Some("x"));
    }

    #[test]
    fn mandatory_files_per_type() {
        assert_eq!(mandatory_files(ProjectType::Bundle), ["bundle.yaml", "README.md"]);
        assert!(mandatory_files(ProjectType::Charm).is_empty());
    }
}
