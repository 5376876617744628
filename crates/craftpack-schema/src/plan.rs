//! Dependency-ordered execution plan over declared parts.

use crate::part::PartSpec;
use crate::types::PartName;
use crate::SchemaError;
use std::collections::{HashMap, HashSet};

/// Parts in execution order: every part appears after all parts named in
/// its `after` list. Independent parts keep their declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildPlan {
    parts: Vec<PartSpec>,
}

impl BuildPlan {
    pub fn parts(&self) -> &[PartSpec] {
        &self.parts
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    pub fn names(&self) -> Vec<PartName> {
        self.parts.iter().map(|p| p.name.clone()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&PartSpec> {
        self.parts.iter().find(|p| p.name == name)
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.parts.iter().position(|p| p.name == name)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PartSpec> {
        self.parts.iter()
    }
}

impl<'a> IntoIterator for &'a BuildPlan {
    type Item = &'a PartSpec;
    type IntoIter = std::slice::Iter<'a, PartSpec>;

    fn into_iter(self) -> Self::IntoIter {
        self.parts.iter()
    }
}

/// Compute a deterministic topological order of `parts`.
///
/// At each step the earliest-declared part whose dependencies are all placed
/// is emitted next. Unknown dependencies and cycles are configuration errors.
pub fn build_plan(parts: Vec<PartSpec>) -> Result<BuildPlan, SchemaError> {
    let mut seen = HashSet::new();
    for part in &parts {
        if !seen.insert(part.name.as_str()) {
            return Err(SchemaError::DuplicatePart(part.name.to_string()));
        }
    }
    for part in &parts {
        if let Some(dep) = part.after.iter().find(|d| !seen.contains(d.as_str())) {
            return Err(SchemaError::UnknownDependency {
                part: part.name.to_string(),
                dependency: dep.to_string(),
            });
        }
    }

    let mut placed: HashSet<PartName> = HashSet::with_capacity(parts.len());
    let mut order: Vec<usize> = Vec::with_capacity(parts.len());
    while order.len() < parts.len() {
        let next = parts.iter().enumerate().position(|(idx, part)| {
            !order.contains(&idx) && part.after.iter().all(|dep| placed.contains(dep))
        });
        let Some(idx) = next else {
            return Err(SchemaError::DependencyCycle(find_cycle(&parts, &placed)));
        };
        placed.insert(parts[idx].name.clone());
        order.push(idx);
    }

    let mut slots: Vec<Option<PartSpec>> = parts.into_iter().map(Some).collect();
    let parts = order
        .into_iter()
        .filter_map(|idx| slots[idx].take())
        .collect();
    Ok(BuildPlan { parts })
}

/// Walk unplaced dependencies from the first unplaced part until a name
/// repeats; the repeated suffix is the cycle.
fn find_cycle(parts: &[PartSpec], placed: &HashSet<PartName>) -> Vec<String> {
    let by_name: HashMap<&str, &PartSpec> = parts.iter().map(|p| (p.name.as_str(), p)).collect();
    let Some(mut current) = parts.iter().find(|p| !placed.contains(&p.name)) else {
        return Vec::new();
    };

    let mut path: Vec<&str> = Vec::new();
    loop {
        if let Some(start) = path.iter().position(|n| *n == current.name.as_str()) {
            let mut cycle: Vec<String> = path[start..].iter().map(|n| (*n).to_owned()).collect();
            cycle.push(current.name.to_string());
            return cycle;
        }
        path.push(current.name.as_str());
        let next = current
            .after
            .iter()
            .find(|d| !placed.contains(*d))
            .and_then(|d| by_name.get(d.as_str()));
        match next {
            Some(part) => current = part,
            None => return path.iter().map(|n| (*n).to_owned()).collect(),
        }
    }
}
