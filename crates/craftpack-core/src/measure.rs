//! Wall-clock timings of a pack run, dumped as JSON on request.
//!
//! Measurements form a tree: the whole run is the root, every target and
//! lifecycle step hangs below it through `parent`.

use chrono::Utc;
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MeasureId(String);

impl MeasureId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Measurement {
    /// `None` only for the root measurement.
    pub parent: Option<String>,
    pub msg: String,
    /// Seconds since the Unix epoch.
    pub tstart: f64,
    pub tend: Option<f64>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

impl Measurement {
    /// Elapsed seconds, once the measurement has ended.
    pub fn elapsed(&self) -> Option<f64> {
        self.tend.map(|end| end - self.tstart)
    }
}

/// Shared collector; clones record into the same set.
#[derive(Debug, Clone, Default)]
pub struct Measurements {
    entries: Arc<Mutex<Vec<Measurement>>>,
}

fn now() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

impl Measurements {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Measurement>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn start(
        &self,
        msg: &str,
        parent: Option<&MeasureId>,
        extra: &[(&str, &str)],
    ) -> MeasureId {
        let mut entries = self.lock();
        let id = MeasureId(format!("m{:05}", entries.len()));
        entries.push(Measurement {
            parent: parent.map(|p| p.0.clone()),
            msg: msg.to_owned(),
            tstart: now(),
            tend: None,
            extra: extra
                .iter()
                .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
                .collect(),
        });
        id
    }

    /// Close a measurement. Ending it twice keeps the first end time.
    pub fn end(&self, id: &MeasureId) {
        let Ok(index) = id.0.trim_start_matches('m').parse::<usize>() else {
            return;
        };
        if let Some(entry) = self.lock().get_mut(index) {
            if entry.tend.is_none() {
                entry.tend = Some(now());
            }
        }
    }

    /// Every measurement keyed by id.
    pub fn snapshot(&self) -> BTreeMap<String, Measurement> {
        self.lock()
            .iter()
            .enumerate()
            .map(|(i, m)| (format!("m{i:05}"), m.clone()))
            .collect()
    }
}

impl Serialize for Measurements {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.snapshot().serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_measurements_link_to_parent() {
        let m = Measurements::new();
        let root = m.start("Whole pack run", None, &[]);
        let step = m.start("pull part 'lib'", Some(&root), &[("part", "lib")]);
        m.end(&step);
        m.end(&root);

        let all = m.snapshot();
        assert_eq!(all.len(), 2);
        let root_entry = &all[root.as_str()];
        assert!(root_entry.parent.is_none());
        assert!(root_entry.elapsed().is_some_and(|s| s >= 0.0));
        let step_entry = &all[step.as_str()];
        assert_eq!(step_entry.parent.as_deref(), Some(root.as_str()));
        assert_eq!(step_entry.extra["part"], "lib");
    }

    #[test]
    fn clones_share_entries() {
        let m = Measurements::new();
        let clone = m.clone();
        let id = clone.start("build", None, &[]);
        assert!(m.snapshot()[id.as_str()].tend.is_none());
        m.end(&id);
        assert!(clone.snapshot()[id.as_str()].tend.is_some());
    }

    #[test]
    fn serializes_root_with_null_parent() {
        let m = Measurements::new();
        let root = m.start("Whole pack run", None, &[]);
        m.end(&root);
        let value = serde_json::to_value(&m).unwrap();
        assert!(value[root.as_str()]["parent"].is_null());
        assert_eq!(value[root.as_str()]["msg"], "Whole pack run");
    }
}
