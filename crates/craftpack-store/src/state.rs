use crate::layout::WorkLayout;
use crate::{io_at, write_atomic, StoreError};
use craftpack_schema::PartName;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

const TREES_FILE: &str = "trees.json";
const PART_PREFIX: &str = "part-";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    Pending,
    Pulled,
    Built,
    Staged,
    Primed,
    Failed,
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LifecycleState::Pending => write!(f, "pending"),
            LifecycleState::Pulled => write!(f, "pulled"),
            LifecycleState::Built => write!(f, "built"),
            LifecycleState::Staged => write!(f, "staged"),
            LifecycleState::Primed => write!(f, "primed"),
            LifecycleState::Failed => write!(f, "failed"),
        }
    }
}

/// Fingerprint of the inputs of each step's last successful run.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StepFingerprints {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pull: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prime: Option<String>,
}

impl StepFingerprints {
    /// Forget the fingerprints of every step after pull.
    pub fn clear_from_build(&mut self) {
        self.build = None;
        self.clear_from_stage();
    }

    pub fn clear_from_stage(&mut self) {
        self.stage = None;
        self.prime = None;
    }
}

/// Persisted lifecycle state of one part.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PartState {
    pub part: PartName,
    pub state: LifecycleState,
    #[serde(default)]
    pub fingerprints: StepFingerprints,
    #[serde(default)]
    pub staged_files: Vec<String>,
    #[serde(default)]
    pub primed_files: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
    pub updated_at: String,
    /// blake3 checksum over the serialized state without this field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

impl PartState {
    pub fn new(part: PartName) -> Self {
        Self {
            part,
            state: LifecycleState::Pending,
            fingerprints: StepFingerprints::default(),
            staged_files: Vec::new(),
            primed_files: Vec::new(),
            failure: None,
            updated_at: chrono::Utc::now().to_rfc3339(),
            checksum: None,
        }
    }

    fn compute_checksum(&self) -> Result<String, StoreError> {
        let mut copy = self.clone();
        copy.checksum = None;
        let json = serde_json::to_string_pretty(&copy)?;
        Ok(blake3::hash(json.as_bytes()).to_hex().to_string())
    }
}

/// Ordered record of which parts have been applied to a shared tree and
/// with which step fingerprint.
///
/// The tree on disk is valid only as long as its ledger is a prefix of the
/// plan with matching fingerprints.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TreeLedger {
    pub applied: Vec<(PartName, String)>,
}

impl TreeLedger {
    /// Whether position `idx` already holds `part` applied with `fingerprint`.
    pub fn is_current(&self, idx: usize, part: &PartName, fingerprint: &str) -> bool {
        self.applied
            .get(idx)
            .is_some_and(|(p, fp)| p == part && fp == fingerprint)
    }

    pub fn len(&self) -> usize {
        self.applied.len()
    }

    pub fn is_empty(&self) -> bool {
        self.applied.is_empty()
    }

    /// Record `part` at position `idx`, dropping everything after it.
    pub fn record(&mut self, idx: usize, part: PartName, fingerprint: String) {
        self.applied.truncate(idx);
        self.applied.push((part, fingerprint));
    }

    pub fn clear(&mut self) {
        self.applied.clear();
    }

    /// Digest over the whole ledger; changes whenever the tree content may have.
    pub fn digest(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        for (part, fp) in &self.applied {
            hasher.update(part.as_bytes());
            hasher.update(&[0]);
            hasher.update(fp.as_bytes());
            hasher.update(&[0]);
        }
        hasher.finalize().to_hex().to_string()
    }
}

/// Ledgers of the shared stage and prime trees.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TreeState {
    #[serde(default)]
    pub stage: TreeLedger,
    #[serde(default)]
    pub prime: TreeLedger,
}

/// Atomic, checksummed storage for [`PartState`] and [`TreeState`].
pub struct StateStore {
    layout: WorkLayout,
}

impl StateStore {
    pub fn new(layout: WorkLayout) -> Self {
        Self { layout }
    }

    fn part_path(&self, part: &str) -> PathBuf {
        self.layout
            .state_dir()
            .join(format!("{PART_PREFIX}{part}.json"))
    }

    pub fn put(&self, state: &PartState) -> Result<(), StoreError> {
        let mut with_checksum = state.clone();
        with_checksum.checksum = Some(with_checksum.compute_checksum()?);
        let content = serde_json::to_string_pretty(&with_checksum)?;
        fs::create_dir_all(self.layout.state_dir())?;
        write_atomic(&self.part_path(&state.part), content.as_bytes())
    }

    /// Load a part's state. `Ok(None)` when the part has never run.
    pub fn get(&self, part: &str) -> Result<Option<PartState>, StoreError> {
        let path = self.part_path(part);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path).map_err(io_at(&path))?;
        let state: PartState = serde_json::from_str(&content)?;

        if let Some(ref expected) = state.checksum {
            let actual = state.compute_checksum()?;
            if actual != *expected {
                return Err(StoreError::IntegrityFailure {
                    name: part.to_owned(),
                    expected: expected.clone(),
                    actual,
                });
            }
        }

        Ok(Some(state))
    }

    pub fn remove(&self, part: &str) -> Result<(), StoreError> {
        let path = self.part_path(part);
        if path.exists() {
            fs::remove_file(&path).map_err(io_at(&path))?;
        }
        Ok(())
    }

    /// Names of every part with a state file, sorted. Unreadable states are
    /// included so callers can remove them.
    pub fn recorded_parts(&self) -> Result<Vec<String>, StoreError> {
        let dir = self.layout.state_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in fs::read_dir(&dir).map_err(io_at(&dir))? {
            let entry = entry?;
            let file_name = entry.file_name();
            let Some(part) = file_name
                .to_str()
                .and_then(|n| n.strip_prefix(PART_PREFIX))
                .and_then(|n| n.strip_suffix(".json"))
            else {
                continue;
            };
            if part.is_empty() || part == "." || part == ".." {
                continue;
            }
            names.push(part.to_owned());
        }
        names.sort();
        Ok(names)
    }

    /// Load the tree ledgers. Missing or unreadable ledgers load as empty,
    /// which forces the trees to be rebuilt.
    pub fn get_trees(&self) -> TreeState {
        let path = self.layout.state_dir().join(TREES_FILE);
        let Ok(content) = fs::read_to_string(&path) else {
            return TreeState::default();
        };
        match serde_json::from_str(&content) {
            Ok(trees) => trees,
            Err(e) => {
                tracing::warn!("discarding unreadable tree ledger: {e}");
                TreeState::default()
            }
        }
    }

    pub fn put_trees(&self, trees: &TreeState) -> Result<(), StoreError> {
        let content = serde_json::to_string_pretty(trees)?;
        fs::create_dir_all(self.layout.state_dir())?;
        write_atomic(&self.layout.state_dir().join(TREES_FILE), content.as_bytes())
    }
}
