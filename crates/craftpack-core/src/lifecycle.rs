use crate::CoreError;
use craftpack_store::LifecycleState;
use std::fmt;

/// The four lifecycle steps, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Step {
    Pull,
    Build,
    Stage,
    Prime,
}

impl Step {
    pub const ALL: [Step; 4] = [Step::Pull, Step::Build, Step::Stage, Step::Prime];

    /// State a part reaches once this step has run (or been skipped).
    pub fn reached_state(self) -> LifecycleState {
        match self {
            Step::Pull => LifecycleState::Pulled,
            Step::Build => LifecycleState::Built,
            Step::Stage => LifecycleState::Staged,
            Step::Prime => LifecycleState::Primed,
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Pull => write!(f, "pull"),
            Step::Build => write!(f, "build"),
            Step::Stage => write!(f, "stage"),
            Step::Prime => write!(f, "prime"),
        }
    }
}

pub fn validate_transition(from: LifecycleState, to: LifecycleState) -> Result<(), CoreError> {
    let valid = matches!(
        (from, to),
        (_, LifecycleState::Pulled | LifecycleState::Failed)
            | (
                LifecycleState::Pulled | LifecycleState::Built,
                LifecycleState::Built
            )
            | (
                LifecycleState::Built | LifecycleState::Staged,
                LifecycleState::Staged
            )
            | (
                LifecycleState::Staged | LifecycleState::Primed,
                LifecycleState::Primed
            )
    );

    if valid {
        Ok(())
    } else {
        Err(CoreError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}
