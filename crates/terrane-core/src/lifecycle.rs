use crate::CoreError;
use std::fmt;
use terrane_states::{DeposedKey, ResourceInstanceState};

/// Where a single object of a resource instance lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotState {
    Absent,
    Current,
    Deposed(DeposedKey),
}

impl fmt::Display for SlotState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotState::Absent => write!(f, "absent"),
            SlotState::Current => write!(f, "current"),
            SlotState::Deposed(key) => write!(f, "deposed({key})"),
        }
    }
}

impl SlotState {
    /// Slot of the deposed object named by `key`.
    pub fn of_deposed(instance: Option<&ResourceInstanceState>, key: &DeposedKey) -> Self {
        match instance {
            Some(is) if is.deposed.contains_key(key) => SlotState::Deposed(key.clone()),
            _ => SlotState::Absent,
        }
    }
}

/// Check that an object may move from one slot to another.
///
/// Objects are created into the current slot, may be deposed, and leave state
/// only by removal. A deposed object never becomes current again and never
/// moves to another deposed key.
pub fn validate_transition(from: &SlotState, to: &SlotState) -> Result<(), CoreError> {
    let valid = match (from, to) {
        (SlotState::Deposed(a), SlotState::Deposed(b)) => a == b,
        _ => matches!(
            (from, to),
            (SlotState::Absent | SlotState::Current, SlotState::Current)
                | (SlotState::Current, SlotState::Deposed(_))
                | (SlotState::Current | SlotState::Deposed(_), SlotState::Absent)
                | (SlotState::Absent, SlotState::Absent)
        ),
    };

    if valid {
        Ok(())
    } else {
        Err(CoreError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deposed() -> SlotState {
        SlotState::Deposed(DeposedKey::new("deadbeef"))
    }

    #[test]
    fn valid_transitions() {
        assert!(validate_transition(&SlotState::Absent, &SlotState::Current).is_ok());
        assert!(validate_transition(&SlotState::Current, &SlotState::Current).is_ok()); // overwrite
        assert!(validate_transition(&SlotState::Current, &deposed()).is_ok());
        assert!(validate_transition(&SlotState::Current, &SlotState::Absent).is_ok());
        assert!(validate_transition(&deposed(), &SlotState::Absent).is_ok());
        assert!(validate_transition(&SlotState::Absent, &SlotState::Absent).is_ok());
        assert!(validate_transition(&deposed(), &deposed()).is_ok()); // in-place update
    }

    #[test]
    fn invalid_transitions() {
        assert!(validate_transition(&deposed(), &SlotState::Current).is_err());
        assert!(validate_transition(&SlotState::Absent, &deposed()).is_err());
        assert!(validate_transition(
            &deposed(),
            &SlotState::Deposed(DeposedKey::new("0badf00d"))
        )
        .is_err());
    }

    #[test]
    fn error_names_both_slots() {
        let err = validate_transition(&deposed(), &SlotState::Current).unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid state transition: deposed(deadbeef) -> current"
        );
    }
}
