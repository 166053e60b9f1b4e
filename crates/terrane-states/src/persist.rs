//! Persistence seam for state snapshots.

use crate::statefile::StateFile;
use crate::state::State;
use crate::StateError;
use std::sync::Mutex;
use tracing::debug;

/// Durable storage for whole-state snapshots.
///
/// Implementations receive deep copies; they never see the live run state.
pub trait StatePersister: Send + Sync {
    /// The most recently persisted state, or `None` if nothing was persisted yet.
    fn read_state(&self) -> Result<Option<State>, StateError>;

    /// Persist `state` and return the serial it was recorded under.
    fn write_state(&self, state: &State) -> Result<u64, StateError>;
}

/// Tracks lineage and serial across successive writes of one state.
///
/// The serial is bumped only when the content differs from the last file
/// produced, so repeated snapshots of an unchanged state are idempotent.
#[derive(Debug, Clone)]
pub struct SerialTracker {
    lineage: String,
    last: Option<StateFile>,
}

impl Default for SerialTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl SerialTracker {
    /// Start a new lineage.
    pub fn new() -> Self {
        Self {
            lineage: uuid::Uuid::new_v4().to_string(),
            last: None,
        }
    }

    /// Continue the lineage of a previously persisted file.
    pub fn resume(file: StateFile) -> Self {
        Self {
            lineage: file.lineage.clone(),
            last: Some(file),
        }
    }

    pub fn lineage(&self) -> &str {
        &self.lineage
    }

    pub fn serial(&self) -> u64 {
        self.last.as_ref().map_or(0, |f| f.serial)
    }

    /// Build the next file for `state` without recording it. Returns `None`
    /// if nothing changed since the last committed file.
    pub fn prepare(&self, state: &State) -> Option<StateFile> {
        let mut file = StateFile::from_state(state, &self.lineage, self.serial());
        match &self.last {
            Some(last) if last.same_content(&file) => {
                debug!("state unchanged at serial {}", last.serial);
                None
            }
            Some(last) => {
                file.serial = last.serial + 1;
                Some(file)
            }
            None => {
                file.serial = 1;
                Some(file)
            }
        }
    }

    /// Record `file` as persisted. Call only once the write has succeeded.
    pub fn commit(&mut self, file: StateFile) {
        self.last = Some(file);
    }
}

/// Keeps snapshots in memory. Useful for tests and short-lived runs.
#[derive(Debug, Default)]
pub struct MemoryPersister {
    inner: Mutex<MemoryInner>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    tracker: SerialTracker,
    bytes: Option<Vec<u8>>,
    writes: usize,
}

impl MemoryPersister {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of snapshots that changed the stored content.
    pub fn writes(&self) -> Result<usize, StateError> {
        Ok(self.guard()?.writes)
    }

    /// The serialized form of the latest snapshot.
    pub fn bytes(&self) -> Result<Option<Vec<u8>>, StateError> {
        Ok(self.guard()?.bytes.clone())
    }

    fn guard(&self) -> Result<std::sync::MutexGuard<'_, MemoryInner>, StateError> {
        self.inner
            .lock()
            .map_err(|e| StateError::LockFailed(format!("mutex poisoned: {e}")))
    }
}

impl StatePersister for MemoryPersister {
    fn read_state(&self) -> Result<Option<State>, StateError> {
        let inner = self.guard()?;
        match &inner.bytes {
            Some(bytes) => Ok(Some(StateFile::from_bytes(bytes)?.to_state()?)),
            None => Ok(None),
        }
    }

    fn write_state(&self, state: &State) -> Result<u64, StateError> {
        let mut inner = self.guard()?;
        if let Some(file) = inner.tracker.prepare(state) {
            inner.bytes = Some(file.to_bytes()?);
            inner.writes += 1;
            inner.tracker.commit(file);
        }
        Ok(inner.tracker.serial())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::ResourceInstanceObjectSrc;
    use crate::state::OutputValue;
    use terrane_schema::{AbsProviderConfig, ModuleInstance};

    #[test]
    fn serial_bumps_only_on_change() {
        let mut tracker = SerialTracker::new();
        let mut state = State::new();
        let first = tracker.prepare(&state).unwrap();
        assert_eq!(first.serial, 1);
        tracker.commit(first);
        assert!(tracker.prepare(&state).is_none());

        state.set_output_value(
            &ModuleInstance::root(),
            "x",
            OutputValue::new(serde_json::json!(1)),
        );
        let second = tracker.prepare(&state).unwrap();
        assert_eq!(second.serial, 2);
        tracker.commit(second);
        assert_eq!(tracker.serial(), 2);
    }

    #[test]
    fn resume_keeps_lineage_and_serial() {
        let file = StateFile::from_state(&State::new(), "lin", 41);
        let tracker = SerialTracker::resume(file);
        assert_eq!(tracker.lineage(), "lin");
        assert!(tracker.prepare(&State::new()).is_none());

        let mut state = State::new();
        state.set_resource_instance_current(
            &"null_resource.a".parse().unwrap(),
            Some(ResourceInstanceObjectSrc::from_json_bytes(b"{}", 0).unwrap()),
            &AbsProviderConfig::root("null"),
        );
        let next = tracker.prepare(&state).unwrap();
        assert_eq!(next.serial, 42);
        assert_eq!(next.lineage, "lin");
    }

    #[test]
    fn uncommitted_file_is_prepared_again() {
        let mut tracker = SerialTracker::new();
        let mut state = State::new();
        state.set_output_value(
            &ModuleInstance::root(),
            "x",
            OutputValue::new(serde_json::json!(1)),
        );

        // A failed write never reaches commit; the retry must produce the file again.
        let attempt = tracker.prepare(&state).unwrap();
        assert_eq!(tracker.serial(), 0);
        let retry = tracker.prepare(&state).unwrap();
        assert_eq!(retry.serial, attempt.serial);
        assert_eq!(retry.lineage, attempt.lineage);

        tracker.commit(retry);
        assert!(tracker.prepare(&state).is_none());
    }

    #[test]
    fn lineage_is_a_uuid() {
        let tracker = SerialTracker::new();
        assert!(uuid::Uuid::parse_str(tracker.lineage()).is_ok());
    }

    #[test]
    fn memory_persister_roundtrip() {
        let persister = MemoryPersister::new();
        assert!(persister.read_state().unwrap().is_none());

        let mut state = State::new();
        state.set_output_value(
            &ModuleInstance::root(),
            "x",
            OutputValue::new(serde_json::json!("v")),
        );
        assert_eq!(persister.write_state(&state).unwrap(), 1);
        assert_eq!(persister.write_state(&state).unwrap(), 1);
        assert_eq!(persister.writes().unwrap(), 1);
        assert_eq!(persister.read_state().unwrap(), Some(state));
    }
}
