use crate::concurrency::{sibling_path, StateLock};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use terrane_states::{
    read_state_file, write_state_file, SerialTracker, State, StateError, StatePersister,
};
use tracing::{debug, info};

/// Persists state to a local JSON file.
///
/// Each write takes an advisory lock on `<path>.lock`, keeps the previous file
/// as `<path>.backup`, and replaces the state file atomically. Writes of
/// unchanged content are skipped and keep the serial.
#[derive(Debug)]
pub struct LocalStatePersister {
    path: PathBuf,
    tracker: Mutex<Option<SerialTracker>>,
}

impl LocalStatePersister {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            tracker: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn lock_path(&self) -> PathBuf {
        StateLock::path_for(&self.path)
    }

    pub fn backup_path(&self) -> PathBuf {
        sibling_path(&self.path, ".backup")
    }

    fn tracker(&self) -> Result<MutexGuard<'_, Option<SerialTracker>>, StateError> {
        self.tracker
            .lock()
            .map_err(|e| StateError::LockFailed(format!("mutex poisoned: {e}")))
    }
}

impl StatePersister for LocalStatePersister {
    fn read_state(&self) -> Result<Option<State>, StateError> {
        let Some(file) = read_state_file(&self.path)? else {
            return Ok(None);
        };
        let state = file.to_state()?;
        debug!(
            "loaded state {} serial {} from {}",
            file.lineage,
            file.serial,
            self.path.display()
        );
        *self.tracker()? = Some(SerialTracker::resume(file));
        Ok(Some(state))
    }

    fn write_state(&self, state: &State) -> Result<u64, StateError> {
        let _lock = StateLock::acquire(&self.path)?;
        let mut guard = self.tracker()?;
        let tracker = match guard.take() {
            Some(t) => t,
            None => match read_state_file(&self.path)? {
                Some(existing) => SerialTracker::resume(existing),
                None => SerialTracker::new(),
            },
        };
        let tracker = guard.insert(tracker);

        let Some(file) = tracker.prepare(state) else {
            return Ok(tracker.serial());
        };
        if self.path.exists() {
            fs::copy(&self.path, self.backup_path())?;
        }
        write_state_file(&self.path, &file)?;
        info!(
            "wrote state serial {} to {}",
            file.serial,
            self.path.display()
        );
        let serial = file.serial;
        tracker.commit(file);
        Ok(serial)
    }
}
