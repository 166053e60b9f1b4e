//! State persistence through remote state versions.

use crate::types::StateVersionCreateOptions;
use crate::{RemoteError, StateVersions};
use base64::Engine as _;
use std::sync::{Arc, Mutex, MutexGuard};
use terrane_states::{SerialTracker, State, StateError, StateFile, StatePersister};
use tracing::{debug, info};

/// Stores each changed snapshot as a new state version of one workspace.
pub struct RemoteStatePersister {
    client: Arc<dyn StateVersions>,
    workspace_id: String,
    tracker: Mutex<Option<SerialTracker>>,
}

impl std::fmt::Debug for RemoteStatePersister {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteStatePersister")
            .field("workspace_id", &self.workspace_id)
            .finish_non_exhaustive()
    }
}

fn backend(e: RemoteError) -> StateError {
    StateError::Backend(e.to_string())
}

impl RemoteStatePersister {
    pub fn new(client: Arc<dyn StateVersions>, workspace_id: &str) -> Self {
        Self {
            client,
            workspace_id: workspace_id.to_owned(),
            tracker: Mutex::new(None),
        }
    }

    pub fn workspace_id(&self) -> &str {
        &self.workspace_id
    }

    fn tracker(&self) -> Result<MutexGuard<'_, Option<SerialTracker>>, StateError> {
        self.tracker
            .lock()
            .map_err(|e| StateError::LockFailed(format!("mutex poisoned: {e}")))
    }

    /// The current remote state file, or `None` if the workspace has none.
    fn current_file(&self) -> Result<Option<StateFile>, StateError> {
        let sv = match self.client.current(&self.workspace_id) {
            Ok(sv) => sv,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(backend(e)),
        };
        let bytes = self.client.download(&sv.download_url).map_err(backend)?;
        let file = StateFile::from_bytes(&bytes)?;
        if file.serial != sv.serial {
            return Err(StateError::Malformed(format!(
                "state version {} records serial {} but its file has serial {}",
                sv.id, sv.serial, file.serial
            )));
        }
        Ok(Some(file))
    }
}

impl StatePersister for RemoteStatePersister {
    fn read_state(&self) -> Result<Option<State>, StateError> {
        let Some(file) = self.current_file()? else {
            return Ok(None);
        };
        let state = file.to_state()?;
        debug!(
            "loaded remote state {} serial {} for {}",
            file.lineage, file.serial, self.workspace_id
        );
        *self.tracker()? = Some(SerialTracker::resume(file));
        Ok(Some(state))
    }

    fn write_state(&self, state: &State) -> Result<u64, StateError> {
        let mut guard = self.tracker()?;
        let tracker = match guard.take() {
            Some(t) => t,
            None => match self.current_file()? {
                Some(existing) => SerialTracker::resume(existing),
                None => SerialTracker::new(),
            },
        };
        let tracker = guard.insert(tracker);

        let Some(file) = tracker.prepare(state) else {
            return Ok(tracker.serial());
        };
        let payload = base64::engine::general_purpose::STANDARD.encode(file.to_bytes()?);
        let sv = self
            .client
            .create(
                &self.workspace_id,
                StateVersionCreateOptions {
                    serial: file.serial,
                    lineage: Some(file.lineage.clone()),
                    state: payload,
                },
            )
            .map_err(backend)?;
        info!(
            "stored state serial {} as {} in {}",
            file.serial, sv.id, self.workspace_id
        );
        let serial = file.serial;
        tracker.commit(file);
        Ok(serial)
    }
}
