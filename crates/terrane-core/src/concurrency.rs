use fs2::FileExt;
use std::ffi::OsString;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use terrane_states::StateError;
use tracing::debug;

/// `<path><suffix>`, e.g. `terrane.tfstate.lock`.
pub(crate) fn sibling_path(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

/// Exclusive advisory lock guarding writes to one state file.
///
/// The lock lives on `<state>.lock` so the state file itself can be replaced
/// by rename while the lock is held. Released on drop.
#[derive(Debug)]
pub struct StateLock {
    lock_file: File,
    path: PathBuf,
}

impl StateLock {
    /// Block until the lock for `state_path` is held.
    pub fn acquire(state_path: &Path) -> Result<Self, StateError> {
        let path = Self::path_for(state_path);
        let file = open_lock_file(&path)?;
        file.lock_exclusive()
            .map_err(|e| StateError::LockFailed(format!("{}: {e}", path.display())))?;
        debug!("locked {}", path.display());
        Ok(Self {
            lock_file: file,
            path,
        })
    }

    /// The lock file used for `state_path`.
    pub fn path_for(state_path: &Path) -> PathBuf {
        sibling_path(state_path, ".lock")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn open_lock_file(path: &Path) -> Result<File, StateError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(path)
        .map_err(|e| StateError::LockFailed(format!("{}: {e}", path.display())))
}

impl Drop for StateLock {
    fn drop(&mut self) {
        let _ = self.lock_file.unlock();
    }
}

static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);

/// Route Ctrl-C into the stop flag. A second Ctrl-C exits immediately.
pub fn install_signal_handler() {
    let _ = ctrlc::set_handler(move || {
        if SHUTDOWN_REQUESTED.load(Ordering::SeqCst) {
            std::process::exit(1);
        }
        SHUTDOWN_REQUESTED.store(true, Ordering::SeqCst);
        eprintln!("\nstop requested, finishing in-flight steps...");
    });
}

pub fn shutdown_requested() -> bool {
    SHUTDOWN_REQUESTED.load(Ordering::SeqCst)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn lock_file_sits_next_to_state() {
        let dir = tempfile::tempdir().unwrap();
        let state = dir.path().join("nested").join("terrane.tfstate");

        let lock = StateLock::acquire(&state).unwrap();
        assert_eq!(lock.path(), dir.path().join("nested/terrane.tfstate.lock"));
        assert!(lock.path().exists());
        assert!(!state.exists());
    }

    #[test]
    fn second_writer_waits_for_release() {
        let dir = tempfile::tempdir().unwrap();
        let state = dir.path().join("terrane.tfstate");
        let held = StateLock::acquire(&state).unwrap();

        let acquired = Arc::new(AtomicBool::new(false));
        let waiter = {
            let state = state.clone();
            let acquired = Arc::clone(&acquired);
            std::thread::spawn(move || {
                let _lock = StateLock::acquire(&state).unwrap();
                acquired.store(true, Ordering::SeqCst);
            })
        };

        std::thread::sleep(Duration::from_millis(100));
        assert!(!acquired.load(Ordering::SeqCst));
        drop(held);
        waiter.join().unwrap();
        assert!(acquired.load(Ordering::SeqCst));
    }

    #[test]
    fn unwritable_location_is_lock_failure() {
        let dir = tempfile::tempdir().unwrap();
        // The lock path is an existing directory.
        let state = dir.path().join("terrane.tfstate");
        std::fs::create_dir(StateLock::path_for(&state)).unwrap();

        assert!(matches!(
            StateLock::acquire(&state).unwrap_err(),
            StateError::LockFailed(_)
        ));
    }
}
