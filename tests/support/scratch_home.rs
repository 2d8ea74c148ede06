use std::{
    ffi::OsString,
    fs,
    path::{Path, PathBuf},
    sync::{Mutex, MutexGuard},
};

use driftscan::app_dirs::HOME_ENV_VAR;
use tempfile::TempDir;

/// Serializes tests that repoint the process-wide agent home.
static HOME_SERIAL: Mutex<()> = Mutex::new(());

/// A throwaway agent installation.
///
/// `DRIFTSCAN_HOME` points at `<scratch>/home` and managed resource trees live
/// under `<scratch>/srv` until the value is dropped, at which point the
/// previous home is restored and the scratch tree removed.
pub struct ScratchHome {
    previous: Option<OsString>,
    dir: TempDir,
    _serial: MutexGuard<'static, ()>,
}

impl ScratchHome {
    pub fn new() -> Self {
        let serial = HOME_SERIAL.lock().unwrap_or_else(|err| err.into_inner());
        let dir = tempfile::tempdir().expect("create scratch dir");
        fs::create_dir_all(dir.path().join("srv")).expect("create resource root");
        let previous = std::env::var_os(HOME_ENV_VAR);
        // SAFETY: every writer of HOME_ENV_VAR holds HOME_SERIAL.
        unsafe { std::env::set_var(HOME_ENV_VAR, dir.path().join("home")) };
        Self {
            previous,
            dir,
            _serial: serial,
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Directory holding the managed resources' files.
    pub fn resource_root(&self) -> PathBuf {
        self.dir.path().join("srv")
    }
}

impl Drop for ScratchHome {
    fn drop(&mut self) {
        // SAFETY: HOME_SERIAL is still held; it is released after this runs.
        unsafe {
            match self.previous.take() {
                Some(value) => std::env::set_var(HOME_ENV_VAR, value),
                None => std::env::remove_var(HOME_ENV_VAR),
            }
        }
    }
}
