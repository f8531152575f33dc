// Copyright 2025 Crrow
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Locking for critical sections shared between threads and processes.
//!
//! [`GlobalLock`] is an advisory lock on a well-known file inside the queue
//! directory. The OS drops the lock when the holding process dies, so a
//! crashed holder never wedges the queue: the next waiter simply acquires it.
//! That keeps the queue available after a crash but says nothing about the
//! state the crashed critical section left behind.

use std::{
    fs::{File, OpenOptions},
    path::{Path, PathBuf},
    thread,
    time::{Duration, Instant},
};

use fs2::FileExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, ensure};
use tracing::{trace, warn};

use crate::{
    Result,
    error::{IoSnafu, LockTimeoutSnafu},
};

/// Default time to wait for a [`GlobalLock`].
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_millis(5000);

const MIN_SPIN: Duration = Duration::from_micros(50);
const MAX_SPIN: Duration = Duration::from_millis(5);

/// How appenders serialize their reservations.
///
/// All appenders of one physical queue must agree on a compatible mode.
/// Mixing modes is not detected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockMode {
    /// No locking. The caller guarantees a single appender.
    SingleThread,
    /// One process-wide mutex. Safe across threads, not across processes.
    SingleProcess,
    /// The queue's file lock. Safe across threads and processes.
    #[default]
    MultiProcess,
}

/// An exclusive, cross-process lock held for as long as the value lives.
#[derive(Debug)]
pub struct GlobalLock {
    file: File,
    path: PathBuf,
}

impl GlobalLock {
    /// Acquire the lock backed by the file at `path`, creating it if needed.
    ///
    /// A zero `timeout` waits forever. Otherwise a
    /// [`LockTimeout`](crate::QueueError::LockTimeout) is returned once the
    /// timeout elapses.
    pub fn acquire(path: &Path, timeout: Duration) -> Result<Self> {
        let file = open_lock_file(path)?;

        if timeout.is_zero() {
            file.lock_exclusive().context(IoSnafu { path })?;
            return Ok(Self {
                file,
                path: path.to_path_buf(),
            });
        }

        let started = Instant::now();
        let mut spin = MIN_SPIN;
        loop {
            match file.try_lock_exclusive() {
                Ok(()) => break,
                Err(e) if e.kind() == fs2::lock_contended_error().kind() => {
                    ensure!(
                        started.elapsed() < timeout,
                        LockTimeoutSnafu { path, timeout }
                    );
                    trace!(path = ?path, "Lock contended, waiting");
                    thread::sleep(spin);
                    spin = (spin * 2).min(MAX_SPIN);
                }
                Err(e) => return Err(e).context(IoSnafu { path }),
            }
        }

        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path { &self.path }
}

impl Drop for GlobalLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            warn!(path = ?self.path, error = %e, "Failed to release lock");
        }
    }
}

#[cfg(unix)]
fn open_lock_file(path: &Path) -> Result<File> {
    use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .mode(0o666)
        .open(path)
        .context(IoSnafu { path })?;
    // The umask usually strips group/other write; other users' processes
    // must still be able to take the lock.
    let metadata = file.metadata().context(IoSnafu { path })?;
    if metadata.permissions().mode() & 0o666 != 0o666 {
        let _ = file.set_permissions(std::fs::Permissions::from_mode(0o666));
    }
    Ok(file)
}

#[cfg(not(unix))]
fn open_lock_file(path: &Path) -> Result<File> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
        .context(IoSnafu { path })
}

static PROCESS_LOCK: Mutex<()> = parking_lot::const_mutex(());

/// The lock discipline of one appender, fixed when the appender is built.
#[derive(Debug)]
pub(crate) enum WriterLock {
    Unlocked,
    Process,
    Global { path: PathBuf, timeout: Duration },
}

impl WriterLock {
    pub(crate) fn new(mode: LockMode, path: PathBuf, timeout: Duration) -> Self {
        match mode {
            LockMode::SingleThread => Self::Unlocked,
            LockMode::SingleProcess => Self::Process,
            LockMode::MultiProcess => Self::Global { path, timeout },
        }
    }

    /// Run `f` inside the critical section.
    pub(crate) fn run<T>(&self, f: impl FnOnce() -> Result<T>) -> Result<T> {
        match self {
            Self::Unlocked => f(),
            Self::Process => {
                let _guard = PROCESS_LOCK.lock();
                f()
            }
            Self::Global { path, timeout } => {
                let _guard = GlobalLock::acquire(path, *timeout)?;
                f()
            }
        }
    }
}
