//! Advisory file lock with shared and exclusive levels.
//!
//! The lock is anchored to a filesystem path and cooperates only with other
//! holders using the same primitive (`flock` on Unix via `fs2`). Acquisition
//! polls with randomised backoff so every blocking call honours the
//! [`LockContext`] deadline and cancel token. Reading the locked file needs at
//! least a shared hold; writing needs an exclusive hold.

mod backoff;
mod context;
mod errors;

use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::thread;

use fs2::FileExt;
use tracing::{debug, warn};

use self::backoff::Backoff;
use self::context::ContextExpiry;

pub use self::context::{CancelToken, LockContext};
pub use self::errors::LockError;

const LOCK_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::lock");

/// Requested lock level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    /// Many concurrent readers.
    Shared,
    /// A single writer.
    Exclusive,
}

impl fmt::Display for LockMode {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(match self {
            Self::Shared => "shared",
            Self::Exclusive => "exclusive",
        })
    }
}

/// Level currently held by a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    /// No lock held.
    Unlocked,
    /// Shared (read) lock held.
    SharedHeld,
    /// Exclusive (write) lock held.
    ExclusiveHeld,
}

impl LockState {
    const fn satisfies(self, mode: LockMode) -> bool {
        match (self, mode) {
            (Self::ExclusiveHeld, _) | (Self::SharedHeld, LockMode::Shared) => true,
            (Self::Unlocked, _) | (Self::SharedHeld, LockMode::Exclusive) => false,
        }
    }
}

impl LockMode {
    const fn held_state(self) -> LockState {
        match self {
            Self::Shared => LockState::SharedHeld,
            Self::Exclusive => LockState::ExclusiveHeld,
        }
    }
}

/// Handle to an advisory lock owned by this process.
///
/// Dropping the handle releases whatever level is held.
#[derive(Debug)]
pub struct AdvisoryLock {
    path: PathBuf,
    file: File,
    state: LockState,
    create: bool,
}

impl AdvisoryLock {
    /// Opens (creating when missing) the lock file at `path`.
    ///
    /// Missing parent directories are created. Existing content is preserved.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, LockError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| {
                LockError::io(parent.to_path_buf(), "create directory for", source)
            })?;
        }
        let file =
            open_file(&path, true).map_err(|source| LockError::io(path.clone(), "open", source))?;
        Ok(Self::from_file(path, file, true))
    }

    /// Opens the lock file only when it already exists.
    ///
    /// Returns `Ok(None)` for a missing file so callers tearing state down
    /// never recreate it. If the file is removed while this handle waits,
    /// acquisition fails with [`LockError::Vanished`].
    pub fn open_existing(path: impl Into<PathBuf>) -> Result<Option<Self>, LockError> {
        let path = path.into();
        match open_file(&path, false) {
            Ok(file) => Ok(Some(Self::from_file(path, file, false))),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(LockError::io(path, "open", source)),
        }
    }

    fn from_file(path: PathBuf, file: File, create: bool) -> Self {
        Self {
            path,
            file,
            state: LockState::Unlocked,
            create,
        }
    }

    /// Path the lock is anchored to.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Level currently held.
    #[must_use]
    pub const fn state(&self) -> LockState {
        self.state
    }

    /// Acquires a shared lock, waiting until `context` expires.
    pub fn acquire_shared(&mut self, context: &LockContext) -> Result<(), LockError> {
        self.acquire(LockMode::Shared, context)
    }

    /// Acquires an exclusive lock, upgrading an existing shared hold.
    ///
    /// On Unix the upgrade converts the `flock` in place. The conversion is
    /// not atomic: a concurrent writer may slip in between the shared hold
    /// being dropped and the exclusive one being granted, so callers must
    /// re-validate anything they read under the shared lock. A failed
    /// upgrade leaves the handle [`LockState::Unlocked`].
    pub fn acquire_exclusive(&mut self, context: &LockContext) -> Result<(), LockError> {
        self.acquire(LockMode::Exclusive, context)
    }

    /// Releases any held lock. Releasing an unlocked handle is a no-op.
    pub fn release(&mut self) {
        if self.state == LockState::Unlocked {
            return;
        }
        if let Err(error) = FileExt::unlock(&self.file) {
            warn!(
                target: LOCK_TARGET,
                file = %self.path.display(),
                error = %error,
                "failed to unlock lock file"
            );
        }
        debug!(
            target: LOCK_TARGET,
            file = %self.path.display(),
            previous = ?self.state,
            "released lock"
        );
        self.state = LockState::Unlocked;
    }

    /// Reads the whole file. Requires at least a shared hold.
    pub fn read_bytes(&mut self) -> Result<Vec<u8>, LockError> {
        self.require(LockMode::Shared)?;
        let mut file = &self.file;
        let mut buffer = Vec::new();
        file.seek(SeekFrom::Start(0))
            .and_then(|_| file.read_to_end(&mut buffer))
            .map_err(|source| LockError::io(self.path.clone(), "read", source))?;
        Ok(buffer)
    }

    /// Replaces the whole file content. Requires an exclusive hold.
    pub fn write_bytes(&mut self, data: &[u8]) -> Result<(), LockError> {
        self.require(LockMode::Exclusive)?;
        let mut file = &self.file;
        file.set_len(0)
            .and_then(|()| file.seek(SeekFrom::Start(0)))
            .and_then(|_| file.write_all(data))
            .and_then(|()| file.sync_all())
            .map_err(|source| LockError::io(self.path.clone(), "write", source))
    }

    fn require(&self, required: LockMode) -> Result<(), LockError> {
        if self.state.satisfies(required) {
            Ok(())
        } else {
            Err(LockError::NotHeld {
                path: self.path.clone(),
                required,
            })
        }
    }

    fn acquire(&mut self, mode: LockMode, context: &LockContext) -> Result<(), LockError> {
        if self.state.satisfies(mode) {
            return Ok(());
        }
        let upgrading = self.state == LockState::SharedHeld;
        #[cfg(not(unix))]
        if upgrading {
            // Platform locks cannot be converted in place here.
            self.release();
        }
        let mut backoff = Backoff::new();
        loop {
            if let Some(expiry) = context.expiry() {
                if upgrading {
                    self.release();
                }
                return Err(self.expired(mode, expiry, context));
            }
            let attempt = self
                .try_lock(mode)
                .map_err(|source| LockError::io(self.path.clone(), "lock", source))
                .and_then(|locked| self.reanchor_if_detached(locked));
            match attempt {
                Ok(true) => {
                    self.state = mode.held_state();
                    debug!(
                        target: LOCK_TARGET,
                        file = %self.path.display(),
                        %mode,
                        waited_ms = duration_ms(context),
                        "acquired lock"
                    );
                    return Ok(());
                }
                Ok(false) => {
                    // A refused conversion has already dropped the shared hold.
                    if upgrading {
                        self.state = LockState::Unlocked;
                    }
                }
                Err(error) => {
                    if upgrading {
                        self.release();
                    }
                    return Err(error);
                }
            }
            thread::sleep(backoff.next_delay(context.remaining()));
        }
    }

    /// Drops a lock taken on a file that was unlinked or replaced while we
    /// waited, then reopens the path so the next attempt targets the live
    /// file. Handles from [`Self::open_existing`] never recreate it.
    fn reanchor_if_detached(&mut self, locked: bool) -> Result<bool, LockError> {
        if !locked {
            return Ok(false);
        }
        let detached = self
            .is_detached()
            .map_err(|source| LockError::io(self.path.clone(), "inspect", source))?;
        if !detached {
            return Ok(true);
        }
        FileExt::unlock(&self.file)
            .map_err(|source| LockError::io(self.path.clone(), "unlock", source))?;
        self.state = LockState::Unlocked;
        self.file = match open_file(&self.path, self.create) {
            Ok(file) => file,
            Err(error) if !self.create && error.kind() == io::ErrorKind::NotFound => {
                debug!(
                    target: LOCK_TARGET,
                    file = %self.path.display(),
                    "lock file removed while waiting"
                );
                return Err(LockError::Vanished {
                    path: self.path.clone(),
                });
            }
            Err(source) => return Err(LockError::io(self.path.clone(), "reopen", source)),
        };
        debug!(
            target: LOCK_TARGET,
            file = %self.path.display(),
            "lock file replaced while waiting; reopened"
        );
        Ok(false)
    }

    #[cfg(unix)]
    fn is_detached(&self) -> io::Result<bool> {
        use std::os::unix::fs::MetadataExt;

        let held = self.file.metadata()?;
        match fs::metadata(&self.path) {
            Ok(current) => Ok(current.dev() != held.dev() || current.ino() != held.ino()),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(true),
            Err(error) => Err(error),
        }
    }

    #[cfg(not(unix))]
    fn is_detached(&self) -> io::Result<bool> {
        Ok(false)
    }

    fn try_lock(&self, mode: LockMode) -> io::Result<bool> {
        let attempt = match mode {
            LockMode::Shared => FileExt::try_lock_shared(&self.file),
            LockMode::Exclusive => FileExt::try_lock_exclusive(&self.file),
        };
        match attempt {
            Ok(()) => Ok(true),
            Err(error) if is_contended(&error) => Ok(false),
            Err(error) => Err(error),
        }
    }

    fn expired(&self, mode: LockMode, expiry: ContextExpiry, context: &LockContext) -> LockError {
        match expiry {
            ContextExpiry::Cancelled => LockError::Cancelled {
                path: self.path.clone(),
                mode,
            },
            ContextExpiry::DeadlineExceeded => LockError::Timeout {
                path: self.path.clone(),
                mode,
                waited_ms: duration_ms(context),
            },
        }
    }
}

impl Drop for AdvisoryLock {
    fn drop(&mut self) {
        self.release();
    }
}

fn open_file(path: &Path, create: bool) -> io::Result<File> {
    let mut options = OpenOptions::new();
    options.read(true).write(true).create(create).truncate(false);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    options.open(path)
}

fn is_contended(error: &io::Error) -> bool {
    error.kind() == io::ErrorKind::WouldBlock
        || error.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

fn duration_ms(context: &LockContext) -> u64 {
    u64::try_from(context.elapsed().as_millis()).unwrap_or(u64::MAX)
}
