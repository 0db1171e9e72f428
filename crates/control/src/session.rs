//! Single-instance guard.
//!
//! A PID file next to the bot marks a running session. Two pollers on one
//! token make the Bot API answer `409 Conflict`, so a second process on the
//! same host refuses to start while the recorded PID is alive.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use bot_metrics::TracingService;
use bot_models::BotError;
use sysinfo::{Pid, ProcessesToUpdate, System};
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Free,
    Active { pid: u32 },
    Stale { pid: u32 },
    Corrupt,
}

pub fn process_alive(pid: u32) -> bool {
    let pid = Pid::from_u32(pid);
    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
    system.process(pid).is_some()
}

fn read_pid(path: &Path) -> Option<u32> {
    fs::read_to_string(path).ok()?.trim().parse().ok()
}

fn remove_if_exists(path: &Path) -> Result<(), BotError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Reads the lock file without touching it. A lock naming our own PID is
/// stale: containers restart with the same PID and find their old file.
pub fn inspect(path: &Path) -> Result<SessionState, BotError> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(SessionState::Free),
        Err(e) if e.kind() == ErrorKind::InvalidData => return Ok(SessionState::Corrupt),
        Err(e) => return Err(e.into()),
    };

    let state = match contents.trim().parse::<u32>() {
        Ok(pid) if pid == std::process::id() => SessionState::Stale { pid },
        Ok(pid) if process_alive(pid) => SessionState::Active { pid },
        Ok(pid) => SessionState::Stale { pid },
        Err(_) => SessionState::Corrupt,
    };
    Ok(state)
}

#[derive(Debug)]
pub struct SessionLock {
    path: PathBuf,
    pid: u32,
    released: bool,
}

impl SessionLock {
    pub fn acquire(path: impl Into<PathBuf>) -> Result<Self, BotError> {
        let path = path.into();

        match inspect(&path)? {
            SessionState::Active { pid } => {
                warn!(path = %path.display(), pid, "Found another running session");
                return Err(BotError::SessionActive { pid });
            }
            SessionState::Stale { pid } => {
                warn!(path = %path.display(), pid, "Removing stale session lock");
                remove_if_exists(&path)?;
            }
            SessionState::Corrupt => {
                warn!(path = %path.display(), "Removing unreadable session lock");
                remove_if_exists(&path)?;
            }
            SessionState::Free => {}
        }

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let pid = std::process::id();
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                // Another process won the race between inspect and create.
                return Err(BotError::SessionActive {
                    pid: read_pid(&path).unwrap_or_default(),
                });
            }
            Err(e) => return Err(e.into()),
        };
        write!(file, "{}", pid)?;
        file.sync_all()?;

        TracingService::log_session("acquired", &path, pid);
        Ok(Self {
            path,
            pid,
            released: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn release(mut self) -> Result<(), BotError> {
        self.release_inner()
    }

    fn release_inner(&mut self) -> Result<(), BotError> {
        if self.released {
            return Ok(());
        }
        self.released = true;

        match read_pid(&self.path) {
            Some(pid) if pid == self.pid => {
                remove_if_exists(&self.path)?;
                TracingService::log_session("released", &self.path, self.pid);
            }
            Some(pid) => {
                warn!(path = %self.path.display(), pid, "Session lock now belongs to another process, leaving it");
            }
            None => {}
        }
        Ok(())
    }
}

impl Drop for SessionLock {
    fn drop(&mut self) {
        if let Err(e) = self.release_inner() {
            warn!(path = %self.path.display(), error = %e, "Failed to remove session lock");
        }
    }
}
