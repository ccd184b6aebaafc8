//! Temperature flag side-channel
//!
//! A single byte ("1" hot, "0" not hot) overwritten every cycle for a local
//! consumer (fan controller, LED daemon). Usually a named pipe, a plain file
//! works too.

use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::sys::stat::Mode;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub trait FlagSignal: Send + Sync {
    fn signal(&self, hot: bool);
}

/// Used when no sensor is configured
pub struct NoSignal;

impl FlagSignal for NoSignal {
    fn signal(&self, _hot: bool) {}
}

pub struct FifoFlag {
    path: PathBuf,
}

impl FifoFlag {
    /// Creates the named pipe when nothing exists at `path` yet
    pub fn create(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            nix::unistd::mkfifo(&path, Mode::from_bits_truncate(0o666))?;
            info!(path = %path.display(), "temperature flag FIFO created");
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_flag(&self, hot: bool) -> io::Result<()> {
        // non-blocking so a FIFO without reader fails fast instead of hanging the cycle
        let mut file = OpenOptions::new()
            .write(true)
            .truncate(true)
            .custom_flags(OFlag::O_NONBLOCK.bits())
            .open(&self.path)?;
        file.write_all(if hot { b"1" } else { b"0" })
    }
}

impl FlagSignal for FifoFlag {
    fn signal(&self, hot: bool) {
        match self.write_flag(hot) {
            Ok(()) => debug!(hot, path = %self.path.display(), "temperature flag written"),
            Err(e) if e.raw_os_error() == Some(Errno::ENXIO as i32) => {
                debug!(path = %self.path.display(), "no reader on temperature flag FIFO");
            }
            Err(e) => warn!(path = %self.path.display(), error = %e, "failed to write temperature flag"),
        }
    }
}
