use std::fs::OpenOptions;
use std::io;
use std::os::fd::{AsFd, BorrowedFd, OwnedFd};
use std::os::unix::fs::OpenOptionsExt;

use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::sys::termios::{self, LocalFlags, SetArg, Termios};

use super::{TerminalController, TerminalError};

const CONTROLLING_TTY: &str = "/dev/tty";

/// termios-backed driver for one terminal file descriptor.
pub struct PosixTerminal {
    fd: OwnedFd,
}

impl PosixTerminal {
    /// Opens `/dev/tty`, the controlling terminal, regardless of where stdin
    /// and stdout point.
    pub fn open_controlling() -> Result<Self, TerminalError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(OFlag::O_NOCTTY.bits())
            .open(CONTROLLING_TTY)
            .map_err(|source| TerminalError::Open {
                path: CONTROLLING_TTY,
                source,
            })?;
        Self::from_fd(file.into())
    }

    /// Wraps an already-open descriptor. Fails with
    /// [`TerminalError::NotATerminal`] unless it refers to a tty.
    pub fn from_fd(fd: OwnedFd) -> Result<Self, TerminalError> {
        // Same test isatty(3) performs: only a tty has termios attributes.
        match termios::tcgetattr(&fd) {
            Ok(_) => Ok(Self { fd }),
            Err(Errno::ENOTTY) | Err(Errno::EINVAL) => Err(TerminalError::NotATerminal),
            Err(errno) => Err(io::Error::from(errno).into()),
        }
    }

    fn attrs(&self) -> io::Result<Termios> {
        Ok(termios::tcgetattr(&self.fd)?)
    }

    fn apply(&self, attrs: &Termios) -> io::Result<()> {
        // TCSANOW keeps whatever input is already queued; TCSAFLUSH would drop it.
        Ok(termios::tcsetattr(&self.fd, SetArg::TCSANOW, attrs)?)
    }

    /// Flips one local flag and leaves every other attribute, control
    /// characters included, exactly as it was.
    fn set_local_flag(&self, flag: LocalFlags, enabled: bool) -> Result<(), TerminalError> {
        let mut attrs = self.attrs()?;
        attrs.local_flags.set(flag, enabled);
        self.apply(&attrs)?;
        Ok(())
    }

    fn local_flag(&self, flag: LocalFlags) -> Result<bool, TerminalError> {
        Ok(self.attrs()?.local_flags.contains(flag))
    }
}

impl AsFd for PosixTerminal {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }
}

impl TerminalController for PosixTerminal {
    fn set_echo(&mut self, enabled: bool) -> Result<(), TerminalError> {
        tracing::debug!(enabled, "setting terminal echo");
        self.set_local_flag(LocalFlags::ECHO, enabled)
    }

    fn set_buffer(&mut self, enabled: bool) -> Result<(), TerminalError> {
        tracing::debug!(enabled, "setting terminal line buffering");
        self.set_local_flag(LocalFlags::ICANON, enabled)
    }

    fn echo_enabled(&self) -> Result<bool, TerminalError> {
        self.local_flag(LocalFlags::ECHO)
    }

    fn buffer_enabled(&self) -> Result<bool, TerminalError> {
        self.local_flag(LocalFlags::ICANON)
    }
}
