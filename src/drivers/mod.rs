//! Terminal mode drivers.
//!
//! [`TerminalController`] is the capability the rest of the crate talks to.
//! The concrete driver is picked at build time: termios on Unix, console
//! modes on Windows. [`open_controlling`] hands out whichever one the target
//! supports.

#[cfg(unix)]
pub mod posix;
#[cfg(windows)]
pub mod windows;

use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TerminalError {
    #[error("cannot open controlling terminal {path}: {source}")]
    Open {
        path: &'static str,
        #[source]
        source: io::Error,
    },
    #[error("not a terminal")]
    NotATerminal,
    #[error("terminal attribute call failed: {0}")]
    Io(#[from] io::Error),
}

/// The two input-mode flags this crate manages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerminalMode {
    pub echo: bool,
    pub buffered: bool,
}

/// Echo and line-buffering toggles for one terminal.
///
/// Each setter reads the current attributes, changes exactly one flag, and
/// writes them back immediately without discarding pending input. Setting a
/// flag to the value it already has is a no-op in effect.
pub trait TerminalController {
    fn set_echo(&mut self, enabled: bool) -> Result<(), TerminalError>;
    fn set_buffer(&mut self, enabled: bool) -> Result<(), TerminalError>;
    fn echo_enabled(&self) -> Result<bool, TerminalError>;
    fn buffer_enabled(&self) -> Result<bool, TerminalError>;

    fn mode(&self) -> Result<TerminalMode, TerminalError> {
        Ok(TerminalMode {
            echo: self.echo_enabled()?,
            buffered: self.buffer_enabled()?,
        })
    }

    fn restore(&mut self, mode: TerminalMode) -> Result<(), TerminalError> {
        // Windows consoles refuse echo without line input, so line input is
        // switched on first and off last.
        if mode.buffered {
            self.set_buffer(true)?;
            self.set_echo(mode.echo)
        } else {
            self.set_echo(mode.echo)?;
            self.set_buffer(false)
        }
    }
}

impl<T: TerminalController + ?Sized> TerminalController for &mut T {
    fn set_echo(&mut self, enabled: bool) -> Result<(), TerminalError> {
        (**self).set_echo(enabled)
    }

    fn set_buffer(&mut self, enabled: bool) -> Result<(), TerminalError> {
        (**self).set_buffer(enabled)
    }

    fn echo_enabled(&self) -> Result<bool, TerminalError> {
        (**self).echo_enabled()
    }

    fn buffer_enabled(&self) -> Result<bool, TerminalError> {
        (**self).buffer_enabled()
    }
}

impl<T: TerminalController + ?Sized> TerminalController for Box<T> {
    fn set_echo(&mut self, enabled: bool) -> Result<(), TerminalError> {
        (**self).set_echo(enabled)
    }

    fn set_buffer(&mut self, enabled: bool) -> Result<(), TerminalError> {
        (**self).set_buffer(enabled)
    }

    fn echo_enabled(&self) -> Result<bool, TerminalError> {
        (**self).echo_enabled()
    }

    fn buffer_enabled(&self) -> Result<bool, TerminalError> {
        (**self).buffer_enabled()
    }
}

#[cfg(unix)]
pub type NativeTerminal = posix::PosixTerminal;
#[cfg(windows)]
pub type NativeTerminal = windows::WindowsConsole;

/// Opens the controlling terminal of the current process with the driver
/// native to this platform.
pub fn open_controlling() -> Result<Box<dyn TerminalController>, TerminalError> {
    Ok(Box::new(NativeTerminal::open_controlling()?))
}

/// Restores a terminal to the mode it had when the guard was created.
///
/// Restoration happens on drop, so an early return or panic between the
/// guard's creation and its end still leaves the terminal as it was found.
pub struct ModeGuard<T: TerminalController> {
    terminal: T,
    saved: TerminalMode,
}

impl<T: TerminalController> ModeGuard<T> {
    pub fn new(terminal: T) -> Result<Self, TerminalError> {
        let saved = terminal.mode()?;
        Ok(Self { terminal, saved })
    }

    pub fn saved(&self) -> TerminalMode {
        self.saved
    }

    pub fn terminal(&mut self) -> &mut T {
        &mut self.terminal
    }
}

impl<T: TerminalController> Drop for ModeGuard<T> {
    fn drop(&mut self) {
        if let Err(err) = self.terminal.restore(self.saved) {
            tracing::warn!(error = %err, "failed to restore terminal mode");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct FakeTerminal {
        mode: TerminalMode,
        writes: usize,
    }

    impl FakeTerminal {
        fn new() -> Self {
            Self {
                mode: TerminalMode {
                    echo: true,
                    buffered: true,
                },
                writes: 0,
            }
        }
    }

    impl TerminalController for FakeTerminal {
        fn set_echo(&mut self, enabled: bool) -> Result<(), TerminalError> {
            self.mode.echo = enabled;
            self.writes += 1;
            Ok(())
        }

        fn set_buffer(&mut self, enabled: bool) -> Result<(), TerminalError> {
            self.mode.buffered = enabled;
            self.writes += 1;
            Ok(())
        }

        fn echo_enabled(&self) -> Result<bool, TerminalError> {
            Ok(self.mode.echo)
        }

        fn buffer_enabled(&self) -> Result<bool, TerminalError> {
            Ok(self.mode.buffered)
        }
    }

    #[test]
    fn guard_restores_original_mode_on_drop() {
        let mut term = FakeTerminal::new();
        {
            let mut guard = ModeGuard::new(&mut term).unwrap();
            guard.terminal().set_echo(false).unwrap();
            guard.terminal().set_buffer(false).unwrap();
            assert_eq!(
                guard.terminal().mode().unwrap(),
                TerminalMode {
                    echo: false,
                    buffered: false
                }
            );
        }
        assert_eq!(term.mode, FakeTerminal::new().mode);
    }

    #[test]
    fn boxed_controller_forwards_calls() {
        let mut boxed: Box<dyn TerminalController> = Box::new(FakeTerminal::new());
        boxed.set_echo(false).unwrap();
        assert!(!boxed.echo_enabled().unwrap());
        assert!(boxed.buffer_enabled().unwrap());
    }

    #[test]
    fn error_messages_name_the_path() {
        let err = TerminalError::Open {
            path: "/dev/tty",
            source: io::Error::from(io::ErrorKind::NotFound),
        };
        assert!(err.to_string().contains("/dev/tty"));
    }
}
