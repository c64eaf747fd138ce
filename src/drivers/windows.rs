use std::fs::OpenOptions;
use std::io;
use std::os::windows::io::{AsRawHandle, OwnedHandle};

use windows_sys::Win32::System::Console::{
    CONSOLE_MODE, ENABLE_ECHO_INPUT, ENABLE_LINE_INPUT, GetConsoleMode, SetConsoleMode,
};

use super::{TerminalController, TerminalError};

const CONSOLE_INPUT: &str = "CONIN$";

/// Console-mode driver for a console input buffer.
///
/// The console only honours `ENABLE_ECHO_INPUT` while `ENABLE_LINE_INPUT` is
/// set; `SetConsoleMode` rejects echo without line input and the error is
/// returned unchanged.
pub struct WindowsConsole {
    handle: OwnedHandle,
}

impl WindowsConsole {
    /// Opens `CONIN$`, the console attached to this process, even when stdin
    /// is redirected.
    pub fn open_controlling() -> Result<Self, TerminalError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(CONSOLE_INPUT)
            .map_err(|source| TerminalError::Open {
                path: CONSOLE_INPUT,
                source,
            })?;
        Self::from_handle(file.into())
    }

    pub fn from_handle(handle: OwnedHandle) -> Result<Self, TerminalError> {
        let console = Self { handle };
        if console.console_mode().is_err() {
            return Err(TerminalError::NotATerminal);
        }
        Ok(console)
    }

    fn console_mode(&self) -> io::Result<CONSOLE_MODE> {
        let mut mode: CONSOLE_MODE = 0;
        // SAFETY: the handle stays open for the lifetime of `self`.
        if unsafe { GetConsoleMode(self.handle.as_raw_handle() as _, &mut mode) } == 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(mode)
    }

    fn set_flag(&mut self, flag: CONSOLE_MODE, enabled: bool) -> Result<(), TerminalError> {
        let mut mode = self.console_mode()?;
        if enabled {
            mode |= flag;
        } else {
            mode &= !flag;
        }
        // SAFETY: as above.
        if unsafe { SetConsoleMode(self.handle.as_raw_handle() as _, mode) } == 0 {
            return Err(io::Error::last_os_error().into());
        }
        Ok(())
    }
}

impl TerminalController for WindowsConsole {
    fn set_echo(&mut self, enabled: bool) -> Result<(), TerminalError> {
        tracing::debug!(enabled, "setting console echo");
        self.set_flag(ENABLE_ECHO_INPUT, enabled)
    }

    fn set_buffer(&mut self, enabled: bool) -> Result<(), TerminalError> {
        tracing::debug!(enabled, "setting console line input");
        self.set_flag(ENABLE_LINE_INPUT, enabled)
    }

    fn echo_enabled(&self) -> Result<bool, TerminalError> {
        Ok(self.console_mode()? & ENABLE_ECHO_INPUT != 0)
    }

    fn buffer_enabled(&self) -> Result<bool, TerminalError> {
        Ok(self.console_mode()? & ENABLE_LINE_INPUT != 0)
    }
}
