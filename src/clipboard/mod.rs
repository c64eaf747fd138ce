//! System clipboard access through the selection protocol.
//!
//! On X11 the accessor takes part in the selection exchange itself: `copy`
//! becomes the selection owner and answers conversion requests until its
//! time-to-live runs out, and `paste` asks the current owner for a text
//! conversion. Other platforms get the same surface on top of `arboard`.
//!
//! Every operation opens its own display connection and closes it before
//! returning, whichever way it returns.

pub mod protocol;

#[cfg(not(x11_selection))]
mod fallback;
#[cfg(x11_selection)]
mod x11;

#[cfg(not(x11_selection))]
use fallback as backend;
#[cfg(x11_selection)]
use x11 as backend;

use std::io;
use std::string::FromUtf8Error;
use std::time::Duration;

use thiserror::Error;

use crate::cancel::CancelToken;
use crate::constants::{DEFAULT_PASTE_TIMEOUT, DEFAULT_SELECTION, DEFAULT_WAIT_SLICE};

#[derive(Debug, Error)]
pub enum ClipboardError {
    #[cfg(x11_selection)]
    #[error("cannot connect to the X display: {0}")]
    Unavailable(#[source] xcb::ConnError),
    #[cfg(x11_selection)]
    #[error("X display has no screen {0}")]
    NoScreen(i32),
    #[cfg(x11_selection)]
    #[error("X connection error: {0}")]
    Connection(#[from] xcb::ConnError),
    #[cfg(x11_selection)]
    #[error("X protocol error: {0:?}")]
    Protocol(#[from] xcb::ProtocolError),
    #[cfg(not(x11_selection))]
    #[error("clipboard backend error: {0}")]
    Backend(#[from] arboard::Error),
    #[error("selection {selection} is owned by another client")]
    OwnershipDenied { selection: String },
    #[error("{0} is not supported by this clipboard backend")]
    Unsupported(&'static str),
    #[error("clipboard text is not valid UTF-8")]
    InvalidText(#[source] FromUtf8Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

#[cfg(x11_selection)]
impl From<xcb::Error> for ClipboardError {
    fn from(err: xcb::Error) -> Self {
        match err {
            xcb::Error::Connection(err) => ClipboardError::Connection(err),
            xcb::Error::Protocol(err) => ClipboardError::Protocol(err),
        }
    }
}

/// Payload as a `String` for backends that only store text. Bytes that are
/// not UTF-8 are rejected rather than replaced.
#[cfg_attr(x11_selection, allow(dead_code))]
pub(crate) fn text_payload(payload: &[u8]) -> Result<String, ClipboardError> {
    String::from_utf8(payload.to_vec()).map_err(ClipboardError::InvalidText)
}

/// Settings shared by every clipboard operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClipboardConfig {
    selection: String,
    display: Option<String>,
    paste_timeout: Duration,
    wait_slice: Duration,
}

impl Default for ClipboardConfig {
    fn default() -> Self {
        Self {
            selection: DEFAULT_SELECTION.to_string(),
            display: None,
            paste_timeout: DEFAULT_PASTE_TIMEOUT,
            wait_slice: DEFAULT_WAIT_SLICE,
        }
    }
}

impl ClipboardConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Selection to own or convert. Any atom name works; `CLIPBOARD` and
    /// `PRIMARY` are the ones other applications look at.
    pub fn with_selection(mut self, selection: impl Into<String>) -> Self {
        self.selection = selection.into();
        self
    }

    /// Display to connect to instead of `$DISPLAY`.
    pub fn with_display(mut self, display: impl Into<String>) -> Self {
        self.display = Some(display.into());
        self
    }

    pub fn with_paste_timeout(mut self, timeout: Duration) -> Self {
        self.paste_timeout = timeout;
        self
    }

    pub fn with_wait_slice(mut self, slice: Duration) -> Self {
        self.wait_slice = slice;
        self
    }

    pub fn selection(&self) -> &str {
        &self.selection
    }

    pub fn display(&self) -> Option<&str> {
        self.display.as_deref()
    }

    pub fn paste_timeout(&self) -> Duration {
        self.paste_timeout
    }

    pub fn wait_slice(&self) -> Duration {
        self.wait_slice
    }
}

/// Summary of one `copy` run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CopyReport {
    /// Requests answered with data or a target list.
    pub served: usize,
    /// Requests answered with a refusal.
    pub refused: usize,
    /// Another client took the selection while we were serving.
    pub ownership_lost: bool,
    /// The run ended through its cancellation token.
    pub cancelled: bool,
}

/// Result of one raw conversion request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Conversion {
    Data {
        encoding: String,
        format: u8,
        bytes: Vec<u8>,
    },
    Refused,
    TimedOut,
}

#[derive(Debug, Clone, Default)]
pub struct Clipboard {
    config: ClipboardConfig,
}

impl Clipboard {
    pub fn new(config: ClipboardConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ClipboardConfig {
        &self.config
    }

    /// Owns the selection with `text` and serves requests for `duration`.
    ///
    /// Blocks for the whole duration even if nobody asks. Fails with
    /// [`ClipboardError::OwnershipDenied`] without serving anything when the
    /// server does not hand the selection to us.
    pub fn copy(&self, text: &[u8], duration: Duration) -> Result<CopyReport, ClipboardError> {
        self.copy_until(text, duration, &CancelToken::new())
    }

    /// Like [`Clipboard::copy`], but returns early once `cancel` fires.
    pub fn copy_until(
        &self,
        text: &[u8],
        duration: Duration,
        cancel: &CancelToken,
    ) -> Result<CopyReport, ClipboardError> {
        backend::copy(&self.config, text, duration, cancel)
    }

    /// Current selection contents as text, or `None` when there is no owner
    /// or the owner cannot produce text.
    pub fn paste(&self) -> Result<Option<Vec<u8>>, ClipboardError> {
        backend::paste(&self.config)
    }

    /// Names of the targets the current owner advertises.
    pub fn targets(&self) -> Result<Vec<String>, ClipboardError> {
        backend::targets(&self.config)
    }

    /// Asks the owner for a single conversion to `target`.
    pub fn convert(&self, target: &str) -> Result<Conversion, ClipboardError> {
        backend::convert(&self.config, target)
    }
}

/// Copies `text` to the default selection for `duration`.
pub fn copy(text: &[u8], duration: Duration) -> Result<CopyReport, ClipboardError> {
    Clipboard::default().copy(text, duration)
}

/// Reads the default selection as text.
pub fn paste() -> Result<Option<Vec<u8>>, ClipboardError> {
    Clipboard::default().paste()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_uses_crate_constants() {
        let config = ClipboardConfig::default();
        assert_eq!(config.selection(), DEFAULT_SELECTION);
        assert_eq!(config.display(), None);
        assert_eq!(config.paste_timeout(), DEFAULT_PASTE_TIMEOUT);
        assert_eq!(config.wait_slice(), DEFAULT_WAIT_SLICE);
    }

    #[test]
    fn builder_overrides_fields() {
        let config = ClipboardConfig::new()
            .with_selection("PRIMARY")
            .with_display(":1")
            .with_paste_timeout(Duration::from_millis(10))
            .with_wait_slice(Duration::from_millis(2));
        assert_eq!(config.selection(), "PRIMARY");
        assert_eq!(config.display(), Some(":1"));
        assert_eq!(config.paste_timeout(), Duration::from_millis(10));
        assert_eq!(config.wait_slice(), Duration::from_millis(2));
        assert_eq!(Clipboard::new(config.clone()).config(), &config);
    }

    #[test]
    fn ownership_error_names_the_selection() {
        let err = ClipboardError::OwnershipDenied {
            selection: "CLIPBOARD".into(),
        };
        assert_eq!(
            err.to_string(),
            "selection CLIPBOARD is owned by another client"
        );
    }

    #[test]
    fn text_payload_keeps_bytes_exactly() {
        let text = "h\u{e9}llo \u{1f600}";
        assert_eq!(text_payload(text.as_bytes()).unwrap(), text);
        assert_eq!(text_payload(b"").unwrap(), "");
    }

    #[test]
    fn text_payload_rejects_invalid_utf8() {
        let err = text_payload(b"ab\xffcd").unwrap_err();
        assert!(matches!(err, ClipboardError::InvalidText(_)));
        assert_eq!(err.to_string(), "clipboard text is not valid UTF-8");
        // lone continuation byte
        assert!(text_payload(&[0x80]).is_err());
    }
}
