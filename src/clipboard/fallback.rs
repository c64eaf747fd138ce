//! Clipboard backend for platforms without X selections, on top of `arboard`.
//!
//! There is no selection owner to run here: the platform clipboard keeps the
//! text itself, so `copy` stores it and then simply holds for the requested
//! time to keep the same blocking contract.

use std::convert::Infallible;
use std::thread;
use std::time::Duration;

use super::{ClipboardConfig, ClipboardError, Conversion, CopyReport, text_payload};
use crate::cancel::CancelToken;
use crate::event_loop::{EventLoop, EventSource, LoopExit, deadline_after};

/// Event source that never produces anything; waiting just sleeps.
struct Idle;

impl EventSource for Idle {
    type Event = Infallible;
    type Error = ClipboardError;

    fn wait(&mut self, timeout: Duration) -> Result<bool, ClipboardError> {
        thread::sleep(timeout);
        Ok(false)
    }

    fn next(&mut self) -> Result<Option<Infallible>, ClipboardError> {
        Ok(None)
    }
}

pub(super) fn copy(
    config: &ClipboardConfig,
    payload: &[u8],
    duration: Duration,
    cancel: &CancelToken,
) -> Result<CopyReport, ClipboardError> {
    let text = text_payload(payload)?;
    let mut cb = arboard::Clipboard::new()?;
    cb.set_text(text)?;
    tracing::info!(len = payload.len(), "stored clipboard text");

    let exit = EventLoop::new(Idle, config.wait_slice())
        .run_until(deadline_after(duration), cancel, |_, never| match never {})?;
    Ok(CopyReport {
        cancelled: exit == LoopExit::Cancelled,
        ..CopyReport::default()
    })
}

pub(super) fn paste(_config: &ClipboardConfig) -> Result<Option<Vec<u8>>, ClipboardError> {
    let mut cb = arboard::Clipboard::new()?;
    match cb.get_text() {
        Ok(text) => Ok(Some(text.into_bytes())),
        Err(arboard::Error::ContentNotAvailable) => Ok(None),
        Err(err) => Err(err.into()),
    }
}

pub(super) fn targets(_config: &ClipboardConfig) -> Result<Vec<String>, ClipboardError> {
    Err(ClipboardError::Unsupported("listing selection targets"))
}

pub(super) fn convert(
    _config: &ClipboardConfig,
    _target: &str,
) -> Result<Conversion, ClipboardError> {
    Err(ClipboardError::Unsupported("raw selection conversion"))
}
