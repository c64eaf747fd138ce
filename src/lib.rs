//! Terminal echo/line-buffering toggles and a selection-protocol clipboard.
//!
//! The two halves are independent: [`drivers`] flips input modes on the
//! controlling terminal, [`clipboard`] owns or reads the system clipboard.

pub mod cancel;
pub mod clipboard;
pub mod constants;
pub mod drivers;
pub mod event_loop;
pub mod tracing_sub;

pub use cancel::CancelToken;
pub use clipboard::{Clipboard, ClipboardConfig, ClipboardError, CopyReport};
pub use drivers::{ModeGuard, TerminalController, TerminalError, TerminalMode};
