//! Shared crate-wide constants.

use std::time::Duration;

/// Name of the selection used when the caller does not pick one.
///
/// `CLIPBOARD` is the selection desktop applications read on an explicit
/// paste. `PRIMARY` (middle-click paste) is the usual alternative.
pub const DEFAULT_SELECTION: &str = "CLIPBOARD";

/// Property on our own window that owners write converted data into.
pub const TRANSFER_PROPERTY: &str = "TTYCLIP_DATA";

/// How long a single conversion attempt waits for the owner's
/// `SelectionNotify` before the attempt counts as timed out.
pub const DEFAULT_PASTE_TIMEOUT: Duration = Duration::from_millis(1500);

/// Longest single blocking wait on the display connection.
///
/// The event loops re-check their deadline and cancellation token at least
/// this often, so it bounds how late a cancellation is observed.
pub const DEFAULT_WAIT_SLICE: Duration = Duration::from_millis(50);

/// Time-to-live used by the CLI when `copy` is given no `--seconds`.
pub const DEFAULT_COPY_SECONDS: u64 = 10;
