use std::io;

use tracing::Level;

/// Maps a `-v` count onto a maximum log level. Warnings always show.
pub fn level_for_verbosity(verbosity: u8) -> Level {
    match verbosity {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Initialize a compact tracing subscriber on stderr, keeping stdout free
/// for pasted data. Safe to call multiple times; subsequent calls are no-ops
/// for the global subscriber.
pub fn init(verbosity: u8) {
    let _ = tracing_subscriber::fmt()
        .with_max_level(level_for_verbosity(verbosity))
        .with_writer(io::stderr)
        .with_target(false)
        .with_thread_names(false)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_raises_level() {
        assert_eq!(level_for_verbosity(0), Level::WARN);
        assert_eq!(level_for_verbosity(1), Level::INFO);
        assert_eq!(level_for_verbosity(2), Level::DEBUG);
        assert_eq!(level_for_verbosity(9), Level::TRACE);
    }

    #[test]
    fn init_twice_is_harmless() {
        init(0);
        init(3);
    }
}
