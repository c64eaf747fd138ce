use std::io::{self, Read, Write};
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use crossterm::tty::IsTty;
use indoc::indoc;

use ttyclip::clipboard::{Clipboard, ClipboardConfig};
use ttyclip::constants::{DEFAULT_COPY_SECONDS, DEFAULT_SELECTION};
use ttyclip::drivers::{self, TerminalController};
use ttyclip::tracing_sub;

const AFTER_HELP: &str = indoc! {"
    Examples:
      ttyclip copy 'hello' -s 5     own CLIPBOARD with 'hello' for five seconds
      echo hi | ttyclip copy        copy from stdin
      ttyclip paste                 print the clipboard, exit 1 when empty
      ttyclip --selection PRIMARY paste
      ttyclip echo off              stop echoing typed characters
"};

/// Longest time-to-live accepted for `copy`.
const MAX_COPY_SECONDS: u64 = 24 * 60 * 60;

#[derive(Parser, Debug)]
#[command(
    name = "ttyclip",
    version = env!("CARGO_PKG_VERSION"),
    about = "Toggle terminal echo/buffering and read or write the X11 clipboard",
    after_help = AFTER_HELP
)]
struct Cli {
    /// Selection to own or read.
    #[arg(long, global = true, value_name = "NAME", default_value = DEFAULT_SELECTION)]
    selection: String,

    /// X display to use instead of $DISPLAY.
    #[arg(long, global = true, value_name = "DISPLAY")]
    display: Option<String>,

    /// Log more; repeat for more detail.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Own the selection with TEXT (or stdin) and serve it for a while.
    Copy {
        /// Text to copy. Read from stdin when omitted.
        text: Option<String>,

        /// How long to keep serving the selection.
        #[arg(
            short = 's',
            long = "seconds",
            value_name = "SECONDS",
            default_value_t = DEFAULT_COPY_SECONDS
        )]
        seconds: u64,
    },
    /// Print the selection as text.
    Paste {
        /// How long to wait for the owner per conversion attempt.
        #[arg(long = "timeout-ms", value_name = "MILLIS")]
        timeout_ms: Option<u64>,
    },
    /// List the targets the current owner offers.
    Targets,
    /// Turn terminal echo on or off.
    Echo { state: Toggle },
    /// Turn terminal line buffering on or off.
    Buffer { state: Toggle },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Toggle {
    On,
    Off,
}

impl Toggle {
    fn enabled(self) -> bool {
        self == Toggle::On
    }
}

impl TryFrom<&Cli> for ClipboardConfig {
    type Error = String;

    fn try_from(cli: &Cli) -> Result<Self, Self::Error> {
        if cli.selection.is_empty() {
            return Err("selection name must not be empty".to_string());
        }
        let mut config = ClipboardConfig::new().with_selection(cli.selection.clone());
        if let Some(display) = &cli.display {
            config = config.with_display(display.clone());
        }
        if let Command::Paste {
            timeout_ms: Some(ms),
        } = cli.command
        {
            if !(1..=60_000).contains(&ms) {
                return Err("timeout must be between 1 and 60000 ms".to_string());
            }
            config = config.with_paste_timeout(Duration::from_millis(ms));
        }
        Ok(config)
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    tracing_sub::init(cli.verbose);
    match run(&cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("ttyclip: {err}");
            ExitCode::from(2)
        }
    }
}

fn run(cli: &Cli) -> Result<ExitCode, Box<dyn std::error::Error>> {
    match &cli.command {
        Command::Copy { text, seconds } => {
            if *seconds > MAX_COPY_SECONDS {
                return Err(format!("seconds must be at most {MAX_COPY_SECONDS}").into());
            }
            let payload = match text {
                Some(text) => text.clone().into_bytes(),
                None => read_stdin()?,
            };
            let clipboard = Clipboard::new(ClipboardConfig::try_from(cli)?);
            let report = clipboard.copy(&payload, Duration::from_secs(*seconds))?;
            tracing::info!(served = report.served, "copy finished");
            Ok(ExitCode::SUCCESS)
        }
        Command::Paste { .. } => {
            let clipboard = Clipboard::new(ClipboardConfig::try_from(cli)?);
            match clipboard.paste()? {
                Some(bytes) => {
                    let mut stdout = io::stdout().lock();
                    stdout.write_all(&bytes)?;
                    stdout.flush()?;
                    Ok(ExitCode::SUCCESS)
                }
                None => Ok(ExitCode::from(1)),
            }
        }
        Command::Targets => {
            let clipboard = Clipboard::new(ClipboardConfig::try_from(cli)?);
            let mut stdout = io::stdout().lock();
            for name in clipboard.targets()? {
                writeln!(stdout, "{name}")?;
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Echo { state } => {
            drivers::open_controlling()?.set_echo(state.enabled())?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Buffer { state } => {
            drivers::open_controlling()?.set_buffer(state.enabled())?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn read_stdin() -> io::Result<Vec<u8>> {
    let mut stdin = io::stdin();
    if stdin.is_tty() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "no text given and stdin is a terminal",
        ));
    }
    let mut buf = Vec::new();
    stdin.read_to_end(&mut buf)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn copy_defaults() {
        let cli = Cli::try_parse_from(["ttyclip", "copy", "hi"]).unwrap();
        match cli.command {
            Command::Copy { text, seconds } => {
                assert_eq!(text.as_deref(), Some("hi"));
                assert_eq!(seconds, DEFAULT_COPY_SECONDS);
            }
            other => panic!("unexpected command {other:?}"),
        }
        assert_eq!(cli.selection, DEFAULT_SELECTION);
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli =
            Cli::try_parse_from(["ttyclip", "paste", "--selection", "PRIMARY", "-vv"]).unwrap();
        assert_eq!(cli.selection, "PRIMARY");
        assert_eq!(cli.verbose, 2);
        let config = ClipboardConfig::try_from(&cli).unwrap();
        assert_eq!(config.selection(), "PRIMARY");
    }

    #[test]
    fn paste_timeout_is_validated() {
        let cli = Cli::try_parse_from(["ttyclip", "paste", "--timeout-ms", "0"]).unwrap();
        assert!(ClipboardConfig::try_from(&cli).is_err());
        let cli = Cli::try_parse_from(["ttyclip", "paste", "--timeout-ms", "250"]).unwrap();
        let config = ClipboardConfig::try_from(&cli).unwrap();
        assert_eq!(config.paste_timeout(), Duration::from_millis(250));
    }

    #[test]
    fn toggles_parse() {
        let cli = Cli::try_parse_from(["ttyclip", "echo", "off"]).unwrap();
        assert!(matches!(cli.command, Command::Echo { state: Toggle::Off }));
        assert!(!Toggle::Off.enabled());
        assert!(Toggle::On.enabled());
        assert!(Cli::try_parse_from(["ttyclip", "buffer", "maybe"]).is_err());
    }
}
