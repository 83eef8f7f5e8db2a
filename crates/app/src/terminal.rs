//! Line-oriented terminal front end for a practice session.

use std::fmt;

use services::{ConnectionState, UiEvent};
use sign_core::{EndOfCatalog, MoveKind, Navigation};
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Input {
    Navigate(Navigation),
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputError {
    Unknown(String),
    InvalidIndex(String),
}

impl fmt::Display for InputError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputError::Unknown(line) => write!(f, "unknown command: {line} (try `help`)"),
            InputError::InvalidIndex(raw) => write!(f, "jump needs a symbol number, got {raw:?}"),
        }
    }
}

impl std::error::Error for InputError {}

pub const HELP: &str = "\
commands:
  next         advance once the current symbol is mastered
  next wrap    advance, starting over after the last symbol
  skip         move on without mastering
  skip wrap    skip, starting over after the last symbol
  jump <n>     practice symbol number <n> (1-based)
  quit         save and exit";

/// Parse one line typed by the learner. Blank lines yield `None`.
///
/// # Errors
///
/// Returns `InputError` for unknown commands or a bad jump target.
pub fn parse_input(line: &str) -> Result<Option<Input>, InputError> {
    let words: Vec<&str> = line.split_whitespace().collect();
    let input = match words.as_slice() {
        [] => return Ok(None),
        ["next" | "n"] => Input::Navigate(Navigation::Advance(EndOfCatalog::Clamp)),
        ["next" | "n", "wrap"] => Input::Navigate(Navigation::Advance(EndOfCatalog::Wrap)),
        ["skip" | "s"] => Input::Navigate(Navigation::Skip(EndOfCatalog::Clamp)),
        ["skip" | "s", "wrap"] => Input::Navigate(Navigation::Skip(EndOfCatalog::Wrap)),
        ["jump" | "j", raw] => {
            let number: usize = raw
                .parse()
                .map_err(|_| InputError::InvalidIndex((*raw).to_owned()))?;
            let index = number
                .checked_sub(1)
                .ok_or_else(|| InputError::InvalidIndex((*raw).to_owned()))?;
            Input::Navigate(Navigation::Jump(index))
        }
        ["help" | "h" | "?"] => Input::Help,
        ["quit" | "q" | "exit"] => Input::Quit,
        _ => return Err(InputError::Unknown(line.trim().to_owned())),
    };
    Ok(Some(input))
}

/// One display line per event. Candidate updates are suppressed unless `verbose`.
#[must_use]
pub fn render(event: &UiEvent, verbose: bool) -> Option<String> {
    let line = match event {
        UiEvent::Candidate {
            label, confidence, ..
        } => {
            if !verbose {
                return None;
            }
            format!("  seeing {label} ({:.0}%)", confidence * 100.0)
        }
        UiEvent::Verdict(verdict) if verdict.correct => {
            format!("✔ {} ({:.0}%)", verdict.label, verdict.confidence * 100.0)
        }
        UiEvent::Verdict(verdict) => format!(
            "✘ saw {} while practicing {} ({:.0}%)",
            verdict.label,
            verdict.target,
            verdict.confidence * 100.0
        ),
        UiEvent::Progress(update) => {
            let mut line = format!(
                "  {}: {} correct this round, streak {}",
                update.symbol, update.record.correct_this_round, update.streak
            );
            if update.newly_mastered {
                line.push_str(" (mastered! type `next`)");
            }
            line
        }
        UiEvent::SymbolChanged {
            index,
            symbol,
            kind: MoveKind::Clamped,
        } => format!(
            "end of the list, still on #{} {symbol}; `next wrap` starts over",
            index + 1
        ),
        UiEvent::SymbolChanged {
            index,
            symbol,
            kind: MoveKind::Wrapped,
        } => format!("starting over: sign #{} {symbol}", index + 1),
        UiEvent::SymbolChanged { index, symbol, .. } => {
            format!("now practicing #{} {symbol}", index + 1)
        }
        UiEvent::Connection(ConnectionState::Open) => "[service connected]".to_owned(),
        UiEvent::Connection(ConnectionState::Disconnected) => "[service disconnected]".to_owned(),
        UiEvent::Connection(_) => return None,
        UiEvent::Status(message) => format!("[{message}]"),
        UiEvent::NavigationRejected(err) => format!("can't do that: {err}"),
        UiEvent::CaptureFailed(reason) => {
            format!("camera unavailable: {reason}. Restart once it is fixed.")
        }
    };
    Some(line)
}

/// Print events until the session loop drops its sender.
pub async fn print_events(mut events: mpsc::UnboundedReceiver<UiEvent>, verbose: bool) {
    while let Some(event) = events.recv().await {
        if let Some(line) = render(&event, verbose) {
            println!("{line}");
        }
    }
}
