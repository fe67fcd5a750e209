use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use std::io::{self, IsTerminal};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Char(char),
    Enter,
    Escape,
    Other,
}

impl Key {
    fn from_code(code: KeyCode) -> Self {
        match code {
            KeyCode::Char(ch) => Key::Char(ch),
            KeyCode::Enter => Key::Enter,
            KeyCode::Esc => Key::Escape,
            _ => Key::Other,
        }
    }

    pub(crate) fn from_line(line: &str) -> Self {
        match line.chars().next() {
            Some(ch) => Key::Char(ch),
            None => Key::Enter,
        }
    }
}

/// How a single keystroke is captured. `Line` is the fallback for piped or
/// redirected input, where one whole line stands in for the key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyInput {
    Terminal,
    Line,
}

impl KeyInput {
    pub fn detect() -> Self {
        if io::stdin().is_terminal() {
            KeyInput::Terminal
        } else {
            KeyInput::Line
        }
    }
}

struct RawModeGuard;

impl RawModeGuard {
    fn enable() -> io::Result<Self> {
        enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
    }
}

// Returns None when the operator interrupts: raw mode swallows SIGINT, so
// Ctrl+C and Ctrl+D arrive here as ordinary key events.
pub(crate) fn read_terminal_key() -> io::Result<Option<Key>> {
    let _raw = RawModeGuard::enable()?;
    loop {
        let Event::Key(key) = event::read()? else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }
        if key.modifiers.contains(KeyModifiers::CONTROL)
            && matches!(key.code, KeyCode::Char('c') | KeyCode::Char('d'))
        {
            return Ok(None);
        }
        return Ok(Some(Key::from_code(key.code)));
    }
}
