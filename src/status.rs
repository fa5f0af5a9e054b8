//! Operator status screen.
//! `Status` is a plain value: transitions return a new one and rendering is
//! applied afterwards through a [`StatusSink`].

use dialoguer::console::Term;
use std::fmt;
use std::io::Write;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Status {
    pub swipes: u64,
    pub processing: bool,
}

impl Status {
    /// A valid swipe was read and is now being recorded.
    pub fn begin_swipe(self) -> Self {
        Self {
            swipes: self.swipes + 1,
            processing: true,
        }
    }

    pub fn finish(self) -> Self {
        Self {
            processing: false,
            ..self
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "There have been {} card swipes.", self.swipes)?;
        if self.processing {
            write!(f, "Processing...")
        } else {
            write!(f, "Ready for next scan...")
        }
    }
}

/// Where status screens and operator notices are shown.
pub trait StatusSink {
    fn show(&mut self, status: &Status);
    fn notify(&mut self, message: &str);
}

/// Clears the terminal and redraws the status on every transition.
pub struct TerminalSink {
    term: Term,
}

impl TerminalSink {
    pub fn new() -> Self {
        Self {
            term: Term::stdout(),
        }
    }
}

impl Default for TerminalSink {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusSink for TerminalSink {
    fn show(&mut self, status: &Status) {
        // Not a tty (e.g. piped input in a kiosk script): just print
        if self.term.is_term() {
            let _ = self.term.clear_screen();
        }
        let _ = writeln!(self.term, "{status}");
    }

    fn notify(&mut self, message: &str) {
        eprintln!("{message}");
    }
}
