//! Terminal notification sink.
//!
//! The linking flow reports progress through the `Notifier` port: plain
//! info lines, a green line on success, a red line on failure. This module
//! writes those lines to stderr so they never interleave with the QR
//! artifact, which goes to stdout and may be piped into a file or another
//! program.

use std::io::IsTerminal;

use pairlink_core::Notifier;

const GREEN: &str = "\x1b[32m";
const RED: &str = "\x1b[31m";
const RESET: &str = "\x1b[0m";

/// Severity-coloured stderr sink for user-facing lines.
pub struct ConsoleNotifier {
    /// ANSI colouring is applied only when stderr is a terminal, so piped
    /// and redirected output stays clean.
    color: bool,
}

impl ConsoleNotifier {
    /// Creates a notifier that colours output when stderr is a terminal.
    pub fn new() -> Self {
        Self {
            color: std::io::stderr().is_terminal(),
        }
    }

    /// Creates a notifier that never emits ANSI escapes.
    pub fn plain() -> Self {
        Self { color: false }
    }

    /// Wraps `message` in `color` escapes when colouring is on.
    fn paint(&self, color: &str, message: &str) -> String {
        if self.color {
            format!("{color}{message}{RESET}")
        } else {
            message.to_string()
        }
    }
}

impl Default for ConsoleNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifier for ConsoleNotifier {
    fn info(&self, message: &str) {
        eprintln!("{message}");
    }

    fn success(&self, message: &str) {
        eprintln!("{}", self.paint(GREEN, message));
    }

    fn danger(&self, message: &str) {
        eprintln!("{}", self.paint(RED, message));
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paint_wraps_message_in_escapes_when_colored() {
        let notifier = ConsoleNotifier { color: true };

        let line = notifier.paint(GREEN, "Linked!");

        assert_eq!(line, "\x1b[32mLinked!\x1b[0m");
    }

    #[test]
    fn test_paint_passes_message_through_when_plain() {
        let notifier = ConsoleNotifier::plain();

        let line = notifier.paint(RED, "Login failed");

        assert_eq!(line, "Login failed");
    }
}
