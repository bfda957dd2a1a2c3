//! Console printer with ANSI color support.

use std::io::{self, Write};

use serde::{Deserialize, Serialize};

/// Available colors for printed output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrinterColor {
    Red,
    Green,
    Yellow,
    Cyan,
    BoldRed,
    BoldGreen,
    BoldCyan,
    Plain,
}

impl PrinterColor {
    /// ANSI escape code for this color.
    fn ansi_code(&self) -> &'static str {
        match self {
            Self::Red => "\x1b[31m",
            Self::Green => "\x1b[32m",
            Self::Yellow => "\x1b[33m",
            Self::Cyan => "\x1b[36m",
            Self::BoldRed => "\x1b[1;31m",
            Self::BoldGreen => "\x1b[1;32m",
            Self::BoldCyan => "\x1b[1;36m",
            Self::Plain => "",
        }
    }
}

/// ANSI reset code.
const RESET: &str = "\x1b[0m";

/// Printer for console output.
///
/// With colors disabled (e.g. output is not a terminal) text is written
/// verbatim.
#[derive(Debug, Clone)]
pub struct Printer {
    colored: bool,
}

impl Default for Printer {
    fn default() -> Self {
        Self { colored: true }
    }
}

impl Printer {
    pub fn new(colored: bool) -> Self {
        Self { colored }
    }

    /// Wrap `content` in the color's escape codes.
    pub fn paint(&self, content: &str, color: PrinterColor) -> String {
        if !self.colored || color == PrinterColor::Plain {
            return content.to_string();
        }
        format!("{}{}{}", color.ansi_code(), content, RESET)
    }

    /// Print a colored prefix followed by plain text, then a newline.
    pub fn print_line(&self, prefix: &str, color: PrinterColor, text: &str) -> io::Result<()> {
        let mut out = io::stdout().lock();
        writeln!(out, "{}{}", self.paint(prefix, color), text)?;
        out.flush()
    }

    /// Print a prompt without a trailing newline.
    pub fn prompt(&self, prompt: &str, color: PrinterColor) -> io::Result<()> {
        let mut out = io::stdout().lock();
        write!(out, "{}", self.paint(prompt, color))?;
        out.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paint_colored() {
        let printer = Printer::new(true);
        assert_eq!(
            printer.paint("Assistant > ", PrinterColor::Green),
            "\x1b[32mAssistant > \x1b[0m"
        );
        assert_eq!(printer.paint("x", PrinterColor::Plain), "x");
    }

    #[test]
    fn test_paint_uncolored() {
        let printer = Printer::new(false);
        assert_eq!(printer.paint("User > ", PrinterColor::BoldCyan), "User > ");
    }
}
