//! Conversation I/O surface.
//!
//! The loop suspends in exactly two places: waiting for user text here, and
//! waiting for the completion service. Both are `async` so a host can swap
//! the console for any other line-oriented transport.

use std::collections::VecDeque;
use std::io;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

use crate::utilities::printer::{Printer, PrinterColor};

/// Who a line of output belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Speaker {
    User,
    Assistant,
    /// Failures reported to the user, not part of the conversation.
    Error,
}

impl Speaker {
    /// Console prefix for this speaker.
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::User => "User > ",
            Self::Assistant => "Assistant > ",
            Self::Error => "Error > ",
        }
    }

    fn color(&self) -> PrinterColor {
        match self {
            Self::User => PrinterColor::BoldCyan,
            Self::Assistant => PrinterColor::BoldGreen,
            Self::Error => PrinterColor::BoldRed,
        }
    }
}

/// Line-oriented input and output for one session.
#[async_trait]
pub trait ConversationIo: Send {
    /// Show `prompt` and wait for one line. `Ok(None)` means end of input.
    async fn read_input(&mut self, prompt: &str) -> io::Result<Option<String>>;

    /// Deliver one line of output.
    async fn emit(&mut self, speaker: Speaker, text: &str) -> io::Result<()>;
}

// ---------------------------------------------------------------------------
// Console
// ---------------------------------------------------------------------------

/// Terminal I/O: stdin lines in, colored prefixed lines out.
pub struct ConsoleIo {
    lines: Lines<BufReader<Stdin>>,
    printer: Printer,
}

impl ConsoleIo {
    pub fn new(colored: bool) -> Self {
        Self {
            lines: BufReader::new(tokio::io::stdin()).lines(),
            printer: Printer::new(colored),
        }
    }
}

#[async_trait]
impl ConversationIo for ConsoleIo {
    async fn read_input(&mut self, prompt: &str) -> io::Result<Option<String>> {
        self.printer.prompt(prompt, Speaker::User.color())?;
        let line = self.lines.next_line().await?;
        Ok(line.map(|l| l.trim_end_matches('\r').to_string()))
    }

    async fn emit(&mut self, speaker: Speaker, text: &str) -> io::Result<()> {
        self.printer.print_line(speaker.prefix(), speaker.color(), text)
    }
}

// ---------------------------------------------------------------------------
// Scripted
// ---------------------------------------------------------------------------

/// Pre-recorded input with captured output, for tests and batch runs.
#[derive(Debug, Default)]
pub struct ScriptedIo {
    inputs: VecDeque<String>,
    outputs: Vec<(Speaker, String)>,
    prompts: usize,
}

impl ScriptedIo {
    pub fn new<I, S>(inputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            inputs: inputs.into_iter().map(Into::into).collect(),
            outputs: Vec::new(),
            prompts: 0,
        }
    }

    /// Everything emitted so far.
    pub fn outputs(&self) -> &[(Speaker, String)] {
        &self.outputs
    }

    /// How many times input was requested.
    pub fn prompts(&self) -> usize {
        self.prompts
    }
}

#[async_trait]
impl ConversationIo for ScriptedIo {
    async fn read_input(&mut self, _prompt: &str) -> io::Result<Option<String>> {
        self.prompts += 1;
        Ok(self.inputs.pop_front())
    }

    async fn emit(&mut self, speaker: Speaker, text: &str) -> io::Result<()> {
        self.outputs.push((speaker, text.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefixes() {
        assert_eq!(Speaker::User.prefix(), "User > ");
        assert_eq!(Speaker::Assistant.prefix(), "Assistant > ");
        assert_eq!(Speaker::Error.prefix(), "Error > ");
    }

    #[tokio::test]
    async fn test_scripted_io() {
        let mut io = ScriptedIo::new(["hello"]);
        assert_eq!(io.read_input("User > ").await.unwrap().as_deref(), Some("hello"));
        assert_eq!(io.read_input("User > ").await.unwrap(), None);
        io.emit(Speaker::Assistant, "hi").await.unwrap();
        assert_eq!(io.outputs(), &[(Speaker::Assistant, "hi".to_string())]);
        assert_eq!(io.prompts(), 2);
    }
}
