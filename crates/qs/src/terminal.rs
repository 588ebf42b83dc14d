use anyhow::{Context, Result};
use std::io::{BufRead, Write};

use crate::flows::{PickItem, Prompter};

/// Line-based prompts. Questions go to `output` so stdout stays free for
/// results such as a picked project path.
pub struct TerminalPrompter<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> TerminalPrompter<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    /// `None` on end of input.
    fn read_answer(&mut self) -> Result<Option<String>> {
        self.output.flush().context("failed to flush prompt")?;
        let mut line = String::new();
        let read = self
            .input
            .read_line(&mut line)
            .context("failed to read answer")?;
        if read == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim().to_string()))
    }
}

impl<R: BufRead, W: Write> Prompter for TerminalPrompter<R, W> {
    fn pick(&mut self, placeholder: &str, items: &[PickItem]) -> Result<Option<usize>> {
        if items.is_empty() {
            return Ok(None);
        }
        writeln!(self.output, "{placeholder}")?;
        let label_width = items.iter().map(|item| item.label.len()).max().unwrap_or(0);
        for (index, item) in items.iter().enumerate() {
            writeln!(
                self.output,
                "{:>3}) {:<label_width$}  {}",
                index + 1,
                item.label,
                item.description
            )?;
        }

        loop {
            write!(self.output, "> ")?;
            let Some(answer) = self.read_answer()? else {
                return Ok(None);
            };
            if answer.is_empty() || answer.eq_ignore_ascii_case("q") {
                return Ok(None);
            }
            match parse_choice(&answer, items.len()) {
                Some(index) => return Ok(Some(index)),
                None => writeln!(self.output, "enter a number from 1 to {}", items.len())?,
            }
        }
    }

    fn confirm(&mut self, message: &str, action: &str) -> Result<bool> {
        write!(self.output, "{message} {action}? [y/N] ")?;
        let answer = self.read_answer()?.unwrap_or_default();
        Ok(matches!(answer.to_ascii_lowercase().as_str(), "y" | "yes"))
    }

    fn input(
        &mut self,
        prompt: &str,
        initial: &str,
        validate: &dyn Fn(&str) -> Result<(), String>,
    ) -> Result<Option<String>> {
        loop {
            if initial.is_empty() {
                write!(self.output, "{prompt}: ")?;
            } else {
                write!(self.output, "{prompt} [{initial}]: ")?;
            }
            let Some(answer) = self.read_answer()? else {
                return Ok(None);
            };
            let value = if answer.is_empty() {
                if initial.is_empty() {
                    return Ok(None);
                }
                initial.to_string()
            } else {
                answer
            };
            match validate(&value) {
                Ok(()) => return Ok(Some(value)),
                Err(message) => writeln!(self.output, "{message}")?,
            }
        }
    }

    fn notify(&mut self, message: &str) {
        let _ = writeln!(self.output, "{message}");
    }
}

/// Maps a 1-based answer onto an item index.
fn parse_choice(answer: &str, len: usize) -> Option<usize> {
    let number = answer.parse::<usize>().ok()?;
    (1..=len).contains(&number).then(|| number - 1)
}
