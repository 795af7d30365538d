//! Interactive `[y/N]` confirmation on the terminal.

use std::io::{self, BufRead, Write};

use colored::*;
use relq_core::prompt::Prompt;
use relq_core::{RelqError, Result};

/// Reads answers from stdin. End of input cancels.
pub struct TerminalPrompt<R> {
    input: R,
}

impl TerminalPrompt<io::StdinLock<'static>> {
    pub fn stdin() -> Self {
        TerminalPrompt {
            input: io::stdin().lock(),
        }
    }
}

impl<R: BufRead> TerminalPrompt<R> {
    pub fn new(input: R) -> Self {
        TerminalPrompt { input }
    }
}

fn parse_answer(line: &str) -> bool {
    matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

impl<R: BufRead> Prompt for TerminalPrompt<R> {
    fn confirm(&mut self, question: &str, details: &[String]) -> Result<bool> {
        for detail in details {
            println!("  {} {}", "•".yellow(), detail);
        }
        print!("{} {} ", question.bold(), "[y/N]".dimmed());
        io::stdout().flush()?;

        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            println!();
            return Err(RelqError::UserCancel);
        }
        Ok(parse_answer(&line))
    }
}
