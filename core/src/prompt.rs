//! Interactive confirmation, injected by the caller.

use crate::error::Result;

pub trait Prompt {
    /// Ask a yes/no question. `details` are shown above it, one per line.
    ///
    /// A cancelled prompt returns [`crate::RelqError::UserCancel`].
    fn confirm(&mut self, question: &str, details: &[String]) -> Result<bool>;
}

/// Answers every question with yes.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysYes;

impl Prompt for AlwaysYes {
    fn confirm(&mut self, _question: &str, _details: &[String]) -> Result<bool> {
        Ok(true)
    }
}

/// Answers every question with no.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysNo;

impl Prompt for AlwaysNo {
    fn confirm(&mut self, _question: &str, _details: &[String]) -> Result<bool> {
        Ok(false)
    }
}

/// Replays a fixed list of answers and records the questions asked.
#[derive(Debug, Clone, Default)]
pub struct Scripted {
    answers: Vec<bool>,
    pub asked: Vec<String>,
}

impl Scripted {
    pub fn new(answers: &[bool]) -> Self {
        Scripted {
            answers: answers.iter().rev().copied().collect(),
            asked: Vec::new(),
        }
    }
}

impl Prompt for Scripted {
    fn confirm(&mut self, question: &str, _details: &[String]) -> Result<bool> {
        self.asked.push(question.to_string());
        self.answers.pop().ok_or(crate::RelqError::UserCancel)
    }
}

impl<P: Prompt + ?Sized> Prompt for &mut P {
    fn confirm(&mut self, question: &str, details: &[String]) -> Result<bool> {
        (**self).confirm(question, details)
    }
}
