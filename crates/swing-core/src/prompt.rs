//! Overwrite confirmation.

use crate::error::{Result, SwingError};
use std::io::{self, BufRead, Write};

/// Question asked before overwriting local files
pub const OVERWRITE_QUESTION: &str = "Do you want to continue? [Y/N]: ";

/// Parsed answer to a yes/no question
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Answer {
    /// `y` or `yes`
    Yes,
    /// `n` or `no`
    No,
    /// Anything else
    Other,
}

impl Answer {
    /// Whether the run may go on
    #[must_use]
    pub fn proceeds(self) -> bool {
        self == Self::Yes
    }
}

/// Parse an answer, ignoring case and surrounding whitespace
#[must_use]
pub fn parse_answer(input: &str) -> Answer {
    match input.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" => Answer::Yes,
        "n" | "no" => Answer::No,
        _ => Answer::Other,
    }
}

/// Something that can answer a yes/no question
pub trait Confirm {
    /// Ask `question`; `Ok(true)` means go ahead
    ///
    /// # Errors
    ///
    /// Returns [`SwingError::Prompt`] if no answer can be read.
    fn confirm(&mut self, question: &str) -> Result<bool>;
}

/// Batch mode: every question is answered yes
#[derive(Debug, Clone, Copy, Default)]
pub struct AssumeYes;

impl Confirm for AssumeYes {
    fn confirm(&mut self, _question: &str) -> Result<bool> {
        Ok(true)
    }
}

/// Interactive prompt over a reader and a writer
#[derive(Debug)]
pub struct Prompt<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> Prompt<R, W> {
    /// Create a prompt reading answers from `input`
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }
}

impl Prompt<io::StdinLock<'static>, io::Stdout> {
    /// Prompt on the terminal
    #[must_use]
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stdout())
    }
}

impl<R: BufRead, W: Write> Confirm for Prompt<R, W> {
    fn confirm(&mut self, question: &str) -> Result<bool> {
        self.output
            .write_all(question.as_bytes())
            .and_then(|()| self.output.flush())
            .map_err(SwingError::Prompt)?;

        let mut line = String::new();
        let read = self.input.read_line(&mut line).map_err(SwingError::Prompt)?;
        if read == 0 {
            return Err(SwingError::Prompt(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "no answer on standard input",
            )));
        }

        let answer = parse_answer(&line);
        tracing::debug!("Prompt answer: {:?}", answer);
        Ok(answer.proceeds())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn ask(input: &str) -> (Result<bool>, String) {
        let mut output = Vec::new();
        let result = Prompt::new(Cursor::new(input.as_bytes()), &mut output)
            .confirm(OVERWRITE_QUESTION);
        (result, String::from_utf8(output).unwrap())
    }

    #[test]
    fn test_parse_answer() {
        assert_eq!(parse_answer("y"), Answer::Yes);
        assert_eq!(parse_answer("YES\n"), Answer::Yes);
        assert_eq!(parse_answer("  Y \r\n"), Answer::Yes);
        assert_eq!(parse_answer("n"), Answer::No);
        assert_eq!(parse_answer("No"), Answer::No);
        assert_eq!(parse_answer(""), Answer::Other);
        assert_eq!(parse_answer("yep"), Answer::Other);
    }

    #[test]
    fn test_only_yes_proceeds() {
        assert!(Answer::Yes.proceeds());
        assert!(!Answer::No.proceeds());
        assert!(!Answer::Other.proceeds());
    }

    #[test]
    fn test_prompt_writes_question() {
        let (result, output) = ask("yes\n");
        assert!(result.unwrap());
        assert_eq!(output, OVERWRITE_QUESTION);

        let (result, _) = ask("n\n");
        assert!(!result.unwrap());

        let (result, _) = ask("maybe\n");
        assert!(!result.unwrap());
    }

    #[test]
    fn test_prompt_eof_is_error() {
        let (result, _) = ask("");
        assert!(matches!(result, Err(SwingError::Prompt(_))));
    }

    #[test]
    fn test_assume_yes() {
        assert!(AssumeYes.confirm(OVERWRITE_QUESTION).unwrap());
    }
}
