//! Per-entry confirmation for batch commands.

use std::io::{BufRead, BufReader, Stderr, Stdin, Write};

use anyhow::{Context, Result};

pub trait Confirm {
    /// Ask `question`; `Ok(true)` means go ahead.
    fn confirm(&mut self, question: &str) -> Result<bool>;
}

/// `--yes`: every question is answered yes.
#[derive(Debug, Clone, Copy, Default)]
pub struct AssumeYes;

impl Confirm for AssumeYes {
    fn confirm(&mut self, _question: &str) -> Result<bool> {
        Ok(true)
    }
}

/// Prompts on `output` and reads answers from `input` until one is
/// recognised. An empty answer counts as yes.
pub struct Prompt<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> Prompt<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }
}

impl Prompt<BufReader<Stdin>, Stderr> {
    /// Stdin is only locked while an answer is read.
    pub fn terminal() -> Self {
        Self::new(BufReader::new(std::io::stdin()), std::io::stderr())
    }
}

impl<R: BufRead, W: Write> Confirm for Prompt<R, W> {
    fn confirm(&mut self, question: &str) -> Result<bool> {
        loop {
            write!(self.output, "{question} (Y/n) ").context("failed to write prompt")?;
            self.output.flush().context("failed to write prompt")?;

            let mut answer = String::new();
            let read = self
                .input
                .read_line(&mut answer)
                .context("failed to read answer")?;
            if read == 0 {
                // end of input: nothing more will be confirmed
                return Ok(false);
            }
            if let Some(yes) = parse_answer(&answer) {
                return Ok(yes);
            }
        }
    }
}

fn parse_answer(answer: &str) -> Option<bool> {
    match answer.trim().to_ascii_lowercase().as_str() {
        "" | "y" | "yes" => Some(true),
        "n" | "no" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::io::Cursor;

    #[rstest]
    #[case::empty("\n", true)]
    #[case::y("y\n", true)]
    #[case::yes_upper("YES\n", true)]
    #[case::n("n\n", false)]
    #[case::no_upper("NO\n", false)]
    fn answers(#[case] input: &str, #[case] expected: bool) {
        let mut out = Vec::new();
        let mut prompt = Prompt::new(Cursor::new(input.as_bytes()), &mut out);
        assert_eq!(prompt.confirm("hold a.nc?").unwrap(), expected);
        assert_eq!(String::from_utf8(out).unwrap(), "hold a.nc? (Y/n) ");
    }

    #[rstest]
    #[case::then_yes("maybe\ny\n", true)]
    #[case::then_no("x\nnope\nn\n", false)]
    fn unrecognised_answers_ask_again(#[case] input: &str, #[case] expected: bool) {
        let mut out = Vec::new();
        let mut prompt = Prompt::new(Cursor::new(input.as_bytes()), &mut out);
        assert_eq!(prompt.confirm("hold a.nc?").unwrap(), expected);
        let asked = String::from_utf8(out).unwrap().matches("hold a.nc? (Y/n) ").count();
        assert_eq!(asked, input.lines().count());
    }

    #[test]
    fn unrecognised_answer_then_end_of_input_declines() {
        let mut prompt = Prompt::new(Cursor::new(&b"maybe\n"[..]), Vec::new());
        assert!(!prompt.confirm("reset?").unwrap());
    }

    #[test]
    fn closed_input_declines() {
        let mut prompt = Prompt::new(Cursor::new(&b""[..]), Vec::new());
        assert!(!prompt.confirm("reset?").unwrap());
    }

    #[test]
    fn reads_one_answer_per_question() {
        let mut prompt = Prompt::new(Cursor::new(&b"y\nn\n"[..]), Vec::new());
        assert!(prompt.confirm("first?").unwrap());
        assert!(!prompt.confirm("second?").unwrap());
    }
}
