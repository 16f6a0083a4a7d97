//! Line-oriented operator prompts.
//!
//! The prompter works over any `BufRead` / `Write` pair so acquisition can be
//! driven by a terminal or by a scripted transcript in tests.

use anyhow::{bail, Context, Result};
use std::io::{BufRead, Write};

use super::{CredentialRecord, Field};

pub struct Prompter<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> Prompter<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    pub fn into_output(self) -> W {
        self.output
    }

    /// Print a line to the operator.
    pub fn say(&mut self, message: &str) -> Result<()> {
        writeln!(self.output, "{message}").context("writing to operator")?;
        Ok(())
    }

    fn read_line(&mut self) -> Result<String> {
        let mut line = String::new();
        let read = self
            .input
            .read_line(&mut line)
            .context("reading operator input")?;
        if read == 0 {
            bail!("operator input closed before all values were entered");
        }
        Ok(line.replace("\r\n", "\n").trim().to_string())
    }

    /// Prompt for `field` until a valid value is entered.
    ///
    /// A blank entry keeps a non-empty `current` value. An invalid entry is
    /// reported and re-prompted; `current` is returned untouched only through
    /// the blank-entry path.
    pub fn read_value(&mut self, field: Field, current: &str) -> Result<String> {
        loop {
            write!(self.output, "{} [{}]: ", field.label(), current)
                .and_then(|_| self.output.flush())
                .context("writing prompt")?;
            let entered = self.read_line()?;
            if entered.is_empty() && !current.is_empty() {
                return Ok(current.to_string());
            }
            if field.is_valid(&entered) {
                return Ok(entered);
            }
            self.say(&field.violation_message())?;
        }
    }

    /// Prompt for `field` on a record and return the updated record.
    pub fn read_field(&mut self, record: CredentialRecord, field: Field) -> Result<CredentialRecord> {
        let value = self.read_value(field, record.get(field))?;
        Ok(record.with(field, value))
    }

    /// Yes/no question; only `y` and `yes` count as yes.
    pub fn confirm(&mut self, question: &str) -> Result<bool> {
        self.say(question)?;
        let answer = self.read_line()?;
        Ok(matches!(answer.as_str(), "y" | "yes"))
    }
}
