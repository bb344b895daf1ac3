//! Operator prompts

use crate::Result;
use std::io::{self, Write};

/// Asks the operator a yes/no question.
pub trait Confirm {
    fn confirm(&self, message: &str) -> Result<bool>;
}

/// Interactive terminal prompt, defaulting to "no".
pub struct InquireConfirm;

impl Confirm for InquireConfirm {
    fn confirm(&self, message: &str) -> Result<bool> {
        let answer = inquire::Confirm::new(message).with_default(false).prompt()?;
        Ok(answer)
    }
}

/// Reads a value without echoing it to the terminal.
pub fn read_hidden_value(name: &str) -> Result<String> {
    print!("Enter value for {}: ", name);
    io::stdout().flush()?;
    Ok(rpassword::read_password()?)
}
