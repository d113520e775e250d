//! Terminal prompts for the HR commands.

use std::io::{self, Write};
use anyhow::{bail, Context, Result};
use termion::input::TermRead;

/// Read a password without echoing it.
pub fn read_password(prompt: &str) -> Result<String> {
    let stdout = io::stdout();
    let mut stdout = stdout.lock();
    let stdin = io::stdin();
    let mut stdin = stdin.lock();

    write!(stdout, "{}", prompt)?;
    stdout.flush()?;

    let password = stdin
        .read_passwd(&mut stdout)
        .context("Failed to read password")?;
    writeln!(stdout)?;

    match password {
        Some(p) => Ok(p),
        None => bail!("No password entered"),
    }
}

/// Ask for explicit confirmation. Only a typed "yes" counts.
pub fn confirm(question: &str) -> Result<bool> {
    let stdout = io::stdout();
    let mut stdout = stdout.lock();
    let stdin = io::stdin();
    let mut stdin = stdin.lock();

    write!(stdout, "{} [yes/no] ", question)?;
    stdout.flush()?;

    let answer = stdin.read_line().context("Failed to read answer")?;
    Ok(answer.as_deref().is_some_and(is_affirmative))
}

fn is_affirmative(answer: &str) -> bool {
    answer.trim().eq_ignore_ascii_case("yes")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_affirmative() {
        assert!(is_affirmative("yes"));
        assert!(is_affirmative(" YES\n"));
        assert!(!is_affirmative("y"));
        assert!(!is_affirmative(""));
        assert!(!is_affirmative("no"));
    }
}
