//! Line prompting for the interactive tools.

use std::io::{BufRead, Write};
use std::{fmt, io};

/// Shows a prompt, then reads one line of input.
///
/// Returns `None` when the input is closed.
pub fn prompt<P: fmt::Display>(text: P) -> Option<String> {
    print!("{text}");
    let _ = io::stdout().flush();
    io::stdin()
        .lock()
        .lines()
        .next()
        .map(|line| line.unwrap_or_default())
}
