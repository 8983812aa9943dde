//! Helpers for turning child-process results into tool errors

use std::process::ExitStatus;

use pb_core::error::ToolError;

/// Map an exit status to `Ok` or the matching [`ToolError`]
pub(crate) fn check_status(command: &str, status: ExitStatus) -> Result<(), ToolError> {
    if status.success() {
        return Ok(());
    }
    match status.code() {
        Some(code) => Err(ToolError::Exited {
            command: command.to_string(),
            status: code,
        }),
        None => Err(ToolError::Signalled {
            command: command.to_string(),
        }),
    }
}

/// Quote one word for a POSIX shell
pub(crate) fn shell_quote(word: &str) -> String {
    let safe = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:@,+%".contains(c));
    if safe {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', r"'\''"))
    }
}

/// Join words into a single shell command line
pub(crate) fn shell_join<S: AsRef<str>>(words: &[S]) -> String {
    words
        .iter()
        .map(|w| shell_quote(w.as_ref()))
        .collect::<Vec<_>>()
        .join(" ")
}
