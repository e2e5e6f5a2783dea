//! Shared helpers for command handlers.

use xkeen_core::CommandResult;

use crate::error::CliError;

/// Prompt for confirmation, auto-approving if `--yes` was passed.
pub fn confirm(message: &str, yes_flag: bool) -> Result<bool, CliError> {
    if yes_flag {
        return Ok(true);
    }
    let confirmed = dialoguer::Confirm::new()
        .with_prompt(message)
        .default(false)
        .interact()?;
    Ok(confirmed)
}

/// A command answered with a result of the wrong kind.
pub fn unexpected(result: &CommandResult) -> CliError {
    CliError::Internal {
        message: format!("unexpected command result: {result:?}"),
    }
}

/// Print a status message to stderr unless `--quiet`.
pub fn notice(message: &str, quiet: bool) {
    if !quiet {
        eprintln!("{message}");
    }
}
