//! Daemon control: restart, update, watchdog.

use xkeen_core::{Command as CoreCommand, CommandResult, DaemonOutput};

use crate::cli::{GlobalOpts, Toggle, WatchdogArgs};
use crate::config::Context;
use crate::error::CliError;
use crate::output::Output;

use super::util;

pub async fn restart(ctx: &Context, global: &GlobalOpts) -> Result<(), CliError> {
    run_daemon_command(ctx, CoreCommand::RestartDaemon, global).await
}

pub async fn update(ctx: &Context, global: &GlobalOpts) -> Result<(), CliError> {
    if !util::confirm("Update xkeen? The proxy restarts and connections drop.", global.yes)? {
        return Ok(());
    }
    run_daemon_command(ctx, CoreCommand::UpdateDaemon, global).await
}

pub async fn watchdog(ctx: &Context, args: WatchdogArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let active = matches!(args.state, Toggle::On);
    let result = super::oneshot(ctx, |session| async move {
        session.execute(CoreCommand::ToggleWatchdog { active }).await
    })
    .await?;

    let CommandResult::Watchdog { active } = result else {
        return Err(util::unexpected(&result));
    };
    Output::new(global).single(
        &serde_json::json!({ "active": active }),
        |_| format!("Watchdog {}", if active { "on" } else { "off" }),
        |_| active.to_string(),
    );
    Ok(())
}

async fn run_daemon_command(ctx: &Context, command: CoreCommand, global: &GlobalOpts) -> Result<(), CliError> {
    let result = super::oneshot(ctx, |session| async move { session.execute(command).await }).await?;

    let CommandResult::Daemon(daemon) = result else {
        return Err(util::unexpected(&result));
    };
    Output::new(global).single(&daemon, daemon_text, |d| d.success.to_string());

    if daemon.success {
        Ok(())
    } else {
        Err(CliError::Internal {
            message: daemon
                .message
                .unwrap_or_else(|| "the daemon command failed".into()),
        })
    }
}

fn daemon_text(daemon: &DaemonOutput) -> String {
    let mut parts = Vec::new();
    if let Some(ref message) = daemon.message {
        parts.push(message.trim().to_owned());
    }
    let output = daemon.output.trim();
    if !output.is_empty() {
        parts.push(output.to_owned());
    }
    parts.join("\n")
}
