//! `xkeen watch`: follow live status and logs over the push channel.

use std::sync::Arc;

use tokio::sync::mpsc;
use xkeen_core::{ChannelState, CredentialStore, LogBuffer, LogoutReason, LogsKey, Session, Status, StatusKey};

use crate::cli::GlobalOpts;
use crate::config::Context;
use crate::error::CliError;
use crate::output::Output;

use super::{core_error, require_login, status::status_line, util};

pub async fn handle(ctx: &Context, global: &GlobalOpts) -> Result<(), CliError> {
    require_login(ctx)?;
    let credentials: Arc<dyn CredentialStore> = ctx.credentials.clone();
    let session = Session::new(ctx.session.clone(), credentials).map_err(|e| core_error(e, &ctx.profile))?;

    let mut status = session.subscribe::<StatusKey>();
    // Every log snapshot, in order: a `watch` receiver could skip one.
    let (log_tx, mut logs) = mpsc::unbounded_channel();
    let _log_listener = session.listen::<LogsKey, _>(move |buffer| {
        let _ = log_tx.send(Arc::clone(buffer));
    });
    let mut channel = session.channel_state();
    session.start().await;

    let out = Output::new(global);
    let mut seen: Arc<LogBuffer> = Arc::default();

    let outcome = loop {
        tokio::select! {
            Some(next) = status.changed() => print_status(&out, &next),
            Some(next) = logs.recv() => {
                print_lines(&out, next.newer_than(&seen));
                seen = next;
            }
            Ok(()) = channel.changed() => {
                let state = *channel.borrow_and_update();
                if !matches!(state, ChannelState::Connected | ChannelState::Closed) {
                    util::notice(&format!("push channel {state}"), global.quiet);
                }
            }
            reason = session.logged_out() => break Some(reason),
            _ = tokio::signal::ctrl_c() => break None,
        }
    };

    session.teardown().await;
    match outcome {
        None | Some(LogoutReason::UserRequested) => Ok(()),
        Some(LogoutReason::Unauthorized) => Err(CliError::SessionExpired),
        Some(LogoutReason::CredentialMissing) => Err(CliError::NotLoggedIn {
            profile: ctx.profile.clone(),
        }),
    }
}

// Structured formats print one compact JSON object per event.

fn print_status(out: &Output, status: &Status) {
    if out.is_structured() {
        out.emit(&event_json("status", &serde_json::to_value(status).unwrap_or_default()));
    } else {
        out.emit(&status_line(status, out));
    }
}

fn print_lines(out: &Output, lines: &[String]) {
    for line in lines {
        if out.is_structured() {
            out.emit(&event_json("log", &serde_json::Value::from(line.as_str())));
        } else {
            out.emit(line);
        }
    }
}

fn event_json(event: &str, data: &serde_json::Value) -> String {
    serde_json::json!({ "event": event, "data": data }).to_string()
}
