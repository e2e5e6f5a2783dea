//! Command dispatch: bridges CLI args -> core session calls -> output formatting.

pub mod auth;
pub mod daemon;
pub mod logs;
pub mod servers;
pub mod status;
pub mod subscription;
pub mod util;
pub mod watch;

use std::future::Future;
use std::sync::Arc;

use xkeen_core::{CoreError, CredentialStore, Session};

use crate::cli::{Command, GlobalOpts};
use crate::config::Context;
use crate::error::CliError;

/// Dispatch a panel-bound command to the appropriate handler.
pub async fn dispatch(cmd: Command, ctx: Context, global: &GlobalOpts) -> Result<(), CliError> {
    match cmd {
        Command::Setup(args) => auth::setup(ctx, args, global).await,
        Command::Login(args) => auth::login(ctx, args, global).await,
        Command::Logout => {
            auth::logout(&ctx, global);
            Ok(())
        }
        Command::Status => status::handle(&ctx, global).await,
        Command::Servers => servers::list(&ctx, global).await,
        Command::Select(args) => servers::select(&ctx, args, global).await,
        Command::Ping(args) => servers::ping(&ctx, args, global).await,
        Command::Restart => daemon::restart(&ctx, global).await,
        Command::Update => daemon::update(&ctx, global).await,
        Command::Watchdog(args) => daemon::watchdog(&ctx, args, global).await,
        Command::Subscription(args) => subscription::handle(&ctx, args, global).await,
        Command::Logs(args) => logs::handle(&ctx, args, global).await,
        Command::Watch => watch::handle(&ctx, global).await,
        // Completions are handled before dispatch
        Command::Completions(_) => unreachable!(),
    }
}

/// Run `f` against a short-lived session for the active profile.
///
/// A rejected token is forgotten so the next run asks for a login.
pub(crate) async fn oneshot<F, Fut, T>(ctx: &Context, f: F) -> Result<T, CliError>
where
    F: FnOnce(Session) -> Fut,
    Fut: Future<Output = Result<T, CoreError>>,
{
    require_login(ctx)?;
    let credentials: Arc<dyn CredentialStore> = ctx.credentials.clone();
    match Session::oneshot(ctx.session.clone(), credentials, f).await {
        Ok(value) => Ok(value),
        Err(e) => {
            if matches!(e, CoreError::SessionExpired) {
                ctx.credentials.clear();
            }
            Err(core_error(e, &ctx.profile))
        }
    }
}

pub(crate) fn require_login(ctx: &Context) -> Result<(), CliError> {
    if ctx.credentials.is_present() {
        Ok(())
    } else {
        Err(CliError::NotLoggedIn {
            profile: ctx.profile.clone(),
        })
    }
}

/// `CoreError` -> `CliError`, naming the active profile where it helps.
pub(crate) fn core_error(err: CoreError, profile: &str) -> CliError {
    match err {
        CoreError::NotLoggedIn => CliError::NotLoggedIn {
            profile: profile.to_owned(),
        },
        other => other.into(),
    }
}
