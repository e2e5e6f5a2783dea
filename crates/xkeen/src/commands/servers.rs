//! Server listing, selection and latency checks.

use std::time::Duration;

use tabled::Tabled;
use xkeen_core::model::display_order;
use xkeen_core::{Command as CoreCommand, CommandResult, CoreError, LogoutReason, Server, ServersKey};

use crate::cli::{GlobalOpts, PingArgs, SelectArgs};
use crate::config::Context;
use crate::error::CliError;
use crate::output::Output;

use super::util;

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
struct ServerRow {
    #[tabled(rename = "")]
    active: &'static str,
    #[tabled(rename = "ID")]
    id: u32,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Protocol")]
    protocol: String,
    #[tabled(rename = "Address")]
    address: String,
    #[tabled(rename = "Latency")]
    latency: String,
}

impl From<&Server> for ServerRow {
    fn from(s: &Server) -> Self {
        Self {
            active: if s.active { "*" } else { "" },
            id: s.id,
            name: s.name.clone(),
            protocol: s.protocol.to_string(),
            address: format!("{}:{}", s.address, s.port),
            latency: s.latency_ms.to_string(),
        }
    }
}

fn render_servers(servers: &[Server], global: &GlobalOpts) {
    let mut sorted = servers.to_vec();
    sorted.sort_by(display_order);
    Output::new(global).list(&sorted, |s| ServerRow::from(s), |s| s.id.to_string());
}

// ── Handlers ────────────────────────────────────────────────────────

pub async fn list(ctx: &Context, global: &GlobalOpts) -> Result<(), CliError> {
    let servers = super::oneshot(ctx, |session| async move { session.load::<ServersKey>().await }).await?;
    render_servers(&servers, global);
    Ok(())
}

pub async fn select(ctx: &Context, args: SelectArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let result = super::oneshot(ctx, |session| async move {
        session.execute(CoreCommand::SelectServer { id: args.id }).await
    })
    .await?;

    let CommandResult::ServerSelected { server, restarting } = result else {
        return Err(util::unexpected(&result));
    };

    Output::new(global).single(
        &server,
        |s| {
            if restarting {
                format!("Selected {} ({}), daemon restarting", s.name, s.id)
            } else {
                format!("Selected {} ({})", s.name, s.id)
            }
        },
        |s| s.id.to_string(),
    );
    Ok(())
}

pub async fn ping(ctx: &Context, args: PingArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let wait = Duration::from_secs(args.wait);
    let quiet = global.quiet;

    let servers = super::oneshot(ctx, |session| async move {
        session.load::<ServersKey>().await?;

        let mut checking = session.latency_checking();
        if !session.check_latency() {
            return Err(CoreError::NotLoggedIn);
        }
        util::notice("Checking latency...", quiet);

        if tokio::time::timeout(wait, checking.wait_for(|running| !*running))
            .await
            .is_err()
        {
            return Err(CoreError::Timeout);
        }

        match session.logout_reason() {
            Some(LogoutReason::Unauthorized) => return Err(CoreError::SessionExpired),
            Some(_) => return Err(CoreError::NotLoggedIn),
            None => {}
        }
        session
            .get::<ServersKey>()
            .ok_or_else(|| CoreError::Internal("server list dropped during the check".into()))
    })
    .await?;

    render_servers(&servers, global);
    Ok(())
}
