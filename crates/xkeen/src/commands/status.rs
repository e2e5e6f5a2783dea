//! `xkeen status`.

use xkeen_core::{Status, StatusKey};

use crate::cli::GlobalOpts;
use crate::config::Context;
use crate::error::CliError;
use crate::output::{Output, detail_lines};

pub async fn handle(ctx: &Context, global: &GlobalOpts) -> Result<(), CliError> {
    let status = super::oneshot(ctx, |session| async move { session.load::<StatusKey>().await }).await?;

    let out = Output::new(global);
    out.single(status.as_ref(), |s| status_detail(s, &out), |s| s.current_server.clone());
    Ok(())
}

pub(crate) fn status_detail(status: &Status, out: &Output) -> String {
    let daemon = if status.restarting {
        out.dim("restarting")
    } else {
        out.flag(status.daemon_running, "running", "stopped")
    };
    let last_check = status.last_check.map_or_else(
        || "-".to_owned(),
        |at| at.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M:%S").to_string(),
    );

    detail_lines(&[
        ("Connection", out.flag(status.connected, "connected", "disconnected")),
        ("Daemon", daemon),
        ("Server", non_empty(&status.current_server)),
        ("Protocol", non_empty(&status.protocol)),
        ("Latency", status.latency_ms.to_string()),
        ("Uptime", non_empty(&status.uptime)),
        ("Last check", last_check),
        ("Watchdog", out.flag(status.watchdog_active, "on", "off")),
    ])
}

/// One-line summary used by `watch`.
pub(crate) fn status_line(status: &Status, out: &Output) -> String {
    let state = if status.restarting {
        out.dim("restarting")
    } else {
        out.flag(status.connected, "connected", "disconnected")
    };
    format!(
        "{state}  {}  {}",
        non_empty(&status.current_server),
        status.latency_ms
    )
}

fn non_empty(value: &str) -> String {
    if value.is_empty() { "-".to_owned() } else { value.to_owned() }
}

#[cfg(test)]
mod tests {
    use xkeen_core::Latency;

    use super::*;
    use crate::cli::{ColorMode, OutputFormat};

    fn plain() -> Output {
        Output::new(&GlobalOpts {
            profile: None,
            panel: None,
            output: OutputFormat::Table,
            color: ColorMode::Never,
            verbose: 0,
            quiet: false,
            yes: false,
            insecure: false,
            timeout: None,
        })
    }

    fn status() -> Status {
        Status {
            connected: true,
            daemon_running: true,
            restarting: false,
            current_server: "nl-1".into(),
            protocol: "vless".into(),
            latency_ms: Latency::from_millis(42),
            uptime: String::new(),
            last_check: None,
            watchdog_active: false,
        }
    }

    #[test]
    fn detail_shows_placeholders_for_missing_fields() {
        let text = status_detail(&status(), &plain());
        assert!(text.contains("Server  nl-1"));
        assert!(text.contains("Uptime  -"));
        assert!(text.contains("Watchdog  off"));
    }

    #[test]
    fn restarting_wins_over_connection_state() {
        let mut s = status();
        s.restarting = true;
        assert_eq!(status_line(&s, &plain()), "restarting  nl-1  42 ms");
    }
}
