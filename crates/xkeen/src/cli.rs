//! Clap derive structures for the `xkeen` CLI.
//!
//! Defines the command tree, global flags, and shared value enums. Depends
//! on clap alone: `build.rs` compiles this file to render man pages.

use std::fmt;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// xkeen -- manage an xkeen proxy router from the command line
#[derive(Debug, Parser)]
#[command(
    name = "xkeen",
    version,
    about = "Control an xkeen-panel router from the command line",
    long_about = "Command-line client for xkeen-panel.\n\n\
        Shows daemon status, lists subscription servers, switches the active\n\
        server and follows the panel's live status and log stream.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Panel profile to use
    #[arg(long, short = 'p', env = "XKEEN_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Panel URL (overrides profile), e.g. http://192.168.1.1:8080
    #[arg(long, short = 'P', env = "XKEEN_PANEL", global = true)]
    pub panel: Option<String>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "XKEEN_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Skip confirmation prompts
    #[arg(long, short = 'y', global = true)]
    pub yes: bool,

    /// Accept self-signed TLS certificates
    #[arg(long, short = 'k', env = "XKEEN_INSECURE", global = true)]
    pub insecure: bool,

    /// Request timeout in seconds (overrides profile)
    #[arg(long, env = "XKEEN_TIMEOUT", global = true)]
    pub timeout: Option<u64>,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Toggle {
    On,
    Off,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create the first account on a fresh panel and log in to it
    Setup(SetupArgs),

    /// Log in to the panel and remember the session token
    Login(LoginArgs),

    /// Forget the stored session token
    Logout,

    /// Show connection and daemon status
    #[command(alias = "st")]
    Status,

    /// List subscription servers
    #[command(alias = "ls")]
    Servers,

    /// Make a server the active one (restarts the daemon)
    Select(SelectArgs),

    /// Measure the latency of every server
    Ping(PingArgs),

    /// Restart the proxy daemon
    Restart,

    /// Update the proxy daemon and its subscription
    Update,

    /// Turn the connection watchdog on or off
    Watchdog(WatchdogArgs),

    /// Show or change the server subscription
    #[command(alias = "sub")]
    Subscription(SubscriptionArgs),

    /// Print recent daemon log lines
    Logs(LogsArgs),

    /// Follow live status and log lines until interrupted
    Watch,

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Command arguments ────────────────────────────────────────────────

#[derive(Args)]
pub struct SetupArgs {
    /// Username of the first account (prompted when omitted)
    #[arg(long, short = 'u')]
    pub username: Option<String>,

    /// Password, at least 8 characters (prompted twice when omitted)
    #[arg(long, env = "XKEEN_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Code from the authenticator after enrolling the secret (prompted when omitted)
    #[arg(long)]
    pub code: Option<String>,
}

#[derive(Args)]
pub struct LoginArgs {
    /// Username (prompted when omitted)
    #[arg(long, short = 'u')]
    pub username: Option<String>,

    /// Password (prompted when omitted)
    #[arg(long, env = "XKEEN_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// One-time TOTP code (prompted when omitted)
    #[arg(long)]
    pub totp: Option<String>,
}

// Passwords stay out of debug logs.

impl fmt::Debug for SetupArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SetupArgs")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("code", &self.code)
            .finish()
    }
}

impl fmt::Debug for LoginArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginArgs")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("totp", &self.totp)
            .finish()
    }
}

#[derive(Debug, Args)]
pub struct SelectArgs {
    /// Server ID, as shown by `xkeen servers`
    pub id: u32,
}

#[derive(Debug, Args)]
pub struct PingArgs {
    /// Give up after this many seconds
    #[arg(long, default_value = "60")]
    pub wait: u64,
}

#[derive(Debug, Args)]
pub struct WatchdogArgs {
    pub state: Toggle,
}

#[derive(Debug, Args)]
pub struct SubscriptionArgs {
    #[command(subcommand)]
    pub command: SubscriptionCommand,
}

#[derive(Debug, Subcommand)]
pub enum SubscriptionCommand {
    /// Show the subscription URL and server count
    Show,

    /// Replace the subscription URL and reload its servers
    Set {
        /// Subscription URL
        url: String,
    },

    /// Reload servers from the current subscription
    Refresh,
}

#[derive(Debug, Args)]
pub struct LogsArgs {
    /// Number of lines
    #[arg(long, short = 'n', default_value = "50")]
    pub lines: usize,
}

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn debug_output_hides_passwords() {
        for args in [
            ["xkeen", "setup", "--password", "s3cret-pass", "--code", "123456"],
            ["xkeen", "login", "--password", "s3cret-pass", "--totp", "123456"],
        ] {
            let cli = Cli::try_parse_from(args).unwrap();
            let text = format!("{:?}", cli.command);
            assert!(!text.contains("s3cret-pass"), "{text}");
            assert!(text.contains("***"), "{text}");
        }
    }
}
