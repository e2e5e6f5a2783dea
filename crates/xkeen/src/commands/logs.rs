//! `xkeen logs`.

use crate::cli::{GlobalOpts, LogsArgs};
use crate::config::Context;
use crate::error::CliError;
use crate::output::Output;

pub async fn handle(ctx: &Context, args: LogsArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let lines = super::oneshot(ctx, |session| async move { session.client().logs(args.lines).await }).await?;

    Output::new(global).single(&lines, |l| l.join("\n"), |l| l.join("\n"));
    Ok(())
}
