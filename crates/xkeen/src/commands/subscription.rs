//! Subscription commands.

use xkeen_core::{Command as CoreCommand, CommandResult, SubscriptionInfo, SubscriptionKey};

use crate::cli::{GlobalOpts, SubscriptionArgs, SubscriptionCommand};
use crate::config::Context;
use crate::error::CliError;
use crate::output::{Output, detail_lines};

use super::util;

pub async fn handle(ctx: &Context, args: SubscriptionArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        SubscriptionCommand::Show => {
            let info =
                super::oneshot(ctx, |session| async move { session.load::<SubscriptionKey>().await })
                    .await?;
            Output::new(global).single(info.as_ref(), subscription_detail, |s| s.url.clone());
            Ok(())
        }

        SubscriptionCommand::Set { url } => {
            update(ctx, CoreCommand::UpdateSubscription { url }, global).await
        }

        SubscriptionCommand::Refresh => update(ctx, CoreCommand::RefreshSubscription, global).await,
    }
}

async fn update(ctx: &Context, command: CoreCommand, global: &GlobalOpts) -> Result<(), CliError> {
    let result = super::oneshot(ctx, |session| async move { session.execute(command).await }).await?;

    let CommandResult::Subscription { server_count } = result else {
        return Err(util::unexpected(&result));
    };
    Output::new(global).single(
        &serde_json::json!({ "server_count": server_count }),
        |_| format!("Subscription loaded: {server_count} servers"),
        |_| server_count.to_string(),
    );
    Ok(())
}

fn subscription_detail(info: &SubscriptionInfo) -> String {
    detail_lines(&[
        (
            "URL",
            if info.url.is_empty() { "(not set)".to_owned() } else { info.url.clone() },
        ),
        ("Servers", info.server_count.to_string()),
        (
            "Updated",
            info.last_updated.map_or_else(
                || "never".to_owned(),
                |at| at.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M").to_string(),
            ),
        ),
    ])
}
