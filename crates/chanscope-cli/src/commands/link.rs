//! `chanscope link` command - register a channel for an admin.

use anyhow::Result;
use chrono::Utc;

use crate::context::AppContext;
use crate::ui;

pub async fn run(ctx: &AppContext, chat_id: i64, admin: i64, username: Option<&str>) -> Result<()> {
    let channel = ctx
        .store
        .link_admin_channel(admin, chat_id, username, Utc::now())
        .await?;

    match &channel.username {
        Some(name) => ui::success(&format!("Linked @{} ({}) to admin {}", name, channel.chat_id, admin)),
        None => {
            ui::success(&format!("Linked {} to admin {}", channel.chat_id, admin));
            ui::hint("Without a username the channel cannot be synced.");
        }
    }
    Ok(())
}
