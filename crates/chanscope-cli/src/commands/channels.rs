//! `chanscope channels` command - list channels linked to an admin.

use anyhow::Result;

use crate::context::AppContext;
use crate::ui;

pub async fn run(ctx: &AppContext, admin: i64, json: bool) -> Result<()> {
    let channels = ctx.store.channels_for_admin(admin).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&channels)?);
        return Ok(());
    }

    if channels.is_empty() {
        ui::info(&format!("No channels linked to admin {}.", admin));
        ui::hint("Add one with: chanscope link <CHAT_ID> --admin <ID> --username <NAME>");
        return Ok(());
    }

    for channel in &channels {
        match &channel.username {
            Some(name) => ui::info(&format!("{}  @{}", channel.chat_id, name)),
            None => ui::info(&format!("{}  (no username)", channel.chat_id)),
        }
    }
    Ok(())
}
