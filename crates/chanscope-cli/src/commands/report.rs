//! `chanscope report` command - sync a channel if due and print its leaderboard.

use anyhow::Result;

use crate::context::AppContext;
use crate::render::render_report;
use crate::ui;

pub async fn run(ctx: &AppContext, chat_id: i64, json: bool) -> Result<()> {
    if !ctx.has_gateway() && !json {
        ui::hint("No gateway configured; showing stored data only.");
    }

    let service = ctx.report_service()?;
    let pb = (!json).then(|| ui::spinner("Building report"));
    let result = service.build_core_users_report_for_channel(chat_id).await;
    if let Some(pb) = &pb {
        pb.finish_and_clear();
    }

    let report = match result {
        Ok(report) => report,
        Err(e) => {
            ui::error(&format!("Failed to build report for {}: {}", chat_id, e));
            return Err(e);
        }
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("{}", render_report(&report));

    if let Some(outcome) = &report.sync {
        println!();
        match outcome.skipped {
            Some(reason) => ui::hint(&format!("Sync skipped: {}", reason.as_str())),
            None => ui::hint(&format!(
                "Synced: {} new posts, {} re-synced, {} new comments, {} gateway calls",
                outcome.stats.new_posts,
                outcome.stats.resynced_posts,
                outcome.stats.comments_inserted,
                outcome.stats.gateway_calls
            )),
        }
    } else {
        println!();
        ui::hint("Channel is not linked yet. Link it with:");
        println!("    chanscope link {} --admin <ID> --username <NAME>", chat_id);
    }

    Ok(())
}
