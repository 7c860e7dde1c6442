//! `chanscope cleanup` command - run the retention sweep on its own.

use anyhow::Result;

use crate::context::AppContext;
use crate::ui;

pub async fn run(ctx: &AppContext) -> Result<()> {
    let deleted = ctx.report_service()?.cleanup_old_comments().await?;
    if deleted > 0 {
        ui::success(&format!("Deleted {} comments outside the analysis window", deleted));
    } else {
        ui::success("Nothing to clean up");
    }
    Ok(())
}
