//! Plain-text rendering of core-user reports.

use chanscope_core::{CoreUsersReport, ReportKind};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Render a report the way it is sent back to a channel admin.
pub fn render_report(report: &CoreUsersReport) -> String {
    let from = report.window_from.format(DATE_FORMAT);
    let to = report.window_to.format(DATE_FORMAT);

    if report.kind == ReportKind::NoData {
        return format!(
            "Not enough comment data for this period yet.\n\nAnalysis window: {} to {}.",
            from, to
        );
    }

    let mut lines = Vec::with_capacity(report.items.len() + 5);
    lines.push(format!("Core commenters from {} to {}.", from, to));
    if report.synced_with_telegram {
        lines.push("Data was just refreshed from the latest posts.".to_string());
    } else {
        lines.push("Showing data from the last sync (sync frequency is limited).".to_string());
    }
    lines.push(String::new());
    lines.push("Top commenters (by number of comments):".to_string());
    lines.push(String::new());

    for (idx, item) in report.items.iter().enumerate() {
        lines.push(format!(
            "{}. user_id={} - {} {} ({} {}, {:.2} per post where active)",
            idx + 1,
            item.author_external_id,
            item.comments_count,
            plural(item.comments_count, "comment", "comments"),
            item.posts_count,
            plural(item.posts_count, "post", "posts"),
            item.avg_comments_per_active_post,
        ));
    }

    lines.join("\n")
}

fn plural<'a>(n: i64, one: &'a str, many: &'a str) -> &'a str {
    if n == 1 {
        one
    } else {
        many
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Utc};

    use super::*;
    use chanscope_core::CoreUserReportItem;

    fn report(kind: ReportKind, synced: bool, items: Vec<CoreUserReportItem>) -> CoreUsersReport {
        let to: DateTime<Utc> = "2026-03-01T12:00:00Z".parse().unwrap();
        CoreUsersReport {
            kind,
            synced_with_telegram: synced,
            items,
            window_from: to - chrono::Duration::days(90),
            window_to: to,
            sync: None,
        }
    }

    #[test]
    fn test_render_no_data() {
        let text = render_report(&report(ReportKind::NoData, true, Vec::new()));
        assert_eq!(
            text,
            "Not enough comment data for this period yet.\n\nAnalysis window: 2025-12-01 to 2026-03-01."
        );
    }

    #[test]
    fn test_render_items() {
        let items = vec![
            CoreUserReportItem {
                author_external_id: 1001,
                comments_count: 7,
                posts_count: 3,
                avg_comments_per_active_post: 7.0 / 3.0,
            },
            CoreUserReportItem {
                author_external_id: 1002,
                comments_count: 1,
                posts_count: 1,
                avg_comments_per_active_post: 1.0,
            },
        ];
        let text = render_report(&report(ReportKind::Ok, false, items));
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[0], "Core commenters from 2025-12-01 to 2026-03-01.");
        assert_eq!(
            lines[1],
            "Showing data from the last sync (sync frequency is limited)."
        );
        assert_eq!(
            lines[5],
            "1. user_id=1001 - 7 comments (3 posts, 2.33 per post where active)"
        );
        assert_eq!(
            lines[6],
            "2. user_id=1002 - 1 comment (1 post, 1.00 per post where active)"
        );
    }

    #[test]
    fn test_render_fresh_sync_line() {
        let items = vec![CoreUserReportItem {
            author_external_id: 5,
            comments_count: 2,
            posts_count: 1,
            avg_comments_per_active_post: 2.0,
        }];
        let text = render_report(&report(ReportKind::Ok, true, items));
        assert!(text.contains("Data was just refreshed from the latest posts."));
    }
}
