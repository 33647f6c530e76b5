// Merged historical log view for a network: per-member tails, sorted by parsed timestamp.

use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use tracing::warn;

use crate::models::{ContainerRef, LogLine};
use crate::runtime::{ContainerRuntime, LogQuery};

const FETCH_CONCURRENCY: usize = 8;

/// Parse a runtime timestamp; anything unparsable sorts as the earliest instant.
pub fn parse_timestamp(ts: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(ts)
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Stable sort by parsed timestamp; equal instants keep their collected order.
pub fn sort_by_timestamp(mut lines: Vec<LogLine>) -> Vec<LogLine> {
    lines.sort_by_cached_key(|l| parse_timestamp(&l.timestamp));
    lines
}

async fn fetch_tail(runtime: &dyn ContainerRuntime, member: &ContainerRef, tail: u32) -> Vec<LogLine> {
    let query = LogQuery {
        tail,
        since: None,
        follow: false,
    };
    let mut stream = runtime.logs(&member.id, query);
    let mut lines = Vec::new();
    while let Some(item) = stream.next().await {
        match item {
            Ok(raw) => lines.push(LogLine::parse(&raw).with_source(member.name.clone())),
            Err(e) => {
                warn!(container = %member.name, error = %e, "skipping rest of member log");
                break;
            }
        }
    }
    lines
}

/// Collect up to `tail` lines from each member and merge them into one time-ordered list.
/// A member whose log cannot be read contributes nothing.
pub async fn merged(runtime: &dyn ContainerRuntime, members: &[ContainerRef], tail: u32) -> Vec<LogLine> {
    let fetches: Vec<_> = members.iter().map(|m| fetch_tail(runtime, m, tail)).collect();
    let per_member: Vec<Vec<LogLine>> = futures_util::stream::iter(fetches)
        .buffer_unordered(FETCH_CONCURRENCY)
        .collect()
        .await;
    sort_by_timestamp(per_member.into_iter().flatten().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(ts: &str, msg: &str, source: &str) -> LogLine {
        LogLine {
            timestamp: ts.to_string(),
            line: msg.to_string(),
            container: Some(source.to_string()),
        }
    }

    #[test]
    fn sorts_across_sources_by_time() {
        let t1 = "2024-05-01T10:00:01.000000000Z";
        let t2 = "2024-05-01T10:00:02.000000000Z";
        let t3 = "2024-05-01T10:00:03.000000000Z";
        let merged = sort_by_timestamp(vec![
            line(t3, "three", "api"),
            line(t1, "one", "db"),
            line(t2, "two", "api"),
        ]);
        let order: Vec<&str> = merged.iter().map(|l| l.line.as_str()).collect();
        assert_eq!(order, ["one", "two", "three"]);
    }

    #[test]
    fn unparsable_timestamp_sorts_first() {
        let merged = sort_by_timestamp(vec![
            line("2024-05-01T10:00:01Z", "real", "api"),
            line("garbage", "odd", "db"),
        ]);
        assert_eq!(merged[0].line, "odd");
        assert_eq!(merged[1].line, "real");
    }

    #[test]
    fn nanosecond_offsets_compare_correctly() {
        let a = parse_timestamp("2024-05-01T12:00:00.000000002+02:00");
        let b = parse_timestamp("2024-05-01T10:00:00.000000001Z");
        assert!(b < a);
        assert_eq!(parse_timestamp(""), DateTime::<Utc>::MIN_UTC);
    }
}
