// ── Domain model ──
//
// The cached entities are the panel's wire types; this module re-exports
// them and holds the pure transformations applied to cached snapshots.
// Every helper that feeds `QueryCache::patch` returns `None` when nothing
// changes, so unchanged snapshots keep their `Arc` and nobody is notified.

use std::cmp::Ordering;
use std::sync::Arc;

pub use xkeen_api::models::{
    DaemonOutput, InvalidLatency, Latency, Protocol, Server, Status, SubscriptionInfo,
    TotpEnrollment,
};

/// The bounded tail of the daemon log, oldest line first.
///
/// `appended` counts the lines pushed onto the buffer since it was last
/// loaded whole. Two snapshots with identical lines still differ in it,
/// which is how a consumer tells a repeated line from no change.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogBuffer {
    lines: Vec<String>,
    appended: u64,
}

impl LogBuffer {
    /// A freshly loaded buffer keeping only the most recent `capacity` lines.
    pub fn new(mut lines: Vec<String>, capacity: usize) -> Self {
        if lines.len() > capacity {
            lines.drain(..lines.len() - capacity);
        }
        Self { lines, appended: 0 }
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn appended(&self) -> u64 {
        self.appended
    }

    /// Append one line, dropping the oldest lines beyond `capacity`.
    pub fn with_line(current: Option<&Arc<Self>>, line: String, capacity: usize) -> Arc<Self> {
        let previous = current.map_or(&[][..], |c| c.lines.as_slice());
        let mut lines = Vec::with_capacity(capacity.min(previous.len() + 1));
        let keep = capacity.saturating_sub(1);
        lines.extend(previous.iter().skip(previous.len().saturating_sub(keep)).cloned());
        if capacity > 0 {
            lines.push(line);
        }
        Arc::new(Self {
            lines,
            appended: current.map_or(0, |c| c.appended) + 1,
        })
    }

    /// Lines of `self` that `previous` did not hold yet.
    ///
    /// Exact when `self` is the next snapshot after `previous`. A buffer
    /// loaded whole is matched by content: the longest tail of `previous`
    /// that opens `self` counts as already seen.
    pub fn newer_than(&self, previous: &Self) -> &[String] {
        if self.appended > previous.appended {
            let fresh = usize::try_from(self.appended - previous.appended)
                .unwrap_or(usize::MAX)
                .min(self.lines.len());
            return &self.lines[self.lines.len() - fresh..];
        }
        (0..previous.lines.len())
            .map(|start| &previous.lines[start..])
            .find(|tail| self.lines.starts_with(tail))
            .map_or(self.lines.as_slice(), |tail| &self.lines[tail.len()..])
    }
}

impl std::ops::Deref for LogBuffer {
    type Target = [String];

    fn deref(&self) -> &[String] {
        &self.lines
    }
}

/// Make `id` the only active server.
pub fn mark_active(servers: &Arc<Vec<Server>>, id: u32) -> Option<Arc<Vec<Server>>> {
    if servers.iter().all(|s| s.active == (s.id == id)) {
        return None;
    }
    Some(Arc::new(
        servers
            .iter()
            .map(|s| Server {
                active: s.id == id,
                ..s.clone()
            })
            .collect(),
    ))
}

/// Record a measured latency for server `id`. `None` when no server has
/// that id.
pub fn apply_latency(servers: &Arc<Vec<Server>>, id: u32, latency: Latency) -> Option<Arc<Vec<Server>>> {
    if !servers.iter().any(|s| s.id == id) {
        return None;
    }
    Some(Arc::new(
        servers
            .iter()
            .map(|s| {
                if s.id == id {
                    Server {
                        latency_ms: latency,
                        ..s.clone()
                    }
                } else {
                    s.clone()
                }
            })
            .collect(),
    ))
}

/// Set `status.restarting`.
pub fn with_restarting(status: &Arc<Status>, restarting: bool) -> Option<Arc<Status>> {
    (status.restarting != restarting).then(|| {
        Arc::new(Status {
            restarting,
            ..Status::clone(status)
        })
    })
}

/// Set `status.watchdog_active`.
pub fn with_watchdog(status: &Arc<Status>, active: bool) -> Option<Arc<Status>> {
    (status.watchdog_active != active).then(|| {
        Arc::new(Status {
            watchdog_active: active,
            ..Status::clone(status)
        })
    })
}

/// Display order: active first, then ascending measured latency,
/// unmeasured last, ties by id.
pub fn display_order(a: &Server, b: &Server) -> Ordering {
    b.active
        .cmp(&a.active)
        .then_with(|| match (a.latency_ms.millis(), b.latency_ms.millis()) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
        .then_with(|| a.id.cmp(&b.id))
}


#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::fixtures::{server, status};
    use super::*;

    fn lines(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| (*s).to_owned()).collect()
    }

    #[test]
    fn log_buffer_is_bounded_and_ordered() {
        let mut logs: Option<Arc<LogBuffer>> = None;
        for i in 0..205 {
            logs = Some(LogBuffer::with_line(logs.as_ref(), format!("line {i}"), 200));
        }
        let logs = logs.unwrap();
        assert_eq!(logs.len(), 200);
        assert_eq!(logs.appended(), 205);
        assert_eq!(logs.first().unwrap(), "line 5");
        assert_eq!(logs.last().unwrap(), "line 204");
    }

    #[test]
    fn short_log_buffer_keeps_everything() {
        let logs = LogBuffer::with_line(None, "a".into(), 200);
        let logs = LogBuffer::with_line(Some(&logs), "b".into(), 200);
        assert_eq!(logs.lines(), ["a", "b"]);
    }

    #[test]
    fn loading_keeps_most_recent() {
        let loaded = LogBuffer::new((0..250).map(|i| i.to_string()).collect(), 200);
        assert_eq!(loaded.len(), 200);
        assert_eq!(loaded[0], "50");
        assert_eq!(loaded.appended(), 0);
    }

    #[test]
    fn repeated_line_on_a_full_buffer_is_new() {
        let full = Arc::new(LogBuffer::new(vec!["watchdog: ok".to_owned(); 200], 200));
        let next = LogBuffer::with_line(Some(&full), "watchdog: ok".into(), 200);

        assert_eq!(next.lines(), full.lines());
        assert_eq!(next.newer_than(&full), ["watchdog: ok"]);
        assert!(full.newer_than(&full).is_empty());
    }

    #[test]
    fn appends_after_trimming_are_new() {
        let seen = Arc::new(LogBuffer::new(lines(&["a", "b", "c"]), 3));
        let one = LogBuffer::with_line(Some(&seen), "d".into(), 3);
        let two = LogBuffer::with_line(Some(&one), "e".into(), 3);
        assert_eq!(two.newer_than(&seen), lines(&["d", "e"]));
    }

    #[test]
    fn reload_skips_lines_already_seen() {
        let seen = LogBuffer::new(lines(&["a", "b", "c"]), 200);
        let reloaded = LogBuffer::new(lines(&["b", "c", "d", "e"]), 200);
        assert_eq!(reloaded.newer_than(&seen), lines(&["d", "e"]));

        let unrelated = LogBuffer::new(lines(&["x", "y"]), 200);
        assert_eq!(unrelated.newer_than(&seen), lines(&["x", "y"]));
        assert_eq!(unrelated.newer_than(&LogBuffer::default()), lines(&["x", "y"]));
    }

    #[test]
    fn mark_active_leaves_exactly_one() {
        let servers = Arc::new(vec![
            server(1, true, Latency::UNMEASURED),
            server(2, false, Latency::UNMEASURED),
            server(3, false, Latency::UNMEASURED),
        ]);
        let next = mark_active(&servers, 3).unwrap();
        let active: Vec<u32> = next.iter().filter(|s| s.active).map(|s| s.id).collect();
        assert_eq!(active, vec![3]);
        assert!(mark_active(&next, 3).is_none());
    }

    #[test]
    fn latency_for_unknown_id_is_no_change() {
        let servers = Arc::new(vec![server(1, true, Latency::UNMEASURED)]);
        assert!(apply_latency(&servers, 9, Latency::from_millis(10)).is_none());
        let next = apply_latency(&servers, 1, Latency::from_millis(10)).unwrap();
        assert_eq!(next[0].latency_ms.millis(), Some(10));
    }

    #[test]
    fn restarting_patch_touches_only_that_field() {
        let before = Arc::new(status());
        let after = with_restarting(&before, true).unwrap();
        assert_eq!(
            *after,
            Status {
                restarting: true,
                ..status()
            }
        );
        assert!(with_restarting(&after, true).is_none());
    }

    #[test]
    fn display_order_active_then_latency() {
        let mut servers = vec![
            server(1, false, Latency::UNMEASURED),
            server(2, false, Latency::from_millis(300)),
            server(3, true, Latency::UNMEASURED),
            server(4, false, Latency::from_millis(40)),
        ];
        servers.sort_by(display_order);
        let ids: Vec<u32> = servers.iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![3, 4, 2, 1]);
    }
}
