//! Pure sliding-window arithmetic.

use std::time::Duration;

use crate::config::Limits;

/// Outcome of evaluating a history against the limits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Evaluation {
    /// Under the threshold; `next` is the pruned history with `now` appended.
    Admit { next: Vec<i64> },
    /// At or over the threshold.
    Reject { in_window: usize, retry_after: Duration },
}

/// Start of the window ending at `now`. Entries at or before it no longer count.
pub fn window_start(now: i64, window_ms: i64) -> i64 {
    now.saturating_sub(window_ms)
}

/// Keep timestamps strictly after the window start, in stored order.
pub fn prune(history: &[i64], now: i64, window_ms: i64) -> Vec<i64> {
    let start = window_start(now, window_ms);
    history.iter().copied().filter(|&ts| ts > start).collect()
}

/// Decide whether one more action fits.
pub fn evaluate(history: &[i64], now: i64, limits: &Limits) -> Evaluation {
    let mut pruned = prune(history, now, limits.window_ms());
    let max = limits.max_actions() as usize;

    if pruned.len() >= max {
        let retry_after = retry_after(&pruned, now, limits.window_ms(), max);
        return Evaluation::Reject { in_window: pruned.len(), retry_after };
    }

    pruned.push(now);
    Evaluation::Admit { next: pruned }
}

// Entries need not be sorted when concurrent writers interleaved, so order a copy.
// `len - max + 1` entries must expire; the last of those is at sorted index `len - max`.
fn retry_after(in_window: &[i64], now: i64, window_ms: i64, max: usize) -> Duration {
    let mut sorted = in_window.to_vec();
    sorted.sort_unstable();
    let idx = sorted.len().saturating_sub(max);
    let expires_at = sorted[idx].saturating_add(window_ms);
    let wait = expires_at.saturating_sub(now).max(0);
    Duration::from_millis(wait as u64)
}
