//! Host utilization sampling. Linux reads `/proc/stat` deltas; every other platform (and
//! any read failure) falls back to a fixed midpoint so the monitor still has something to
//! hysteresis over rather than needing a cfg-gated code path per target.

use std::sync::atomic::{AtomicU64, Ordering};

static LAST_IDLE: AtomicU64 = AtomicU64::new(0);
static LAST_TOTAL: AtomicU64 = AtomicU64::new(0);

/// Returns a scheduler utilization proxy in `0.0..=1.0`.
pub fn sample_scheduler_utilization() -> f64 {
    #[cfg(target_os = "linux")]
    {
        if let Some(u) = read_proc_stat() {
            return u;
        }
    }
    0.3
}

#[cfg(target_os = "linux")]
fn read_proc_stat() -> Option<f64> {
    let contents = std::fs::read_to_string("/proc/stat").ok()?;
    let line = contents.lines().next()?;
    let mut fields = line.split_whitespace();
    if fields.next()? != "cpu" {
        return None;
    }
    let values: Vec<u64> = fields.filter_map(|f| f.parse().ok()).collect();
    if values.len() < 4 {
        return None;
    }
    let idle = values[3] + values.get(4).copied().unwrap_or(0);
    let total: u64 = values.iter().sum();

    let last_idle = LAST_IDLE.swap(idle, Ordering::Relaxed);
    let last_total = LAST_TOTAL.swap(total, Ordering::Relaxed);

    let d_total = total.saturating_sub(last_total);
    let d_idle = idle.saturating_sub(last_idle);
    if d_total == 0 {
        return None;
    }
    Some(1.0 - (d_idle as f64 / d_total as f64))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_is_in_range() {
        let u = sample_scheduler_utilization();
        assert!((0.0..=1.0).contains(&u));
    }
}
