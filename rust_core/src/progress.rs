//! Live sampling progress on stderr.
//!
//! Chains report each finished transition into a shared [`ProgressState`];
//! a reporter thread polls the counters and redraws one status line.

use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

const REDRAW_EVERY: Duration = Duration::from_millis(100);
const BAR_WIDTH: usize = 24;

/// Counters shared by every chain of one sampling run.
pub struct ProgressState {
    num_chains: usize,
    warmup_total: usize,
    draws_total: usize,
    warmup_done: AtomicUsize,
    draws_done: AtomicUsize,
    grad_evals: AtomicUsize,
    divergences: AtomicUsize,
    finished: AtomicBool,
    started: Instant,
}

impl ProgressState {
    pub fn new(num_chains: usize, num_draws: usize, num_warmup: usize) -> Self {
        Self {
            num_chains,
            warmup_total: num_chains * num_warmup,
            draws_total: num_chains * num_draws,
            warmup_done: AtomicUsize::new(0),
            draws_done: AtomicUsize::new(0),
            grad_evals: AtomicUsize::new(0),
            divergences: AtomicUsize::new(0),
            finished: AtomicBool::new(false),
            started: Instant::now(),
        }
    }

    /// Record one transition. Divergences are only counted after warmup.
    pub fn record(&self, warmup: bool, n_leapfrog: usize, diverging: bool) {
        self.grad_evals.fetch_add(n_leapfrog, Ordering::Relaxed);
        if warmup {
            self.warmup_done.fetch_add(1, Ordering::Relaxed);
        } else {
            self.draws_done.fetch_add(1, Ordering::Relaxed);
            if diverging {
                self.divergences.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn warmup_done(&self) -> usize {
        self.warmup_done.load(Ordering::Relaxed)
    }

    pub fn draws_done(&self) -> usize {
        self.draws_done.load(Ordering::Relaxed)
    }

    pub fn grad_evals(&self) -> usize {
        self.grad_evals.load(Ordering::Relaxed)
    }

    pub fn divergences(&self) -> usize {
        self.divergences.load(Ordering::Relaxed)
    }

    /// Fraction of all transitions, warmup included, completed so far.
    pub fn fraction(&self) -> f64 {
        let total = self.warmup_total + self.draws_total;
        if total == 0 {
            return 1.0;
        }
        ((self.warmup_done() + self.draws_done()) as f64 / total as f64).min(1.0)
    }

    pub fn finish(&self) {
        self.finished.store(true, Ordering::Relaxed);
    }

    fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Relaxed)
    }

    fn status_line(&self) -> String {
        let elapsed = self.started.elapsed().as_secs_f64();
        let filled = (self.fraction() * BAR_WIDTH as f64).round() as usize;
        let bar = format!(
            "{}{}",
            "█".repeat(filled),
            "░".repeat(BAR_WIDTH - filled.min(BAR_WIDTH))
        );
        let phase = if self.warmup_done() < self.warmup_total {
            format!("warmup {}/{}", compact(self.warmup_done()), compact(self.warmup_total))
        } else {
            format!("draws {}/{}", compact(self.draws_done()), compact(self.draws_total))
        };
        format!(
            "{} chains [{}] {} | {} divergent | {} gradients | {}",
            self.num_chains,
            bar,
            phase,
            self.divergences(),
            compact(self.grad_evals()),
            clock(elapsed),
        )
    }
}

/// `950`, `25.0k`, `1.2M`.
fn compact(n: usize) -> String {
    match n {
        0..=9_999 => n.to_string(),
        10_000..=999_999 => format!("{:.1}k", n as f64 / 1e3),
        _ => format!("{:.1}M", n as f64 / 1e6),
    }
}

/// Seconds below a minute, `m:ss` above.
fn clock(secs: f64) -> String {
    if secs < 60.0 {
        return format!("{:.1}s", secs);
    }
    let whole = secs as u64;
    format!("{}:{:02}", whole / 60, whole % 60)
}

fn redraw(state: &ProgressState, last: bool) {
    let mut err = std::io::stderr().lock();
    let end = if last { "\n" } else { "" };
    let _ = write!(err, "\r{}\x1b[K{}", state.status_line(), end);
    let _ = err.flush();
}

/// Start the reporter thread. Call [`ProgressState::finish`] and join the
/// handle once sampling returns; the final line is drawn before exit.
pub fn spawn_progress_thread(state: Arc<ProgressState>) -> JoinHandle<()> {
    std::thread::spawn(move || {
        while !state.is_finished() {
            redraw(&state, false);
            std::thread::sleep(REDRAW_EVERY);
        }
        redraw(&state, true);
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_warmup_then_draws() {
        let state = ProgressState::new(2, 10, 5);
        state.record(true, 7, true);
        state.record(false, 3, true);
        state.record(false, 1, false);
        assert_eq!(state.warmup_done(), 1);
        assert_eq!(state.draws_done(), 2);
        assert_eq!(state.grad_evals(), 11);
        // The warmup divergence is not counted.
        assert_eq!(state.divergences(), 1);
        assert!((state.fraction() - 0.1).abs() < 1e-12);
        assert!(state.status_line().contains("warmup 1/10"));
    }

    #[test]
    fn test_status_switches_to_draws() {
        let state = ProgressState::new(1, 2, 1);
        state.record(true, 1, false);
        state.record(false, 1, false);
        assert!(state.status_line().contains("draws 1/2"));
        assert!(ProgressState::new(1, 0, 0).fraction() >= 1.0);
    }

    #[test]
    fn test_compact_formatting() {
        assert_eq!(compact(950), "950");
        assert_eq!(compact(25_000), "25.0k");
        assert_eq!(compact(1_200_000), "1.2M");
        assert_eq!(clock(75.0), "1:15");
        assert_eq!(clock(3.5), "3.5s");
    }
}
