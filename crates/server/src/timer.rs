//! Elapsed-time accounting for a single (student, checkpoint, mode) progress
//! record.
//!
//! All transitions are pure functions over a [`TimerState`] snapshot so the
//! accounting invariants hold regardless of where the snapshot came from. The
//! persistence layer loads a snapshot, applies [`TimerState::sweep`] first,
//! then the requested transition, and writes the result back.

use chrono::{DateTime, Utc};
use thiserror::Error;

/// A timer left paused this long is force-stopped by the lazy sweep.
pub const AUTO_STOP_AFTER_SECS: i64 = 30 * 60;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TimerError {
    #[error("timer is not running")]
    NotRunning,

    #[error("timer is already paused")]
    AlreadyPaused,

    #[error("timer is not paused")]
    NotPaused,

    #[error("pause window expired; timer was stopped")]
    PauseExpired,

    #[error("checkpoint is already completed")]
    Completed,
}

/// Snapshot of one progress record's timing fields.
///
/// Invariants, maintained by the transitions below:
/// - `accumulated_seconds` only grows, and only while running
/// - `paused_at.is_some()` exactly when `is_paused`
/// - `running_since.is_some()` exactly when running (not paused, not idle)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimerState {
    pub running_since: Option<DateTime<Utc>>,
    pub paused_at: Option<DateTime<Utc>>,
    pub is_paused: bool,
    pub accumulated_seconds: i64,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_seconds: Option<i64>,
}

impl TimerState {
    pub fn is_running(&self) -> bool {
        self.running_since.is_some() && !self.is_paused && self.completed_at.is_none()
    }

    pub fn is_completed(&self) -> bool {
        self.completed_at.is_some()
    }

    /// Whether the student has ever engaged with this checkpoint
    pub fn has_started(&self) -> bool {
        self.running_since.is_some()
            || self.is_paused
            || self.accumulated_seconds > 0
            || self.completed_at.is_some()
    }

    /// Start the timer. Restarts from zero after a completion; a no-op while
    /// already running or paused.
    pub fn start(&mut self, now: DateTime<Utc>) -> Result<(), TimerError> {
        if self.completed_at.is_some() {
            *self = TimerState::default();
            self.running_since = Some(now);
            return Ok(());
        }
        if self.is_running() || self.is_paused {
            return Ok(());
        }
        self.running_since = Some(now);
        Ok(())
    }

    /// Pause a running timer, folding the open interval into the accumulator.
    pub fn pause(&mut self, now: DateTime<Utc>) -> Result<i64, TimerError> {
        if self.completed_at.is_some() {
            return Err(TimerError::Completed);
        }
        if self.is_paused {
            return Err(TimerError::AlreadyPaused);
        }
        let since = self.running_since.ok_or(TimerError::NotRunning)?;
        self.accumulated_seconds += interval_seconds(since, now);
        self.running_since = None;
        self.paused_at = Some(now);
        self.is_paused = true;
        Ok(self.accumulated_seconds)
    }

    /// Resume a paused timer. Rejected once the pause window has expired;
    /// callers are expected to have applied [`sweep`](Self::sweep) first.
    pub fn resume(&mut self, now: DateTime<Utc>) -> Result<(), TimerError> {
        if self.completed_at.is_some() {
            return Err(TimerError::Completed);
        }
        if !self.is_paused {
            return Err(TimerError::NotPaused);
        }
        let paused_at = self.paused_at.ok_or(TimerError::NotPaused)?;
        if interval_seconds(paused_at, now) >= AUTO_STOP_AFTER_SECS {
            self.force_stop();
            return Err(TimerError::PauseExpired);
        }
        self.paused_at = None;
        self.is_paused = false;
        self.running_since = Some(now);
        Ok(())
    }

    /// Stop the timer and persist the accumulated total.
    pub fn stop(&mut self, now: DateTime<Utc>) -> Result<i64, TimerError> {
        if self.completed_at.is_some() {
            return Err(TimerError::Completed);
        }
        if !self.is_paused && self.running_since.is_none() {
            return Err(TimerError::NotRunning);
        }
        if let Some(since) = self.running_since.take() {
            if !self.is_paused {
                self.accumulated_seconds += interval_seconds(since, now);
            }
        }
        self.paused_at = None;
        self.is_paused = false;
        self.duration_seconds = Some(self.accumulated_seconds);
        Ok(self.accumulated_seconds)
    }

    /// Discard all recorded time.
    pub fn reset(&mut self) {
        *self = TimerState::default();
    }

    /// Mark the checkpoint complete, finalizing the total.
    pub fn complete(&mut self, now: DateTime<Utc>) -> i64 {
        if let Some(since) = self.running_since.take() {
            if !self.is_paused {
                self.accumulated_seconds += interval_seconds(since, now);
            }
        }
        self.paused_at = None;
        self.is_paused = false;
        self.completed_at = Some(now);
        self.duration_seconds = Some(self.accumulated_seconds);
        self.accumulated_seconds
    }

    /// Undo a completion, keeping the accumulated time.
    pub fn uncomplete(&mut self) {
        self.completed_at = None;
        self.duration_seconds = None;
    }

    /// Lazy auto-stop: a row paused for [`AUTO_STOP_AFTER_SECS`] or longer is
    /// force-stopped before anything else reads or writes it. Returns whether
    /// the state changed; applying it twice yields the same totals.
    pub fn sweep(&mut self, now: DateTime<Utc>) -> bool {
        if !self.is_paused {
            return false;
        }
        let Some(paused_at) = self.paused_at else {
            return false;
        };
        if interval_seconds(paused_at, now) < AUTO_STOP_AFTER_SECS {
            return false;
        }
        self.force_stop();
        true
    }

    fn force_stop(&mut self) {
        self.running_since = None;
        self.paused_at = None;
        self.is_paused = false;
        self.duration_seconds = Some(self.accumulated_seconds);
    }

    /// Elapsed time as displayed to the student.
    pub fn elapsed_seconds(&self, now: DateTime<Utc>) -> i64 {
        if self.completed_at.is_some() {
            return self.duration_seconds.unwrap_or(self.accumulated_seconds);
        }
        match self.running_since {
            Some(since) if !self.is_paused => {
                self.accumulated_seconds + interval_seconds(since, now)
            }
            _ => self.accumulated_seconds,
        }
    }
}

/// Clock skew between loads must never shrink the accumulator.
fn interval_seconds(from: DateTime<Utc>, to: DateTime<Utc>) -> i64 {
    (to - from).num_seconds().max(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
    }

    fn at(secs: i64) -> DateTime<Utc> {
        t0() + Duration::seconds(secs)
    }

    #[test]
    fn test_pause_resume_stop_scenario() {
        // start at t=0, pause at 600, resume at 900, stop at 1500 -> 1200
        let mut timer = TimerState::default();
        timer.start(at(0)).unwrap();
        assert_eq!(timer.pause(at(600)).unwrap(), 600);
        timer.resume(at(900)).unwrap();
        assert_eq!(timer.stop(at(1500)).unwrap(), 1200);
        assert_eq!(timer.duration_seconds, Some(1200));
        assert!(!timer.is_paused);
        assert!(timer.paused_at.is_none());
    }

    #[test]
    fn test_additivity_over_many_cycles() {
        // accumulated equals the sum of the running intervals no matter how
        // many pauses split them
        let mut timer = TimerState::default();
        let intervals = [(0, 120), (300, 450), (500, 910), (1000, 1003)];
        let mut expected = 0;
        for (start, pause) in intervals {
            if timer.has_started() {
                timer.resume(at(start)).unwrap();
            } else {
                timer.start(at(start)).unwrap();
            }
            timer.pause(at(pause)).unwrap();
            expected += pause - start;
            assert_eq!(timer.accumulated_seconds, expected);
        }
        timer.resume(at(1100)).unwrap();
        assert_eq!(timer.stop(at(1200)).unwrap(), expected + 100);
    }

    #[test]
    fn test_auto_stop_sweep_is_idempotent() {
        // paused at t=0, never resumed; a read at 1800+1 triggers the
        // auto-stop, and later sweeps leave the total untouched
        let mut timer = TimerState::default();
        timer.start(at(-400)).unwrap();
        timer.pause(at(0)).unwrap();
        assert_eq!(timer.accumulated_seconds, 400);

        assert!(!timer.sweep(at(1799)));
        assert!(timer.is_paused);

        assert!(timer.sweep(at(1801)));
        assert!(!timer.is_paused);
        assert_eq!(timer.duration_seconds, Some(400));

        assert!(!timer.sweep(at(3600)));
        assert_eq!(timer.elapsed_seconds(at(3600)), 400);
        assert_eq!(timer.elapsed_seconds(at(7200)), 400);
    }

    #[test]
    fn test_sweep_at_exact_threshold() {
        let mut timer = TimerState::default();
        timer.start(at(0)).unwrap();
        timer.pause(at(100)).unwrap();
        assert!(timer.sweep(at(100 + AUTO_STOP_AFTER_SECS)));
        assert_eq!(timer.accumulated_seconds, 100);
    }

    #[test]
    fn test_resume_rejected_after_window() {
        let mut timer = TimerState::default();
        timer.start(at(0)).unwrap();
        timer.pause(at(250)).unwrap();
        let err = timer.resume(at(250 + AUTO_STOP_AFTER_SECS)).unwrap_err();
        assert_eq!(err, TimerError::PauseExpired);
        // the rejection force-stopped the timer with the total intact
        assert!(!timer.is_paused);
        assert_eq!(timer.duration_seconds, Some(250));
    }

    #[test]
    fn test_resume_within_window() {
        let mut timer = TimerState::default();
        timer.start(at(0)).unwrap();
        timer.pause(at(600)).unwrap();
        timer.resume(at(600 + AUTO_STOP_AFTER_SECS - 1)).unwrap();
        assert!(timer.is_running());
    }

    #[test]
    fn test_start_is_idempotent_while_running() {
        let mut timer = TimerState::default();
        timer.start(at(0)).unwrap();
        let snapshot = timer.clone();
        timer.start(at(500)).unwrap();
        assert_eq!(timer, snapshot);
        assert_eq!(timer.elapsed_seconds(at(600)), 600);
    }

    #[test]
    fn test_pause_while_paused_rejected_without_corruption() {
        let mut timer = TimerState::default();
        timer.start(at(0)).unwrap();
        timer.pause(at(300)).unwrap();
        let err = timer.pause(at(400)).unwrap_err();
        assert_eq!(err, TimerError::AlreadyPaused);
        assert_eq!(timer.accumulated_seconds, 300);
    }

    #[test]
    fn test_pause_while_idle_rejected() {
        let mut timer = TimerState::default();
        assert_eq!(timer.pause(at(0)).unwrap_err(), TimerError::NotRunning);
    }

    #[test]
    fn test_elapsed_while_running_and_paused() {
        let mut timer = TimerState::default();
        timer.start(at(0)).unwrap();
        assert_eq!(timer.elapsed_seconds(at(90)), 90);
        timer.pause(at(100)).unwrap();
        assert_eq!(timer.elapsed_seconds(at(500)), 100);
        timer.resume(at(600)).unwrap();
        assert_eq!(timer.elapsed_seconds(at(650)), 150);
    }

    #[test]
    fn test_stop_while_paused_keeps_total() {
        let mut timer = TimerState::default();
        timer.start(at(0)).unwrap();
        timer.pause(at(200)).unwrap();
        assert_eq!(timer.stop(at(900)).unwrap(), 200);
    }

    #[test]
    fn test_reset_zeroes_everything() {
        let mut timer = TimerState::default();
        timer.start(at(0)).unwrap();
        timer.pause(at(450)).unwrap();
        timer.reset();
        assert_eq!(timer, TimerState::default());
        assert_eq!(timer.elapsed_seconds(at(1000)), 0);
    }

    #[test]
    fn test_complete_finalizes_and_restart_clears() {
        let mut timer = TimerState::default();
        timer.start(at(0)).unwrap();
        assert_eq!(timer.complete(at(700)), 700);
        assert!(timer.is_completed());
        assert_eq!(timer.elapsed_seconds(at(9999)), 700);

        // starting again after completion begins a fresh attempt
        timer.start(at(1000)).unwrap();
        assert!(!timer.is_completed());
        assert_eq!(timer.accumulated_seconds, 0);
        assert_eq!(timer.elapsed_seconds(at(1050)), 50);
    }

    #[test]
    fn test_uncomplete_keeps_accumulated() {
        let mut timer = TimerState::default();
        timer.start(at(0)).unwrap();
        timer.complete(at(300));
        timer.uncomplete();
        assert!(!timer.is_completed());
        assert_eq!(timer.accumulated_seconds, 300);
        assert_eq!(timer.duration_seconds, None);
    }

    #[test]
    fn test_complete_while_paused() {
        let mut timer = TimerState::default();
        timer.start(at(0)).unwrap();
        timer.pause(at(120)).unwrap();
        assert_eq!(timer.complete(at(500)), 120);
        assert!(!timer.is_paused);
    }

    #[test]
    fn test_backwards_clock_never_shrinks_total() {
        let mut timer = TimerState::default();
        timer.start(at(100)).unwrap();
        assert_eq!(timer.pause(at(50)).unwrap(), 0);
        assert_eq!(timer.accumulated_seconds, 0);
    }
}
