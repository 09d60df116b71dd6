//! SM-2 spaced-repetition scheduling.
//!
//! [`Scheduler::advance`] is a pure state transition: the same schedule,
//! rating, and `now` always produce the same successor. The caller supplies
//! `now`; nothing here reads a clock.
//!
//! # Transition
//!
//! ```text
//! ease' = max(ease + 0.1 - (5 - q)·(0.08 + (5 - q)·0.02), min_ease)
//!
//! q < 3  → repetitions' = 0,     interval' = 1
//! q >= 3 → repetitions' = r + 1, interval' = 1 | 6 | round(interval · ease')
//!
//! next_review = now + interval' × 86 400 000 ms
//! ```

use chrono::{DateTime, TimeDelta, Utc};

use crate::models::{FlashcardSchedule, Quality};

/// Milliseconds in one scheduling day. Not calendar-aware.
pub const DAY_MS: i64 = 86_400_000;

/// SM-2 tuning constants.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SchedulerParams {
    pub initial_ease_factor: f64,
    pub min_ease_factor: f64,
    /// Interval after a failure and after the first pass, in days.
    pub initial_interval: u32,
    /// Interval after the second consecutive pass, in days.
    pub second_interval: u32,
    /// Lowest rating that counts as a pass.
    pub passing_quality: u8,
}

impl Default for SchedulerParams {
    fn default() -> Self {
        Self {
            initial_ease_factor: 2.5,
            min_ease_factor: 1.3,
            initial_interval: 1,
            second_interval: 6,
            passing_quality: 3,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Scheduler {
    params: SchedulerParams,
}

impl Scheduler {
    pub fn new(params: SchedulerParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &SchedulerParams {
        &self.params
    }

    /// Schedule for a freshly generated card: due immediately.
    pub fn initial_schedule(&self, now: DateTime<Utc>) -> FlashcardSchedule {
        FlashcardSchedule {
            ease_factor: self.params.initial_ease_factor,
            interval: self.params.initial_interval.max(1),
            repetitions: 0,
            next_review_date: now,
            last_review_quality: None,
            last_reviewed_at: None,
        }
    }

    /// Compute the schedule that follows a review rated `quality` at `now`.
    pub fn advance(
        &self,
        schedule: &FlashcardSchedule,
        quality: Quality,
        now: DateTime<Utc>,
    ) -> FlashcardSchedule {
        let p = &self.params;
        let q = quality.value() as f64;
        let miss = 5.0 - q;

        let ease = (schedule.ease_factor + (0.1 - miss * (0.08 + miss * 0.02)))
            .max(p.min_ease_factor);

        let (repetitions, interval) = if quality.value() < p.passing_quality {
            (0, p.initial_interval)
        } else {
            let reps = schedule.repetitions.saturating_add(1);
            let interval = match reps {
                1 => p.initial_interval,
                2 => p.second_interval,
                _ => scaled_interval(schedule.interval, ease),
            };
            (reps, interval)
        };
        let interval = interval.max(1);

        FlashcardSchedule {
            ease_factor: ease,
            interval,
            repetitions,
            next_review_date: now
                .checked_add_signed(TimeDelta::milliseconds(interval as i64 * DAY_MS))
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
            last_review_quality: Some(quality),
            last_reviewed_at: Some(now),
        }
    }

    /// The successor schedule for every possible rating, lowest first.
    pub fn preview(
        &self,
        schedule: &FlashcardSchedule,
        now: DateTime<Utc>,
    ) -> Vec<(Quality, FlashcardSchedule)> {
        Quality::all()
            .map(|q| (q, self.advance(schedule, q, now)))
            .collect()
    }
}

fn scaled_interval(interval: u32, ease: f64) -> u32 {
    let scaled = (interval as f64 * ease).round();
    if scaled >= u32::MAX as f64 {
        u32::MAX
    } else {
        scaled as u32
    }
}
