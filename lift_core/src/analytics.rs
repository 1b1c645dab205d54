//! Read-only statistics over the workout log.
//!
//! Every function here is pure: it takes the records and the calendar to
//! bucket them in, and never touches the store. Days are calendar days in
//! the supplied time zone, keyed on a session's start time.

use crate::types::SessionRecord;
use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};
use serde::Serialize;
use std::collections::BTreeSet;

/// Calendar day a session belongs to
pub fn session_day<Tz: TimeZone>(record: &SessionRecord, tz: &Tz) -> NaiveDate {
    record.started_at.with_timezone(tz).date_naive()
}

fn active_days<Tz: TimeZone>(records: &[SessionRecord], tz: &Tz) -> BTreeSet<NaiveDate> {
    records.iter().map(|r| session_day(r, tz)).collect()
}

fn days_back(days: &BTreeSet<NaiveDate>, from: NaiveDate) -> u32 {
    let mut count = 0;
    let mut day = from;
    while days.contains(&day) {
        count += 1;
        match day.pred_opt() {
            Some(previous) => day = previous,
            None => break,
        }
    }
    count
}

/// Consecutive days with a session, counting back from `today`.
///
/// A day without a session yet on `today` does not break the run; the
/// count then starts from yesterday. Any earlier gap ends it.
pub fn current_streak<Tz: TimeZone>(records: &[SessionRecord], today: NaiveDate, tz: &Tz) -> u32 {
    let days = active_days(records, tz);
    if days.contains(&today) {
        return days_back(&days, today);
    }
    match today.pred_opt() {
        Some(yesterday) => days_back(&days, yesterday),
        None => 0,
    }
}

/// Longest run of consecutive session days anywhere in the log
pub fn longest_streak<Tz: TimeZone>(records: &[SessionRecord], tz: &Tz) -> u32 {
    longest_run(&active_days(records, tz))
}

fn longest_run(days: &BTreeSet<NaiveDate>) -> u32 {
    let mut best = 0;
    let mut run = 0;
    let mut previous: Option<NaiveDate> = None;

    for &day in days {
        run = match previous {
            Some(p) if p.succ_opt() == Some(day) => run + 1,
            _ => 1,
        };
        best = best.max(run);
        previous = Some(day);
    }
    best
}

/// Sunday opening the week that contains `date`
pub fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(date.weekday().num_days_from_sunday() as i64)
}

/// Sunday-first flags for the days of `reference`'s week that have a session
pub fn week_days<Tz: TimeZone>(records: &[SessionRecord], reference: NaiveDate, tz: &Tz) -> [bool; 7] {
    let start = week_start(reference);
    let mut flags = [false; 7];
    for day in active_days(records, tz) {
        let offset = (day - start).num_days();
        if (0..7).contains(&offset) {
            flags[offset as usize] = true;
        }
    }
    flags
}

/// Distinct days with a session in the Sunday-based week containing `reference`
pub fn weekly_progress<Tz: TimeZone>(records: &[SessionRecord], reference: NaiveDate, tz: &Tz) -> u32 {
    week_days(records, reference, tz)
        .iter()
        .filter(|&&done| done)
        .count() as u32
}

/// Days of the month (1-based) that have a session
pub fn calendar_days<Tz: TimeZone>(
    records: &[SessionRecord],
    year: i32,
    month: u32,
    tz: &Tz,
) -> BTreeSet<u32> {
    active_days(records, tz)
        .into_iter()
        .filter(|d| d.year() == year && d.month() == month)
        .map(|d| d.day())
        .collect()
}

// ============================================================================
// Achievements
// ============================================================================

/// Quantity an achievement threshold is measured against
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Sessions,
    ActiveHours,
    StreakDays,
}

#[derive(Clone, Copy, Debug)]
pub struct Achievement {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub metric: Metric,
    pub target: u32,
}

pub const ACHIEVEMENTS: [Achievement; 4] = [
    Achievement {
        id: "first_workout",
        name: "First Workout",
        description: "Complete your first workout",
        metric: Metric::Sessions,
        target: 1,
    },
    Achievement {
        id: "week_warrior",
        name: "Week Warrior",
        description: "Complete 7 workouts",
        metric: Metric::Sessions,
        target: 7,
    },
    Achievement {
        id: "hour_power",
        name: "Hour Power",
        description: "Work out for 1 hour total",
        metric: Metric::ActiveHours,
        target: 1,
    },
    Achievement {
        id: "consistency_king",
        name: "Consistency King",
        description: "Maintain a 3-day streak",
        metric: Metric::StreakDays,
        target: 3,
    },
];

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AchievementStatus {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub metric: Metric,
    pub target: u32,
    /// Current value, capped at `target`
    pub progress: u32,
    pub unlocked: bool,
    /// Start time of the session that first crossed the threshold
    pub unlocked_at: Option<DateTime<Utc>>,
}

/// Running totals while replaying the log in start order
#[derive(Default)]
struct Totals {
    sessions: u32,
    active_seconds: u64,
    days: BTreeSet<NaiveDate>,
    best_streak: u32,
}

impl Totals {
    fn add<Tz: TimeZone>(&mut self, record: &SessionRecord, tz: &Tz) {
        self.sessions += 1;
        self.active_seconds += record.active_duration_seconds;
        let day = session_day(record, tz);
        if self.days.insert(day) {
            self.best_streak = self.best_streak.max(self.run_through(day));
        }
    }

    /// Length of the run of session days containing `day`
    fn run_through(&self, day: NaiveDate) -> u32 {
        let mut forward = 0;
        let mut next = day.succ_opt();
        while let Some(d) = next.filter(|d| self.days.contains(d)) {
            forward += 1;
            next = d.succ_opt();
        }
        days_back(&self.days, day) + forward
    }

    fn value(&self, metric: Metric) -> u64 {
        match metric {
            Metric::Sessions => self.sessions as u64,
            Metric::ActiveHours => self.active_seconds / 3600,
            Metric::StreakDays => self.best_streak as u64,
        }
    }
}

/// Evaluate every entry of [`ACHIEVEMENTS`] against the log
pub fn achievement_status<Tz: TimeZone>(records: &[SessionRecord], tz: &Tz) -> Vec<AchievementStatus> {
    let mut ordered: Vec<&SessionRecord> = records.iter().collect();
    ordered.sort_by_key(|r| r.started_at);

    let mut unlocked_at: Vec<Option<DateTime<Utc>>> = vec![None; ACHIEVEMENTS.len()];
    let mut totals = Totals::default();

    for record in ordered {
        totals.add(record, tz);
        for (slot, achievement) in unlocked_at.iter_mut().zip(ACHIEVEMENTS.iter()) {
            if slot.is_none() && totals.value(achievement.metric) >= achievement.target as u64 {
                *slot = Some(record.started_at);
            }
        }
    }

    ACHIEVEMENTS
        .iter()
        .zip(unlocked_at)
        .map(|(achievement, unlocked_at)| AchievementStatus {
            id: achievement.id,
            name: achievement.name,
            description: achievement.description,
            metric: achievement.metric,
            target: achievement.target,
            progress: totals
                .value(achievement.metric)
                .min(achievement.target as u64) as u32,
            unlocked: unlocked_at.is_some(),
            unlocked_at,
        })
        .collect()
}

// ============================================================================
// Summary
// ============================================================================

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSummary {
    pub total_sessions: usize,
    pub total_active_hours: f64,
    pub current_streak: u32,
    pub longest_streak: u32,
    pub weekly_progress: u32,
    pub week_days: [bool; 7],
}

pub fn summary<Tz: TimeZone>(records: &[SessionRecord], today: NaiveDate, tz: &Tz) -> ProgressSummary {
    let active_seconds: u64 = records.iter().map(|r| r.active_duration_seconds).sum();
    let week = week_days(records, today, tz);
    ProgressSummary {
        total_sessions: records.len(),
        total_active_hours: active_seconds as f64 / 3600.0,
        current_streak: current_streak(records, today, tz),
        longest_streak: longest_streak(records, tz),
        weekly_progress: week.iter().filter(|&&done| done).count() as u32,
        week_days: week,
    }
}
