//! Core domain types for Lift.
//!
//! This module defines the fundamental types used throughout the system:
//! - Exercise specifications and workout plans (read-only session input)
//! - Set and session records (what a finished session leaves behind)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Seconds assumed per rep-based set when estimating plan length
const SECONDS_PER_REP_SET: u32 = 45;

/// Upper bounds a plan must respect to become a session
pub const MAX_SETS: u32 = 100;
pub const MAX_REPS: u32 = 1_000;
pub const MAX_DURATION_SECONDS: u32 = 3_600;
pub const MAX_REST_SECONDS: u32 = 3_600;

// ============================================================================
// Plan Types
// ============================================================================

/// What one set asks of the user: a rep count or a timed hold
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SetTarget {
    Reps(u32),
    #[serde(alias = "duration_seconds")]
    DurationSeconds(u32),
}

impl SetTarget {
    /// Planned reps, if this is a rep target
    pub fn reps(&self) -> Option<u32> {
        match self {
            SetTarget::Reps(reps) => Some(*reps),
            SetTarget::DurationSeconds(_) => None,
        }
    }

    /// Rough working time for one set
    pub fn estimated_seconds(&self) -> u32 {
        match self {
            SetTarget::Reps(_) => SECONDS_PER_REP_SET,
            SetTarget::DurationSeconds(secs) => *secs,
        }
    }

    fn is_zero(&self) -> bool {
        match self {
            SetTarget::Reps(n) | SetTarget::DurationSeconds(n) => *n == 0,
        }
    }

    fn exceeds_limit(&self) -> bool {
        match self {
            SetTarget::Reps(n) => *n > MAX_REPS,
            SetTarget::DurationSeconds(secs) => *secs > MAX_DURATION_SECONDS,
        }
    }
}

impl fmt::Display for SetTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SetTarget::Reps(reps) => write!(f, "{} reps", reps),
            SetTarget::DurationSeconds(secs) => write!(f, "{}s hold", secs),
        }
    }
}

fn default_rest_seconds() -> u32 {
    60
}

/// One exercise of a plan, immutable once a session starts
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ExerciseSpec {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub muscles: Vec<String>,
    pub target: SetTarget,
    pub sets: u32,
    #[serde(default = "default_rest_seconds")]
    pub rest_seconds: u32,
    #[serde(default)]
    pub weight_suggestion: Option<f64>,
}

/// Plan difficulty label shown in previews
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    #[default]
    Beginner,
    Intermediate,
    Advanced,
}

/// An ordered list of exercises making up one workout
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct WorkoutPlan {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub difficulty: Difficulty,
    pub exercises: Vec<ExerciseSpec>,
}

impl WorkoutPlan {
    /// Every problem that would stop this plan from becoming a session
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();

        if self.id.trim().is_empty() {
            problems.push("plan has an empty id".to_string());
        }
        if self.exercises.is_empty() {
            problems.push(format!("plan '{}' has no exercises", self.id));
        }

        for exercise in &self.exercises {
            if exercise.id.trim().is_empty() {
                problems.push(format!("plan '{}': exercise with an empty id", self.id));
            }
            if exercise.sets == 0 {
                problems.push(format!(
                    "plan '{}': exercise '{}' declares 0 sets",
                    self.id, exercise.id
                ));
            }
            if exercise.sets > MAX_SETS {
                problems.push(format!(
                    "plan '{}': exercise '{}' declares {} sets (max {})",
                    self.id, exercise.id, exercise.sets, MAX_SETS
                ));
            }
            if exercise.target.is_zero() {
                problems.push(format!(
                    "plan '{}': exercise '{}' has an empty target",
                    self.id, exercise.id
                ));
            }
            if exercise.target.exceeds_limit() {
                problems.push(format!(
                    "plan '{}': exercise '{}' target {} is out of range",
                    self.id, exercise.id, exercise.target
                ));
            }
            if exercise.rest_seconds > MAX_REST_SECONDS {
                problems.push(format!(
                    "plan '{}': exercise '{}' rests {}s (max {}s)",
                    self.id, exercise.id, exercise.rest_seconds, MAX_REST_SECONDS
                ));
            }
        }

        problems
    }

    /// Validate for use as a session template
    pub fn validate(&self) -> crate::Result<()> {
        let problems = self.problems();
        if problems.is_empty() {
            Ok(())
        } else {
            Err(crate::Error::InvalidTemplate(problems.join("; ")))
        }
    }

    pub fn total_sets(&self) -> u32 {
        self.exercises
            .iter()
            .fold(0u32, |total, e| total.saturating_add(e.sets))
    }

    /// Working time plus rest between sets, rounded up to whole minutes.
    /// Saturates instead of overflowing on unvalidated plans.
    pub fn estimated_duration_minutes(&self) -> u32 {
        let seconds = self.exercises.iter().fold(0u64, |total, e| {
            let sets = u64::from(e.sets);
            let work = u64::from(e.target.estimated_seconds()).saturating_mul(sets);
            let rest = u64::from(e.rest_seconds).saturating_mul(sets.saturating_sub(1));
            total.saturating_add(work).saturating_add(rest)
        });
        u32::try_from(seconds.div_ceil(60)).unwrap_or(u32::MAX)
    }
}

// ============================================================================
// Record Types
// ============================================================================

/// Derived outcome of a set
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SetStatus {
    /// Never reached
    Pending,
    Completed,
    /// Passed over by the user
    Skipped,
}

/// One set as performed (or not) during a session
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SetRecord {
    pub index: u32,
    pub target: SetTarget,
    pub actual_reps: Option<u32>,
    pub actual_weight: Option<f64>,
    pub completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
}

impl SetRecord {
    /// A set that has not been touched yet
    pub fn pending(index: u32, target: SetTarget) -> Self {
        Self {
            index,
            target,
            actual_reps: None,
            actual_weight: None,
            completed: false,
            completed_at: None,
        }
    }

    /// A set is touched once; after that it is never modified
    pub fn is_touched(&self) -> bool {
        self.completed_at.is_some()
    }

    pub fn status(&self) -> SetStatus {
        match (self.completed, self.completed_at) {
            (true, _) => SetStatus::Completed,
            (false, Some(_)) => SetStatus::Skipped,
            (false, None) => SetStatus::Pending,
        }
    }
}

/// The sets logged against one exercise
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExerciseLog {
    pub exercise_id: String,
    pub sets: Vec<SetRecord>,
}

/// A finished workout as stored in the workout log
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub id: Uuid,
    pub plan_id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub active_duration_seconds: u64,
    pub exercises: Vec<ExerciseLog>,
    #[serde(default)]
    pub note: String,
}

impl SessionRecord {
    /// Skeleton record for a plan: one untouched set per planned set
    pub fn skeleton(plan: &WorkoutPlan, started_at: DateTime<Utc>) -> Self {
        let exercises = plan
            .exercises
            .iter()
            .map(|spec| ExerciseLog {
                exercise_id: spec.id.clone(),
                sets: (0..spec.sets)
                    .map(|index| SetRecord::pending(index, spec.target))
                    .collect(),
            })
            .collect();

        Self {
            id: Uuid::new_v4(),
            plan_id: plan.id.clone(),
            started_at,
            ended_at: None,
            active_duration_seconds: 0,
            exercises,
            note: String::new(),
        }
    }

    pub fn sets(&self) -> impl Iterator<Item = &SetRecord> {
        self.exercises.iter().flat_map(|e| e.sets.iter())
    }

    pub fn total_sets(&self) -> usize {
        self.sets().count()
    }

    pub fn count_sets(&self, status: SetStatus) -> usize {
        self.sets().filter(|s| s.status() == status).count()
    }
}
