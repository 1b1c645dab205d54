//! Workout plan catalog.
//!
//! Provides the built-in quick workouts and loads user plan files
//! (`*.json` or `*.toml`) from configured directories. The catalog is a
//! read-only source of session templates.

use crate::types::*;
use crate::{Error, Result};
use once_cell::sync::Lazy;
use std::collections::BTreeMap;
use std::path::Path;

/// Cached default catalog - built once and reused
static DEFAULT_CATALOG: Lazy<PlanCatalog> = Lazy::new(build_default_catalog);

/// Get a reference to the cached default catalog
pub fn get_default_catalog() -> &'static PlanCatalog {
    &DEFAULT_CATALOG
}

/// Plans keyed by id
#[derive(Clone, Debug, Default)]
pub struct PlanCatalog {
    plans: BTreeMap<String, WorkoutPlan>,
}

impl PlanCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a plan
    pub fn insert(&mut self, plan: WorkoutPlan) {
        self.plans.insert(plan.id.clone(), plan);
    }

    pub fn get(&self, id: &str) -> Option<&WorkoutPlan> {
        self.plans.get(id)
    }

    /// Plans ordered by id
    pub fn list(&self) -> impl Iterator<Item = &WorkoutPlan> {
        self.plans.values()
    }

    pub fn len(&self) -> usize {
        self.plans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plans.is_empty()
    }

    /// Validate every plan in the catalog
    ///
    /// Returns a list of problems (empty if valid)
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.plans.is_empty() {
            errors.push("Catalog has no plans".to_string());
        }

        for (id, plan) in &self.plans {
            if id != &plan.id {
                errors.push(format!("Plan key '{}' does not match plan id '{}'", id, plan.id));
            }
            errors.extend(plan.problems());
        }

        errors
    }

    /// Add every plan file found in `dir`. Unreadable files are skipped with a warning.
    ///
    /// Returns the number of plans added.
    pub fn load_dir(&mut self, dir: &Path) -> Result<usize> {
        if !dir.exists() {
            tracing::debug!("Plan directory {:?} does not exist", dir);
            return Ok(0);
        }

        let mut paths: Vec<_> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                matches!(
                    path.extension().and_then(|ext| ext.to_str()),
                    Some("json") | Some("toml")
                )
            })
            .collect();
        paths.sort();

        let mut count = 0;
        for path in paths {
            match load_plan_file(&path) {
                Ok(plan) => {
                    tracing::info!("Loaded plan '{}' from {:?}", plan.id, path);
                    self.insert(plan);
                    count += 1;
                }
                Err(e) => {
                    tracing::warn!("Skipping plan file {:?}: {}", path, e);
                }
            }
        }

        Ok(count)
    }
}

/// Read a single plan from a JSON or TOML file
pub fn load_plan_file(path: &Path) -> Result<WorkoutPlan> {
    let contents = std::fs::read_to_string(path)?;
    let plan: WorkoutPlan = match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => serde_json::from_str(&contents)?,
        Some("toml") => toml::from_str(&contents)?,
        _ => {
            return Err(Error::Other(format!(
                "Unsupported plan file type: {}",
                path.display()
            )))
        }
    };
    plan.validate()?;
    Ok(plan)
}

fn exercise(
    id: &str,
    name: &str,
    muscles: &[&str],
    target: SetTarget,
    sets: u32,
    rest_seconds: u32,
) -> ExerciseSpec {
    ExerciseSpec {
        id: id.into(),
        name: name.into(),
        muscles: muscles.iter().map(|m| m.to_string()).collect(),
        target,
        sets,
        rest_seconds,
        weight_suggestion: None,
    }
}

/// Builds the catalog of built-in quick workouts
///
/// Prefer `get_default_catalog()` outside of tests.
pub fn build_default_catalog() -> PlanCatalog {
    let mut catalog = PlanCatalog::new();

    catalog.insert(WorkoutPlan {
        id: "quick_full_body".into(),
        name: "Quick Full Body".into(),
        difficulty: Difficulty::Beginner,
        exercises: vec![
            exercise(
                "push-up-001",
                "Standard Push-Up",
                &["chest", "triceps", "shoulders", "core"],
                SetTarget::Reps(10),
                3,
                60,
            ),
            exercise(
                "squat-001",
                "Bodyweight Squat",
                &["quadriceps", "glutes", "hamstrings"],
                SetTarget::Reps(15),
                3,
                60,
            ),
            exercise(
                "plank-001",
                "Forearm Plank",
                &["core", "shoulders"],
                SetTarget::DurationSeconds(30),
                3,
                45,
            ),
        ],
    });

    catalog.insert(WorkoutPlan {
        id: "upper_body_express".into(),
        name: "Upper Body Express".into(),
        difficulty: Difficulty::Intermediate,
        exercises: vec![
            exercise(
                "pike-push-up-001",
                "Pike Push-Up",
                &["shoulders", "triceps"],
                SetTarget::Reps(8),
                3,
                75,
            ),
            exercise(
                "chair-dip-001",
                "Chair Dip",
                &["triceps", "chest"],
                SetTarget::Reps(12),
                3,
                60,
            ),
            exercise(
                "diamond-push-up-001",
                "Diamond Push-Up",
                &["triceps", "chest"],
                SetTarget::Reps(8),
                2,
                90,
            ),
        ],
    });

    catalog.insert(WorkoutPlan {
        id: "core_blast".into(),
        name: "Core Blast".into(),
        difficulty: Difficulty::Beginner,
        exercises: vec![
            exercise(
                "plank-001",
                "Forearm Plank",
                &["core", "shoulders"],
                SetTarget::DurationSeconds(45),
                2,
                30,
            ),
            exercise(
                "glute-bridge-001",
                "Glute Bridge",
                &["glutes", "hamstrings", "core"],
                SetTarget::Reps(15),
                3,
                45,
            ),
            exercise(
                "mountain-climber-001",
                "Mountain Climbers",
                &["core", "shoulders", "cardio"],
                SetTarget::DurationSeconds(30),
                3,
                30,
            ),
        ],
    });

    catalog
}
