//! The five conceptual planning phases.
//!
//! Phases are not stored anywhere. The oracle infers them from the
//! conversation; [`Phase::detect`] only produces a hint for logging.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    Assessment,
    GoalSetting,
    WorkoutPlan,
    MealPlan,
    ProgressTracking,
}

const ASSESSMENT_HINTS: &[&str] = &[
    "assess",
    "fitness level",
    "current fitness",
    "starting point",
    "how fit am i",
    "my stats",
    "bmi",
    "body composition",
    "evaluate",
    "baseline",
    "fitness test",
];

const GOAL_HINTS: &[&str] = &[
    "goal",
    "target",
    "objective",
    "aim",
    "want to lose",
    "want to gain",
    "want to build",
    "lose weight",
    "gain muscle",
    "get stronger",
    "get lean",
    "bulk",
    "cut",
    "recomp",
];

const WORKOUT_HINTS: &[&str] = &[
    "workout",
    "exercise",
    "training",
    "split",
    "routine",
    "push pull",
    "upper lower",
    "full body",
    "gym plan",
    "program",
    "schedule",
    "sets",
    "reps",
    "cardio",
    "hiit",
    "resistance",
];

const MEAL_HINTS: &[&str] = &[
    "meal",
    "diet",
    "nutrition",
    "food",
    "eat",
    "calories",
    "macro",
    "protein",
    "carb",
    "fat",
    "tdee",
    "supplement",
    "hydration",
];

const PROGRESS_HINTS: &[&str] = &[
    "progress",
    "track",
    "measure",
    "check-in",
    "plateau",
    "adjust",
    "deload",
    "overtraining",
    "milestone",
    "not seeing results",
    "stuck",
    "update my plan",
];

// One whole-word pattern per phase, in methodology order. A trailing `s` is
// allowed so plurals like "meals" still count.
static PHASE_PATTERNS: LazyLock<Vec<(Phase, Regex)>> = LazyLock::new(|| {
    Phase::ALL
        .into_iter()
        .map(|phase| {
            let alternation = phase
                .hints()
                .iter()
                .map(|hint| regex::escape(hint))
                .collect::<Vec<_>>()
                .join("|");
            let pattern = format!(r"\b(?:{alternation})s?\b");
            (phase, Regex::new(&pattern).unwrap())
        })
        .collect()
});

impl Phase {
    pub const ALL: [Phase; 5] = [
        Phase::Assessment,
        Phase::GoalSetting,
        Phase::WorkoutPlan,
        Phase::MealPlan,
        Phase::ProgressTracking,
    ];

    /// Position of the phase in the methodology, starting at 1.
    pub fn ordinal(self) -> u8 {
        match self {
            Phase::Assessment => 1,
            Phase::GoalSetting => 2,
            Phase::WorkoutPlan => 3,
            Phase::MealPlan => 4,
            Phase::ProgressTracking => 5,
        }
    }

    fn hints(self) -> &'static [&'static str] {
        match self {
            Phase::Assessment => ASSESSMENT_HINTS,
            Phase::GoalSetting => GOAL_HINTS,
            Phase::WorkoutPlan => WORKOUT_HINTS,
            Phase::MealPlan => MEAL_HINTS,
            Phase::ProgressTracking => PROGRESS_HINTS,
        }
    }

    /// Guesses which phase a user message is about by whole-word keyword
    /// matching.
    ///
    /// Phases are checked in methodology order and the first match wins.
    pub fn detect(text: &str) -> Option<Phase> {
        let lowered = text.to_lowercase();
        PHASE_PATTERNS
            .iter()
            .find(|(_, pattern)| pattern.is_match(&lowered))
            .map(|(phase, _)| *phase)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Assessment => "assessment",
            Phase::GoalSetting => "goal-setting",
            Phase::WorkoutPlan => "workout-plan",
            Phase::MealPlan => "meal-plan",
            Phase::ProgressTracking => "progress-tracking",
        };
        f.write_str(name)
    }
}
