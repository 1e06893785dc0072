//src/catalog.rs
//! Built-in exercise knowledge: the default list per workout type, the
//! muscle-group database and the picker that merges in custom exercises.

use crate::db::WorkoutType;

/// Source of default exercise names and muscle groups.
pub trait ExerciseCatalog: Send + Sync {
    /// Ordered default exercises for a workout type. Sessions seed from the
    /// first three.
    fn default_exercises(&self, workout_type: WorkoutType) -> Vec<String>;

    /// Muscle group of a built-in exercise, `None` for anything else.
    fn muscle_group(&self, exercise_name: &str) -> Option<String>;

    fn is_builtin(&self, exercise_name: &str) -> bool {
        self.muscle_group(exercise_name).is_some()
    }
}

pub const CUSTOM_GROUP: &str = "Custom";

const CHEST: &[&str] = &[
    "Bench Press",
    "Incline Bench Press",
    "Decline Bench Press",
    "Dumbbell Press",
    "Incline Dumbbell Press",
    "Dumbbell Flyes",
    "Cable Flyes",
    "Cable Crossover",
    "Chest Dips",
    "Push-Ups",
];

const TRICEPS: &[&str] = &[
    "Tricep Pushdown",
    "Skull Crushers",
    "Overhead Tricep Extension",
    "Dips",
    "Close-Grip Bench Press",
    "Tricep Kickbacks",
];

const BACK: &[&str] = &[
    "Deadlift",
    "Barbell Row",
    "Dumbbell Row",
    "Lat Pulldown",
    "Pull-Ups",
    "Chin-Ups",
    "Seated Cable Row",
    "T-Bar Row",
    "Face Pulls",
];

const BICEPS: &[&str] = &[
    "Barbell Curl",
    "Dumbbell Curl",
    "Hammer Curl",
    "Preacher Curl",
    "Concentration Curl",
    "Cable Curl",
];

const SHOULDERS: &[&str] = &[
    "Overhead Press",
    "Dumbbell Shoulder Press",
    "Arnold Press",
    "Lateral Raises",
    "Front Raises",
    "Rear Delt Flyes",
    "Upright Rows",
    "Shrugs",
];

const LEGS: &[&str] = &[
    "Squat",
    "Front Squat",
    "Leg Press",
    "Romanian Deadlift",
    "Leg Curl",
    "Leg Extension",
    "Lunges",
    "Bulgarian Split Squat",
    "Calf Raises",
    "Hip Thrust",
];

const MUSCLE_GROUPS: &[(&str, &[&str])] = &[
    ("Chest", CHEST),
    ("Triceps", TRICEPS),
    ("Back", BACK),
    ("Biceps", BICEPS),
    ("Shoulders", SHOULDERS),
    ("Legs", LEGS),
];

const fn default_list(workout_type: WorkoutType) -> &'static [&'static str] {
    match workout_type {
        WorkoutType::Push => &[
            "Bench Press",
            "Incline Dumbbell Press",
            "Cable Flyes",
            "Tricep Pushdown",
            "Overhead Tricep Extension",
        ],
        WorkoutType::Pull => &[
            "Deadlift",
            "Barbell Row",
            "Lat Pulldown",
            "Face Pulls",
            "Barbell Curl",
            "Hammer Curl",
        ],
        WorkoutType::Shoulders => &[
            "Overhead Press",
            "Lateral Raises",
            "Front Raises",
            "Rear Delt Flyes",
            "Shrugs",
        ],
        WorkoutType::Legs => &[
            "Squat",
            "Romanian Deadlift",
            "Leg Press",
            "Leg Curl",
            "Leg Extension",
            "Calf Raises",
        ],
    }
}

/// Muscle groups offered in the picker for each workout type, in order.
const fn picker_groups(workout_type: WorkoutType) -> &'static [&'static str] {
    match workout_type {
        WorkoutType::Push => &["Chest", "Triceps"],
        WorkoutType::Pull => &["Back", "Biceps"],
        WorkoutType::Shoulders => &["Shoulders"],
        WorkoutType::Legs => &["Legs"],
    }
}

/// The compiled-in catalog.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinCatalog;

impl ExerciseCatalog for BuiltinCatalog {
    fn default_exercises(&self, workout_type: WorkoutType) -> Vec<String> {
        default_list(workout_type)
            .iter()
            .map(|name| (*name).to_string())
            .collect()
    }

    fn muscle_group(&self, exercise_name: &str) -> Option<String> {
        MUSCLE_GROUPS
            .iter()
            .find(|(_, names)| names.iter().any(|n| n.eq_ignore_ascii_case(exercise_name)))
            .map(|(group, _)| (*group).to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExerciseGroup {
    pub name: String,
    pub exercises: Vec<String>,
}

/// Built-in groups for a workout type, unfiltered.
pub fn exercise_groups(workout_type: WorkoutType) -> Vec<ExerciseGroup> {
    picker_groups(workout_type)
        .iter()
        .filter_map(|wanted| MUSCLE_GROUPS.iter().find(|(group, _)| group == wanted))
        .map(|(group, names)| ExerciseGroup {
            name: (*group).to_string(),
            exercises: names.iter().map(|n| (*n).to_string()).collect(),
        })
        .collect()
}

/// Picker contents: built-in groups followed by a "Custom" group holding
/// `custom` sorted by name. A non-empty `search` keeps only names containing
/// it (case-insensitive); groups left empty are dropped.
pub fn browse(workout_type: WorkoutType, custom: &[String], search: Option<&str>) -> Vec<ExerciseGroup> {
    let needle = search
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_lowercase);
    let keep = |name: &String| {
        needle
            .as_deref()
            .map_or(true, |n| name.to_lowercase().contains(n))
    };

    let mut groups = exercise_groups(workout_type);
    if !custom.is_empty() {
        let mut names = custom.to_vec();
        names.sort_by_key(|n| n.to_lowercase());
        groups.push(ExerciseGroup {
            name: CUSTOM_GROUP.to_string(),
            exercises: names,
        });
    }

    groups
        .into_iter()
        .filter_map(|mut group| {
            group.exercises.retain(|n| keep(n));
            (!group.exercises.is_empty()).then_some(group)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_every_default_exercise_has_a_muscle_group() {
        let catalog = BuiltinCatalog;
        for workout_type in WorkoutType::iter() {
            let defaults = catalog.default_exercises(workout_type);
            assert!(defaults.len() >= 3, "{workout_type} needs three seeds");
            for name in defaults {
                assert!(catalog.is_builtin(&name), "{name} missing from groups");
            }
        }
    }

    #[test]
    fn test_muscle_group_lookup() {
        let catalog = BuiltinCatalog;
        assert_eq!(catalog.muscle_group("bench press").as_deref(), Some("Chest"));
        assert_eq!(catalog.muscle_group("Romanian Deadlift").as_deref(), Some("Legs"));
        assert_eq!(catalog.muscle_group("Deadlift").as_deref(), Some("Back"));
        assert_eq!(catalog.muscle_group("Zercher Carry"), None);
    }

    #[test]
    fn test_browse_puts_custom_last_and_sorted() {
        let custom = vec!["Zottman Curl".to_string(), "cable row".to_string()];
        let groups = browse(WorkoutType::Pull, &custom, None);
        let names: Vec<&str> = groups.iter().map(|g| g.name.as_str()).collect();
        assert_eq!(names, vec!["Back", "Biceps", CUSTOM_GROUP]);
        assert_eq!(groups[2].exercises, vec!["cable row", "Zottman Curl"]);
    }

    #[test]
    fn test_browse_search_filters_and_drops_empty_groups() {
        let custom = vec!["Curl Machine".to_string()];
        let groups = browse(WorkoutType::Pull, &custom, Some("  CURL "));
        let names: Vec<&str> = groups.iter().map(|g| g.name.as_str()).collect();
        assert_eq!(names, vec!["Biceps", CUSTOM_GROUP]);
        assert!(groups[0].exercises.iter().all(|n| n.contains("Curl")));

        assert!(browse(WorkoutType::Legs, &[], Some("bench")).is_empty());
        assert_eq!(browse(WorkoutType::Legs, &[], Some("   ")).len(), 1);
    }
}
