//! Weighted task selection with optional time-of-day adjustment.
//!
//! At night (01:00–05:59) posting tasks are slowed down; during the day
//! (08:00–20:59) engagement tasks are boosted. Everything else keeps its
//! configured weight. Zero-weight tasks stay in the draw with probability 0.

use std::collections::HashMap;

use murmur_config::{AgentDefinition, DAY_MULTIPLIER_KEY, NIGHT_MULTIPLIER_KEY, TaskConfig, defaults};
use rand::Rng;
use rand::distr::Distribution;
use rand::distr::weighted::WeightedIndex;

/// Anything with a name and a weight can be drawn.
pub trait WeightedTask {
    fn name(&self) -> &str;
    fn weight(&self) -> f64;
}

impl WeightedTask for TaskConfig {
    fn name(&self) -> &str {
        &self.name
    }

    fn weight(&self) -> f64 {
        self.weight
    }
}

impl WeightedTask for (&str, f64) {
    fn name(&self) -> &str {
        self.0
    }

    fn weight(&self) -> f64 {
        self.1
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SelectionError {
    #[error("No tasks to select from")]
    NoTasks,

    #[error("All task weights are zero")]
    AllWeightsZero,

    #[error("Task '{task}' has invalid weight {weight}")]
    InvalidWeight { task: String, weight: f64 },
}

/// Time-of-day weighting rules.
#[derive(Debug, Clone)]
pub struct TimeWeighting {
    pub night_multiplier: f64,
    pub day_multiplier: f64,
    pub posting_tasks: Vec<String>,
    pub engagement_tasks: Vec<String>,
}

impl TimeWeighting {
    /// Build from a named multiplier table, defaulting absent keys.
    pub fn from_table(
        multipliers: &HashMap<String, f64>,
        posting_tasks: Vec<String>,
        engagement_tasks: Vec<String>,
    ) -> Self {
        Self {
            night_multiplier: multipliers
                .get(NIGHT_MULTIPLIER_KEY)
                .copied()
                .unwrap_or(defaults::NIGHT_MULTIPLIER),
            day_multiplier: multipliers
                .get(DAY_MULTIPLIER_KEY)
                .copied()
                .unwrap_or(defaults::DAY_MULTIPLIER),
            posting_tasks,
            engagement_tasks,
        }
    }

    /// The weight of `name` at `hour` (0–23).
    pub fn adjust(&self, name: &str, weight: f64, hour: u32) -> f64 {
        let matches = |category: &[String]| category.iter().any(|task| task == name);
        match hour {
            1..=5 if matches(&self.posting_tasks) => weight * self.night_multiplier,
            8..=20 if matches(&self.engagement_tasks) => weight * self.day_multiplier,
            _ => weight,
        }
    }
}

/// Draws one task per iteration.
#[derive(Debug, Clone, Default)]
pub struct TaskSelector {
    time_weighting: Option<TimeWeighting>,
}

impl TaskSelector {
    /// Plain weighted selection.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_time_weighting(time_weighting: TimeWeighting) -> Self {
        Self {
            time_weighting: Some(time_weighting),
        }
    }

    /// The selector an agent definition asks for.
    pub fn for_agent(definition: &AgentDefinition) -> Self {
        if definition.time_weighting_enabled() {
            Self::with_time_weighting(TimeWeighting::from_table(
                &definition.time_based_multipliers,
                definition.posting_tasks.clone(),
                definition.engagement_tasks.clone(),
            ))
        } else {
            Self::new()
        }
    }

    pub fn is_time_weighted(&self) -> bool {
        self.time_weighting.is_some()
    }

    /// Weights after time adjustment, in task order.
    pub fn weights<T: WeightedTask>(&self, tasks: &[T], hour: Option<u32>) -> Vec<f64> {
        tasks
            .iter()
            .map(|task| match (&self.time_weighting, hour) {
                (Some(rules), Some(hour)) => rules.adjust(task.name(), task.weight(), hour),
                _ => task.weight(),
            })
            .collect()
    }

    /// Draw one task. `hour` is ignored unless time weighting is enabled.
    pub fn select<'t, T, R>(
        &self,
        tasks: &'t [T],
        hour: Option<u32>,
        rng: &mut R,
    ) -> Result<&'t T, SelectionError>
    where
        T: WeightedTask,
        R: Rng + ?Sized,
    {
        if tasks.is_empty() {
            return Err(SelectionError::NoTasks);
        }

        let weights = self.weights(tasks, hour);
        if let Some((task, &weight)) = tasks
            .iter()
            .zip(&weights)
            .find(|(_, w)| !(w.is_finite() && **w >= 0.0))
        {
            return Err(SelectionError::InvalidWeight {
                task: task.name().to_string(),
                weight,
            });
        }
        if weights.iter().all(|w| *w == 0.0) {
            return Err(SelectionError::AllWeightsZero);
        }

        let distribution =
            WeightedIndex::new(&weights).map_err(|_| SelectionError::AllWeightsZero)?;
        Ok(&tasks[distribution.sample(rng)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn default_rules() -> TimeWeighting {
        TimeWeighting::from_table(
            &HashMap::new(),
            vec!["post-tweet".into()],
            vec!["reply-to-tweet".into(), "like-tweet".into()],
        )
    }

    #[test]
    fn zero_weight_is_never_drawn() {
        let tasks = [("post", 0.0), ("like", 10.0)];
        let selector = TaskSelector::new();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..10_000 {
            let task = selector.select(&tasks, None, &mut rng).unwrap();
            assert_eq!(task.name(), "like");
        }
    }

    #[test]
    fn night_slows_posting() {
        let rules = default_rules();
        assert_eq!(rules.adjust("post-tweet", 10.0, 3), 4.0);
        assert_eq!(rules.adjust("reply-to-tweet", 5.0, 3), 5.0);
    }

    #[test]
    fn day_boosts_engagement() {
        let rules = default_rules();
        assert_eq!(rules.adjust("reply-to-tweet", 5.0, 14), 7.5);
        assert_eq!(rules.adjust("like-tweet", 2.0, 8), 3.0);
        assert_eq!(rules.adjust("post-tweet", 10.0, 14), 10.0);
    }

    #[test]
    fn other_tasks_unchanged_at_every_hour() {
        let rules = default_rules();
        for hour in 0..24 {
            assert_eq!(rules.adjust("scrape-news", 3.0, hour), 3.0);
        }
        // Boundaries: 06-07 and 21-00 are neutral for everything.
        for hour in [0, 6, 7, 21, 23] {
            assert_eq!(rules.adjust("post-tweet", 10.0, hour), 10.0);
            assert_eq!(rules.adjust("like-tweet", 10.0, hour), 10.0);
        }
    }

    #[test]
    fn table_overrides_defaults() {
        let table = HashMap::from([(NIGHT_MULTIPLIER_KEY.to_string(), 0.1)]);
        let rules = TimeWeighting::from_table(&table, vec!["post-tweet".into()], vec![]);
        assert_eq!(rules.night_multiplier, 0.1);
        assert_eq!(rules.day_multiplier, 1.5);
    }

    #[test]
    fn hour_ignored_without_time_weighting() {
        let tasks = [("post-tweet", 10.0)];
        assert_eq!(TaskSelector::new().weights(&tasks, Some(3)), vec![10.0]);
        assert_eq!(
            TaskSelector::with_time_weighting(default_rules()).weights(&tasks, Some(3)),
            vec![4.0]
        );
    }

    #[test]
    fn all_zero_fails_deterministically() {
        let tasks = [("a", 0.0), ("b", 0.0)];
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(
            TaskSelector::new().select(&tasks, None, &mut rng).err(),
            Some(SelectionError::AllWeightsZero)
        );
    }

    #[test]
    fn empty_and_negative_are_rejected() {
        let mut rng = StdRng::seed_from_u64(1);
        let empty: [(&str, f64); 0] = [];
        assert_eq!(
            TaskSelector::new().select(&empty, None, &mut rng).err(),
            Some(SelectionError::NoTasks)
        );

        let tasks = [("a", 1.0), ("b", -1.0)];
        assert!(matches!(
            TaskSelector::new().select(&tasks, None, &mut rng),
            Err(SelectionError::InvalidWeight { task, .. }) if task == "b"
        ));
    }

    #[test]
    fn draws_roughly_follow_weights() {
        let tasks = [("a", 1.0), ("b", 3.0)];
        let mut rng = StdRng::seed_from_u64(42);
        let selector = TaskSelector::new();
        let b_count = (0..4_000)
            .filter(|_| selector.select(&tasks, None, &mut rng).unwrap().name() == "b")
            .count();
        assert!((2_700..3_300).contains(&b_count), "b drawn {b_count} times");
    }
}
