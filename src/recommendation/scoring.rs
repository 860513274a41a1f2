/// Plan recommendation scoring
///
/// Pure functions: a user's training profile and a plan template go in, a scored
/// recommendation comes out. No I/O, no clocks, no randomness, so identical inputs
/// always give identical output.

use super::{CompletionStatus, PlanTemplate};
use crate::types::{FitnessLevel, TrainingGoal, UserProfile};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

const EXPERIENCE_WEIGHT: f64 = 0.40;
const FREQUENCY_WEIGHT: f64 = 0.30;
const GOAL_WEIGHT: f64 = 0.20;
const VOLUME_WEIGHT: f64 = 0.10;

/// Applied to the weighted score when the user is close to the template's level
const PROXIMITY_BONUS: f64 = 1.10;
/// Templates still missing exercises keep 70% of their score
const INCOMPLETE_MULTIPLIER: f64 = 0.70;

/// Lowest compatibility, also used for unknown catalog values
const DEFAULT_SCORE: f64 = 20.0;
/// Volume score when the template has no exercise count
const NEUTRAL_VOLUME_SCORE: f64 = 75.0;

const OPTIMAL_THRESHOLD: f64 = 90.0;
const GOOD_THRESHOLD: f64 = 75.0;
const ACCEPTABLE_THRESHOLD: f64 = 60.0;

/// Per-factor scores, each 0-100
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub experience: f64,
    pub frequency: f64,
    pub goal: f64,
    pub volume: f64,
}

impl ScoreBreakdown {
    pub fn weighted(&self) -> f64 {
        self.experience * EXPERIENCE_WEIGHT
            + self.frequency * FREQUENCY_WEIGHT
            + self.goal * GOAL_WEIGHT
            + self.volume * VOLUME_WEIGHT
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationTier {
    Optimal,
    Good,
    Acceptable,
    Fallback,
}

impl RecommendationTier {
    pub fn from_score(score: f64) -> Self {
        if score >= OPTIMAL_THRESHOLD {
            RecommendationTier::Optimal
        } else if score >= GOOD_THRESHOLD {
            RecommendationTier::Good
        } else if score >= ACCEPTABLE_THRESHOLD {
            RecommendationTier::Acceptable
        } else {
            RecommendationTier::Fallback
        }
    }
}

/// Suggested change to a template's exercises per workout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeModification {
    pub current_exercises: u32,
    pub suggested_exercises: u32,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanRecommendation {
    pub template: PlanTemplate,
    pub total_score: f64,
    pub breakdown: ScoreBreakdown,
    pub completeness: CompletionStatus,
    pub tier: RecommendationTier,
    pub reasoning: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_modification: Option<VolumeModification>,
}

/// Months of experience after which a user counts as approaching the next level
fn next_level_threshold(level: FitnessLevel) -> Option<u32> {
    match level {
        FitnessLevel::Beginner => Some(10),
        FitnessLevel::Intermediate => Some(30),
        FitnessLevel::Advanced => None,
    }
}

/// True when the template is exactly one level above the user and the user has
/// enough months to be close to that level
pub fn is_close_to_next_level(user: &UserProfile, template_level: Option<FitnessLevel>) -> bool {
    let Some(template_level) = template_level else {
        return false;
    };
    if template_level.rank() - user.fitness_level.rank() != 1 {
        return false;
    }
    next_level_threshold(user.fitness_level)
        .map(|threshold| user.training_experience_months >= threshold)
        .unwrap_or(false)
}

pub fn experience_match(user: &UserProfile, template_level: Option<FitnessLevel>) -> f64 {
    let Some(level) = template_level else {
        return DEFAULT_SCORE;
    };

    match level.rank() - user.fitness_level.rank() {
        0 => 100.0,
        1 if is_close_to_next_level(user, template_level) => 80.0,
        1 => 50.0,
        -1 => 60.0,
        _ => DEFAULT_SCORE,
    }
}

pub fn frequency_match(user_days: u8, template_days: u8) -> f64 {
    let diff = (i32::from(user_days) - i32::from(template_days)).abs();
    (100.0 - 20.0 * f64::from(diff)).max(DEFAULT_SCORE)
}

/// Compatibility of a template's goal with the user's goal. Not symmetric.
pub fn goal_match(user_goal: TrainingGoal, template_goal: Option<TrainingGoal>) -> f64 {
    use TrainingGoal::*;

    let Some(template_goal) = template_goal else {
        return DEFAULT_SCORE;
    };
    if user_goal == template_goal {
        return 100.0;
    }

    match (user_goal, template_goal) {
        (Strength, Powerlifting) => 90.0,
        (Strength, Both) => 80.0,
        (Strength, Hypertrophy) => 40.0,
        (Strength, GeneralFitness) => 40.0,

        (Hypertrophy, Both) => 80.0,
        (Hypertrophy, Strength) => 40.0,
        (Hypertrophy, GeneralFitness) => 40.0,
        (Hypertrophy, Powerlifting) => 30.0,

        (Both, Strength) => 80.0,
        (Both, Hypertrophy) => 80.0,
        (Both, Powerlifting) => 60.0,
        (Both, GeneralFitness) => 50.0,

        (GeneralFitness, Both) => 60.0,
        (GeneralFitness, Hypertrophy) => 50.0,
        (GeneralFitness, Strength) => 50.0,

        (Powerlifting, Strength) => 90.0,
        (Powerlifting, Both) => 60.0,
        (Powerlifting, Hypertrophy) => 30.0,

        _ => DEFAULT_SCORE,
    }
}

/// Ideal exercises per workout for a level, inclusive
pub fn ideal_exercise_range(level: FitnessLevel) -> (u32, u32) {
    match level {
        FitnessLevel::Beginner => (4, 6),
        FitnessLevel::Intermediate => (5, 7),
        FitnessLevel::Advanced => (6, 9),
    }
}

pub fn volume_match(level: FitnessLevel, exercises_per_workout: Option<u32>) -> f64 {
    let Some(exercises) = exercises_per_workout else {
        return NEUTRAL_VOLUME_SCORE;
    };

    match distance_outside(exercises, ideal_exercise_range(level)) {
        0 => 100.0,
        1 => 80.0,
        2 => 60.0,
        _ => 40.0,
    }
}

fn distance_outside(value: u32, (min, max): (u32, u32)) -> u32 {
    if value < min {
        min - value
    } else if value > max {
        value - max
    } else {
        0
    }
}

/// Score one template for one user
pub fn score(user: &UserProfile, template: &PlanTemplate) -> PlanRecommendation {
    let breakdown = ScoreBreakdown {
        experience: experience_match(user, template.fitness_level),
        frequency: frequency_match(user.available_training_days, template.days_per_week),
        goal: goal_match(user.primary_goal, template.primary_goal),
        volume: volume_match(user.fitness_level, template.exercises_per_workout),
    };

    let close_to_next_level = is_close_to_next_level(user, template.fitness_level);
    let mut adjusted = breakdown.weighted();
    // Second application of the proximity reward, on the aggregate
    if close_to_next_level {
        adjusted = (adjusted * PROXIMITY_BONUS).min(100.0);
    }
    if template.completion_status == CompletionStatus::Incomplete {
        adjusted *= INCOMPLETE_MULTIPLIER;
    }
    let total_score = adjusted.min(100.0);

    PlanRecommendation {
        template: template.clone(),
        total_score,
        breakdown,
        completeness: template.completion_status,
        tier: RecommendationTier::from_score(total_score),
        reasoning: reasoning(user, template, &breakdown, close_to_next_level),
        volume_modification: volume_modification(user.fitness_level, template.exercises_per_workout),
    }
}

fn reasoning(
    user: &UserProfile,
    template: &PlanTemplate,
    breakdown: &ScoreBreakdown,
    close_to_next_level: bool,
) -> Vec<String> {
    let mut reasons = Vec::new();

    match template.fitness_level {
        Some(level) if breakdown.experience >= 100.0 => {
            reasons.push(format!("Matches your {} experience level", level))
        }
        Some(level) if close_to_next_level => reasons.push(format!(
            "With {} months of training you are ready to progress to {}",
            user.training_experience_months, level
        )),
        Some(level) if level.rank() > user.fitness_level.rank() => {
            reasons.push(format!("Designed for {} lifters, a step above your level", level))
        }
        Some(level) => reasons.push(format!("Designed for {} lifters, easier than your level", level)),
        None => reasons.push("Template does not state a fitness level".to_string()),
    }

    if template.days_per_week == user.available_training_days {
        reasons.push(format!("Fits your {} training days per week", user.available_training_days));
    } else {
        reasons.push(format!(
            "Requires {} days per week, you have {} available",
            template.days_per_week, user.available_training_days
        ));
    }

    match template.primary_goal {
        Some(goal) if goal == user.primary_goal => {
            reasons.push(format!("Targets your goal of {}", goal.as_str().replace('_', " ")))
        }
        Some(goal) if breakdown.goal >= 80.0 => reasons.push(format!(
            "Focus on {} complements your goal",
            goal.as_str().replace('_', " ")
        )),
        Some(goal) => reasons.push(format!(
            "Focus on {} differs from your goal",
            goal.as_str().replace('_', " ")
        )),
        None => reasons.push("Template does not state a training goal".to_string()),
    }

    if let Some(sets) = template.estimated_sets_per_week {
        reasons.push(format!("About {} working sets per week", sets));
    }

    if template.completion_status == CompletionStatus::Incomplete {
        reasons.push("Template is still being completed with exercises".to_string());
    }

    reasons
}

fn volume_modification(level: FitnessLevel, exercises_per_workout: Option<u32>) -> Option<VolumeModification> {
    let exercises = exercises_per_workout?;
    let (min, max) = ideal_exercise_range(level);

    let (suggested, direction) = if exercises < min {
        (min, "Add")
    } else if exercises > max {
        (max, "Drop")
    } else {
        return None;
    };

    Some(VolumeModification {
        current_exercises: exercises,
        suggested_exercises: suggested,
        reason: format!(
            "{} {} exercise(s) per workout to reach the {}-{} range suited to {} lifters",
            direction,
            exercises.abs_diff(suggested),
            min,
            max,
            level
        ),
    })
}

fn by_score_desc(a: &PlanRecommendation, b: &PlanRecommendation) -> Ordering {
    b.total_score.partial_cmp(&a.total_score).unwrap_or(Ordering::Equal)
}

/// Order scored recommendations and keep at most `limit`.
///
/// Complete templates come first, best score first. Incomplete ones only fill the
/// slots left when there are fewer than `limit` complete templates.
pub fn prioritize(mut recommendations: Vec<PlanRecommendation>, limit: usize) -> Vec<PlanRecommendation> {
    recommendations.sort_by(by_score_desc);

    let (complete, incomplete): (Vec<_>, Vec<_>) = recommendations
        .into_iter()
        .partition(|r| r.completeness == CompletionStatus::Complete);

    complete.into_iter().chain(incomplete).take(limit).collect()
}

/// Score every template and return the best `limit`, complete templates first
pub fn get_top_recommendations(
    user: &UserProfile,
    templates: &[PlanTemplate],
    limit: usize,
) -> Vec<PlanRecommendation> {
    let scored = templates.iter().map(|template| score(user, template)).collect();
    prioritize(scored, limit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn user(level: FitnessLevel, months: u32) -> UserProfile {
        UserProfile {
            fitness_level: level,
            training_experience_months: months,
            available_training_days: 3,
            primary_goal: TrainingGoal::Strength,
        }
    }

    fn template(level: FitnessLevel, days: u8, goal: TrainingGoal) -> PlanTemplate {
        PlanTemplate {
            id: Uuid::from_u128(1),
            name: "Full Body Basics".to_string(),
            fitness_level: Some(level),
            days_per_week: days,
            primary_goal: Some(goal),
            min_training_experience_months: 0,
            exercises_per_workout: Some(5),
            estimated_sets_per_week: Some(45),
            completion_status: CompletionStatus::Complete,
        }
    }

    #[test]
    fn test_frequency_reference_values() {
        assert_eq!(frequency_match(3, 3), 100.0);
        assert_eq!(frequency_match(3, 4), 80.0);
        assert_eq!(frequency_match(3, 5), 60.0);
        assert_eq!(frequency_match(3, 6), 40.0);
        assert_eq!(frequency_match(1, 7), 20.0);
        assert_eq!(frequency_match(6, 3), 40.0);
    }

    #[test]
    fn test_goal_reference_values() {
        use TrainingGoal::*;
        assert_eq!(goal_match(Strength, Some(Strength)), 100.0);
        assert_eq!(goal_match(Strength, Some(Hypertrophy)), 40.0);
        assert_eq!(goal_match(Hypertrophy, Some(Powerlifting)), 30.0);
        assert_eq!(goal_match(Strength, Some(Powerlifting)), 90.0);
        assert_eq!(goal_match(Powerlifting, Some(Strength)), 90.0);
        assert_eq!(goal_match(Strength, Some(Both)), 80.0);
        assert_eq!(goal_match(Powerlifting, Some(GeneralFitness)), 20.0);
        assert_eq!(goal_match(Strength, None), 20.0);
    }

    #[test]
    fn test_goal_table_is_asymmetric() {
        use TrainingGoal::*;
        assert_ne!(
            goal_match(GeneralFitness, Some(Strength)),
            goal_match(Strength, Some(GeneralFitness))
        );
    }

    #[test]
    fn test_experience_exact_ignores_months() {
        for months in [0, 5, 29, 120] {
            for level in [FitnessLevel::Beginner, FitnessLevel::Intermediate, FitnessLevel::Advanced] {
                assert_eq!(experience_match(&user(level, months), Some(level)), 100.0);
            }
        }
    }

    #[test]
    fn test_experience_one_level_apart() {
        let beginner = user(FitnessLevel::Beginner, 4);
        let seasoned_beginner = user(FitnessLevel::Beginner, 10);
        let intermediate = user(FitnessLevel::Intermediate, 29);
        let seasoned_intermediate = user(FitnessLevel::Intermediate, 30);

        assert_eq!(experience_match(&beginner, Some(FitnessLevel::Intermediate)), 50.0);
        assert_eq!(experience_match(&seasoned_beginner, Some(FitnessLevel::Intermediate)), 80.0);
        assert_eq!(experience_match(&intermediate, Some(FitnessLevel::Advanced)), 50.0);
        assert_eq!(experience_match(&seasoned_intermediate, Some(FitnessLevel::Advanced)), 80.0);
        assert_eq!(experience_match(&intermediate, Some(FitnessLevel::Beginner)), 60.0);
    }

    #[test]
    fn test_experience_two_levels_or_unknown() {
        let beginner = user(FitnessLevel::Beginner, 100);
        let advanced = user(FitnessLevel::Advanced, 100);
        assert_eq!(experience_match(&beginner, Some(FitnessLevel::Advanced)), 20.0);
        assert_eq!(experience_match(&advanced, Some(FitnessLevel::Beginner)), 20.0);
        assert_eq!(experience_match(&advanced, None), 20.0);
    }

    #[test]
    fn test_volume_ranges() {
        use FitnessLevel::*;
        assert_eq!(volume_match(Beginner, Some(5)), 100.0);
        assert_eq!(volume_match(Beginner, Some(7)), 80.0);
        assert_eq!(volume_match(Beginner, Some(2)), 60.0);
        assert_eq!(volume_match(Beginner, Some(10)), 40.0);
        assert_eq!(volume_match(Advanced, Some(9)), 100.0);
        assert_eq!(volume_match(Advanced, Some(5)), 80.0);
        assert_eq!(volume_match(Intermediate, None), 75.0);
    }

    #[test]
    fn test_perfect_match_scores_100_and_optimal() {
        let rec = score(
            &user(FitnessLevel::Beginner, 3),
            &template(FitnessLevel::Beginner, 3, TrainingGoal::Strength),
        );
        assert_eq!(rec.total_score, 100.0);
        assert_eq!(rec.tier, RecommendationTier::Optimal);
        assert!(rec.volume_modification.is_none());
        assert_eq!(rec.reasoning[0], "Matches your beginner experience level");
    }

    #[test]
    fn test_proximity_bonus_applies_twice() {
        // experience 80, frequency 80, goal 100, volume 100 (beginner range 4-6)
        let rec = score(
            &user(FitnessLevel::Beginner, 12),
            &template(FitnessLevel::Intermediate, 4, TrainingGoal::Strength),
        );
        assert_eq!(rec.breakdown.experience, 80.0);
        let weighted = 80.0 * 0.4 + 80.0 * 0.3 + 100.0 * 0.2 + 100.0 * 0.1;
        assert!((rec.total_score - weighted * 1.1).abs() < 1e-9);
        assert!((rec.total_score - 94.6).abs() < 1e-9);
        assert_eq!(rec.tier, RecommendationTier::Optimal);
    }

    #[test]
    fn test_bonus_is_capped_before_completeness_penalty() {
        let mut plan = template(FitnessLevel::Intermediate, 3, TrainingGoal::Strength);
        plan.completion_status = CompletionStatus::Incomplete;
        let near = user(FitnessLevel::Beginner, 12);

        let complete = score(&near, &template(FitnessLevel::Intermediate, 3, TrainingGoal::Strength));
        let incomplete = score(&near, &plan);
        assert_eq!(complete.total_score, 100.0);
        assert!((incomplete.total_score - 70.0).abs() < 1e-9);
        assert!(incomplete
            .reasoning
            .iter()
            .any(|r| r.contains("still being completed")));
    }

    #[test]
    fn test_incomplete_penalty() {
        let mut plan = template(FitnessLevel::Beginner, 3, TrainingGoal::Strength);
        plan.completion_status = CompletionStatus::Incomplete;
        let rec = score(&user(FitnessLevel::Beginner, 1), &plan);
        assert!((rec.total_score - 70.0).abs() < 1e-9);
        assert_eq!(rec.tier, RecommendationTier::Acceptable);
        assert_eq!(rec.completeness, CompletionStatus::Incomplete);
    }

    #[test]
    fn test_score_is_deterministic() {
        let user = UserProfile {
            fitness_level: FitnessLevel::Intermediate,
            training_experience_months: 31,
            available_training_days: 4,
            primary_goal: TrainingGoal::Hypertrophy,
        };
        let mut plan = template(FitnessLevel::Advanced, 5, TrainingGoal::Both);
        plan.exercises_per_workout = Some(10);

        let first = score(&user, &plan);
        for _ in 0..100 {
            let again = score(&user, &plan);
            assert_eq!(again.total_score.to_bits(), first.total_score.to_bits());
            assert_eq!(again, first);
        }
    }

    #[test]
    fn test_volume_modification_suggestion() {
        let mut plan = template(FitnessLevel::Beginner, 3, TrainingGoal::Strength);
        plan.exercises_per_workout = Some(9);
        let rec = score(&user(FitnessLevel::Beginner, 2), &plan);

        let modification = rec.volume_modification.unwrap();
        assert_eq!(modification.current_exercises, 9);
        assert_eq!(modification.suggested_exercises, 6);
        assert!(modification.reason.starts_with("Drop 3"));
    }

    #[test]
    fn test_tier_thresholds() {
        assert_eq!(RecommendationTier::from_score(90.0), RecommendationTier::Optimal);
        assert_eq!(RecommendationTier::from_score(89.9), RecommendationTier::Good);
        assert_eq!(RecommendationTier::from_score(75.0), RecommendationTier::Good);
        assert_eq!(RecommendationTier::from_score(60.0), RecommendationTier::Acceptable);
        assert_eq!(RecommendationTier::from_score(59.9), RecommendationTier::Fallback);
    }
}
