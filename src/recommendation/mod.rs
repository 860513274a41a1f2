/// Training plan recommendations
///
/// This module contains:
/// - Plan templates as read from the catalog
/// - The deterministic scorer and top-N selection
/// - A service that scores the active catalog for a user

pub mod scoring;

pub use scoring::{
    get_top_recommendations, prioritize, score, PlanRecommendation, RecommendationTier, ScoreBreakdown,
    VolumeModification,
};

use crate::database::PlanCatalog;
use crate::error::{ServiceResult, ValidationError};
use crate::types::{FitnessLevel, TrainingGoal, UserProfile};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, instrument};
use uuid::Uuid;

/// Whether a template has been fully authored with exercises
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionStatus {
    Complete,
    Incomplete,
}

impl CompletionStatus {
    /// Anything other than "complete" counts as incomplete
    pub fn from_catalog(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("complete") {
            CompletionStatus::Complete
        } else {
            CompletionStatus::Incomplete
        }
    }
}

/// Plan template as published in the catalog.
///
/// `fitness_level` and `primary_goal` are `None` when the catalog holds a value this
/// service does not know; such fields score the lowest compatibility.
/// `exercises_per_workout` is `None` when the catalog has not computed it yet; volume
/// then scores neutral.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanTemplate {
    pub id: Uuid,
    pub name: String,
    pub fitness_level: Option<FitnessLevel>,
    pub days_per_week: u8,
    pub primary_goal: Option<TrainingGoal>,
    pub min_training_experience_months: u32,
    pub exercises_per_workout: Option<u32>,
    pub estimated_sets_per_week: Option<u32>,
    pub completion_status: CompletionStatus,
}

/// Recommends plans from the active catalog
pub struct RecommendationService {
    catalog: Arc<dyn PlanCatalog>,
}

impl RecommendationService {
    pub fn new(catalog: Arc<dyn PlanCatalog>) -> Self {
        Self { catalog }
    }

    #[instrument(skip(self, user))]
    pub async fn recommend(&self, user: &UserProfile, limit: usize) -> ServiceResult<Vec<PlanRecommendation>> {
        if !(1..=7).contains(&user.available_training_days) {
            return Err(ValidationError::InvalidField {
                field: "available_training_days",
                reason: format!("{} is outside 1-7", user.available_training_days),
            }
            .into());
        }

        let templates = self.catalog.active_templates().await?;
        let recommendations = get_top_recommendations(user, &templates, limit);
        debug!(
            "Scored {} templates, returning {}",
            templates.len(),
            recommendations.len()
        );
        Ok(recommendations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServiceError;
    use async_trait::async_trait;

    struct MockCatalog {
        templates: Vec<PlanTemplate>,
        should_fail: bool,
    }

    #[async_trait]
    impl PlanCatalog for MockCatalog {
        async fn active_templates(&self) -> ServiceResult<Vec<PlanTemplate>> {
            if self.should_fail {
                return Err(ServiceError::DatabaseError("Mock catalog failure".to_string()));
            }
            Ok(self.templates.clone())
        }
    }

    fn plan(id: u128, status: CompletionStatus) -> PlanTemplate {
        PlanTemplate {
            id: Uuid::from_u128(id),
            name: format!("Plan {}", id),
            fitness_level: Some(FitnessLevel::Beginner),
            days_per_week: 3,
            primary_goal: Some(TrainingGoal::Strength),
            min_training_experience_months: 0,
            exercises_per_workout: Some(5),
            estimated_sets_per_week: None,
            completion_status: status,
        }
    }

    fn scored(id: u128, total_score: f64, status: CompletionStatus) -> PlanRecommendation {
        PlanRecommendation {
            template: plan(id, status),
            total_score,
            breakdown: ScoreBreakdown {
                experience: total_score,
                frequency: total_score,
                goal: total_score,
                volume: total_score,
            },
            completeness: status,
            tier: RecommendationTier::from_score(total_score),
            reasoning: Vec::new(),
            volume_modification: None,
        }
    }

    fn beginner() -> UserProfile {
        UserProfile {
            fitness_level: FitnessLevel::Beginner,
            training_experience_months: 2,
            available_training_days: 3,
            primary_goal: TrainingGoal::Strength,
        }
    }

    fn ids(recommendations: &[PlanRecommendation]) -> Vec<u128> {
        recommendations.iter().map(|r| r.template.id.as_u128()).collect()
    }

    #[test]
    fn test_completion_status_parsing() {
        assert_eq!(CompletionStatus::from_catalog("complete"), CompletionStatus::Complete);
        assert_eq!(CompletionStatus::from_catalog(" Complete "), CompletionStatus::Complete);
        assert_eq!(CompletionStatus::from_catalog("incomplete"), CompletionStatus::Incomplete);
        assert_eq!(CompletionStatus::from_catalog("draft"), CompletionStatus::Incomplete);
    }

    #[test]
    fn test_complete_plans_fill_slots_first() {
        let recommendations = vec![
            scored(1, 65.0, CompletionStatus::Complete),
            scored(2, 95.0, CompletionStatus::Incomplete),
            scored(3, 70.0, CompletionStatus::Complete),
        ];

        let top3 = prioritize(recommendations.clone(), 3);
        assert_eq!(ids(&top3), vec![3, 1, 2]);

        let top2 = prioritize(recommendations, 2);
        assert_eq!(ids(&top2), vec![3, 1]);
    }

    #[test]
    fn test_incomplete_only_when_complete_run_out() {
        let recommendations = vec![
            scored(1, 40.0, CompletionStatus::Incomplete),
            scored(2, 60.0, CompletionStatus::Incomplete),
            scored(3, 50.0, CompletionStatus::Complete),
        ];
        assert_eq!(ids(&prioritize(recommendations.clone(), 10)), vec![3, 2, 1]);
        assert!(prioritize(recommendations, 0).is_empty());
    }

    #[test]
    fn test_get_top_recommendations_scores_and_orders() {
        let mut weak = plan(1, CompletionStatus::Complete);
        weak.days_per_week = 7;
        weak.primary_goal = Some(TrainingGoal::Hypertrophy);
        let strong = plan(2, CompletionStatus::Complete);
        let draft = plan(3, CompletionStatus::Incomplete);

        let top = get_top_recommendations(&beginner(), &[weak, draft, strong], 3);
        assert_eq!(ids(&top), vec![2, 1, 3]);
        assert_eq!(top[0].total_score, 100.0);
        // A weaker complete plan still outranks a stronger draft
        assert!(top[1].total_score < top[2].total_score);
    }

    #[tokio::test]
    async fn test_service_scores_catalog() {
        let service = RecommendationService::new(Arc::new(MockCatalog {
            templates: vec![plan(1, CompletionStatus::Complete), plan(2, CompletionStatus::Incomplete)],
            should_fail: false,
        }));

        let recommendations = service.recommend(&beginner(), 1).await.unwrap();
        assert_eq!(ids(&recommendations), vec![1]);
        assert_eq!(recommendations[0].tier, RecommendationTier::Optimal);
    }

    #[tokio::test]
    async fn test_service_rejects_invalid_days_and_surfaces_catalog_errors() {
        let service = RecommendationService::new(Arc::new(MockCatalog {
            templates: Vec::new(),
            should_fail: true,
        }));

        let mut user = beginner();
        user.available_training_days = 0;
        let err = service.recommend(&user, 3).await.unwrap_err();
        assert_eq!(err.status_code(), 400);

        let err = service.recommend(&beginner(), 3).await.unwrap_err();
        assert_eq!(err.error_type(), "database_error");
    }
}
