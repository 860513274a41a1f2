use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Cached food item, keyed by product barcode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoodItem {
    /// Natural key (barcode), immutable
    pub key: String,
    /// Display name
    pub name: String,
    pub brand: Option<String>,
    /// Nutrition per 100 g
    pub calories: Option<f64>,
    pub protein: Option<f64>,
    pub carbs: Option<f64>,
    pub fat: Option<f64>,
    pub fiber: Option<f64>,
    pub sugar: Option<f64>,
    pub sodium: Option<f64>,
    /// Serving-size descriptor as printed on the package ("30 g", "1 bar")
    pub serving_size: Option<String>,
    /// Quality grades
    pub nutriscore_grade: Option<String>,
    pub nova_group: Option<i32>,
    /// Number of hits/re-caches seen by the tier that produced this record (>= 1)
    pub usage_count: u32,
    pub last_used_at: DateTime<Utc>,
    pub cached_at: DateTime<Utc>,
}

impl FoodItem {
    /// Create a fresh record with `usage_count = 1`
    pub fn new(key: impl Into<String>, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            key: key.into(),
            name: name.into(),
            brand: None,
            calories: None,
            protein: None,
            carbs: None,
            fat: None,
            fiber: None,
            sugar: None,
            sodium: None,
            serving_size: None,
            nutriscore_grade: None,
            nova_group: None,
            usage_count: 1,
            last_used_at: now,
            cached_at: now,
        }
    }

    pub fn with_brand(mut self, brand: impl Into<String>) -> Self {
        self.brand = Some(brand.into());
        self
    }

    pub fn with_usage(mut self, usage_count: u32) -> Self {
        self.usage_count = usage_count.max(1);
        self
    }
}

/// Tier a record was served from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FoodSource {
    /// Embedded on-device store
    Local,
    /// Remote shared cache
    Cloud,
    /// Third-party product database
    External,
}

impl FoodSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            FoodSource::Local => "local",
            FoodSource::Cloud => "cloud",
            FoodSource::External => "external",
        }
    }
}

impl fmt::Display for FoodSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a query matched a record, strongest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    Exact,
    StartsWith,
    WordMatch,
    Contains,
    BrandMatch,
}

/// A food item with transient relevance data for one search call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedFood {
    #[serde(flatten)]
    pub item: FoodItem,
    pub match_type: MatchType,
    /// Char index of the query inside the normalized name (or brand for brand matches)
    pub match_position: usize,
    pub relevance_score: f64,
    pub source: FoodSource,
}

/// Result of a combined search across all tiers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FoodSearchResponse {
    pub query: String,
    /// Local results first, then cloud, then external
    pub items: Vec<RankedFood>,
    pub elapsed_ms: f64,
    /// Tier contributing the most results (ties go to the faster tier)
    pub primary_source: Option<FoodSource>,
    pub local_count: usize,
    pub cloud_count: usize,
    pub external_count: usize,
}

impl FoodSearchResponse {
    pub fn empty(query: &str) -> Self {
        Self {
            query: query.to_string(),
            items: Vec::new(),
            elapsed_ms: 0.0,
            primary_source: None,
            local_count: 0,
            cloud_count: 0,
            external_count: 0,
        }
    }
}

/// Daily nutrition totals, keyed by calendar date
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyNutritionSummary {
    pub date: NaiveDate,
    pub calories: f64,
    pub protein: f64,
    pub carbs: f64,
    pub fat: f64,
    pub fiber: f64,
    pub water_ml: f64,
    pub meal_count: u32,
    pub updated_at: DateTime<Utc>,
}

impl DailyNutritionSummary {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            calories: 0.0,
            protein: 0.0,
            carbs: 0.0,
            fat: 0.0,
            fiber: 0.0,
            water_ml: 0.0,
            meal_count: 0,
            updated_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FitnessLevel {
    Beginner,
    Intermediate,
    Advanced,
}

impl FitnessLevel {
    /// Ordinal used to measure the distance between levels
    pub fn rank(&self) -> i32 {
        match self {
            FitnessLevel::Beginner => 0,
            FitnessLevel::Intermediate => 1,
            FitnessLevel::Advanced => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FitnessLevel::Beginner => "beginner",
            FitnessLevel::Intermediate => "intermediate",
            FitnessLevel::Advanced => "advanced",
        }
    }
}

impl FromStr for FitnessLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "beginner" => Ok(FitnessLevel::Beginner),
            "intermediate" => Ok(FitnessLevel::Intermediate),
            "advanced" => Ok(FitnessLevel::Advanced),
            other => Err(format!("unknown fitness level '{}'", other)),
        }
    }
}

impl fmt::Display for FitnessLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrainingGoal {
    Strength,
    Hypertrophy,
    Both,
    GeneralFitness,
    Powerlifting,
}

impl TrainingGoal {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrainingGoal::Strength => "strength",
            TrainingGoal::Hypertrophy => "hypertrophy",
            TrainingGoal::Both => "both",
            TrainingGoal::GeneralFitness => "general_fitness",
            TrainingGoal::Powerlifting => "powerlifting",
        }
    }
}

impl FromStr for TrainingGoal {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strength" => Ok(TrainingGoal::Strength),
            "hypertrophy" => Ok(TrainingGoal::Hypertrophy),
            "both" => Ok(TrainingGoal::Both),
            "general_fitness" => Ok(TrainingGoal::GeneralFitness),
            "powerlifting" => Ok(TrainingGoal::Powerlifting),
            other => Err(format!("unknown training goal '{}'", other)),
        }
    }
}

impl fmt::Display for TrainingGoal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scoring input: the training-relevant slice of a user's profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub fitness_level: FitnessLevel,
    pub training_experience_months: u32,
    /// 1-7
    pub available_training_days: u8,
    pub primary_goal: TrainingGoal,
}

/// Persisted profile as held by the remote profile store and the local profile cache
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredProfile {
    pub id: Uuid,
    pub display_name: Option<String>,
    pub profile_image_url: Option<String>,
    pub fitness_level: Option<FitnessLevel>,
    pub training_experience_months: Option<u32>,
    pub available_training_days: Option<u8>,
    pub primary_goal: Option<TrainingGoal>,
    pub updated_at: DateTime<Utc>,
}

impl StoredProfile {
    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            display_name: None,
            profile_image_url: None,
            fitness_level: None,
            training_experience_months: None,
            available_training_days: None,
            primary_goal: None,
            updated_at: Utc::now(),
        }
    }

    /// Merge a partial update into this profile
    pub fn apply(&mut self, update: &ProfileUpdate) {
        if let Some(name) = &update.display_name {
            self.display_name = Some(name.clone());
        }
        if let Some(level) = update.fitness_level {
            self.fitness_level = Some(level);
        }
        if let Some(months) = update.training_experience_months {
            self.training_experience_months = Some(months);
        }
        if let Some(days) = update.available_training_days {
            self.available_training_days = Some(days);
        }
        if let Some(goal) = update.primary_goal {
            self.primary_goal = Some(goal);
        }
        self.updated_at = Utc::now();
    }

    /// Project to the scoring input; `None` when a required field is unset
    pub fn training_profile(&self) -> Option<UserProfile> {
        Some(UserProfile {
            fitness_level: self.fitness_level?,
            training_experience_months: self.training_experience_months?,
            available_training_days: self.available_training_days?,
            primary_goal: self.primary_goal?,
        })
    }
}

/// Partial profile update; absent fields are left untouched
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fitness_level: Option<FitnessLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub training_experience_months: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available_training_days: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_goal: Option<TrainingGoal>,
}

impl ProfileUpdate {
    pub fn is_empty(&self) -> bool {
        self.display_name.is_none()
            && self.fitness_level.is_none()
            && self.training_experience_months.is_none()
            && self.available_training_days.is_none()
            && self.primary_goal.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enum_parsing_is_case_insensitive() {
        assert_eq!("Intermediate".parse::<FitnessLevel>(), Ok(FitnessLevel::Intermediate));
        assert_eq!("general_fitness".parse::<TrainingGoal>(), Ok(TrainingGoal::GeneralFitness));
        assert!("elite".parse::<FitnessLevel>().is_err());
    }

    #[test]
    fn test_profile_apply_and_projection() {
        let mut profile = StoredProfile::new(Uuid::new_v4());
        assert!(profile.training_profile().is_none());

        profile.apply(&ProfileUpdate {
            fitness_level: Some(FitnessLevel::Beginner),
            training_experience_months: Some(4),
            available_training_days: Some(3),
            primary_goal: Some(TrainingGoal::Strength),
            ..Default::default()
        });

        let training = profile.training_profile().unwrap();
        assert_eq!(training.fitness_level, FitnessLevel::Beginner);
        assert_eq!(training.available_training_days, 3);
        assert!(profile.display_name.is_none());
    }

    #[test]
    fn test_match_type_ordering() {
        assert!(MatchType::Exact < MatchType::StartsWith);
        assert!(MatchType::Contains < MatchType::BrandMatch);
    }
}
