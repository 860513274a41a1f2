use super::*;
use crate::error::ServiceError;
use crate::observability::MetricsRegistry;
use crate::types::{DailyNutritionSummary, FitnessLevel, FoodItem, ProfileUpdate, StoredProfile};
use chrono::NaiveDate;
use std::sync::Arc;
use tempfile::TempDir;
use uuid::Uuid;

/// Helper function to create an initialized in-memory store
fn create_test_store() -> Arc<LocalStore> {
    Arc::new(LocalStore::open_in_memory().expect("in-memory store"))
}

/// Helper function to create a food cache with the reference capacity
fn create_test_food_cache() -> LocalFoodCache {
    LocalFoodCache::new(create_test_store(), 50)
}

fn barcode(i: usize) -> String {
    format!("40000000{:05}", i)
}

#[tokio::test]
async fn test_get_by_key_bumps_usage() {
    let cache = create_test_food_cache();
    cache.put(&FoodItem::new("4001", "Magerquark")).await.unwrap();

    let first = cache.get_by_key("4001").await.unwrap().unwrap();
    let second = cache.get_by_key("4001").await.unwrap().unwrap();

    // Hits return the post-increment record
    assert_eq!(first.usage_count, 2);
    assert_eq!(second.usage_count, 3);
    assert!(second.last_used_at >= first.last_used_at);

    assert!(cache.get_by_key("missing").await.unwrap().is_none());
}

#[tokio::test]
async fn test_put_twice_keeps_one_row_and_bumps_usage() {
    let cache = create_test_food_cache();
    let item = FoodItem::new("4002", "Haferflocken").with_brand("Kölln");

    cache.put(&item).await.unwrap();
    cache.put(&item).await.unwrap();

    assert_eq!(cache.count().await.unwrap(), 1);
    let stored = cache.top_used(10).await.unwrap();
    assert_eq!(stored[0].usage_count, 2);
}

#[tokio::test]
async fn test_put_merges_missing_fields() {
    let cache = create_test_food_cache();
    let mut full = FoodItem::new("4003", "Skyr");
    full.protein = Some(11.0);
    full.calories = Some(63.0);
    cache.put(&full).await.unwrap();

    let mut partial = FoodItem::new("4003", "Skyr Natur");
    partial.calories = Some(64.0);
    cache.put(&partial).await.unwrap();

    let stored = cache.get_by_key("4003").await.unwrap().unwrap();
    assert_eq!(stored.name, "Skyr Natur");
    assert_eq!(stored.calories, Some(64.0));
    assert_eq!(stored.protein, Some(11.0));
}

#[tokio::test]
async fn test_inserting_past_capacity_evicts_least_used() {
    let registry = MetricsRegistry::new().unwrap();
    let cache = LocalFoodCache::new(create_test_store(), 50).with_metrics(registry.metrics.clone());

    for i in 0..50 {
        cache.put(&FoodItem::new(barcode(i), format!("Produkt {}", i))).await.unwrap();
    }
    // Every record except #7 gets an extra hit
    for i in (0..50).filter(|i| *i != 7) {
        cache.get_by_key(&barcode(i)).await.unwrap();
    }
    assert_eq!(cache.count().await.unwrap(), 50);

    cache.put(&FoodItem::new(barcode(50), "Produkt 50")).await.unwrap();

    assert_eq!(cache.count().await.unwrap(), 50);
    assert!(cache.get_by_key(&barcode(7)).await.unwrap().is_none());
    assert!(cache.get_by_key(&barcode(50)).await.unwrap().is_some());
    assert_eq!(registry.metrics.local_evictions_total.get() as u64, 1);
}

#[tokio::test]
async fn test_eviction_ties_fall_back_to_oldest_use() {
    let cache = LocalFoodCache::new(create_test_store(), 3);

    for i in 0..3 {
        cache.put(&FoodItem::new(barcode(i), format!("Produkt {}", i))).await.unwrap();
    }
    cache.put(&FoodItem::new(barcode(3), "Produkt 3")).await.unwrap();

    assert_eq!(cache.count().await.unwrap(), 3);
    assert!(cache.get_by_key(&barcode(0)).await.unwrap().is_none());
    assert!(cache.get_by_key(&barcode(3)).await.unwrap().is_some());
}

#[tokio::test]
async fn test_search_by_name_short_query_returns_empty() {
    let cache = create_test_food_cache();
    cache.put(&FoodItem::new("4004", "Ei")).await.unwrap();

    assert!(cache.search_by_name("e", 10).await.unwrap().is_empty());
    assert!(cache.search_by_name("  e  ", 10).await.unwrap().is_empty());
    assert!(cache.search_by_name("", 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_short_query_guard_runs_before_initialization_check() {
    // No I/O happens for short queries, so even an uninitialized store answers
    let cache = LocalFoodCache::new(Arc::new(LocalStore::in_memory()), 50);
    assert!(cache.search_by_name("x", 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_search_by_name_matches_name_only_ordered_by_usage() {
    let cache = create_test_food_cache();
    cache.put(&FoodItem::new("1", "Joghurt Natur").with_brand("Weihenstephan")).await.unwrap();
    cache.put(&FoodItem::new("2", "Griechischer Joghurt")).await.unwrap();
    cache.put(&FoodItem::new("3", "Milch").with_brand("Joghurtland")).await.unwrap();
    cache.get_by_key("2").await.unwrap();

    let results = cache.search_by_name("JOGHURT", 10).await.unwrap();
    let keys: Vec<&str> = results.iter().map(|item| item.key.as_str()).collect();
    assert_eq!(keys, vec!["2", "1"]);

    let limited = cache.search_by_name("joghurt", 1).await.unwrap();
    assert_eq!(limited.len(), 1);
}

#[tokio::test]
async fn test_search_by_name_folds_umlauts_and_escapes_wildcards() {
    let cache = create_test_food_cache();
    cache.put(&FoodItem::new("1", "Hähnchenbrust")).await.unwrap();
    cache.put(&FoodItem::new("2", "Orangensaft 100%")).await.unwrap();
    cache.put(&FoodItem::new("3", "Apfelsaft")).await.unwrap();

    assert_eq!(cache.search_by_name("hahnchen", 10).await.unwrap().len(), 1);
    let percent = cache.search_by_name("0%", 10).await.unwrap();
    assert_eq!(percent.len(), 1);
    assert_eq!(percent[0].key, "2");
}

#[tokio::test]
async fn test_operations_before_initialize_fail_clearly() {
    let cache = LocalFoodCache::new(Arc::new(LocalStore::in_memory()), 50);

    let err = cache.get_by_key("4001").await.unwrap_err();
    assert!(matches!(err, ServiceError::NotInitialized(_)));
    let err = cache.put(&FoodItem::new("4001", "Quark")).await.unwrap_err();
    assert!(matches!(err, ServiceError::NotInitialized(_)));
}

#[tokio::test]
async fn test_clear_empties_food_items() {
    let cache = create_test_food_cache();
    cache.put(&FoodItem::new("1", "Banane")).await.unwrap();
    cache.clear().await.unwrap();
    assert_eq!(cache.count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_store_persists_across_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("local_cache.db");

    {
        let store = Arc::new(LocalStore::open(&path).unwrap());
        let cache = LocalFoodCache::new(store, 50);
        cache.put(&FoodItem::new("4005", "Reiswaffeln")).await.unwrap();
    }

    let store = Arc::new(LocalStore::open(&path).unwrap());
    let cache = LocalFoodCache::new(store, 50);
    let item = cache.get_by_key("4005").await.unwrap().unwrap();
    assert_eq!(item.name, "Reiswaffeln");
}

#[tokio::test]
async fn test_nutrition_window_drops_oldest_dates() {
    let cache = DailyNutritionCache::new(create_test_store(), 30);
    let start = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();

    for offset in 0..31 {
        let mut summary = DailyNutritionSummary::new(start + chrono::Duration::days(offset));
        summary.calories = 2000.0 + offset as f64;
        cache.put(&summary).await.unwrap();
    }

    assert_eq!(cache.count().await.unwrap(), 30);
    assert!(cache.get(start).await.unwrap().is_none());

    let recent = cache.recent(2).await.unwrap();
    assert_eq!(recent[0].date, start + chrono::Duration::days(30));
    assert_eq!(recent[0].calories, 2030.0);
    assert_eq!(recent[1].date, start + chrono::Duration::days(29));
}

#[tokio::test]
async fn test_nutrition_put_replaces_same_date() {
    let cache = DailyNutritionCache::new(create_test_store(), 30);
    let date = NaiveDate::from_ymd_opt(2026, 3, 14).unwrap();

    let mut summary = DailyNutritionSummary::new(date);
    summary.meal_count = 1;
    cache.put(&summary).await.unwrap();
    summary.meal_count = 3;
    summary.water_ml = 1500.0;
    cache.put(&summary).await.unwrap();

    assert_eq!(cache.count().await.unwrap(), 1);
    let stored = cache.get(date).await.unwrap().unwrap();
    assert_eq!(stored.meal_count, 3);
    assert_eq!(stored.water_ml, 1500.0);
}

#[tokio::test]
async fn test_profile_cache_round_trip_and_updates() {
    let cache = LocalProfileCache::new(create_test_store());
    let id = Uuid::new_v4();

    assert!(!cache.apply_update(id, &ProfileUpdate::default()).await.unwrap());
    assert!(!cache.update_image(id, "https://cdn.example/a.png").await.unwrap());

    let mut profile = StoredProfile::new(id);
    profile.display_name = Some("Alex".to_string());
    cache.put(&profile).await.unwrap();

    let update = ProfileUpdate {
        fitness_level: Some(FitnessLevel::Advanced),
        ..Default::default()
    };
    assert!(cache.apply_update(id, &update).await.unwrap());
    assert!(cache.update_image(id, "https://cdn.example/b.png").await.unwrap());

    let stored = cache.get(id).await.unwrap().unwrap();
    assert_eq!(stored.display_name.as_deref(), Some("Alex"));
    assert_eq!(stored.fitness_level, Some(FitnessLevel::Advanced));
    assert_eq!(stored.profile_image_url.as_deref(), Some("https://cdn.example/b.png"));

    cache.delete(id).await.unwrap();
    assert!(cache.get(id).await.unwrap().is_none());
}
