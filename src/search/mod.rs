/// Food search module
///
/// This module contains:
/// - Relevance ranking of candidate records against a free-text query
/// - The tiered food service (point lookup, combined search, prefetch)

pub mod ranking;
pub mod service;


pub use ranking::{normalize_text, rank};
pub use service::FoodService;
