//! Open Food Facts client
//!
//! Barcode lookups use the v2 product endpoint; free-text search uses the legacy
//! `cgi/search.pl` endpoint, which is the only one that matches product names.
//! A client-side sliding window keeps us under the public rate limit and fails
//! fast with `RateLimitExceeded` instead of queueing.

use super::ExternalFoodSource;
use crate::config::ExternalConfig;
use crate::error::{ServiceError, ServiceResult};
use crate::types::FoodItem;
use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Sliding one-minute request budget
#[derive(Debug)]
struct RateLimiter {
    requests: Vec<Instant>,
    limit: u32,
    window: Duration,
}

impl RateLimiter {
    const fn new(limit: u32, window: Duration) -> Self {
        Self {
            requests: Vec::new(),
            limit,
            window,
        }
    }

    /// Record a request if the budget allows it
    fn try_acquire(&mut self) -> bool {
        let now = Instant::now();
        self.requests.retain(|&t| now.duration_since(t) < self.window);
        if self.requests.len() < self.limit as usize {
            self.requests.push(now);
            true
        } else {
            false
        }
    }
}

#[derive(Debug, Deserialize)]
struct ProductResponse {
    #[serde(default)]
    status: i64,
    product: Option<Product>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    products: Vec<Product>,
}

#[derive(Debug, Deserialize)]
struct Product {
    code: Option<String>,
    product_name: Option<String>,
    brands: Option<String>,
    serving_size: Option<String>,
    nutriscore_grade: Option<String>,
    nova_group: Option<Value>,
    #[serde(default)]
    nutriments: HashMap<String, Value>,
}

/// OFF encodes numbers inconsistently (number or numeric string)
fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

impl Product {
    fn nutriment(&self, name: &str) -> Option<f64> {
        self.nutriments.get(name).and_then(as_f64)
    }

    /// Products without a barcode or a usable name are dropped.
    /// `requested_code` wins over the product's own (possibly canonicalized) code.
    fn into_food_item(self, requested_code: Option<&str>) -> Option<FoodItem> {
        let code = match requested_code {
            Some(code) => code.to_string(),
            None => self.code.clone().filter(|c| !c.trim().is_empty())?,
        };
        let name = self
            .product_name
            .clone()
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())?;

        let mut item = FoodItem::new(code, name);
        item.brand = self
            .brands
            .as_deref()
            .and_then(|b| b.split(',').next())
            .map(|b| b.trim().to_string())
            .filter(|b| !b.is_empty());
        item.calories = self.nutriment("energy-kcal_100g");
        item.protein = self.nutriment("proteins_100g");
        item.carbs = self.nutriment("carbohydrates_100g");
        item.fat = self.nutriment("fat_100g");
        item.fiber = self.nutriment("fiber_100g");
        item.sugar = self.nutriment("sugars_100g");
        item.sodium = self.nutriment("sodium_100g");
        item.serving_size = self.serving_size.clone().filter(|s| !s.is_empty());
        item.nutriscore_grade = self.nutriscore_grade.clone().filter(|g| !g.is_empty());
        item.nova_group = self.nova_group.as_ref().and_then(as_f64).map(|n| n as i32);
        Some(item)
    }
}

/// Rate-limited Open Food Facts client
#[derive(Clone)]
pub struct OpenFoodFactsClient {
    http: reqwest::Client,
    base_url: Url,
    rate_limiter: Arc<Mutex<RateLimiter>>,
}

impl OpenFoodFactsClient {
    pub fn new(config: &ExternalConfig) -> ServiceResult<Self> {
        let http = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| ServiceError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        let base_url = Url::parse(&config.base_url)
            .map_err(|e| ServiceError::ConfigError(format!("Invalid Open Food Facts URL: {}", e)))?;
        if base_url.cannot_be_a_base() {
            return Err(ServiceError::ConfigError(format!(
                "Open Food Facts URL cannot carry a path: {}",
                config.base_url
            )));
        }

        Ok(Self {
            http,
            base_url,
            rate_limiter: Arc::new(Mutex::new(RateLimiter::new(
                config.rate_limit_per_minute,
                Duration::from_secs(60),
            ))),
        })
    }

    /// Base URL extended by `segments`; every segment is percent-encoded, `/` and `?` included
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn acquire(&self) -> ServiceResult<()> {
        if self.rate_limiter.lock().await.try_acquire() {
            Ok(())
        } else {
            warn!("Open Food Facts request budget exhausted");
            Err(ServiceError::RateLimitExceeded)
        }
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> ServiceResult<Option<reqwest::Response>> {
        self.acquire().await?;

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ServiceError::Timeout
            } else {
                ServiceError::Network(format!("Open Food Facts request failed: {}", e))
            }
        })?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            StatusCode::TOO_MANY_REQUESTS => Err(ServiceError::RateLimitExceeded),
            status if !status.is_success() => Err(ServiceError::Network(format!(
                "Open Food Facts returned HTTP {}",
                status
            ))),
            _ => Ok(Some(response)),
        }
    }
}

#[async_trait]
impl ExternalFoodSource for OpenFoodFactsClient {
    async fn get_by_key(&self, key: &str) -> ServiceResult<Option<FoodItem>> {
        let file = format!("{}.json", key);
        let url = self.endpoint(&["api", "v2", "product", &file]);
        let Some(response) = self.send(self.http.get(url)).await? else {
            debug!("Open Food Facts has no product {}", key);
            return Ok(None);
        };

        let body: ProductResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::Network(format!("Invalid Open Food Facts product response: {}", e)))?;

        if body.status == 0 {
            debug!("Open Food Facts has no product {}", key);
            return Ok(None);
        }

        Ok(body.product.and_then(|product| product.into_food_item(Some(key))))
    }

    async fn search(&self, query: &str, limit: usize) -> ServiceResult<Vec<FoodItem>> {
        let query = query.trim();
        if query.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let url = self.endpoint(&["cgi", "search.pl"]);
        let page_size = limit.to_string();
        let request = self.http.get(url).query(&[
            ("search_terms", query),
            ("search_simple", "1"),
            ("action", "process"),
            ("json", "1"),
            ("page_size", page_size.as_str()),
        ]);

        let Some(response) = self.send(request).await? else {
            return Ok(Vec::new());
        };

        let body: SearchResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::Network(format!("Invalid Open Food Facts search response: {}", e)))?;

        let items: Vec<FoodItem> = body
            .products
            .into_iter()
            .filter_map(|product| product.into_food_item(None))
            .take(limit)
            .collect();

        debug!("Open Food Facts returned {} products for search", items.len());
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, path_regex, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer, rate_limit_per_minute: u32) -> OpenFoodFactsClient {
        OpenFoodFactsClient::new(&ExternalConfig {
            base_url: server.uri(),
            user_agent: "fitfuel-api/test".to_string(),
            rate_limit_per_minute,
            timeout_ms: 2000,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_product_lookup_maps_nutriments() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v2/product/4008400401621.json"))
            .and(header("user-agent", "fitfuel-api/test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": "4008400401621",
                "status": 1,
                "product": {
                    "code": "4008400401621",
                    "product_name": "Haferflocken",
                    "brands": "Kölln, Peter Kölln",
                    "serving_size": "40 g",
                    "nutriscore_grade": "a",
                    "nova_group": 1,
                    "nutriments": {
                        "energy-kcal_100g": 372,
                        "proteins_100g": "13.5",
                        "carbohydrates_100g": 58.7,
                        "fat_100g": 7,
                        "fiber_100g": 10,
                        "sugars_100g": 0.7,
                        "sodium_100g": 0.004
                    }
                }
            })))
            .mount(&server)
            .await;

        let item = client_for(&server, 10)
            .get_by_key("4008400401621")
            .await
            .unwrap()
            .unwrap();

        assert_eq!(item.key, "4008400401621");
        assert_eq!(item.name, "Haferflocken");
        assert_eq!(item.brand.as_deref(), Some("Kölln"));
        assert_eq!(item.calories, Some(372.0));
        assert_eq!(item.protein, Some(13.5));
        assert_eq!(item.nova_group, Some(1));
        assert_eq!(item.usage_count, 1);
    }

    #[tokio::test]
    async fn test_unknown_product_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v2/product/0000.json"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v2/product/1111.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": "1111",
                "status": 0,
                "status_verbose": "product not found"
            })))
            .mount(&server)
            .await;

        let client = client_for(&server, 10);
        assert!(client.get_by_key("0000").await.unwrap().is_none());
        assert!(client.get_by_key("1111").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_lookup_keeps_requested_code() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v2/product/012345678905.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": "0012345678905",
                "status": 1,
                "product": { "code": "0012345678905", "product_name": "Cola Zero" }
            })))
            .mount(&server)
            .await;

        let item = client_for(&server, 10)
            .get_by_key("012345678905")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(item.key, "012345678905");
    }

    #[tokio::test]
    async fn test_lookup_key_cannot_escape_product_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/cgi/search.pl"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": "x",
                "status": 1,
                "product": { "code": "x", "product_name": "Injected" }
            })))
            .expect(0)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path_regex(r"^/api/v2/product/[^/]+\.json$"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": 0 })))
            .expect(2)
            .mount(&server)
            .await;

        let client = client_for(&server, 10);
        assert!(client.get_by_key("../../../cgi/search.pl?x=").await.unwrap().is_none());
        assert!(client.get_by_key("123/../../cgi/search.pl").await.unwrap().is_none());

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 2);
        for request in requests {
            assert!(request.url.path().starts_with("/api/v2/product/"));
            assert!(request.url.query().is_none());
        }
    }

    #[tokio::test]
    async fn test_search_drops_unnamed_products() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/cgi/search.pl"))
            .and(query_param("search_terms", "skyr"))
            .and(query_param("page_size", "5"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "count": 3,
                "products": [
                    { "code": "1", "product_name": "Skyr Natur", "nutriments": {} },
                    { "code": "2", "product_name": "" },
                    { "product_name": "Skyr ohne Code" }
                ]
            })))
            .mount(&server)
            .await;

        let items = client_for(&server, 10).search("skyr", 5).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].key, "1");
    }

    #[tokio::test]
    async fn test_http_429_maps_to_rate_limit() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let err = client_for(&server, 10).search("eier", 5).await.unwrap_err();
        assert!(matches!(err, ServiceError::RateLimitExceeded));
    }

    #[tokio::test]
    async fn test_server_error_is_network_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = client_for(&server, 10).get_by_key("123").await.unwrap_err();
        assert!(matches!(err, ServiceError::Network(_)));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_client_side_budget_fails_fast() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .expect(2)
            .mount(&server)
            .await;

        let client = client_for(&server, 2);
        assert!(client.get_by_key("1").await.unwrap().is_none());
        assert!(client.get_by_key("2").await.unwrap().is_none());
        let err = client.get_by_key("3").await.unwrap_err();
        assert!(matches!(err, ServiceError::RateLimitExceeded));
    }

    #[test]
    fn test_rate_limiter_window() {
        let mut limiter = RateLimiter::new(1, Duration::from_millis(20));
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());
        std::thread::sleep(Duration::from_millis(30));
        assert!(limiter.try_acquire());
    }
}
