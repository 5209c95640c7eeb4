//! PostgREST client for the Supabase `rest/v1` API.
//!
//! Every request authenticates with the service key (sent both as `apikey`
//! and as a bearer token), is retried on transient failures and is recorded
//! in the request metrics.

use std::time::{Duration, Instant};

use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info_span, Instrument};

use crate::error::{DbError, DbResult};
use crate::metrics::record_request;
use crate::retry::{with_retry, RetryConfig};

/// Row store client configuration.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Project URL, e.g. `https://xyz.supabase.co`
    pub url: String,
    /// Service role key
    pub service_key: String,
    /// Request timeout
    pub timeout: Duration,
    /// Connect timeout
    pub connect_timeout: Duration,
    /// Retry configuration
    pub retry: RetryConfig,
}

impl DbConfig {
    pub fn new(url: impl Into<String>, service_key: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            service_key: service_key.into(),
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(5),
            retry: RetryConfig::default(),
        }
    }

    /// Create config from environment variables.
    pub fn from_env() -> DbResult<Self> {
        let url = std::env::var("SUPABASE_URL")
            .ok()
            .filter(|v| !v.is_empty())
            .ok_or_else(|| DbError::config_error("SUPABASE_URL must be set to access the row store"))?;
        let service_key = std::env::var("SUPABASE_SERVICE_KEY")
            .ok()
            .filter(|v| !v.is_empty())
            .ok_or_else(|| DbError::config_error("SUPABASE_SERVICE_KEY must be set to access the row store"))?;

        let connect_timeout_secs: u64 = std::env::var("DB_CONNECT_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(5);

        Ok(Self {
            connect_timeout: Duration::from_secs(connect_timeout_secs),
            retry: RetryConfig::from_env(),
            ..Self::new(url, service_key)
        })
    }

    /// Whether the row store variables are present.
    pub fn is_configured() -> bool {
        ["SUPABASE_URL", "SUPABASE_SERVICE_KEY"]
            .iter()
            .all(|name| std::env::var(name).map(|v| !v.is_empty()).unwrap_or(false))
    }
}

/// Equality filter on a column (`column=eq.value`).
#[derive(Debug, Clone)]
pub struct Filter {
    column: String,
    value: String,
}

impl Filter {
    pub fn eq(column: impl Into<String>, value: impl ToString) -> Self {
        Self {
            column: column.into(),
            value: value.to_string(),
        }
    }

    fn to_query(&self) -> (String, String) {
        (self.column.clone(), format!("eq.{}", self.value))
    }
}

/// PostgREST client.
#[derive(Debug, Clone)]
pub struct RestClient {
    http: Client,
    config: DbConfig,
    base_url: String,
}

impl RestClient {
    pub fn new(config: DbConfig) -> DbResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(10)
            .user_agent(concat!("shortify-db/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let base_url = format!("{}/rest/v1", config.url.trim_end_matches('/'));

        Ok(Self {
            http,
            config,
            base_url,
        })
    }

    /// Create from environment variables.
    pub fn from_env() -> DbResult<Self> {
        Self::new(DbConfig::from_env()?)
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/{}", self.base_url, table)
    }

    /// `GET /{table}?select=*&filters`.
    pub async fn select<T: DeserializeOwned>(
        &self,
        table: &str,
        filters: &[Filter],
        limit: Option<usize>,
    ) -> DbResult<Vec<T>> {
        let mut query: Vec<(String, String)> = vec![("select".to_string(), "*".to_string())];
        query.extend(filters.iter().map(Filter::to_query));
        if let Some(limit) = limit {
            query.push(("limit".to_string(), limit.to_string()));
        }

        self.execute("select", table, Method::GET, query, None).await
    }

    /// `POST /{table}`, returning the inserted rows.
    pub async fn insert<B, T>(&self, table: &str, row: &B) -> DbResult<Vec<T>>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let body = serde_json::to_value(row)?;
        self.execute("insert", table, Method::POST, Vec::new(), Some(body))
            .await
    }

    /// `PATCH /{table}?filters`, returning the rows that matched.
    ///
    /// An empty result means no row satisfied the filters, which callers use
    /// as a failed compare-and-swap.
    pub async fn update<B, T>(&self, table: &str, filters: &[Filter], patch: &B) -> DbResult<Vec<T>>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        if filters.is_empty() {
            return Err(DbError::request_failed("refusing unfiltered update"));
        }
        let body = serde_json::to_value(patch)?;
        let query = filters.iter().map(Filter::to_query).collect();
        self.execute("update", table, Method::PATCH, query, Some(body))
            .await
    }

    /// Verify the REST endpoint answers with the configured key.
    pub async fn check_connectivity(&self) -> DbResult<()> {
        let response = self
            .http
            .get(format!("{}/", self.base_url))
            .header("apikey", &self.config.service_key)
            .bearer_auth(&self.config.service_key)
            .send()
            .await?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(Self::error_from_response(response).await)
        }
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        operation: &str,
        table: &str,
        method: Method,
        query: Vec<(String, String)>,
        body: Option<serde_json::Value>,
    ) -> DbResult<T> {
        let url = self.table_url(table);
        let span = info_span!("db_request", operation = %operation, table = %table);

        let client = self;
        let url = url.as_str();
        let method = &method;
        let query = &query;
        let body = body.as_ref();

        let start = Instant::now();
        let result = with_retry(&self.config.retry, operation, || async move {
            let mut request = client
                .http
                .request(method.clone(), url)
                .header("apikey", &client.config.service_key)
                .bearer_auth(&client.config.service_key)
                .query(query);
            if let Some(body) = body {
                request = request.header("Prefer", "return=representation").json(body);
            }

            let response = request.send().await?;
            if !response.status().is_success() {
                return Err(Self::error_from_response(response).await);
            }
            Ok(response.json::<T>().await?)
        })
        .instrument(span)
        .await;

        let latency_ms = start.elapsed().as_millis() as f64;
        let status = match &result {
            Ok(_) => 200,
            Err(e) => e.http_status().unwrap_or(500),
        };
        record_request(operation, status, latency_ms);
        debug!(operation, table, status, latency_ms, "Row store request finished");

        result
    }

    async fn error_from_response(response: reqwest::Response) -> DbError {
        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_ms = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(|secs| secs * 1000);
            return DbError::RateLimited { retry_after_ms };
        }

        let url = response.url().path().to_string();
        let body = response.text().await.unwrap_or_default();
        DbError::from_http_status(status.as_u16(), format!("{} failed: {}", url, body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;
    use serial_test::serial;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(Debug, Deserialize, PartialEq)]
    struct Row {
        id: i64,
    }

    fn test_client(server: &MockServer) -> RestClient {
        let mut config = DbConfig::new(server.uri(), "service-key");
        config.retry = RetryConfig {
            max_retries: 2,
            base_delay_ms: 1,
            max_delay_ms: 2,
        };
        RestClient::new(config).unwrap()
    }

    #[tokio::test]
    async fn test_select_sends_filters_and_auth() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/items"))
            .and(query_param("select", "*"))
            .and(query_param("owner", "eq.u1"))
            .and(header("apikey", "service-key"))
            .and(header("authorization", "Bearer service-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": 1}])))
            .mount(&server)
            .await;

        let rows: Vec<Row> = test_client(&server)
            .select("items", &[Filter::eq("owner", "u1")], None)
            .await
            .unwrap();
        assert_eq!(rows, vec![Row { id: 1 }]);
    }

    #[tokio::test]
    async fn test_insert_requests_representation() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/items"))
            .and(header("prefer", "return=representation"))
            .and(body_json(json!({"id": 5})))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!([{"id": 5}])))
            .mount(&server)
            .await;

        let rows: Vec<Row> = test_client(&server)
            .insert("items", &json!({"id": 5}))
            .await
            .unwrap();
        assert_eq!(rows, vec![Row { id: 5 }]);
    }

    #[tokio::test]
    async fn test_conflict_maps_to_already_exists() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(409).set_body_string("duplicate key"))
            .mount(&server)
            .await;

        let result: DbResult<Vec<Row>> = test_client(&server).insert("items", &json!({"id": 5})).await;
        assert!(matches!(result, Err(DbError::AlreadyExists(_))));
    }

    #[tokio::test]
    async fn test_server_errors_are_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;

        let rows: Vec<Row> = test_client(&server).select("items", &[], None).await.unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn test_update_requires_filters() {
        let server = MockServer::start().await;
        let result: DbResult<Vec<Row>> = test_client(&server)
            .update("items", &[], &json!({"id": 1}))
            .await;
        assert!(matches!(result, Err(DbError::RequestFailed(_))));
    }

    #[test]
    #[serial]
    fn test_config_from_env_requires_url() {
        std::env::remove_var("SUPABASE_URL");
        std::env::set_var("SUPABASE_SERVICE_KEY", "key");
        assert!(matches!(DbConfig::from_env(), Err(DbError::ConfigError(_))));
        assert!(!DbConfig::is_configured());
        std::env::remove_var("SUPABASE_SERVICE_KEY");
    }

    #[test]
    #[serial]
    fn test_config_default_values() {
        std::env::set_var("SUPABASE_URL", "https://project.supabase.co/");
        std::env::set_var("SUPABASE_SERVICE_KEY", "key");
        std::env::remove_var("DB_CONNECT_TIMEOUT_SECS");

        let config = DbConfig::from_env().unwrap();
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
        let client = RestClient::new(config).unwrap();
        assert_eq!(client.table_url("shorts"), "https://project.supabase.co/rest/v1/shorts");

        std::env::remove_var("SUPABASE_URL");
        std::env::remove_var("SUPABASE_SERVICE_KEY");
    }
}
