//! API configuration.

use std::time::Duration;

/// Variables that must be set when running in production.
const REQUIRED_IN_PRODUCTION: &[&str] = &[
    "SUPABASE_URL",
    "SUPABASE_SERVICE_KEY",
    "SUPABASE_JWT_SECRET",
    "STORAGE_ENDPOINT_URL",
    "STORAGE_BUCKET",
    "STORAGE_ACCESS_KEY_ID",
    "STORAGE_SECRET_ACCESS_KEY",
    "GEMINI_API_KEY",
    "SPEECH_API_KEY",
];

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// CORS origins
    pub cors_origins: Vec<String>,
    /// General API rate limit per client (requests per second)
    pub rate_limit_rps: u32,
    /// Job submissions allowed per user per minute
    pub submissions_per_minute: u32,
    /// Request timeout
    pub request_timeout: Duration,
    /// Largest accepted video upload
    pub max_upload_bytes: usize,
    /// HS256 secret of the identity service
    pub jwt_secret: Option<String>,
    /// Externally reachable base URL of this server
    pub public_url: Option<String>,
    /// Environment (development/production)
    pub environment: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            cors_origins: vec!["*".to_string()],
            rate_limit_rps: 20,
            submissions_per_minute: 10,
            request_timeout: Duration::from_secs(60),
            max_upload_bytes: 100 * 1024 * 1024, // 100MB
            jwt_secret: None,
            public_url: None,
            environment: "development".to_string(),
        }
    }
}

impl ApiConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("HOST").unwrap_or(defaults.host),
            port: env_parse("PORT").unwrap_or(defaults.port),
            cors_origins: std::env::var("CORS_ORIGINS")
                .map(|s| {
                    s.split(',')
                        .map(|o| o.trim().to_string())
                        .filter(|o| !o.is_empty())
                        .collect()
                })
                .unwrap_or(defaults.cors_origins),
            rate_limit_rps: env_parse("RATE_LIMIT_RPS").unwrap_or(defaults.rate_limit_rps),
            submissions_per_minute: env_parse("SUBMISSIONS_PER_MINUTE")
                .unwrap_or(defaults.submissions_per_minute),
            request_timeout: env_parse("REQUEST_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.request_timeout),
            max_upload_bytes: env_parse("MAX_UPLOAD_BYTES").unwrap_or(defaults.max_upload_bytes),
            jwt_secret: std::env::var("SUPABASE_JWT_SECRET")
                .ok()
                .filter(|s| !s.is_empty()),
            public_url: std::env::var("PUBLIC_URL")
                .ok()
                .map(|s| s.trim().trim_end_matches('/').to_string())
                .filter(|s| !s.is_empty()),
            environment: std::env::var("ENVIRONMENT").unwrap_or(defaults.environment),
        }
    }

    /// Base URL clients use to reach this server. Falls back to the bind
    /// address, with wildcard hosts replaced by `localhost`.
    pub fn public_base_url(&self) -> String {
        if let Some(url) = &self.public_url {
            return url.clone();
        }
        let host = match self.host.as_str() {
            "0.0.0.0" | "::" | "[::]" | "" => "localhost",
            host => host,
        };
        format!("http://{}:{}", host, self.port)
    }

    /// Base URL of objects served from memory when object storage is not
    /// configured.
    pub fn local_object_base_url(&self) -> String {
        format!("{}/objects", self.public_base_url())
    }

    /// Check if running in production mode.
    pub fn is_production(&self) -> bool {
        self.environment.to_lowercase() == "production"
    }

    /// Names of required variables that are missing.
    ///
    /// Only enforced in production; development falls back to in-memory
    /// storage and ledgers.
    pub fn missing_required(&self) -> Vec<&'static str> {
        if !self.is_production() {
            return Vec::new();
        }
        REQUIRED_IN_PRODUCTION
            .iter()
            .copied()
            .filter(|name| std::env::var(name).map(|v| v.trim().is_empty()).unwrap_or(true))
            .collect()
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.trim().parse().ok())
}
