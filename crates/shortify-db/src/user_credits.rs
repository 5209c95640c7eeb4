//! User credits repository.
//!
//! Rows live in the `user_credits` table. Decrements use an optimistic
//! compare-and-swap: the PATCH is filtered on the credit value that was just
//! read, so a concurrent writer makes it match zero rows and the loop retries.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use shortify_models::{Tier, DEFAULT_STARTING_CREDITS};

use crate::client::{Filter, RestClient};
use crate::error::{DbError, DbResult};

const TABLE: &str = "user_credits";

/// Maximum attempts for a compare-and-swap decrement.
const MAX_CREDIT_RETRIES: u32 = 5;

/// Base delay for backoff between attempts (milliseconds).
const RETRY_BASE_DELAY_MS: u64 = 50;

/// A `user_credits` row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserCredits {
    pub user_id: String,
    pub credits: i64,
    #[serde(default = "default_tier")]
    pub tier: String,
}

fn default_tier() -> String {
    Tier::Free.as_str().to_string()
}

impl UserCredits {
    /// Record for a user seen for the first time.
    pub fn starter(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            credits: DEFAULT_STARTING_CREDITS,
            tier: default_tier(),
        }
    }

    pub fn tier(&self) -> Tier {
        Tier::parse(&self.tier)
    }

    pub fn has_credits(&self) -> bool {
        self.credits >= 1
    }
}

#[derive(Serialize)]
struct CreditsPatch {
    credits: i64,
}

/// Repository for `user_credits` rows.
#[derive(Debug, Clone)]
pub struct UserCreditsRepository {
    client: RestClient,
}

impl UserCreditsRepository {
    pub fn new(client: RestClient) -> Self {
        Self { client }
    }

    /// Fetch the row for `user_id`.
    pub async fn get(&self, user_id: &str) -> DbResult<Option<UserCredits>> {
        let rows: Vec<UserCredits> = self
            .client
            .select(TABLE, &[Filter::eq("user_id", user_id)], Some(1))
            .await?;
        Ok(rows.into_iter().next())
    }

    /// Fetch the row, creating a starter row if the user has none.
    pub async fn get_or_create(&self, user_id: &str) -> DbResult<UserCredits> {
        if let Some(existing) = self.get(user_id).await? {
            return Ok(existing);
        }

        let starter = UserCredits::starter(user_id);
        match self.client.insert::<_, UserCredits>(TABLE, &starter).await {
            Ok(rows) => {
                info!(user_id, credits = starter.credits, "Created credit record");
                Ok(rows.into_iter().next().unwrap_or(starter))
            }
            // Lost a race with another first request from the same user.
            Err(DbError::AlreadyExists(_)) => self
                .get(user_id)
                .await?
                .ok_or_else(|| DbError::not_found(format!("user_credits/{user_id}"))),
            Err(e) => Err(e),
        }
    }

    /// Take one credit from the user, returning the remaining balance.
    pub async fn decrement(&self, user_id: &str) -> DbResult<i64> {
        for attempt in 0..MAX_CREDIT_RETRIES {
            let current = self
                .get(user_id)
                .await?
                .ok_or_else(|| DbError::not_found(format!("user_credits/{user_id}")))?;

            if current.credits < 1 {
                return Err(DbError::precondition_failed(format!(
                    "user {user_id} has no credits left"
                )));
            }

            let remaining = current.credits - 1;
            let updated: Vec<UserCredits> = self
                .client
                .update(
                    TABLE,
                    &[
                        Filter::eq("user_id", user_id),
                        Filter::eq("credits", current.credits),
                    ],
                    &CreditsPatch { credits: remaining },
                )
                .await?;

            if !updated.is_empty() {
                info!(user_id, remaining, "Decremented credits");
                return Ok(remaining);
            }

            debug!(
                user_id,
                attempt = attempt + 1,
                "Credit balance changed concurrently, retrying"
            );
            let delay = Duration::from_millis(RETRY_BASE_DELAY_MS * (attempt as u64 + 1));
            tokio::time::sleep(delay).await;
        }

        warn!(user_id, retries = MAX_CREDIT_RETRIES, "Credit decrement failed after retries");
        Err(DbError::precondition_failed(
            "failed to decrement credits due to concurrent updates",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::DbConfig;
    use crate::retry::RetryConfig;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn repo(server: &MockServer) -> UserCreditsRepository {
        let mut config = DbConfig::new(server.uri(), "service-key");
        config.retry = RetryConfig {
            max_retries: 1,
            base_delay_ms: 1,
            max_delay_ms: 1,
        };
        UserCreditsRepository::new(RestClient::new(config).unwrap())
    }

    async fn mount_row(server: &MockServer, credits: i64) {
        Mock::given(method("GET"))
            .and(path("/rest/v1/user_credits"))
            .and(query_param("user_id", "eq.u1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"user_id": "u1", "credits": credits, "tier": "free"}
            ])))
            .mount(server)
            .await;
    }

    #[test]
    fn test_starter_record() {
        let starter = UserCredits::starter("u1");
        assert_eq!(starter.credits, DEFAULT_STARTING_CREDITS);
        assert_eq!(starter.tier(), Tier::Free);
        assert!(starter.has_credits());
    }

    #[test]
    fn test_missing_tier_defaults_to_free() {
        let row: UserCredits = serde_json::from_value(json!({"user_id": "u1", "credits": 0})).unwrap();
        assert_eq!(row.tier(), Tier::Free);
        assert!(!row.has_credits());
    }

    #[tokio::test]
    async fn test_get_or_create_inserts_missing_user() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/user_credits"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/user_credits"))
            .and(body_json(json!({"user_id": "u1", "credits": 2, "tier": "free"})))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!([
                {"user_id": "u1", "credits": 2, "tier": "free"}
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let row = repo(&server).get_or_create("u1").await.unwrap();
        assert_eq!(row.credits, 2);
    }

    #[tokio::test]
    async fn test_get_or_create_returns_existing_row() {
        let server = MockServer::start().await;
        mount_row(&server, 7).await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(201))
            .expect(0)
            .mount(&server)
            .await;

        let row = repo(&server).get_or_create("u1").await.unwrap();
        assert_eq!(row.credits, 7);
    }

    #[tokio::test]
    async fn test_decrement_uses_compare_and_swap() {
        let server = MockServer::start().await;
        mount_row(&server, 2).await;
        Mock::given(method("PATCH"))
            .and(path("/rest/v1/user_credits"))
            .and(query_param("credits", "eq.2"))
            .and(body_json(json!({"credits": 1})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"user_id": "u1", "credits": 1, "tier": "free"}
            ])))
            .expect(1)
            .mount(&server)
            .await;

        assert_eq!(repo(&server).decrement("u1").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_decrement_retries_when_row_changed() {
        let server = MockServer::start().await;
        mount_row(&server, 2).await;
        Mock::given(method("PATCH"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"user_id": "u1", "credits": 1, "tier": "free"}
            ])))
            .mount(&server)
            .await;

        assert_eq!(repo(&server).decrement("u1").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_decrement_refuses_empty_balance() {
        let server = MockServer::start().await;
        mount_row(&server, 0).await;

        let err = repo(&server).decrement("u1").await.unwrap_err();
        assert!(matches!(err, DbError::PreconditionFailed(_)));
    }
}
