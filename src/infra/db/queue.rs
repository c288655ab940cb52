//! Event publishing into the `apalis.jobs` table.
//!
//! Each topic is an apalis job type, so the batch-count consumers registered
//! with the same namespace pick the payloads up.

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::application::events::{EventPublisher, PublishError};

use super::PostgresRepositories;

const MAX_ATTEMPTS: i32 = 25;

#[async_trait]
impl EventPublisher for PostgresRepositories {
    async fn publish(&self, topic: &str, payload: Value) -> Result<(), PublishError> {
        let id = sqlx::query_scalar::<_, String>(
            "SELECT (apalis.push_job($1, $2::json, 'Pending', now(), $3, 0)).id",
        )
        .bind(topic)
        .bind(payload)
        .bind(MAX_ATTEMPTS)
        .fetch_one(self.pool())
        .await
        .map_err(|err| PublishError::transport(topic, err))?;

        debug!(
            target = "kudos::infra::db::queue",
            topic,
            job_id = %id,
            "Event enqueued"
        );
        Ok(())
    }
}
