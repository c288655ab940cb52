use std::collections::HashMap;

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::{
    application::repos::{LikesRepo, RepoError, UpsertLike},
    domain::{
        entities::{LikeActionRecord, RecentLike},
        types::ActionType,
    },
};

use super::{PostgresRepositories, map_sqlx_error};

#[derive(sqlx::FromRow)]
struct LikeRow {
    actor_id: i64,
    liking_id: i64,
    target_owner_id: i64,
    action_type: ActionType,
    canceled: bool,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<LikeRow> for LikeActionRecord {
    fn from(row: LikeRow) -> Self {
        Self {
            actor_id: row.actor_id,
            liking_id: row.liking_id,
            target_owner_id: row.target_owner_id,
            action_type: row.action_type,
            canceled: row.canceled,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct RecentRow {
    liking_id: i64,
    updated_at: OffsetDateTime,
}

#[derive(sqlx::FromRow)]
struct TargetCountRow {
    liking_id: i64,
    count: i64,
}

#[async_trait]
impl LikesRepo for PostgresRepositories {
    async fn count_by_target(
        &self,
        action_type: ActionType,
        liking_id: i64,
    ) -> Result<i64, RepoError> {
        sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*)
              FROM like_actions
             WHERE action_type = $1
               AND liking_id = $2
               AND canceled = FALSE
            "#,
        )
        .bind(action_type)
        .bind(liking_id)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)
    }

    async fn count_by_targets(
        &self,
        action_type: ActionType,
        liking_ids: &[i64],
    ) -> Result<HashMap<i64, i64>, RepoError> {
        if liking_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let rows = sqlx::query_as::<_, TargetCountRow>(
            r#"
            SELECT liking_id, COUNT(*) AS count
              FROM like_actions
             WHERE action_type = $1
               AND liking_id = ANY($2)
               AND canceled = FALSE
             GROUP BY liking_id
            "#,
        )
        .bind(action_type)
        .bind(liking_ids)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows
            .into_iter()
            .map(|row| (row.liking_id, row.count))
            .collect())
    }

    async fn count_by_owner(&self, owner_id: i64) -> Result<i64, RepoError> {
        sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*)
              FROM like_actions
             WHERE target_owner_id = $1
               AND canceled = FALSE
            "#,
        )
        .bind(owner_id)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)
    }

    async fn count_by_actor(
        &self,
        actor_id: i64,
        action_type: ActionType,
    ) -> Result<i64, RepoError> {
        sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*)
              FROM like_actions
             WHERE actor_id = $1
               AND action_type = $2
               AND canceled = FALSE
            "#,
        )
        .bind(actor_id)
        .bind(action_type)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)
    }

    async fn recent_by_actor(
        &self,
        actor_id: i64,
        action_type: ActionType,
        offset: u64,
        limit: u32,
    ) -> Result<Vec<RecentLike>, RepoError> {
        let offset: i64 = offset
            .try_into()
            .map_err(|_| RepoError::from_persistence("offset exceeds supported range"))?;

        let rows = sqlx::query_as::<_, RecentRow>(
            r#"
            SELECT liking_id, updated_at
              FROM like_actions
             WHERE actor_id = $1
               AND action_type = $2
               AND canceled = FALSE
             ORDER BY updated_at DESC, liking_id DESC
             LIMIT $3 OFFSET $4
            "#,
        )
        .bind(actor_id)
        .bind(action_type)
        .bind(i64::from(limit))
        .bind(offset)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows
            .into_iter()
            .map(|row| RecentLike {
                liking_id: row.liking_id,
                updated_at: row.updated_at,
            })
            .collect())
    }

    async fn find_like(
        &self,
        actor_id: i64,
        liking_id: i64,
        action_type: ActionType,
    ) -> Result<Option<LikeActionRecord>, RepoError> {
        let row = sqlx::query_as::<_, LikeRow>(
            r#"
            SELECT actor_id,
                   liking_id,
                   target_owner_id,
                   action_type,
                   canceled,
                   created_at,
                   updated_at
              FROM like_actions
             WHERE actor_id = $1
               AND liking_id = $2
               AND action_type = $3
            "#,
        )
        .bind(actor_id)
        .bind(liking_id)
        .bind(action_type)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(Into::into))
    }

    async fn upsert_like(&self, like: UpsertLike) -> Result<LikeActionRecord, RepoError> {
        let row = sqlx::query_as::<_, LikeRow>(
            r#"
            INSERT INTO like_actions (
                actor_id,
                liking_id,
                target_owner_id,
                action_type,
                canceled,
                created_at,
                updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $6)
            ON CONFLICT (actor_id, liking_id, action_type) DO UPDATE
               SET canceled = EXCLUDED.canceled,
                   target_owner_id = EXCLUDED.target_owner_id,
                   updated_at = EXCLUDED.updated_at
            RETURNING actor_id,
                      liking_id,
                      target_owner_id,
                      action_type,
                      canceled,
                      created_at,
                      updated_at
            "#,
        )
        .bind(like.actor_id)
        .bind(like.liking_id)
        .bind(like.target_owner_id)
        .bind(like.action_type)
        .bind(like.canceled)
        .bind(like.at)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.into())
    }
}
