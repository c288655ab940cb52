use async_trait::async_trait;

use crate::{
    application::repos::{ObjectResolver, RepoError},
    domain::types::ActionType,
};

use super::{PostgresRepositories, map_sqlx_error};

/// Owner lookup per likeable table. A user owns itself.
fn owner_query(action_type: ActionType) -> &'static str {
    match action_type {
        ActionType::Post => "SELECT author_id FROM posts WHERE id = $1",
        ActionType::Comment => "SELECT author_id FROM comments WHERE id = $1",
        ActionType::User => "SELECT id FROM users WHERE id = $1",
    }
}

#[async_trait]
impl ObjectResolver for PostgresRepositories {
    async fn resolve_owner(
        &self,
        action_type: ActionType,
        object_id: i64,
    ) -> Result<Option<i64>, RepoError> {
        sqlx::query_scalar::<_, i64>(owner_query(action_type))
            .bind(object_id)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)
    }
}
