use std::collections::BTreeMap;

use async_trait::async_trait;
use sqlx::{Postgres, QueryBuilder};

use crate::{
    application::repos::{CounterWriteRepo, RepoError},
    domain::types::{ActionType, CounterScope},
};

use super::{PostgresRepositories, map_sqlx_error};

/// Table and column holding the persisted count of `scope`.
fn counter_column(scope: CounterScope) -> (&'static str, &'static str) {
    match scope {
        CounterScope::Object(ActionType::Post) => ("posts", "like_count"),
        CounterScope::Object(ActionType::Comment) => ("comments", "like_count"),
        CounterScope::Object(ActionType::User) => ("users", "like_count"),
        CounterScope::OwnerTotal => ("users", "received_like_count"),
    }
}

#[async_trait]
impl CounterWriteRepo for PostgresRepositories {
    async fn apply_counts(
        &self,
        scope: CounterScope,
        counts: &BTreeMap<i64, i64>,
    ) -> Result<u64, RepoError> {
        if counts.is_empty() {
            return Ok(0);
        }

        let (table, column) = counter_column(scope);
        let ids: Vec<i64> = counts.keys().copied().collect();
        let values: Vec<i64> = counts.values().map(|count| (*count).max(0)).collect();

        let mut qb: QueryBuilder<'_, Postgres> = QueryBuilder::new("UPDATE ");
        qb.push(table);
        qb.push(" SET ");
        qb.push(column);
        qb.push(" = v.count FROM UNNEST(");
        qb.push_bind(ids);
        qb.push("::bigint[], ");
        qb.push_bind(values);
        qb.push("::bigint[]) AS v(id, count) WHERE ");
        qb.push(table);
        qb.push(".id = v.id");

        let result = qb
            .build()
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(result.rows_affected())
    }
}
