//! Like requests and the events they produce.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::{
    error::DomainError,
    types::{ActionType, CounterScope},
};

/// A validated like or unlike request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LikeRequest {
    pub actor_id: i64,
    pub target_id: i64,
    pub action_type: ActionType,
    pub is_cancel: bool,
}

impl LikeRequest {
    pub fn new(
        actor_id: i64,
        target_id: i64,
        action_type: ActionType,
        is_cancel: bool,
    ) -> Result<Self, DomainError> {
        ensure_object_id(actor_id, "actor_id")?;
        ensure_object_id(target_id, "target_id")?;
        Ok(Self {
            actor_id,
            target_id,
            action_type,
            is_cancel,
        })
    }

    /// Counter delta applied when this request takes effect.
    pub fn delta(&self) -> i64 {
        if self.is_cancel { -1 } else { 1 }
    }
}

/// A like or unlike queued for the engine by another service.
///
/// Carried unvalidated; the engine checks it like any direct call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LikeCommand {
    pub actor_id: i64,
    pub target_id: i64,
    pub action_type: ActionType,
    #[serde(default)]
    pub is_cancel: bool,
}

/// Ids are positive; zero and negatives are reserved for cache bookkeeping.
pub fn ensure_object_id(id: i64, field: &'static str) -> Result<(), DomainError> {
    if id <= 0 {
        return Err(DomainError::validation(format!(
            "`{field}` must be a positive id, got {id}"
        )));
    }
    Ok(())
}

/// Emitted after a like or unlike has been applied and recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LikeCreated {
    pub event_id: Uuid,
    pub actor_id: i64,
    pub target_id: i64,
    pub owner_id: i64,
    pub action_type: ActionType,
    pub is_cancel: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

impl LikeCreated {
    pub fn new(request: &LikeRequest, owner_id: i64, timestamp: OffsetDateTime) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            actor_id: request.actor_id,
            target_id: request.target_id,
            owner_id,
            action_type: request.action_type,
            is_cancel: request.is_cancel,
            timestamp,
        }
    }
}

/// Absolute like counts for one counter scope, produced by a flush cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchCount {
    pub scope: CounterScope,
    #[serde(with = "count_pairs")]
    pub counts: BTreeMap<i64, i64>,
}

impl BatchCount {
    pub fn new(scope: CounterScope, counts: impl IntoIterator<Item = (i64, i64)>) -> Self {
        Self {
            scope,
            counts: counts.into_iter().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }
}

/// Counts travel as `[[id, count], ...]` so integer ids never become JSON object keys.
mod count_pairs {
    use std::collections::BTreeMap;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(counts: &BTreeMap<i64, i64>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_seq(counts.iter())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<BTreeMap<i64, i64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let pairs = Vec::<(i64, i64)>::deserialize(deserializer)?;
        Ok(pairs.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_positive_ids() {
        assert!(LikeRequest::new(0, 1, ActionType::Post, false).is_err());
        assert!(LikeRequest::new(1, -4, ActionType::Post, false).is_err());
        assert!(LikeRequest::new(1, 4, ActionType::Post, false).is_ok());
    }

    #[test]
    fn delta_follows_cancel_flag() {
        let like = LikeRequest::new(1, 2, ActionType::Comment, false).expect("valid");
        let unlike = LikeRequest::new(1, 2, ActionType::Comment, true).expect("valid");
        assert_eq!(like.delta(), 1);
        assert_eq!(unlike.delta(), -1);
    }

    #[test]
    fn like_command_defaults_to_a_like() {
        let command: LikeCommand = serde_json::from_value(serde_json::json!({
            "actor_id": 4,
            "target_id": 8,
            "action_type": "comment"
        }))
        .expect("deserialize command");
        assert_eq!(
            command,
            LikeCommand {
                actor_id: 4,
                target_id: 8,
                action_type: ActionType::Comment,
                is_cancel: false,
            }
        );
    }

    #[test]
    fn batch_count_survives_json_transport() {
        let batch = BatchCount::new(
            CounterScope::Object(ActionType::Post),
            [(9, 1), (3, 4), (5, 0)],
        );
        let json = serde_json::to_value(&batch).expect("serialize batch");
        let decoded: BatchCount = serde_json::from_value(json).expect("deserialize batch");
        assert_eq!(decoded, batch);
        assert_eq!(decoded.counts.get(&3), Some(&4));
    }
}
