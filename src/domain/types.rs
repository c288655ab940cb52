//! Shared domain enumerations aligned with persisted database enums.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Kind of object a like targets (mirrors Postgres enum `like_action_type`).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "like_action_type", rename_all = "snake_case")]
pub enum ActionType {
    Post,
    Comment,
    User,
}

impl ActionType {
    pub const ALL: [ActionType; 3] = [ActionType::Post, ActionType::Comment, ActionType::User];

    pub fn as_str(self) -> &'static str {
        match self {
            ActionType::Post => "post",
            ActionType::Comment => "comment",
            ActionType::User => "user",
        }
    }
}

impl TryFrom<&str> for ActionType {
    type Error = ();

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "post" => Ok(ActionType::Post),
            "comment" => Ok(ActionType::Comment),
            "user" => Ok(ActionType::User),
            _ => Err(()),
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Namespace of a like counter.
///
/// `Object` counts likes on the object itself; `OwnerTotal` counts every active
/// like received by a user across everything they own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "action_type")]
pub enum CounterScope {
    Object(ActionType),
    OwnerTotal,
}

impl CounterScope {
    pub const ALL: [CounterScope; 4] = [
        CounterScope::Object(ActionType::Post),
        CounterScope::Object(ActionType::Comment),
        CounterScope::Object(ActionType::User),
        CounterScope::OwnerTotal,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            CounterScope::Object(action_type) => action_type.as_str(),
            CounterScope::OwnerTotal => "owner_total",
        }
    }
}

impl From<ActionType> for CounterScope {
    fn from(value: ActionType) -> Self {
        CounterScope::Object(value)
    }
}

impl fmt::Display for CounterScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
