use metrics::counter;
use time::OffsetDateTime;
use tracing::{error, info, instrument};

use crate::application::events::{LIKE_CREATED_TOPIC, publish_json};
use crate::application::repos::UpsertLike;
use crate::cache::{CacheError, ToggleOutcome, ToggleScript};
use crate::cache::keys::member;
use crate::cache::user_actions::HYDRATED_MEMBER;
use crate::domain::likes::{LikeCreated, LikeRequest};
use crate::domain::types::{ActionType, CounterScope};

use super::service::LikeService;
use super::types::LikeError;

const METRIC_LIKE_APPLIED: &str = "kudos_like_applied_total";
const METRIC_LIKE_NOOP: &str = "kudos_like_noop_total";

impl LikeService {
    /// Likes (`is_cancel = false`) or unlikes a target on behalf of `actor_id`.
    ///
    /// The cache toggle decides the outcome; the like row and the
    /// [`LikeCreated`] event follow an applied toggle.
    #[instrument(skip(self))]
    pub async fn like(
        &self,
        actor_id: i64,
        target_id: i64,
        action_type: ActionType,
        is_cancel: bool,
    ) -> Result<(), LikeError> {
        let request = LikeRequest::new(actor_id, target_id, action_type, is_cancel)?;

        let Some(owner_id) = self.resolve_target(action_type, target_id).await? else {
            return Err(LikeError::NotFound {
                action_type,
                id: target_id,
            });
        };

        self.warm_object_counter(action_type, target_id).await?;
        self.warm_owner_counter(owner_id).await?;
        self.ensure_hydrated(actor_id, action_type).await?;

        let now = OffsetDateTime::now_utc();
        let script = self.toggle_script(&request, owner_id, now);
        let mut outcome = self.toggle(&script).await?;
        if outcome == ToggleOutcome::Cold {
            self.hydrate(actor_id, action_type).await?;
            outcome = self.toggle(&script).await?;
        }

        match outcome {
            ToggleOutcome::Applied => {}
            ToggleOutcome::Noop => {
                counter!(METRIC_LIKE_NOOP, "action_type" => action_type.as_str()).increment(1);
                return Err(if is_cancel {
                    LikeError::NotActive {
                        actor_id,
                        target_id,
                        action_type,
                    }
                } else {
                    LikeError::AlreadyActive {
                        actor_id,
                        target_id,
                        action_type,
                    }
                });
            }
            ToggleOutcome::Cold => {
                return Err(LikeError::cache_write(CacheError::unavailable(format!(
                    "user action set `{}` was evicted during the toggle",
                    script.set_key
                ))));
            }
        }

        counter!(
            METRIC_LIKE_APPLIED,
            "action_type" => action_type.as_str(),
            "op" => if is_cancel { "unlike" } else { "like" }
        )
        .increment(1);

        let upsert = UpsertLike {
            actor_id,
            liking_id: target_id,
            target_owner_id: owner_id,
            action_type,
            canceled: is_cancel,
            at: now,
        };
        if let Err(source) = self.likes.upsert_like(upsert).await {
            error!(
                target = "kudos::application::likes",
                actor_id,
                target_id,
                owner_id,
                action_type = %action_type,
                is_cancel,
                error = %source,
                "Like applied in cache but the like row was not written"
            );
            return Err(LikeError::InconsistentState {
                actor_id,
                target_id,
                action_type,
                source,
            });
        }

        let event = LikeCreated::new(&request, owner_id, now);
        publish_json(self.publisher.as_ref(), LIKE_CREATED_TOPIC, &event).await?;

        info!(
            target = "kudos::application::likes",
            actor_id,
            target_id,
            owner_id,
            action_type = %action_type,
            is_cancel,
            "Like recorded"
        );
        Ok(())
    }

    fn toggle_script(
        &self,
        request: &LikeRequest,
        owner_id: i64,
        now: OffsetDateTime,
    ) -> ToggleScript {
        ToggleScript {
            set_key: self
                .user_actions
                .key(request.actor_id, request.action_type),
            hydrated_member: HYDRATED_MEMBER.to_string(),
            member: member(request.target_id),
            score: now.unix_timestamp(),
            cancel: request.is_cancel,
            delta: request.delta(),
            counters: vec![
                self.counters
                    .field(CounterScope::Object(request.action_type), request.target_id),
                self.counters.field(CounterScope::OwnerTotal, owner_id),
            ],
            counter_ttl: self.counters.ttl(),
        }
    }

    async fn toggle(&self, script: &ToggleScript) -> Result<ToggleOutcome, LikeError> {
        self.cache
            .toggle(script)
            .await
            .map_err(LikeError::cache_write)
    }
}
