//! Queued like commands applied by the intake worker.

mod support;

use apalis::prelude::{Data, Error as ApalisError};

use kudos::application::events::LIKE_CREATED_TOPIC;
use kudos::application::jobs::{
    IntakeContext, IntakeOutcome, handle_like_command, process_like_command_job,
};
use kudos::application::likes::LikeError;
use kudos::domain::likes::LikeCommand;
use kudos::domain::types::{ActionType, CounterScope};

use support::{P1, POSTS, U1, U2, flush_and_consume, harness};

fn command(actor_id: i64, target_id: i64, is_cancel: bool) -> LikeCommand {
    LikeCommand {
        actor_id,
        target_id,
        action_type: ActionType::Post,
        is_cancel,
    }
}

#[tokio::test]
async fn queued_likes_reach_the_counter_columns() {
    let h = harness();
    let ctx = IntakeContext {
        likes: h.service.clone(),
    };

    assert_eq!(
        handle_like_command(&ctx.likes, &command(U1, P1, false))
            .await
            .expect("apply"),
        IntakeOutcome::Applied
    );
    process_like_command_job(command(3, P1, false), Data::new(ctx.clone()))
        .await
        .expect("job");

    assert_eq!(h.queue.drain_topic(LIKE_CREATED_TOPIC).len(), 2);
    flush_and_consume(&h).await;
    assert_eq!(h.columns.get(POSTS, P1), Some(2));
    assert_eq!(h.columns.get(CounterScope::OwnerTotal, U2), Some(2));
}

#[tokio::test]
async fn rejected_commands_are_acknowledged() {
    let h = harness();
    let ctx = IntakeContext {
        likes: h.service.clone(),
    };
    handle_like_command(&ctx.likes, &command(U1, P1, false))
        .await
        .expect("apply");

    for rejected in [
        command(U1, P1, false),
        command(U2, P1, true),
        command(U1, 404, false),
        command(0, P1, false),
    ] {
        assert_eq!(
            handle_like_command(&ctx.likes, &rejected)
                .await
                .expect("dropped"),
            IntakeOutcome::Dropped,
            "{rejected:?}"
        );
        process_like_command_job(rejected, Data::new(ctx.clone()))
            .await
            .expect("acknowledged");
    }

    assert_eq!(
        h.service.like_count(P1, ActionType::Post).await.expect("count"),
        (1, true)
    );
}

#[tokio::test]
async fn store_outage_is_left_for_retry() {
    let h = harness();
    let ctx = IntakeContext {
        likes: h.service.clone(),
    };
    h.likes.set_target_counts_failing(true);

    let err = handle_like_command(&ctx.likes, &command(U1, P1, false))
        .await
        .expect_err("outage");
    assert!(matches!(err, LikeError::StoreUnavailable { .. }));
    let job = process_like_command_job(command(U1, P1, false), Data::new(ctx.clone())).await;
    assert!(matches!(job, Err(ApalisError::Failed(_))));
    assert!(h.queue.is_empty());

    h.likes.set_target_counts_failing(false);
    process_like_command_job(command(U1, P1, false), Data::new(ctx))
        .await
        .expect("retry");
    assert_eq!(
        h.service.like_count(P1, ActionType::Post).await.expect("count"),
        (1, true)
    );
}
