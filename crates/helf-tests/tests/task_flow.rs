use helf_chat::{SendOutcome, TASK_MESSAGES_TABLE, ViewStatus};
use helf_tests::harness::community::TestCommunity;
use helf_tests::harness::{ADA, BOB, CLEO, OTHER_TASK, TASK, next_live_within, task, task_row};
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(2);

#[tokio::test]
async fn task_history_is_scoped_by_task_only() {
    let community = TestCommunity::new().await;
    community
        .seed(
            TASK_MESSAGES_TABLE,
            [
                task_row("t1", TASK, ADA, BOB, "I can help", 10),
                task_row("x1", OTHER_TASK, ADA, BOB, "other task", 15),
                task_row("t2", TASK, CLEO, ADA, "me too", 20),
            ],
        )
        .await;

    let mut bob = community.session_for(BOB);
    bob.open(task(TASK, ADA)).await;
    assert_eq!(bob.status(), &ViewStatus::Ready);
    assert_eq!(bob.timeline().ids(), vec!["t1", "t2"]);
    assert_eq!(bob.scope().and_then(|s| s.task_id()), Some(TASK));
}

#[tokio::test]
async fn task_send_carries_task_and_reaches_other_side() {
    let community = TestCommunity::new().await;
    let mut ada = community.session_for(ADA);
    let mut bob = community.session_for(BOB);
    ada.open(task(TASK, BOB)).await;
    bob.open(task(TASK, ADA)).await;

    ada.set_compose("on my way");
    assert!(matches!(ada.send().await, SendOutcome::Sent(_)));
    assert_eq!(next_live_within(&mut bob, WAIT).await, Some(true));

    let stored = community.mem.rows(TASK_MESSAGES_TABLE).await;
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0]["task_id"], TASK);
    assert_eq!(stored[0]["sender_id"], ADA);
    assert_eq!(stored[0]["receiver_id"], BOB);
    assert_eq!(bob.messages()[0].task_id.as_deref(), Some(TASK));
}

#[tokio::test]
async fn other_task_live_events_are_ignored() {
    let community = TestCommunity::new().await;
    let mut bob = community.session_for(BOB);
    bob.open(task(TASK, ADA)).await;

    community
        .mem
        .inject_live(
            TASK_MESSAGES_TABLE,
            task_row("x", OTHER_TASK, ADA, BOB, "elsewhere", 5),
        )
        .await;
    community
        .mem
        .inject_live(TASK_MESSAGES_TABLE, task_row("t", TASK, ADA, BOB, "here", 6))
        .await;
    assert_eq!(next_live_within(&mut bob, WAIT).await, Some(true));
    assert_eq!(bob.timeline().ids(), vec!["t"]);
}

#[tokio::test]
async fn malformed_task_id_blocks_send() {
    let community = TestCommunity::new().await;
    let mut ada = community.session_for(ADA);
    ada.open(task("task-42", BOB)).await;
    ada.set_compose("hello");
    let SendOutcome::Rejected(err) = ada.send().await else {
        panic!("malformed task id should be rejected");
    };
    assert_eq!(
        err.to_string(),
        "Invalid UUID(s): Task ID. Please provide valid UUIDs."
    );
    assert_eq!(community.mem.stats().await.inserts, 0);
}
