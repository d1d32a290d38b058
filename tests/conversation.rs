//! Conversation orchestrator integration tests
//!
//! Run on paused time so the session timer and grace delays are virtual.

use std::time::Duration;

use tokio::time::Instant;

use picturetalk::tools::ToolCall;
use picturetalk::{
    ConversationEvent, ConversationState, EndReason, Error, InferenceReply, NoticeKind, Role, Turn,
};

mod common;

use common::{harness, harness_with, harness_without_key, subject};

#[tokio::test(start_paused = true)]
async fn test_red_ball_turn() {
    let mut h = harness();
    h.inference.reply("Hello! What do you see in this picture?");
    h.inference.reply("Wow! A red ball is so much fun to play with!");

    h.handle.start(subject()).await.unwrap();
    h.wait_for_state(ConversationState::Greeting).await;
    h.wait_for_state(ConversationState::Listening).await;

    h.mic.say("I see a red ball");
    h.wait_for_state(ConversationState::Processing).await;
    h.wait_for_state(ConversationState::Listening).await;

    let snapshot = h.handle.snapshot().await.unwrap();
    let roles: Vec<Role> = snapshot.messages.iter().map(|m| m.role()).collect();
    assert_eq!(roles, vec![Role::Assistant, Role::User, Role::Assistant]);
    assert_eq!(snapshot.messages[1].content(), "I see a red ball");
    assert_eq!(
        snapshot.display,
        "Wow! A red ball is so much fun to play with!"
    );

    let requests = h.inference.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].turn, Turn::Initial);
    assert!(requests[0].history.is_empty());
    assert_eq!(requests[1].turn, Turn::User("I see a red ball".to_string()));
    assert_eq!(requests[1].history.len(), 1);

    assert_eq!(h.speech.spoken().len(), 2);
    assert_eq!(h.mic.starts(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_capture_resumes_only_after_playback_and_grace() {
    let mut h = harness_with(Default::default(), Duration::from_secs(2));
    h.inference.reply("Hi there!");

    let started = Instant::now();
    h.handle.start(subject()).await.unwrap();
    h.wait_for_state(ConversationState::Listening).await;

    // 2s of speech then 500ms grace
    assert!(started.elapsed() >= Duration::from_millis(2500));
    assert_eq!(h.mic.starts(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_capture_grace_without_waiting_for_playback() {
    let config = picturetalk::config::ConversationConfig {
        wait_for_playback: false,
        ..Default::default()
    };
    let mut h = harness_with(config, Duration::from_secs(5));
    h.inference.reply("Hi there!");

    let started = Instant::now();
    h.handle.start(subject()).await.unwrap();
    h.wait_for_state(ConversationState::Listening).await;

    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(500));
    assert!(elapsed < Duration::from_secs(5));
}

#[tokio::test(start_paused = true)]
async fn test_inference_error_returns_to_listening() {
    let mut h = harness();
    h.inference.reply("Hello!");
    h.inference.fail("503 Service Unavailable");

    h.handle.start(subject()).await.unwrap();
    h.wait_for_state(ConversationState::Listening).await;

    h.mic.say("It is a dog");
    h.wait_for_state(ConversationState::Processing).await;
    h.wait_for_state(ConversationState::Listening).await;

    let snapshot = h.handle.snapshot().await.unwrap();
    let roles: Vec<Role> = snapshot.messages.iter().map(|m| m.role()).collect();
    assert_eq!(roles, vec![Role::Assistant, Role::User]);
    assert!(snapshot.display.contains("503 Service Unavailable"));

    let notices = h.notices(NoticeKind::Inference);
    assert_eq!(notices.len(), 1);
    assert_eq!(h.mic.starts(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_failed_greeting_still_listens() {
    let mut h = harness();
    h.inference.fail("connection refused");

    h.handle.start(subject()).await.unwrap();
    h.wait_for_state(ConversationState::Listening).await;

    let snapshot = h.handle.snapshot().await.unwrap();
    assert!(snapshot.messages.is_empty());
    assert_eq!(h.notices(NoticeKind::Inference).len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_transcripts_while_processing_are_dropped() {
    let mut h = harness();
    h.inference.reply("Hello!");
    let gate = h.inference.gated_reply("Yes, it's a dog!");

    h.handle.start(subject()).await.unwrap();
    h.wait_for_state(ConversationState::Listening).await;

    h.mic.say("a dog");
    h.wait_for_state(ConversationState::Processing).await;

    h.mic.say("a cat");
    h.mic.say("a bird");
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(h.inference.requests().len(), 2);

    gate.send(()).unwrap();
    h.wait_for_state(ConversationState::Listening).await;

    let snapshot = h.handle.snapshot().await.unwrap();
    assert_eq!(snapshot.dropped_transcripts, 2);
    assert_eq!(snapshot.messages.len(), 3);
    assert_eq!(h.inference.requests().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_final_after_capture_restart_is_dropped() {
    let mut h = harness();
    h.inference.reply("Hello!");
    h.inference.reply("A red ball!");
    h.inference.reply("You said it again!");

    h.handle.start(subject()).await.unwrap();
    h.wait_for_state(ConversationState::Listening).await;

    h.mic.say("a red ball");
    h.wait_for_state(ConversationState::Processing).await;
    h.wait_for_state(ConversationState::Listening).await;
    tokio::time::sleep(Duration::from_secs(2)).await;

    // Engine drops out and replays its last final once restarted
    h.mic.fail("no-speech");
    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(h.mic.starts(), 3);
    h.mic.say("a red ball");
    tokio::time::sleep(Duration::from_millis(100)).await;
    let snapshot = h.handle.snapshot().await.unwrap();
    assert_eq!(snapshot.state, ConversationState::Listening);
    assert_eq!(snapshot.dropped_transcripts, 1);
    assert_eq!(h.inference.requests().len(), 2);

    // The same words later are a new turn
    tokio::time::sleep(Duration::from_secs(2)).await;
    h.mic.say("a red ball");
    h.wait_for_state(ConversationState::Processing).await;
    assert_eq!(h.inference.requests().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_repeated_answer_after_reply_is_a_new_turn() {
    let mut h = harness();
    h.inference.reply("Hello! Is it a dog?");
    h.inference.reply("Is it brown?");

    h.handle.start(subject()).await.unwrap();
    h.wait_for_state(ConversationState::Listening).await;

    h.mic.say("yes");
    h.wait_for_state(ConversationState::Processing).await;
    h.wait_for_state(ConversationState::Listening).await;

    // Answered again straight after capture resumed
    h.mic.say("yes");
    h.wait_for_state(ConversationState::Processing).await;

    let requests = h.inference.requests();
    assert_eq!(requests.len(), 3);
    let snapshot = h.handle.snapshot().await.unwrap();
    assert_eq!(snapshot.dropped_transcripts, 0);
}

#[tokio::test(start_paused = true)]
async fn test_restart_produces_fresh_log() {
    let mut h = harness();
    h.inference.reply("Hello!");
    h.inference.reply("Nice!");
    let gate = h.inference.gated_reply("Hello again!");

    h.handle.start(subject()).await.unwrap();
    h.wait_for_state(ConversationState::Listening).await;
    h.mic.say("a dog");
    h.wait_for_state(ConversationState::Processing).await;
    h.wait_for_state(ConversationState::Listening).await;

    let first = h.handle.snapshot().await.unwrap();
    h.handle.end().await.unwrap();
    let ended = h.handle.snapshot().await.unwrap();
    assert_eq!(ended.state, ConversationState::Ended);
    assert_eq!(ended.messages.len(), 3);

    h.handle.start(subject()).await.unwrap();
    let restarted = h.handle.snapshot().await.unwrap();
    assert_eq!(restarted.state, ConversationState::Greeting);
    assert!(restarted.messages.is_empty());
    assert_ne!(restarted.session, first.session);

    gate.send(()).unwrap();
    h.wait_for_state(ConversationState::Listening).await;
    let snapshot = h.handle.snapshot().await.unwrap();
    assert_eq!(snapshot.messages.len(), 1);
    assert_eq!(snapshot.messages[0].content(), "Hello again!");
    assert!(h.inference.requests()[2].history.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_end_during_inference_discards_reply() {
    let mut h = harness();
    h.inference.reply("Hello!");
    let gate = h.inference.gated_reply("This reply arrives too late");

    h.handle.start(subject()).await.unwrap();
    h.wait_for_state(ConversationState::Listening).await;
    h.mic.say("a dog");
    h.wait_for_state(ConversationState::Processing).await;

    h.handle.end().await.unwrap();
    let snapshot = h.handle.snapshot().await.unwrap();
    assert_eq!(snapshot.state, ConversationState::Ended);
    assert_eq!(snapshot.display, EndReason::User.notice());

    // The request was abandoned; releasing it changes nothing
    let _ = gate.send(());
    tokio::time::sleep(Duration::from_secs(5)).await;

    let snapshot = h.handle.snapshot().await.unwrap();
    assert_eq!(snapshot.state, ConversationState::Ended);
    let roles: Vec<Role> = snapshot.messages.iter().map(|m| m.role()).collect();
    assert_eq!(roles, vec![Role::Assistant, Role::User]);
    assert_eq!(h.mic.starts(), 1);
    assert_eq!(h.speech.spoken().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_end_cancels_playback() {
    let mut h = harness_with(Default::default(), Duration::from_secs(30));
    h.inference.reply("Hello! This greeting takes a long time to say.");

    h.handle.start(subject()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(h.speech.spoken().len(), 1);
    assert_eq!(h.speech.cancelled(), 0);

    h.handle.end().await.unwrap();
    assert_eq!(h.speech.cancelled(), 1);
    assert_eq!(h.mic.starts(), 0);

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(h.mic.starts(), 0);
    assert_eq!(
        h.handle.snapshot().await.unwrap().state,
        ConversationState::Ended
    );
}

#[tokio::test(start_paused = true)]
async fn test_session_timer_fires_once() {
    let mut h = harness();
    h.inference.reply("Hello!");

    let started = Instant::now();
    h.handle.start(subject()).await.unwrap();
    h.wait_for_state(ConversationState::Ended).await;

    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(60));
    assert!(elapsed < Duration::from_secs(61));

    tokio::time::sleep(Duration::from_secs(180)).await;

    let ended: Vec<EndReason> = h
        .drain()
        .iter()
        .filter_map(|event| match event {
            ConversationEvent::Ended { reason } => Some(*reason),
            _ => None,
        })
        .collect();
    assert_eq!(ended, vec![EndReason::Timeout]);
    assert_eq!(
        h.notices(NoticeKind::Ended),
        vec![EndReason::Timeout.notice().to_string()]
    );
    assert_eq!(
        h.handle.snapshot().await.unwrap().state,
        ConversationState::Ended
    );
}

#[tokio::test(start_paused = true)]
async fn test_unknown_tool_kind_is_ignored() {
    let mut h = harness();
    h.inference.reply_with(InferenceReply {
        text: "Look at that dog!".to_string(),
        tool_calls: vec![
            ToolCall::Unknown {
                kind: "confetti".to_string(),
            },
            ToolCall::ShowSubjectFeedback {
                subject: "dog".to_string(),
            },
            ToolCall::ShowBackground {
                emojis: "🐕🌳".to_string(),
            },
        ],
    });

    h.handle.start(subject()).await.unwrap();
    h.wait_for_state(ConversationState::Listening).await;

    let events = h.drain().to_vec();
    assert!(events.iter().any(
        |e| matches!(e, ConversationEvent::ToolIgnored { kind } if kind == "confetti")
    ));
    assert!(events.iter().any(
        |e| matches!(e, ConversationEvent::Background(emojis) if emojis == "🐕🌳")
    ));

    let snapshot = h.handle.snapshot().await.unwrap();
    assert_eq!(snapshot.display, "Great observation about the dog!");
    assert_eq!(snapshot.messages.len(), 1);
    assert_eq!(snapshot.messages[0].content(), "Look at that dog!");
    assert_eq!(h.speech.spoken(), vec!["Look at that dog!".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_missing_key_is_configuration_error() {
    let mut h = harness_without_key();

    let error = tokio_test::assert_err!(h.handle.start(subject()).await);
    assert!(matches!(error, Error::Config(_)));

    let snapshot = h.handle.snapshot().await.unwrap();
    assert_eq!(snapshot.state, ConversationState::Idle);
    assert!(snapshot.session.is_none());
    assert_eq!(h.notices(NoticeKind::Configuration).len(), 1);
    assert_eq!(h.mic.starts(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_interim_transcripts_are_display_only() {
    let mut h = harness();
    h.inference.reply("Hello!");

    h.handle.start(subject()).await.unwrap();
    h.wait_for_state(ConversationState::Listening).await;

    h.mic.interim("I see");
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(h.drain().iter().any(|e| matches!(
        e,
        ConversationEvent::Transcript { text, is_final: false } if text == "I see"
    )));
    let snapshot = h.handle.snapshot().await.unwrap();
    assert_eq!(snapshot.state, ConversationState::Listening);
    assert_eq!(snapshot.messages.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_transient_capture_errors_back_off() {
    let mut h = harness();
    h.inference.reply("Hello!");

    h.handle.start(subject()).await.unwrap();
    h.wait_for_state(ConversationState::Listening).await;
    assert_eq!(h.mic.starts(), 1);

    // 500ms
    h.mic.fail("no-speech");
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(h.mic.starts(), 1);
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(h.mic.starts(), 2);

    // 1s
    h.mic.fail("network");
    tokio::time::sleep(Duration::from_millis(900)).await;
    assert_eq!(h.mic.starts(), 2);
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(h.mic.starts(), 3);

    // 2s
    h.mic.end_stream();
    tokio::time::sleep(Duration::from_millis(2100)).await;
    assert_eq!(h.mic.starts(), 4);

    // Attempts exhausted
    h.mic.fail("no-speech");
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(h.mic.starts(), 4);
    assert_eq!(h.notices(NoticeKind::Capture).len(), 1);

    h.handle.retry_capture().await.unwrap();
    assert_eq!(h.mic.starts(), 5);
    assert_eq!(
        h.handle.snapshot().await.unwrap().state,
        ConversationState::Listening
    );
}

#[tokio::test(start_paused = true)]
async fn test_permission_denied_waits_for_retry() {
    let mut h = harness();
    h.inference.reply("Hello!");

    h.handle.start(subject()).await.unwrap();
    h.wait_for_state(ConversationState::Listening).await;

    h.mic.fail("not-allowed");
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(h.mic.starts(), 1);

    let notices = h.notices(NoticeKind::Capture);
    assert_eq!(notices.len(), 1);
    assert!(notices[0].contains("permission-denied"));

    h.handle.retry_capture().await.unwrap();
    assert_eq!(h.mic.starts(), 2);

    // Capture is running again, so a retry is a no-op
    h.handle.retry_capture().await.unwrap();
    assert_eq!(h.mic.starts(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_set_subject_applies_to_next_turn() {
    let mut h = harness();
    h.inference.reply("Hello!");
    h.inference.reply("The sea is blue!");

    h.handle.start(subject()).await.unwrap();
    h.wait_for_state(ConversationState::Listening).await;

    h.handle
        .set_subject(picturetalk::SubjectContext::new("Ocean Waves", "Blue waves"))
        .await
        .unwrap();
    h.handle.snapshot().await.unwrap();
    h.mic.say("water");
    h.wait_for_state(ConversationState::Processing).await;
    h.wait_for_state(ConversationState::Listening).await;

    let requests = h.inference.requests();
    assert_eq!(requests[0].subject.title, "Friendly Dog");
    assert_eq!(requests[1].subject.title, "Ocean Waves");
}

#[tokio::test(start_paused = true)]
async fn test_start_while_active_is_noop() {
    let mut h = harness();
    h.inference.reply("Hello!");

    h.handle.start(subject()).await.unwrap();
    h.wait_for_state(ConversationState::Listening).await;
    let before = h.handle.snapshot().await.unwrap();

    tokio_test::assert_ok!(h.handle.start(subject()).await);
    let after = h.handle.snapshot().await.unwrap();
    assert_eq!(after.session, before.session);
    assert_eq!(after.state, ConversationState::Listening);
    assert_eq!(h.inference.requests().len(), 1);
}
