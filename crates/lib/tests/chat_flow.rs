//! Chat view against the fake backend: lazy session creation, streamed replies, loading
//! state, cancellation, switching, history merge, and session deletion.

mod common;

use serde_json::json;
use std::sync::Arc;
use tokio::sync::Notify;

use haven::chat::{ChatOptions, ChatView, SendOutcome, APOLOGY};
use haven::history::HistoryMerge;
use haven::message::{Message, Role};
use haven::session::DeleteOutcome;

fn contents(view: &ChatView) -> Vec<String> {
    view.messages().iter().map(|m| m.content.clone()).collect()
}

async fn view_with(state: &common::Shared, options: ChatOptions) -> ChatView {
    let base = common::spawn(state.clone()).await;
    ChatView::new(common::api(&base), common::auth(), options)
}

#[tokio::test]
async fn streamed_reply_grows_one_message_and_creates_one_session() {
    let state = common::state();
    state.lock().unwrap().stream_chunks = vec![
        common::content_line("I"),
        common::content_line("I hear you"),
        common::done_line("I hear you"),
    ];
    let mut view = view_with(&state, ChatOptions::default()).await;
    view.initialize().await;
    assert!(!view.current().persisted);

    let mut updates: Vec<Message> = Vec::new();
    let outcome = view
        .send_message("I feel anxious", &mut |m| updates.push(m.clone()))
        .await;

    assert_eq!(outcome, SendOutcome::Completed);
    assert!(!view.is_loading());
    assert_eq!(contents(&view), vec!["I feel anxious", "I hear you"]);
    assert!(view.current().persisted);
    assert_eq!(view.current().id, "s1");
    assert_eq!(
        common::log(&state),
        vec!["list_sessions", "create_session", "stream:s1"]
    );

    let replies: Vec<&Message> = updates.iter().filter(|m| m.role == Role::Assistant).collect();
    assert_eq!(replies[0].content, "");
    assert!(replies.iter().all(|m| m.id == replies[0].id));
    assert!(replies.iter().any(|m| m.content == "I"));
    assert_eq!(replies.last().unwrap().content, "I hear you");

    view.send_message("thanks", &mut |_| {}).await;
    let creates = common::log(&state)
        .iter()
        .filter(|e| e.as_str() == "create_session")
        .count();
    assert_eq!(creates, 1);
    assert_eq!(common::log(&state).last().unwrap(), "stream:s1");
}

#[tokio::test]
async fn payload_split_across_network_reads_is_not_lost() {
    let state = common::state();
    state.lock().unwrap().stream_chunks = vec![
        "data: {\"type\":\"content\",\"con".to_string(),
        "tent\":\"whole sentence\"}\n\n".to_string(),
    ];
    let mut view = view_with(&state, ChatOptions::default()).await;
    let outcome = view.send_message("hello", &mut |_| {}).await;
    assert_eq!(outcome, SendOutcome::Completed);
    assert_eq!(contents(&view), vec!["hello", "whole sentence"]);
}

#[tokio::test]
async fn loading_stays_set_until_a_stream_without_done_ends() {
    let state = common::state();
    let hold = Arc::new(Notify::new());
    {
        let mut st = state.lock().unwrap();
        st.stream_chunks = vec![
            common::content_line("partial"),
            common::content_line("partial reply"),
        ];
        st.hold = Some(hold.clone());
    }
    let mut view = view_with(&state, ChatOptions::default()).await;
    let loading = view.subscribe_loading();
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

    let task = tokio::spawn(async move {
        let mut on_update = move |m: &Message| {
            let _ = tx.send(m.content.clone());
        };
        let outcome = view.send_message("hi", &mut on_update).await;
        (view, outcome)
    });

    while let Some(content) = rx.recv().await {
        if content == "partial" {
            break;
        }
    }
    assert!(*loading.borrow());

    hold.notify_one();
    let (view, outcome) = task.await.unwrap();
    assert_eq!(outcome, SendOutcome::Completed);
    assert!(!view.is_loading());
    assert!(!*loading.borrow());
    assert_eq!(contents(&view), vec!["hi", "partial reply"]);
}

#[tokio::test]
async fn cancelling_keeps_partial_reply_and_resets_the_token() {
    let state = common::state();
    {
        let mut st = state.lock().unwrap();
        st.stream_chunks = vec![
            common::content_line("Let's breathe"),
            common::content_line("Let's breathe together"),
        ];
        st.hold = Some(Arc::new(Notify::new()));
    }
    let mut view = view_with(&state, ChatOptions::default()).await;
    let cancel = view.cancel_handle();
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

    let task = tokio::spawn(async move {
        let mut on_update = move |m: &Message| {
            let _ = tx.send(m.content.clone());
        };
        let outcome = view.send_message("help", &mut on_update).await;
        (view, outcome)
    });

    while let Some(content) = rx.recv().await {
        if content == "Let's breathe" {
            break;
        }
    }
    cancel.cancel();
    let (view, outcome) = task.await.unwrap();
    assert_eq!(outcome, SendOutcome::Cancelled);
    assert!(!view.is_loading());
    assert_eq!(contents(&view), vec!["help", "Let's breathe"]);
    assert!(!view.cancel_handle().is_cancelled());
}

#[tokio::test]
async fn error_status_puts_apology_in_the_placeholder() {
    let state = common::state();
    state.lock().unwrap().stream_status = Some(axum::http::StatusCode::SERVICE_UNAVAILABLE);
    let mut view = view_with(&state, ChatOptions::default()).await;
    let outcome = view.send_message("are you there?", &mut |_| {}).await;
    assert_eq!(outcome, SendOutcome::Failed);
    assert!(!view.is_loading());
    assert_eq!(contents(&view), vec!["are you there?", APOLOGY]);
    assert_eq!(view.messages()[1].role, Role::Assistant);
}

#[tokio::test]
async fn broken_stream_after_content_appends_apology() {
    let state = common::state();
    {
        let mut st = state.lock().unwrap();
        st.stream_chunks = vec![
            common::content_line("Half an answer"),
            common::content_line("never sent"),
        ];
        st.stream_breaks = true;
    }
    let mut view = view_with(&state, ChatOptions::default()).await;
    let outcome = view.send_message("question", &mut |_| {}).await;
    assert_eq!(outcome, SendOutcome::Failed);
    assert!(!view.is_loading());
    assert_eq!(contents(&view), vec!["question", "Half an answer", APOLOGY]);
}

#[tokio::test]
async fn non_streaming_reply_arrives_whole() {
    let state = common::state();
    let mut view = view_with(
        &state,
        ChatOptions {
            streaming: false,
            ..ChatOptions::default()
        },
    )
    .await;
    let mut updates = 0;
    let outcome = view.send_message("hello", &mut |_| updates += 1).await;
    assert_eq!(outcome, SendOutcome::Completed);
    assert_eq!(updates, 2);
    assert_eq!(contents(&view), vec!["hello", "plain reply"]);
    assert_eq!(
        view.messages()[1].timestamp.to_rfc3339(),
        "2024-01-01T00:00:00+00:00"
    );
    assert_eq!(common::log(&state), vec!["create_session", "message:s1"]);
}

fn seed_two_sessions(state: &common::Shared) {
    let mut st = state.lock().unwrap();
    st.sessions = vec![
        common::session("A", "Session A", "2024-01-02T00:00:00"),
        common::session("B", "Session B", "2024-03-01T00:00:00"),
    ];
    st.histories.insert(
        "A".into(),
        json!({"messages": [
            {"id": 1, "role": "user", "content": "a1", "created_at": "2024-01-02T00:00:00"},
            {"id": 2, "role": "assistant", "content": "a2", "created_at": "2024-01-02T00:00:01"}
        ]}),
    );
    st.histories.insert(
        "B".into(),
        json!([{"id": 3, "role": "user", "content": "b1", "created_at": "2024-03-01T00:00:00"}]),
    );
}

#[tokio::test]
async fn initialize_resumes_newest_and_switching_clears_first() {
    let state = common::state();
    seed_two_sessions(&state);
    let mut view = view_with(&state, ChatOptions::default()).await;

    view.initialize().await;
    assert_eq!(view.current().id, "B");
    assert_eq!(contents(&view), vec!["b1"]);

    view.select_session("A");
    assert!(view.messages().is_empty());
    assert_eq!(view.current().title, "Session A");
    view.load_history("A").await;
    assert_eq!(contents(&view), vec!["a1", "a2"]);
    assert!(!view.is_loading_history());

    view.switch_session("B").await;
    assert_eq!(contents(&view), vec!["b1"]);
    assert!(!common::log(&state).contains(&"create_session".to_string()));
}

#[tokio::test]
async fn history_arriving_over_local_messages_is_dropped_by_default() {
    let state = common::state();
    seed_two_sessions(&state);
    let mut view = view_with(&state, ChatOptions::default()).await;
    view.initialize().await;
    view.load_history("A").await;
    assert_eq!(contents(&view), vec!["b1"]);
}

#[tokio::test]
async fn prepend_policy_keeps_history_and_local_messages() {
    let state = common::state();
    seed_two_sessions(&state);
    let mut view = view_with(
        &state,
        ChatOptions {
            history_merge: HistoryMerge::PrependHistory,
            ..ChatOptions::default()
        },
    )
    .await;
    view.initialize().await;
    view.load_history("A").await;
    assert_eq!(contents(&view), vec!["a1", "a2", "b1"]);
}

#[tokio::test]
async fn deleting_current_session_starts_fresh() {
    let state = common::state();
    seed_two_sessions(&state);
    let mut view = view_with(&state, ChatOptions::default()).await;
    view.initialize().await;

    assert_eq!(view.delete_session("B", |_| false).await, DeleteOutcome::Declined);
    assert!(!common::log(&state).iter().any(|e| e.starts_with("delete_session")));
    assert_eq!(contents(&view), vec!["b1"]);

    let mut prompt = String::new();
    let outcome = view
        .delete_session("B", |p| {
            prompt = p.to_string();
            true
        })
        .await;
    assert_eq!(outcome, DeleteOutcome::Deleted);
    assert!(prompt.contains("cannot be undone"));
    assert!(view.messages().is_empty());
    assert!(!view.current().persisted);
    assert!(view.current().id.starts_with("session_"));
    assert!(view.directory().get("B").is_none());
    assert!(view.directory().get("A").is_some());
}

#[tokio::test]
async fn create_session_switches_and_ignores_blank_titles() {
    let state = common::state();
    seed_two_sessions(&state);
    let mut view = view_with(&state, ChatOptions::default()).await;
    view.initialize().await;

    assert!(view.create_session("   ").await.unwrap().is_none());
    assert!(!common::log(&state).contains(&"create_session".to_string()));

    let created = view.create_session("Sleep worries").await.unwrap().unwrap();
    assert_eq!(created.title.as_deref(), Some("Sleep worries"));
    assert_eq!(view.current().id, created.session_id);
    assert_eq!(view.current().title, "Sleep worries");
    assert!(view.messages().is_empty());
    assert_eq!(view.directory().sessions()[0].session_id, created.session_id);

    view.directory_mut().refresh().await.unwrap();
    let ids: Vec<&str> = view
        .directory()
        .sessions()
        .iter()
        .map(|s| s.session_id.as_str())
        .collect();
    assert_eq!(ids, vec![created.session_id.as_str(), "B", "A"]);
}

#[tokio::test]
async fn failed_delete_leaves_session_and_view_untouched() {
    let state = common::state();
    seed_two_sessions(&state);
    state.lock().unwrap().fail_session_delete = true;
    let mut view = view_with(&state, ChatOptions::default()).await;
    view.initialize().await;

    let outcome = view.delete_session("B", |_| true).await;

    assert_eq!(outcome, DeleteOutcome::Failed);
    assert!(view.directory().get("B").is_some());
    assert_eq!(view.directory().sessions().len(), 2);
    assert_eq!(view.current().id, "B");
    assert_eq!(view.current().title, "Session B");
    assert!(view.current().persisted);
    assert_eq!(contents(&view), vec!["b1"]);
    assert_eq!(common::log(&state).last().unwrap(), "delete_session:B");
}

#[tokio::test]
async fn cancelling_before_any_content_drops_the_placeholder() {
    let state = common::state();
    {
        let mut st = state.lock().unwrap();
        st.stream_chunks = vec![": keep-alive\n\n".to_string(), common::content_line("late")];
        st.hold = Some(Arc::new(Notify::new()));
    }
    let mut view = view_with(&state, ChatOptions::default()).await;
    let cancel = view.cancel_handle();
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

    let task = tokio::spawn(async move {
        let mut on_update = move |m: &Message| {
            let _ = tx.send((m.role, m.content.clone()));
        };
        let outcome = view.send_message("hello?", &mut on_update).await;
        (view, outcome)
    });

    while let Some((role, content)) = rx.recv().await {
        if role == Role::Assistant && content.is_empty() {
            break;
        }
    }
    cancel.cancel();
    let (view, outcome) = task.await.unwrap();
    assert_eq!(outcome, SendOutcome::Cancelled);
    assert!(!view.is_loading());
    assert_eq!(contents(&view), vec!["hello?"]);
    assert_eq!(view.messages()[0].role, Role::User);
}

#[tokio::test]
async fn switching_to_an_unlisted_session_picks_up_its_title() {
    let state = common::state();
    seed_two_sessions(&state);
    let mut view = view_with(&state, ChatOptions::default()).await;

    view.switch_session("A").await;

    assert_eq!(view.current().id, "A");
    assert_eq!(view.current().title, "Session A");
    assert!(view.current().persisted);
    assert_eq!(contents(&view), vec!["a1", "a2"]);
    assert_eq!(common::log(&state), vec!["list_sessions", "history:A"]);
}
