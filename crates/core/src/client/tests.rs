use std::time::Duration;

use quill_backend::{ChatMessage, DocumentId, Granularity, Grounding};
use quill_test_backend::{
    PresetResponse, RecordingIngestBackend, ScriptedChatBackend,
    StaticSourceProvider,
};
use tokio::sync::watch;
use tokio::time::timeout;

use crate::conversation::ConversationId;
use crate::snapshot::{ClientSnapshot, StreamState};
use crate::{ChatClient, ClientBuilder};

const PROMPT: &str = "You answer questions about the attached data.";

struct Harness {
    client: ChatClient,
    chat: ScriptedChatBackend,
    ingest: RecordingIngestBackend,
}

fn harness() -> Harness {
    harness_with_chat(ScriptedChatBackend::default())
}

fn harness_with_chat(chat: ScriptedChatBackend) -> Harness {
    let ingest = RecordingIngestBackend::default();
    let provider = StaticSourceProvider::with_source_names(["Costs", "Sales"]);
    let client =
        ClientBuilder::with_backends(chat.clone(), ingest.clone(), provider)
            .with_system_prompt(PROMPT)
            .build();
    Harness {
        client,
        chat,
        ingest,
    }
}

async fn wait_for(
    rx: &mut watch::Receiver<ClientSnapshot>,
    mut cond: impl FnMut(&ClientSnapshot) -> bool,
) -> ClientSnapshot {
    timeout(Duration::from_secs(1), rx.wait_for(|snap| cond(snap)))
        .await
        .expect("timed out waiting for snapshot")
        .expect("client task has been dropped")
        .clone()
}

/// Creates a conversation and waits until it shows up in a snapshot.
async fn create_conversation(
    client: &ChatClient,
    rx: &mut watch::Receiver<ClientSnapshot>,
) -> ConversationId {
    let before = rx.borrow().conversations().len();
    client.new_conversation();
    let snap =
        wait_for(rx, |s| s.conversations().len() == before + 1).await;
    snap.conversations().last().unwrap().id()
}

fn turn_finished(
    snap: &ClientSnapshot,
    id: ConversationId,
    message_count: usize,
) -> bool {
    !snap.loading_response()
        && snap
            .conversation(id)
            .is_some_and(|c| c.messages().len() == message_count)
}

#[tokio::test]
async fn test_end_to_end_plain_turn() {
    let h = harness();
    h.chat.push_response(PresetResponse::with_deltas(["Hello"]));
    let mut rx = h.client.subscribe();

    let id = create_conversation(&h.client, &mut rx).await;
    assert_eq!(rx.borrow().active_id(), Some(id));

    h.client.send_message(id, "Hi");
    let snap = wait_for(&mut rx, |s| turn_finished(s, id, 3)).await;
    assert_eq!(
        snap.conversation(id).unwrap().messages(),
        &[
            ChatMessage::System(PROMPT.to_owned()),
            ChatMessage::User("Hi".to_owned()),
            ChatMessage::Assistant("Hello".to_owned()),
        ]
    );
    assert_eq!(snap.stream_state(id), StreamState::Idle);
}

#[tokio::test]
async fn test_deltas_fold_into_one_assistant_message() {
    let h = harness();
    h.chat
        .push_response(PresetResponse::with_deltas(["Hel", "lo wor", "ld"]));
    let mut rx = h.client.subscribe();

    let id = create_conversation(&h.client, &mut rx).await;
    h.client.send_message(id, "Say hello");

    let snap = wait_for(&mut rx, |s| turn_finished(s, id, 3)).await;
    let messages = snap.conversation(id).unwrap().messages();
    assert_eq!(
        messages.last(),
        Some(&ChatMessage::Assistant("Hello world".to_owned()))
    );
    let assistant_count = messages
        .iter()
        .filter(|m| matches!(m, ChatMessage::Assistant(_)))
        .count();
    assert_eq!(assistant_count, 1);
}

#[tokio::test]
async fn test_stream_with_no_deltas_completes() {
    let h = harness();
    h.chat
        .push_response(PresetResponse::with_deltas(Vec::<String>::new()));
    let mut rx = h.client.subscribe();

    let id = create_conversation(&h.client, &mut rx).await;
    h.client.send_message(id, "Hi");

    // The turn finishes without ever folding an assistant message.
    let snap = wait_for(&mut rx, |s| {
        !s.loading_response()
            && s.conversation(id).is_some_and(|c| c.messages().len() == 2)
    })
    .await;
    assert_eq!(snap.stream_state(id), StreamState::Idle);
    assert_eq!(
        snap.conversation(id).unwrap().messages(),
        &[
            ChatMessage::System(PROMPT.to_owned()),
            ChatMessage::User("Hi".to_owned()),
        ]
    );
}

#[tokio::test]
async fn test_ungrounded_turn_omits_grounding() {
    let h = harness();
    h.chat.push_response(PresetResponse::with_deltas(["Hi!"]));
    let mut rx = h.client.subscribe();

    let id = create_conversation(&h.client, &mut rx).await;
    h.client.send_message(id, "Hello");
    wait_for(&mut rx, |s| turn_finished(s, id, 3)).await;

    let requests = h.chat.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].grounding, None);
}

#[tokio::test]
async fn test_grounded_turn_includes_document_id() {
    let h = harness();
    h.chat.push_response(PresetResponse::with_deltas(["42"]));
    let mut rx = h.client.subscribe();

    // The placeholder source list is empty, so wait for the startup
    // refresh before selecting.
    wait_for(&mut rx, |s| !s.sources().is_empty()).await;
    let id = create_conversation(&h.client, &mut rx).await;

    h.client.set_data_source(id, "Sales", Granularity::Summary);
    wait_for(&mut rx, |s| {
        !s.loading_ingest()
            && s.conversation(id)
                .is_some_and(|c| c.data_source() == Some("Sales"))
    })
    .await;
    assert_eq!(
        h.ingest.calls(),
        vec![("Sales-summary.txt".to_owned(), "summary of Sales".to_owned())]
    );

    h.client.send_message(id, "What is the total?");
    wait_for(&mut rx, |s| turn_finished(s, id, 3)).await;

    let requests = h.chat.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(
        requests[0].grounding,
        Some(Grounding {
            doc_id: DocumentId("doc:1".to_owned()),
        })
    );
}

#[tokio::test]
async fn test_reselecting_an_ingested_key_does_not_reingest() {
    let h = harness();
    let mut rx = h.client.subscribe();

    wait_for(&mut rx, |s| !s.sources().is_empty()).await;
    let first = create_conversation(&h.client, &mut rx).await;
    let second = create_conversation(&h.client, &mut rx).await;

    // Same key selected twice on one conversation and once more on
    // another: one ingestion request in total.
    h.client.set_data_source(first, "Sales", Granularity::Summary);
    h.client.set_data_source(first, "Sales", Granularity::Summary);
    h.client.set_data_source(second, "Sales", Granularity::Summary);
    wait_for(&mut rx, |s| {
        !s.loading_ingest() && h.ingest.calls().len() == 1
    })
    .await;

    // A different granularity is a different key.
    h.client.set_data_source(first, "Sales", Granularity::Full);
    wait_for(&mut rx, |s| {
        !s.loading_ingest() && h.ingest.calls().len() == 2
    })
    .await;
    assert_eq!(
        h.ingest.calls(),
        vec![
            ("Sales-summary.txt".to_owned(), "summary of Sales".to_owned()),
            ("Sales-full.txt".to_owned(), "full of Sales".to_owned()),
        ]
    );
}

#[tokio::test]
async fn test_unknown_source_selection_is_ignored() {
    let h = harness();
    let mut rx = h.client.subscribe();

    wait_for(&mut rx, |s| !s.sources().is_empty()).await;
    let id = create_conversation(&h.client, &mut rx).await;

    h.client.set_data_source(id, "Margin", Granularity::Summary);
    // Process a subsequent intent to make sure the selection went
    // through the actor.
    h.client.rename_conversation(id, "checkpoint");
    let snap = wait_for(&mut rx, |s| {
        s.conversation(id).is_some_and(|c| c.name() == "checkpoint")
    })
    .await;
    assert_eq!(snap.conversation(id).unwrap().data_source(), None);
    assert!(h.ingest.calls().is_empty());
}

#[tokio::test]
async fn test_initial_sources_shown_until_refresh() {
    let chat = ScriptedChatBackend::default();
    let ingest = RecordingIngestBackend::default();
    let provider = StaticSourceProvider::with_source_names(["Costs", "Sales"]);
    let client = ClientBuilder::with_backends(chat, ingest, provider)
        .with_system_prompt(PROMPT)
        .with_initial_sources(["Cached"])
        .build();
    let mut rx = client.subscribe();

    // The seeded list is visible right away; the refresh task has not
    // run yet on a single-threaded runtime.
    assert_eq!(client.snapshot().sources(), &["Cached".to_owned()]);

    // The provider listing replaces it once the refresh lands.
    let snap = wait_for(&mut rx, |s| s.sources().len() == 2).await;
    assert_eq!(
        snap.sources(),
        &["Costs".to_owned(), "Sales".to_owned()]
    );
}

#[tokio::test]
async fn test_failed_ingestion_clears_loading_and_is_retryable() {
    let h = harness();
    h.chat.push_response(PresetResponse::with_deltas(["unsure"]));
    let mut rx = h.client.subscribe();

    wait_for(&mut rx, |s| !s.sources().is_empty()).await;
    let id = create_conversation(&h.client, &mut rx).await;

    h.ingest.fail_next(1);
    h.client.set_data_source(id, "Costs", Granularity::Full);
    wait_for(&mut rx, |s| {
        !s.loading_ingest() && h.ingest.calls().len() == 1
    })
    .await;

    // No document was recorded, so a turn goes out ungrounded.
    h.client.send_message(id, "How much?");
    wait_for(&mut rx, |s| turn_finished(s, id, 3)).await;
    assert_eq!(h.chat.requests()[0].grounding, None);

    // Re-selecting the failed key issues a fresh ingestion request.
    h.client.set_data_source(id, "Costs", Granularity::Full);
    wait_for(&mut rx, |s| {
        !s.loading_ingest() && h.ingest.calls().len() == 2
    })
    .await;

    h.chat.push_response(PresetResponse::with_deltas(["a lot"]));
    h.client.send_message(id, "And now?");
    wait_for(&mut rx, |s| turn_finished(s, id, 5)).await;
    assert_eq!(
        h.chat.requests()[1].grounding,
        Some(Grounding {
            doc_id: DocumentId("doc:2".to_owned()),
        })
    );
}

#[tokio::test]
async fn test_transport_failure_marks_stream_failed() {
    let h = harness();
    h.chat.push_response(PresetResponse::failing());
    let mut rx = h.client.subscribe();

    let id = create_conversation(&h.client, &mut rx).await;
    h.client.send_message(id, "Hi");

    let snap = wait_for(&mut rx, |s| {
        matches!(s.stream_state(id), StreamState::Failed(_))
    })
    .await;
    assert!(!snap.loading_response());
    // The user turn stays; no assistant message was created.
    assert_eq!(
        snap.conversation(id).unwrap().messages(),
        &[
            ChatMessage::System(PROMPT.to_owned()),
            ChatMessage::User("Hi".to_owned()),
        ]
    );

    // Sending again retries from scratch.
    h.chat.push_response(PresetResponse::with_deltas(["recovered"]));
    h.client.send_message(id, "Still there?");
    let snap = wait_for(&mut rx, |s| turn_finished(s, id, 4)).await;
    assert_eq!(snap.stream_state(id), StreamState::Idle);
    assert_eq!(
        snap.conversation(id).unwrap().messages().last(),
        Some(&ChatMessage::Assistant("recovered".to_owned()))
    );
}

#[tokio::test]
async fn test_rapid_resend_supersedes_previous_stream() {
    let mut chat = ScriptedChatBackend::default();
    chat.set_delay(Duration::from_millis(20));
    chat.push_response(PresetResponse::with_deltas(["stale answer"]));
    chat.push_response(PresetResponse::with_deltas(["fresh answer"]));
    let h = harness_with_chat(chat);
    let mut rx = h.client.subscribe();

    let id = create_conversation(&h.client, &mut rx).await;
    // Two sends without waiting: the second supersedes the first, and
    // the first stream's deltas must not leak into the conversation.
    h.client.send_message(id, "one");
    h.client.send_message(id, "two");

    let snap = wait_for(&mut rx, |s| turn_finished(s, id, 4)).await;
    assert_eq!(
        snap.conversation(id).unwrap().messages(),
        &[
            ChatMessage::System(PROMPT.to_owned()),
            ChatMessage::User("one".to_owned()),
            ChatMessage::User("two".to_owned()),
            ChatMessage::Assistant("fresh answer".to_owned()),
        ]
    );
}

#[tokio::test]
async fn test_concurrent_streams_stay_isolated() {
    let mut chat = ScriptedChatBackend::default();
    chat.set_delay(Duration::from_millis(5));
    chat.push_response(PresetResponse::with_deltas(["first answer"]));
    chat.push_response(PresetResponse::with_deltas(["second answer"]));
    let h = harness_with_chat(chat);
    let mut rx = h.client.subscribe();

    let first = create_conversation(&h.client, &mut rx).await;
    let second = create_conversation(&h.client, &mut rx).await;

    h.client.send_message(first, "q1");
    h.client.send_message(second, "q2");

    let snap = wait_for(&mut rx, |s| {
        turn_finished(s, first, 3) && turn_finished(s, second, 3)
    })
    .await;
    assert_eq!(
        snap.conversation(first).unwrap().messages().last(),
        Some(&ChatMessage::Assistant("first answer".to_owned()))
    );
    assert_eq!(
        snap.conversation(second).unwrap().messages().last(),
        Some(&ChatMessage::Assistant("second answer".to_owned()))
    );
}

#[tokio::test]
async fn test_removing_active_conversation_leaves_no_active() {
    let h = harness();
    let mut rx = h.client.subscribe();

    let first = create_conversation(&h.client, &mut rx).await;
    let second = create_conversation(&h.client, &mut rx).await;
    assert_eq!(rx.borrow().active_id(), Some(second));

    h.client.remove_conversation(second);
    let snap =
        wait_for(&mut rx, |s| s.conversations().len() == 1).await;
    // The pointer is stale by design; it resolves to no conversation.
    assert_eq!(snap.active_id(), Some(second));
    assert!(snap.active_conversation().is_none());

    h.client.select_conversation(first);
    let snap = wait_for(&mut rx, |s| s.active_id() == Some(first)).await;
    assert_eq!(snap.active_conversation().unwrap().id(), first);
}

#[tokio::test]
async fn test_send_after_clear_succeeds_without_system_seed() {
    let h = harness();
    h.chat.push_response(PresetResponse::with_deltas(["ok"]));
    let mut rx = h.client.subscribe();

    let id = create_conversation(&h.client, &mut rx).await;
    h.client.clear_conversation(id);
    wait_for(&mut rx, |s| {
        s.conversation(id).is_some_and(|c| c.messages().is_empty())
    })
    .await;

    h.client.send_message(id, "Hi");
    let snap = wait_for(&mut rx, |s| turn_finished(s, id, 2)).await;
    assert_eq!(
        snap.conversation(id).unwrap().messages(),
        &[
            ChatMessage::User("Hi".to_owned()),
            ChatMessage::Assistant("ok".to_owned()),
        ]
    );
    assert_eq!(
        h.chat.requests()[0].messages,
        vec![ChatMessage::User("Hi".to_owned())]
    );
}

#[tokio::test]
async fn test_message_to_unknown_conversation_is_dropped() {
    let h = harness();
    let mut rx = h.client.subscribe();

    h.client.send_message(ConversationId(7), "anyone?");
    // A later intent proves the drop went through the actor.
    create_conversation(&h.client, &mut rx).await;
    assert!(h.chat.requests().is_empty());
}
