//! The client pipeline against a real server on a loopback socket.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use pretty_assertions::assert_eq;
use tokio::net::TcpListener;

use zyron_core::{
    ChatRequest, ConversationStore, EchoBackend, HttpTransport, InMemoryConversationStore,
    LlmBackend, ProviderSettings, RetryPolicy, ServerSettings, SessionController, SessionError,
    SessionObserver, SessionOutcome, SessionState, TransportError,
};
use zyron_server::{build, AppState};

async fn serve(backend: impl LlmBackend + 'static) -> (SocketAddr, Arc<InMemoryConversationStore>) {
    let store = Arc::new(InMemoryConversationStore::new());
    let app = build(AppState::new(
        ServerSettings::default(),
        ProviderSettings::default(),
        Arc::new(backend),
        store.clone(),
    ));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, store)
}

fn controller(addr: SocketAddr) -> SessionController<HttpTransport> {
    let transport = HttpTransport::new(&format!("http://{addr}"), Duration::from_secs(5)).unwrap();
    SessionController::new(transport).with_retry(RetryPolicy::none())
}

#[derive(Default)]
struct Collect {
    fragments: Mutex<Vec<String>>,
    completed: Mutex<Option<String>>,
}

impl SessionObserver for Collect {
    fn on_fragment(&self, fragment: &str) {
        self.fragments.lock().unwrap().push(fragment.to_owned());
    }

    fn on_complete(&self, response: &str) {
        *self.completed.lock().unwrap() = Some(response.to_owned());
    }
}

#[tokio::test]
async fn test_guest_chat_round_trip() {
    let (addr, store) = serve(EchoBackend::new()).await;
    let controller = controller(addr);
    let observer = Collect::default();

    let outcome = controller
        .send(ChatRequest::new("Hello world"), &observer)
        .await
        .unwrap();

    assert_eq!(outcome, SessionOutcome::Completed("Hello world".into()));
    assert_eq!(*observer.fragments.lock().unwrap(), vec!["Hello ", "world"]);
    assert_eq!(
        observer.completed.lock().unwrap().as_deref(),
        Some("Hello world")
    );
    assert_eq!(controller.state(), SessionState::Completed);
    assert_eq!(controller.conversation_id(), None);
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_multiline_fragment_survives_the_wire() {
    let (addr, _) = serve(EchoBackend::scripted(["```rust\nfn main() {}\n```", "\n\ndone"])).await;
    let controller = controller(addr);
    let observer = Collect::default();

    let outcome = controller
        .send(ChatRequest::new("code please"), &observer)
        .await
        .unwrap();

    assert_eq!(
        outcome,
        SessionOutcome::Completed("```rust\nfn main() {}\n```\n\ndone".into())
    );
}

#[tokio::test]
async fn test_authenticated_session_keeps_its_conversation() {
    let (addr, store) = serve(EchoBackend::new()).await;
    let controller = controller(addr);

    controller
        .send(ChatRequest::new("first").with_user("u1"), &Collect::default())
        .await
        .unwrap();
    let conversation_id = controller.conversation_id().unwrap();

    controller
        .send(
            ChatRequest::new("second")
                .with_user("u1")
                .with_conversation(Some(conversation_id)),
            &Collect::default(),
        )
        .await
        .unwrap();

    assert_eq!(controller.conversation_id(), Some(conversation_id));
    let messages = store.fetch_messages(conversation_id).await.unwrap();
    let contents: Vec<&str> = messages.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["first", "first", "second", "second"]);
}

#[tokio::test]
async fn test_provider_failure_before_stream_is_status_error() {
    let (addr, _) = serve(EchoBackend::unavailable("provider offline")).await;
    let controller = controller(addr);

    let err = controller
        .send(ChatRequest::new("Hi"), &Collect::default())
        .await
        .unwrap_err();

    match err {
        SessionError::Transport(TransportError::Status { status, message }) => {
            assert_eq!(status, 502);
            assert_eq!(message, "provider offline");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(controller.state(), SessionState::Failed);
    assert_eq!(
        controller.error().as_deref(),
        Some("Server returned 502: provider offline")
    );
}

#[tokio::test]
async fn test_mid_stream_failure_is_upstream_error() {
    let (addr, _) = serve(EchoBackend::scripted(["Par"]).with_error("overloaded")).await;
    let controller = controller(addr);
    let observer = Collect::default();

    let err = controller
        .send(ChatRequest::new("Bonjour"), &observer)
        .await
        .unwrap_err();

    assert!(matches!(err, SessionError::Upstream(ref m) if m == "overloaded"));
    assert_eq!(*observer.fragments.lock().unwrap(), vec!["Par"]);
}
