//! Surface operations against real storage and stub or mock model providers

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use branch_tree::{BranchId, ConversationId, NodePatch};
use chat_service::{build_service, AppConfig, Backend, ConversationService, ServiceError};
use conversation_store::{ConversationRegistry, FileTreeStorage};
use reply_client::{ChatMessage, ReplyError, ReplyProvider, Role};
use tempfile::TempDir;
use tokio::sync::Notify;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Echoes the prompt back and remembers every request.
#[derive(Default)]
struct EchoProvider {
    requests: Mutex<Vec<Vec<ChatMessage>>>,
}

#[async_trait]
impl ReplyProvider for EchoProvider {
    async fn reply(&self, messages: &[ChatMessage], _model: &str) -> reply_client::Result<String> {
        self.requests.lock().unwrap().push(messages.to_vec());
        let prompt = messages.last().map(|m| m.content.clone()).unwrap_or_default();
        Ok(format!("echo: {prompt}"))
    }
}

struct FailingProvider;

#[async_trait]
impl ReplyProvider for FailingProvider {
    async fn reply(&self, _messages: &[ChatMessage], _model: &str) -> reply_client::Result<String> {
        Err(ReplyError::RateLimited("slow down".to_string()))
    }
}

/// Holds every reply until the test releases it.
#[derive(Default)]
struct GatedProvider {
    entered: Notify,
    release: Notify,
}

#[async_trait]
impl ReplyProvider for GatedProvider {
    async fn reply(&self, messages: &[ChatMessage], _model: &str) -> reply_client::Result<String> {
        self.entered.notify_one();
        self.release.notified().await;
        Ok(format!("context had {} messages", messages.len()))
    }
}

async fn service_with(provider: Arc<dyn ReplyProvider>) -> (TempDir, ConversationService) {
    let dir = tempfile::tempdir().unwrap();
    let registry = ConversationRegistry::new(Arc::new(FileTreeStorage::new(dir.path())))
        .await
        .unwrap();
    (dir, ConversationService::new(registry, provider, "gpt-4"))
}

#[tokio::test]
async fn test_add_exchange_sends_active_timeline_as_context() {
    let provider = Arc::new(EchoProvider::default());
    let (_dir, service) = service_with(provider.clone()).await;
    let conversation = service.create_conversation(None).await.unwrap();

    service
        .add_exchange(&conversation.id, "first", None)
        .await
        .unwrap();
    let node = service
        .add_exchange(&conversation.id, "second", None)
        .await
        .unwrap();

    assert_eq!(node.ai_msg.as_deref(), Some("echo: second"));
    let requests = provider.requests.lock().unwrap();
    let last: Vec<(Role, &str)> = requests[1]
        .iter()
        .map(|m| (m.role, m.content.as_str()))
        .collect();
    assert_eq!(
        last,
        vec![
            (Role::User, "Start your conversation..."),
            (Role::Assistant, "Hi! How can I help you?"),
            (Role::User, "first"),
            (Role::Assistant, "echo: first"),
            (Role::User, "second"),
        ]
    );
}

#[tokio::test]
async fn test_failed_model_call_records_nothing() {
    let (_dir, service) = service_with(Arc::new(FailingProvider)).await;
    let conversation = service.create_conversation(None).await.unwrap();
    let before = service.get_timeline(&conversation.id, None).await.unwrap();

    let err = service
        .add_exchange(&conversation.id, "hello?", None)
        .await
        .unwrap_err();

    assert!(matches!(err, ServiceError::Upstream(ReplyError::RateLimited(_))));
    let after = service.get_timeline(&conversation.id, None).await.unwrap();
    assert_eq!(after, before);
}

#[tokio::test]
async fn test_fork_switch_and_update_flow() {
    let (_dir, service) = service_with(Arc::new(EchoProvider::default())).await;
    let id = service.create_conversation(Some("Flow".into())).await.unwrap().id;
    let seed = service.cursor(&id).await.unwrap().node_id;
    let main_id = service.cursor(&id).await.unwrap().branch_id;

    let n1 = service.add_exchange(&id, "hi", None).await.unwrap();
    assert_eq!(n1.parent_id.as_ref(), Some(&seed));

    let alt = service.fork_branch(&id, "alt", &seed).await.unwrap();
    service.add_exchange(&id, "bye", None).await.unwrap();

    let main = service.get_timeline(&id, Some(&main_id)).await.unwrap();
    assert_eq!(main.len(), 2);
    assert_eq!(main[1].user_msg.as_deref(), Some("hi"));
    let alt_timeline = service.get_timeline(&id, Some(&alt.id)).await.unwrap();
    assert_eq!(alt_timeline[1].user_msg.as_deref(), Some("bye"));

    let cursor = service.switch_branch(&id, &main_id).await.unwrap();
    assert_eq!(cursor.node_id, n1.id);

    service
        .update_node(&id, &n1.id, NodePatch::default().with_annotations("good answer"))
        .await
        .unwrap();
    service.rename_branch(&id, &alt.id, "experiment").await.unwrap();

    let branches = service.branches(&id).await.unwrap();
    assert_eq!(branches[1].name, "experiment");
    assert!(branches[0].is_active);
    let main = service.get_timeline(&id, None).await.unwrap();
    assert_eq!(main[1].annotations, "good answer");
}

#[tokio::test]
async fn test_not_found_is_surfaced_without_side_effects() {
    let (_dir, service) = service_with(Arc::new(EchoProvider::default())).await;
    let id = service.create_conversation(None).await.unwrap().id;
    let before = service.cursor(&id).await.unwrap();

    let err = service
        .switch_branch(&id, &BranchId::from_raw("nope"))
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(service.cursor(&id).await.unwrap(), before);

    let missing = ConversationId::from_raw("conv_nothere");
    assert!(service.get_timeline(&missing, None).await.unwrap_err().is_not_found());
    assert!(service.delete_conversation(&missing).await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_list_create_rename_delete() {
    let (_dir, service) = service_with(Arc::new(EchoProvider::default())).await;

    let ensured = service.ensure_conversation().await.unwrap();
    assert_eq!(ensured.len(), 1);

    let second = service.create_conversation(None).await.unwrap();
    let renamed = service
        .rename_conversation(&second.id, Some("Groceries".into()))
        .await
        .unwrap();
    assert_eq!(renamed.title, "Groceries");

    let listed = service.list_conversations().await.unwrap();
    assert_eq!(listed.len(), 2);
    let mut ids: Vec<_> = listed.iter().map(|c| c.id.clone()).collect();
    ids.sort();
    assert_eq!(listed.iter().map(|c| c.id.clone()).collect::<Vec<_>>(), ids);

    service.delete_conversation(&second.id).await.unwrap();
    assert_eq!(service.list_conversations().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_configured_service_calls_openai_compatible_endpoint() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "choices": [{
                "index": 0,
                "message": { "role": "assistant", "content": "Hello from upstream" },
                "finish_reason": "stop"
            }]
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let config = AppConfig {
        data_dir: Some(dir.path().to_path_buf()),
        backend: Backend::File,
        api_key: Some("sk-test".into()),
        api_base: Some(mock_server.uri()),
        ..Default::default()
    };
    let service = build_service(&config).await.unwrap();
    let id = service.create_conversation(None).await.unwrap().id;

    let node = service.add_exchange(&id, "hi", None).await.unwrap();

    assert_eq!(node.ai_msg.as_deref(), Some("Hello from upstream"));
    assert_eq!(service.get_timeline(&id, None).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_reply_lands_on_branch_it_was_asked_from() {
    let provider = Arc::new(GatedProvider::default());
    let (_dir, service) = service_with(provider.clone()).await;
    let service = Arc::new(service);
    let id = service.create_conversation(None).await.unwrap().id;
    let start = service.cursor(&id).await.unwrap();
    let first = service
        .record_exchange(&id, Some("first".into()), Some("one".into()), None)
        .await
        .unwrap();
    let alt = service.fork_branch(&id, "alt", &start.node_id).await.unwrap();
    service.switch_branch(&id, &start.branch_id).await.unwrap();

    let pending = {
        let service = Arc::clone(&service);
        let id = id.clone();
        tokio::spawn(async move { service.add_exchange(&id, "follow-up on main", None).await })
    };
    provider.entered.notified().await;
    service.switch_branch(&id, &alt.id).await.unwrap();
    provider.release.notify_one();
    let node = pending.await.unwrap().unwrap();

    assert_eq!(node.ai_msg.as_deref(), Some("context had 5 messages"));
    assert_eq!(node.parent_id.as_ref(), Some(&first.id));
    let main = service.get_timeline(&id, Some(&start.branch_id)).await.unwrap();
    assert_eq!(main.len(), 3);
    assert_eq!(main[2].id, node.id);
    let alt_timeline = service.get_timeline(&id, Some(&alt.id)).await.unwrap();
    assert_eq!(alt_timeline.len(), 1);

    let cursor = service.cursor(&id).await.unwrap();
    assert_eq!(cursor.branch_id, alt.id);
    assert_eq!(cursor.node_id, start.node_id);
}

#[tokio::test]
async fn test_conversation_deleted_during_model_call_stays_deleted() {
    let provider = Arc::new(GatedProvider::default());
    let (dir, service) = service_with(provider.clone()).await;
    let service = Arc::new(service);
    let id = service.create_conversation(None).await.unwrap().id;
    let file = dir.path().join(format!("{}.json", id.as_str()));
    assert!(file.exists());

    let pending = {
        let service = Arc::clone(&service);
        let id = id.clone();
        tokio::spawn(async move { service.add_exchange(&id, "anyone there?", None).await })
    };
    provider.entered.notified().await;
    service.delete_conversation(&id).await.unwrap();
    provider.release.notify_one();

    let err = pending.await.unwrap().unwrap_err();
    assert!(err.is_not_found());
    assert!(service.list_conversations().await.unwrap().is_empty());
    assert!(!file.exists());
}
