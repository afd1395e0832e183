use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

use trialtower_agent::{
    rollback_turn, run_turn, strip_annotations, AgentClient, DebugLog, TurnOutcome, TurnUpdate,
};
use trialtower_schema::{DebugRing, Message, TranscriptEntry};

/// All mutable state belonging to one chat session. Nothing here is shared
/// across sessions; a turn holds the session lock end to end, so at most one
/// turn is in flight per session.
pub struct ChatContext {
    pub transcript: Vec<TranscriptEntry>,
    pub thinking_expanded: bool,
    pub debug_enabled: bool,
    pub debug: DebugRing,
}

impl Default for ChatContext {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatContext {
    pub fn new() -> Self {
        Self {
            transcript: Vec::new(),
            thinking_expanded: true,
            debug_enabled: false,
            debug: DebugRing::new(),
        }
    }

    /// Display-form history, annotations intact.
    pub fn messages(&self) -> Vec<Message> {
        self.transcript
            .iter()
            .map(|entry| entry.message.clone())
            .collect()
    }

    pub fn clear(&mut self) {
        self.transcript.clear();
        self.debug.clear();
    }

    /// Run one chat turn: stage the user message, send the cleaned history,
    /// then let the event loop drive the transcript to its outcome. A request
    /// that never reaches streaming is rolled back here; everything after is
    /// the event loop's responsibility.
    pub async fn send_message(
        &mut self,
        client: &AgentClient,
        text: &str,
        updates: &mpsc::Sender<TurnUpdate>,
    ) -> Result<TurnOutcome> {
        let turn_id = Uuid::new_v4();
        self.transcript
            .push(TranscriptEntry::new(turn_id, Message::user(text)));

        let history = self.messages();
        let cleaned = strip_annotations(&history);
        if self.debug_enabled {
            if cleaned.annotations_removed > 0 {
                self.debug.push(
                    "annotations_stripped",
                    serde_json::json!({ "count": cleaned.annotations_removed }),
                );
            }
            if cleaned.reconstruction_failures > 0 {
                self.debug.push(
                    "message_reconstruction_error",
                    serde_json::json!({ "count": cleaned.reconstruction_failures }),
                );
            }
        }

        let events = match client.run(&cleaned.messages).await {
            Ok(events) => events,
            Err(e) => {
                if self.debug_enabled {
                    self.debug.push(
                        "request_exception",
                        serde_json::json!({ "message": e.to_string() }),
                    );
                }
                rollback_turn(&mut self.transcript, turn_id);
                return Err(e);
            }
        };

        let mut debug = DebugLog::new(&mut self.debug, self.debug_enabled);
        run_turn(
            events,
            &mut self.transcript,
            turn_id,
            self.thinking_expanded,
            &mut debug,
            updates,
        )
        .await
    }
}

struct Slot {
    context: Arc<Mutex<ChatContext>>,
    last_active: Instant,
}

/// Session store keyed by caller-chosen session id. Contexts are created on
/// first contact and dropped after the inactivity window; a context still
/// borrowed by an in-flight turn survives the sweep.
pub struct SessionRegistry {
    slots: std::sync::Mutex<HashMap<String, Slot>>,
    idle_ttl: Duration,
}

impl SessionRegistry {
    pub fn new(idle_ttl: Duration) -> Self {
        Self {
            slots: std::sync::Mutex::new(HashMap::new()),
            idle_ttl,
        }
    }

    pub fn get_or_create(&self, session_id: &str) -> Arc<Mutex<ChatContext>> {
        let mut slots = self.slots.lock().expect("session lock poisoned");
        let slot = slots.entry(session_id.to_string()).or_insert_with(|| {
            tracing::debug!(session_id, "creating chat session");
            Slot {
                context: Arc::new(Mutex::new(ChatContext::new())),
                last_active: Instant::now(),
            }
        });
        slot.last_active = Instant::now();
        slot.context.clone()
    }

    /// Look up without creating; touches the activity timestamp.
    pub fn get(&self, session_id: &str) -> Option<Arc<Mutex<ChatContext>>> {
        let mut slots = self.slots.lock().expect("session lock poisoned");
        let slot = slots.get_mut(session_id)?;
        slot.last_active = Instant::now();
        Some(slot.context.clone())
    }

    pub fn remove(&self, session_id: &str) -> bool {
        self.slots
            .lock()
            .expect("session lock poisoned")
            .remove(session_id)
            .is_some()
    }

    /// Drop sessions idle past the TTL. Returns how many were evicted.
    pub fn evict_idle(&self) -> usize {
        let mut slots = self.slots.lock().expect("session lock poisoned");
        let before = slots.len();
        slots.retain(|session_id, slot| {
            let idle = slot.last_active.elapsed() < self.idle_ttl;
            let in_use = Arc::strong_count(&slot.context) > 1;
            if !idle && !in_use {
                tracing::debug!(session_id, "evicting idle chat session");
            }
            idle || in_use
        });
        before - slots.len()
    }

    pub fn len(&self) -> usize {
        self.slots.lock().expect("session lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trialtower_agent::AgentSettings;
    use wiremock::matchers::{body_partial_json, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client(base_url: &str) -> AgentClient {
        let settings = AgentSettings {
            database: "CLINOPS".into(),
            schema: "ANALYTICS".into(),
            agent: "ENROLLMENT_ASSISTANT".into(),
            model: "claude-4-sonnet".into(),
            warehouse: None,
            role: None,
            verify_ssl: true,
        };
        AgentClient::with_base_url(base_url, "token", settings).unwrap()
    }

    async fn drain(mut rx: mpsc::Receiver<TurnUpdate>) -> Vec<TurnUpdate> {
        let mut updates = Vec::new();
        while let Ok(update) = rx.try_recv() {
            updates.push(update);
        }
        updates
    }

    #[tokio::test]
    async fn send_message_appends_user_and_assistant() {
        let server = MockServer::start().await;
        let sse_body = concat!(
            "event: response.status\ndata: {\"message\": \"Thinking...\"}\n\n",
            "event: response\ndata: {\"role\": \"assistant\", \"content\": [{\"type\": \"text\", \"text\": \"There are 3 trials.\"}]}\n\n",
        );
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Content-Type", "text/event-stream")
                    .set_body_string(sse_body),
            )
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let mut context = ChatContext::new();
        let (tx, rx) = mpsc::channel(64);

        let outcome = context
            .send_message(&client, "How many trials are off track?", &tx)
            .await
            .unwrap();

        assert_eq!(outcome, TurnOutcome::Completed);
        assert_eq!(context.transcript.len(), 2);
        assert_eq!(context.transcript[1].message.text(), "There are 3 trials.");
        let updates = drain(rx).await;
        assert_eq!(updates.last().unwrap().kind(), "completed");
    }

    #[tokio::test]
    async fn send_message_strips_annotations_from_outbound_history() {
        let server = MockServer::start().await;
        let sse_body = "event: response\ndata: {\"role\": \"assistant\", \"content\": [{\"type\": \"text\", \"text\": \"ok\"}]}\n\n";
        Mock::given(method("POST"))
            // The request history must carry an emptied annotations list.
            .and(body_partial_json(serde_json::json!({
                "messages": [{"content": [{"type": "text", "text": "cited", "annotations": []}]}]
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Content-Type", "text/event-stream")
                    .set_body_string(sse_body),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let mut context = ChatContext::new();
        context.debug_enabled = true;
        context.transcript.push(TranscriptEntry::new(
            Uuid::new_v4(),
            serde_json::from_value(serde_json::json!({
                "role": "assistant",
                "content": [{"type": "text", "text": "cited", "annotations": [{"doc": "sop-7"}]}]
            }))
            .unwrap(),
        ));

        let (tx, _rx) = mpsc::channel(64);
        context.send_message(&client, "next question", &tx).await.unwrap();

        // Display transcript keeps the annotation.
        assert!(context.transcript[0].message.content[0].has_annotations());
        assert!(context
            .debug
            .snapshot()
            .iter()
            .any(|e| e.kind == "annotations_stripped"));
    }

    #[tokio::test]
    async fn send_message_rolls_back_on_request_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let mut context = ChatContext::new();
        context.debug_enabled = true;
        let (tx, _rx) = mpsc::channel(64);

        let err = context.send_message(&client, "hello", &tx).await.unwrap_err();
        assert!(err.to_string().contains("503"));
        assert!(context.transcript.is_empty());
        assert_eq!(context.debug.snapshot()[0].kind, "request_exception");
    }

    #[test]
    fn registry_reuses_context_per_session() {
        let registry = SessionRegistry::new(Duration::from_secs(1800));
        let a1 = registry.get_or_create("alpha");
        let a2 = registry.get_or_create("alpha");
        let b = registry.get_or_create("beta");
        assert!(Arc::ptr_eq(&a1, &a2));
        assert!(!Arc::ptr_eq(&a1, &b));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn registry_evicts_only_idle_sessions() {
        let registry = SessionRegistry::new(Duration::from_millis(0));
        let held = registry.get_or_create("busy");
        registry.get_or_create("idle");
        std::thread::sleep(Duration::from_millis(5));

        let evicted = registry.evict_idle();
        assert_eq!(evicted, 1);
        assert!(registry.get("idle").is_none());
        // The held context survives even past its TTL.
        assert!(registry.get("busy").is_some());
        drop(held);
        assert_eq!(registry.evict_idle(), 1);
    }

    #[test]
    fn registry_remove_clears_session() {
        let registry = SessionRegistry::new(Duration::from_secs(1800));
        registry.get_or_create("gone");
        assert!(registry.remove("gone"));
        assert!(!registry.remove("gone"));
        assert!(registry.is_empty());
    }

    #[test]
    fn context_defaults() {
        let context = ChatContext::new();
        assert!(context.thinking_expanded);
        assert!(!context.debug_enabled);
        assert!(context.transcript.is_empty());
        assert!(context.debug.is_empty());
    }
}
