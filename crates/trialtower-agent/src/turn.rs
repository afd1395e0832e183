use std::collections::HashMap;

use anyhow::{Context, Result};
use futures_core::Stream;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use uuid::Uuid;

use trialtower_schema::{AgentEvent, DebugRing, Message, TranscriptEntry};

/// Terminal error delivered by the remote as a stream event, carrying the
/// remote's own error code.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize)]
#[error("agent error {code}: {message}")]
pub struct RemoteError {
    pub code: String,
    pub message: String,
}

/// Rendered state of one display slot, keyed by content index.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SlotContent {
    /// Full accumulated text for the slot, not an increment.
    Text { text: String },
    Thinking { text: String, expanded: bool },
    ToolUse { payload: serde_json::Value },
    ToolResult { payload: serde_json::Value },
    Chart { spec: serde_json::Value },
    Table {
        columns: Vec<String>,
        rows: Vec<Vec<serde_json::Value>>,
    },
}

/// Progress emitted while a turn is running; the outbound counterpart of the
/// inbound event stream.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnUpdate {
    Status { message: String },
    Slot {
        content_index: u32,
        content: SlotContent,
    },
    Error { code: String, message: String },
    Completed { message: Message },
}

impl TurnUpdate {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Status { .. } => "status",
            Self::Slot { .. } => "slot",
            Self::Error { .. } => "error",
            Self::Completed { .. } => "completed",
        }
    }
}

/// How a turn ended. `Exhausted` means the stream closed without either
/// terminator; the user message is left in place in that case.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    Completed,
    Failed(RemoteError),
    Exhausted,
}

/// Debug ring writer that honors the session's debug toggle.
pub struct DebugLog<'a> {
    ring: &'a mut DebugRing,
    enabled: bool,
}

impl<'a> DebugLog<'a> {
    pub fn new(ring: &'a mut DebugRing, enabled: bool) -> Self {
        Self { ring, enabled }
    }

    pub fn record(&mut self, kind: &str, payload: serde_json::Value) {
        if self.enabled {
            self.ring.push(kind, payload);
        }
    }
}

/// Remove every transcript entry belonging to one turn.
pub fn rollback_turn(transcript: &mut Vec<TranscriptEntry>, turn_id: Uuid) {
    transcript.retain(|entry| entry.turn_id != turn_id);
}

/// Consume one turn's event stream, mutating the transcript and emitting
/// display updates.
///
/// Exactly one of these holds afterwards: the transcript gained one terminal
/// assistant message; or the turn failed (remote error event or stream
/// failure) and every entry for `turn_id` was removed; or the stream ran dry
/// and the transcript was left as the caller staged it. Delta accumulation
/// buffers are local to the call and never outlive it.
pub async fn run_turn<S>(
    events: S,
    transcript: &mut Vec<TranscriptEntry>,
    turn_id: Uuid,
    thinking_expanded: bool,
    debug: &mut DebugLog<'_>,
    updates: &mpsc::Sender<TurnUpdate>,
) -> Result<TurnOutcome>
where
    S: Stream<Item = Result<AgentEvent>>,
{
    tokio::pin!(events);
    let mut buffers: HashMap<u32, String> = HashMap::new();

    while let Some(next) = events.next().await {
        let event = match next {
            Ok(event) => event,
            Err(e) => {
                debug.record(
                    "streaming_exception",
                    serde_json::json!({ "message": e.to_string() }),
                );
                rollback_turn(transcript, turn_id);
                return Err(e);
            }
        };

        match event {
            AgentEvent::Status(status) => {
                debug.record(
                    "response.status",
                    serde_json::json!({ "message": status.message }),
                );
                send(updates, TurnUpdate::Status {
                    message: status.message,
                })
                .await;
            }
            AgentEvent::TextDelta(delta) => {
                let buffer = buffers.entry(delta.content_index).or_default();
                buffer.push_str(&delta.text);
                send(updates, TurnUpdate::Slot {
                    content_index: delta.content_index,
                    content: SlotContent::Text {
                        text: buffer.clone(),
                    },
                })
                .await;
            }
            AgentEvent::ThinkingDelta(delta) => {
                let buffer = buffers.entry(delta.content_index).or_default();
                buffer.push_str(&delta.text);
                send(updates, TurnUpdate::Slot {
                    content_index: delta.content_index,
                    content: SlotContent::Thinking {
                        text: buffer.clone(),
                        expanded: thinking_expanded,
                    },
                })
                .await;
            }
            AgentEvent::Thinking(thinking) => {
                send(updates, TurnUpdate::Slot {
                    content_index: thinking.content_index,
                    content: SlotContent::Thinking {
                        text: thinking.text,
                        expanded: thinking_expanded,
                    },
                })
                .await;
            }
            AgentEvent::ToolUse(tool) => {
                send(updates, TurnUpdate::Slot {
                    content_index: tool.content_index,
                    content: SlotContent::ToolUse {
                        payload: tool.payload,
                    },
                })
                .await;
            }
            AgentEvent::ToolResult(tool) => {
                send(updates, TurnUpdate::Slot {
                    content_index: tool.content_index,
                    content: SlotContent::ToolResult {
                        payload: tool.payload,
                    },
                })
                .await;
            }
            AgentEvent::Chart(chart) => {
                let spec: serde_json::Value = match serde_json::from_str(&chart.chart_spec)
                    .context("chart event carried an invalid chart spec")
                {
                    Ok(spec) => spec,
                    Err(e) => {
                        debug.record(
                            "streaming_exception",
                            serde_json::json!({ "message": e.to_string() }),
                        );
                        rollback_turn(transcript, turn_id);
                        return Err(e);
                    }
                };
                send(updates, TurnUpdate::Slot {
                    content_index: chart.content_index,
                    content: SlotContent::Chart { spec },
                })
                .await;
            }
            AgentEvent::Table(table) => {
                send(updates, TurnUpdate::Slot {
                    content_index: table.content_index,
                    content: SlotContent::Table {
                        columns: table.result_set.column_names(),
                        rows: table.result_set.data,
                    },
                })
                .await;
            }
            AgentEvent::Error(error) => {
                debug.record(
                    "error",
                    serde_json::json!({ "code": error.code, "message": error.message }),
                );
                send(updates, TurnUpdate::Error {
                    code: error.code.clone(),
                    message: error.message.clone(),
                })
                .await;
                rollback_turn(transcript, turn_id);
                return Ok(TurnOutcome::Failed(RemoteError {
                    code: error.code,
                    message: error.message,
                }));
            }
            AgentEvent::Response(message) => {
                transcript.push(TranscriptEntry::new(turn_id, message.clone()));
                send(updates, TurnUpdate::Completed { message }).await;
                return Ok(TurnOutcome::Completed);
            }
        }
    }

    Ok(TurnOutcome::Exhausted)
}

// A disconnected consumer must not abort the turn; the transcript outcome
// still matters server-side.
async fn send(updates: &mpsc::Sender<TurnUpdate>, update: TurnUpdate) {
    if updates.send(update).await.is_err() {
        tracing::debug!("turn update receiver dropped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use trialtower_schema::{
        ChartEvent, ErrorEvent, ResultSet, StatusEvent, TableEvent, TextDeltaEvent,
        ThinkingDeltaEvent,
    };

    fn text_delta(index: u32, text: &str) -> Result<AgentEvent> {
        Ok(AgentEvent::TextDelta(TextDeltaEvent {
            content_index: index,
            text: text.into(),
        }))
    }

    fn thinking_delta(index: u32, text: &str) -> Result<AgentEvent> {
        Ok(AgentEvent::ThinkingDelta(ThinkingDeltaEvent {
            content_index: index,
            text: text.into(),
        }))
    }

    fn staged_transcript(prompt: &str, turn_id: Uuid) -> Vec<TranscriptEntry> {
        vec![TranscriptEntry::new(turn_id, Message::user(prompt))]
    }

    async fn drive(
        events: Vec<Result<AgentEvent>>,
        transcript: &mut Vec<TranscriptEntry>,
        turn_id: Uuid,
        debug_enabled: bool,
        ring: &mut DebugRing,
    ) -> (Result<TurnOutcome>, Vec<TurnUpdate>) {
        let (tx, mut rx) = mpsc::channel(256);
        let mut debug = DebugLog::new(ring, debug_enabled);
        let outcome = run_turn(
            tokio_stream::iter(events),
            transcript,
            turn_id,
            true,
            &mut debug,
            &tx,
        )
        .await;
        drop(tx);
        let mut updates = Vec::new();
        while let Some(update) = rx.recv().await {
            updates.push(update);
        }
        (outcome, updates)
    }

    #[tokio::test]
    async fn successful_turn_appends_exactly_one_assistant_message() {
        let turn_id = Uuid::new_v4();
        let mut transcript = staged_transcript("How many trials are off track?", turn_id);
        let mut ring = DebugRing::new();

        let events = vec![
            Ok(AgentEvent::Status(StatusEvent {
                message: "Thinking...".into(),
            })),
            text_delta(0, "There are"),
            text_delta(0, " 3 trials."),
            Ok(AgentEvent::Response(Message::assistant("There are 3 trials."))),
        ];

        let (outcome, updates) =
            drive(events, &mut transcript, turn_id, false, &mut ring).await;

        assert_eq!(outcome.unwrap(), TurnOutcome::Completed);
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript[1].message.text(), "There are 3 trials.");
        // Only the terminal message persists; deltas lived in updates alone.
        assert_eq!(
            updates.last().unwrap().kind(),
            "completed"
        );
        match &updates[2] {
            TurnUpdate::Slot {
                content_index,
                content: SlotContent::Text { text },
            } => {
                assert_eq!(*content_index, 0);
                assert_eq!(text, "There are 3 trials.");
            }
            other => panic!("expected accumulated slot, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn error_event_rolls_back_the_turn() {
        let turn_id = Uuid::new_v4();
        let mut transcript = staged_transcript("How many trials are off track?", turn_id);
        let before = 0; // length before the turn was staged
        let mut ring = DebugRing::new();

        let events = vec![
            text_delta(0, "partial"),
            Ok(AgentEvent::Error(ErrorEvent {
                code: "500".into(),
                message: "internal".into(),
            })),
        ];

        let (outcome, updates) = drive(events, &mut transcript, turn_id, true, &mut ring).await;

        match outcome.unwrap() {
            TurnOutcome::Failed(err) => {
                assert_eq!(err.code, "500");
                assert_eq!(err.message, "internal");
            }
            other => panic!("expected failure, got {other:?}"),
        }
        assert_eq!(transcript.len(), before);
        assert!(matches!(
            updates.last().unwrap(),
            TurnUpdate::Error { code, .. } if code == "500"
        ));
        // Debug mode was on: the error is in the ring.
        assert_eq!(ring.snapshot()[0].kind, "error");
    }

    #[tokio::test]
    async fn stream_failure_rolls_back_and_resurfaces() {
        let turn_id = Uuid::new_v4();
        let mut transcript = staged_transcript("q", turn_id);
        let mut ring = DebugRing::new();

        let events = vec![text_delta(0, "x"), Err(anyhow!("connection reset"))];
        let (outcome, _) = drive(events, &mut transcript, turn_id, true, &mut ring).await;

        let err = outcome.unwrap_err();
        assert!(err.to_string().contains("connection reset"));
        assert!(transcript.is_empty());
        assert_eq!(ring.snapshot()[0].kind, "streaming_exception");
    }

    #[tokio::test]
    async fn interleaved_indices_accumulate_independently() {
        let turn_id = Uuid::new_v4();
        let mut transcript = staged_transcript("q", turn_id);
        let mut ring = DebugRing::new();

        let events = vec![
            text_delta(0, "AA"),
            thinking_delta(1, "BB"),
            text_delta(0, "CC"),
            thinking_delta(1, "DD"),
            Ok(AgentEvent::Response(Message::assistant("done"))),
        ];

        let (outcome, updates) =
            drive(events, &mut transcript, turn_id, false, &mut ring).await;
        assert_eq!(outcome.unwrap(), TurnOutcome::Completed);

        let mut last_per_index: HashMap<u32, String> = HashMap::new();
        for update in &updates {
            if let TurnUpdate::Slot {
                content_index,
                content,
            } = update
            {
                let text = match content {
                    SlotContent::Text { text } => text.clone(),
                    SlotContent::Thinking { text, .. } => text.clone(),
                    other => panic!("unexpected slot content: {other:?}"),
                };
                last_per_index.insert(*content_index, text);
            }
        }
        assert_eq!(last_per_index[&0], "AACC");
        assert_eq!(last_per_index[&1], "BBDD");
    }

    #[tokio::test]
    async fn exhausted_stream_keeps_user_message() {
        let turn_id = Uuid::new_v4();
        let mut transcript = staged_transcript("q", turn_id);
        let mut ring = DebugRing::new();

        let events = vec![text_delta(0, "never finished")];
        let (outcome, _) = drive(events, &mut transcript, turn_id, false, &mut ring).await;

        assert_eq!(outcome.unwrap(), TurnOutcome::Exhausted);
        assert_eq!(transcript.len(), 1);
    }

    #[tokio::test]
    async fn invalid_chart_spec_fails_the_turn() {
        let turn_id = Uuid::new_v4();
        let mut transcript = staged_transcript("q", turn_id);
        let mut ring = DebugRing::new();

        let events = vec![Ok(AgentEvent::Chart(ChartEvent {
            content_index: 0,
            chart_spec: "{not json".into(),
        }))];
        let (outcome, _) = drive(events, &mut transcript, turn_id, false, &mut ring).await;

        assert!(outcome.is_err());
        assert!(transcript.is_empty());
    }

    #[tokio::test]
    async fn table_event_materializes_grid() {
        let turn_id = Uuid::new_v4();
        let mut transcript = staged_transcript("q", turn_id);
        let mut ring = DebugRing::new();

        let result_set: ResultSet = serde_json::from_value(serde_json::json!({
            "data": [["S-001", 6]],
            "result_set_meta_data": {"row_type": [{"name": "STUDY_ID"}, {"name": "DELAY"}]}
        }))
        .unwrap();
        let events = vec![
            Ok(AgentEvent::Table(TableEvent {
                content_index: 2,
                result_set,
            })),
            Ok(AgentEvent::Response(Message::assistant("see table"))),
        ];

        let (_, updates) = drive(events, &mut transcript, turn_id, false, &mut ring).await;
        match &updates[0] {
            TurnUpdate::Slot {
                content_index: 2,
                content: SlotContent::Table { columns, rows },
            } => {
                assert_eq!(columns, &vec!["STUDY_ID".to_string(), "DELAY".to_string()]);
                assert_eq!(rows.len(), 1);
            }
            other => panic!("expected table slot, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn debug_ring_untouched_when_disabled() {
        let turn_id = Uuid::new_v4();
        let mut transcript = staged_transcript("q", turn_id);
        let mut ring = DebugRing::new();

        let events = vec![
            Ok(AgentEvent::Status(StatusEvent {
                message: "Running SQL".into(),
            })),
            Ok(AgentEvent::Error(ErrorEvent {
                code: "429".into(),
                message: "throttled".into(),
            })),
        ];
        let _ = drive(events, &mut transcript, turn_id, false, &mut ring).await;
        assert!(ring.is_empty());
    }
}
