use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

/// Tabular payload carried by table events and table content items.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultSet {
    #[serde(default)]
    pub data: Vec<Vec<serde_json::Value>>,
    #[serde(default)]
    pub result_set_meta_data: ResultSetMeta,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultSetMeta {
    #[serde(default)]
    pub row_type: Vec<ColumnType>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ColumnType {
    pub name: String,
}

impl ResultSet {
    pub fn column_names(&self) -> Vec<String> {
        self.result_set_meta_data
            .row_type
            .iter()
            .map(|c| c.name.clone())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartContent {
    /// Embedded chart specification, stored as a JSON string on the wire.
    pub chart_spec: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableContent {
    pub result_set: ResultSet,
}

/// One piece of message content.
///
/// `annotations` is response-only provenance attached by the agent (e.g.
/// search citations). It must be emptied before a message is ever sent
/// back to the agent; the display transcript keeps it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentItem {
    Text {
        text: String,
        #[serde(default)]
        annotations: Vec<serde_json::Value>,
    },
    Thinking {
        text: String,
    },
    ToolUse {
        #[serde(default)]
        tool_use: serde_json::Value,
    },
    ToolResult {
        #[serde(default)]
        tool_result: serde_json::Value,
    },
    Chart {
        chart: ChartContent,
        #[serde(default)]
        annotations: Vec<serde_json::Value>,
    },
    Table {
        table: TableContent,
        #[serde(default)]
        annotations: Vec<serde_json::Value>,
    },
}

impl ContentItem {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text {
            text: text.into(),
            annotations: Vec::new(),
        }
    }

    /// Whether this item carries any (non-empty) annotations.
    pub fn has_annotations(&self) -> bool {
        match self {
            Self::Text { annotations, .. }
            | Self::Chart { annotations, .. }
            | Self::Table { annotations, .. } => !annotations.is_empty(),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: Vec<ContentItem>,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: vec![ContentItem::text(text)],
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: vec![ContentItem::text(text)],
        }
    }

    /// Concatenated text of all text items.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|item| match item {
                ContentItem::Text { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// A transcript entry ties a message to the turn that produced it, so an
/// error rollback can target the exact entry instead of "the last one".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub turn_id: Uuid,
    pub message: Message,
}

impl TranscriptEntry {
    pub fn new(turn_id: Uuid, message: Message) -> Self {
        Self { turn_id, message }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_item_serde_tagging() {
        let item = ContentItem::text("hello");
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["type"], "text");
        assert_eq!(json["text"], "hello");
        assert_eq!(json["annotations"], serde_json::json!([]));

        let back: ContentItem = serde_json::from_value(json).unwrap();
        assert_eq!(back, item);
    }

    #[test]
    fn content_item_annotations_default_when_absent() {
        let item: ContentItem =
            serde_json::from_str(r#"{"type": "text", "text": "hi"}"#).unwrap();
        assert!(!item.has_annotations());
    }

    #[test]
    fn chart_and_table_items_roundtrip() {
        let chart: ContentItem = serde_json::from_value(serde_json::json!({
            "type": "chart",
            "chart": {"chart_spec": "{\"mark\": \"line\"}"},
            "annotations": [{"source": "search"}]
        }))
        .unwrap();
        assert!(chart.has_annotations());

        let table: ContentItem = serde_json::from_value(serde_json::json!({
            "type": "table",
            "table": {
                "result_set": {
                    "data": [["S1", "12"]],
                    "result_set_meta_data": {"row_type": [{"name": "STUDY_ID"}, {"name": "N"}]}
                }
            }
        }))
        .unwrap();
        match &table {
            ContentItem::Table { table, .. } => {
                assert_eq!(table.result_set.column_names(), vec!["STUDY_ID", "N"]);
                assert_eq!(table.result_set.data.len(), 1);
            }
            _ => panic!("expected table item"),
        }
    }

    #[test]
    fn message_text_joins_text_items_only() {
        let msg = Message {
            role: MessageRole::Assistant,
            content: vec![
                ContentItem::text("line 1"),
                ContentItem::Thinking {
                    text: "pondering".into(),
                },
                ContentItem::text("line 2"),
            ],
        };
        assert_eq!(msg.text(), "line 1\nline 2");
    }

    #[test]
    fn message_role_serde() {
        assert_eq!(
            serde_json::to_string(&MessageRole::User).unwrap(),
            "\"user\""
        );
        let role: MessageRole = serde_json::from_str("\"assistant\"").unwrap();
        assert_eq!(role, MessageRole::Assistant);
    }
}
