use trialtower_schema::Message;

/// Result of preparing a message history for transmission.
#[derive(Debug, Clone)]
pub struct StripOutcome {
    pub messages: Vec<Message>,
    /// Count of non-empty annotation lists that were emptied.
    pub annotations_removed: usize,
    /// Entries that failed the clean/rebuild round trip and were kept as-is.
    pub reconstruction_failures: usize,
}

/// Empty every content item's annotations in a wire copy of the history.
///
/// Annotations are provenance the agent attaches to its own responses; the
/// remote rejects them when echoed back, so the request payload must never
/// carry one. The display transcript is left untouched. Each message is
/// round-tripped through its JSON form; an entry that fails to rebuild is
/// kept in its original form rather than dropped.
pub fn strip_annotations(messages: &[Message]) -> StripOutcome {
    let mut outcome = StripOutcome {
        messages: Vec::with_capacity(messages.len()),
        annotations_removed: 0,
        reconstruction_failures: 0,
    };

    for message in messages {
        let mut doc = match serde_json::to_value(message) {
            Ok(doc) => doc,
            Err(e) => {
                tracing::warn!(error = %e, "message could not be serialized for cleaning");
                outcome.reconstruction_failures += 1;
                outcome.messages.push(message.clone());
                continue;
            }
        };

        if let Some(items) = doc.get_mut("content").and_then(|c| c.as_array_mut()) {
            for item in items {
                let Some(annotations) = item.get_mut("annotations") else {
                    continue;
                };
                if annotations.as_array().map(|a| !a.is_empty()).unwrap_or(false) {
                    outcome.annotations_removed +=
                        annotations.as_array().map(|a| a.len()).unwrap_or(0);
                }
                *annotations = serde_json::Value::Array(Vec::new());
            }
        }

        match serde_json::from_value::<Message>(doc) {
            Ok(cleaned) => outcome.messages.push(cleaned),
            Err(e) => {
                tracing::warn!(error = %e, "cleaned message failed to rebuild, keeping original");
                outcome.reconstruction_failures += 1;
                outcome.messages.push(message.clone());
            }
        }
    }

    outcome
}
