use anyhow::{anyhow, Result};
use futures_core::Stream;
use tokio_stream::StreamExt;
use trialtower_schema::AgentEvent;

/// Decode a server-sent-event byte stream into typed agent events.
///
/// Events are framed as blocks separated by a blank line; each block carries
/// an `event:` name and one or more `data:` lines. Unknown event names are
/// skipped; an undecodable payload or transport failure ends the stream with
/// an error item.
pub fn event_stream(
    byte_stream: impl Stream<Item = std::result::Result<bytes::Bytes, reqwest::Error>>
        + Send
        + 'static,
) -> impl Stream<Item = Result<AgentEvent>> + Send + 'static {
    async_stream::stream! {
        tokio::pin!(byte_stream);
        let mut buffer = String::new();

        while let Some(chunk_result) = byte_stream.next().await {
            match chunk_result {
                Ok(bytes) => {
                    buffer.push_str(&String::from_utf8_lossy(&bytes));

                    while let Some(pos) = buffer.find("\n\n") {
                        let block = buffer[..pos].to_string();
                        buffer = buffer[pos + 2..].to_string();

                        match parse_event_block(&block) {
                            Ok(Some(event)) => yield Ok(event),
                            Ok(None) => {}
                            Err(e) => {
                                yield Err(e);
                                return;
                            }
                        }
                    }
                }
                Err(e) => {
                    yield Err(anyhow!("stream error: {e}"));
                    return;
                }
            }
        }
    }
}

/// Parse one SSE block. Blocks without data (comments, keep-alives) and
/// unknown event names yield `None`.
pub fn parse_event_block(block: &str) -> Result<Option<AgentEvent>> {
    let mut name = "message";
    let mut data_lines: Vec<&str> = Vec::new();

    for line in block.lines() {
        let line = line.trim_end_matches('\r');
        if let Some(value) = line.strip_prefix("event:") {
            name = value.trim();
        } else if let Some(value) = line.strip_prefix("data:") {
            data_lines.push(value.strip_prefix(' ').unwrap_or(value));
        }
    }

    if data_lines.is_empty() {
        return Ok(None);
    }
    let data = data_lines.join("\n");
    if data == "[DONE]" {
        return Ok(None);
    }

    AgentEvent::from_named(name, &data)
}
