//! Server-Sent Events decoding for streamed chat completions.

use super::types::ChatCompletionChunk;
use crate::{Error, Result};
use async_stream::try_stream;
use futures::{Stream, StreamExt};

const DONE_MARKER: &str = "[DONE]";

enum SseData {
    Chunk(ChatCompletionChunk),
    Done,
    Skip,
}

/// Decode a raw SSE byte stream into completion chunks, in arrival order.
///
/// Events may be split across network reads. The stream ends at `[DONE]` or
/// when the byte stream ends; a trailing event without its blank line is
/// still decoded.
pub fn decode_chunks<S, B, E>(bytes: S) -> impl Stream<Item = Result<ChatCompletionChunk>>
where
    S: Stream<Item = std::result::Result<B, E>>,
    B: AsRef<[u8]>,
    E: Into<Error>,
{
    try_stream! {
        let mut buffer: Vec<u8> = Vec::new();
        let mut finished = false;
        futures::pin_mut!(bytes);

        while let Some(item) = bytes.next().await {
            let item = item.map_err(Into::<Error>::into)?;
            buffer.extend(item.as_ref().iter().copied().filter(|b| *b != b'\r'));

            while let Some(event) = take_event(&mut buffer) {
                match parse_event(&event)? {
                    SseData::Chunk(chunk) => yield chunk,
                    SseData::Done => {
                        finished = true;
                        break;
                    }
                    SseData::Skip => {}
                }
            }

            if finished {
                break;
            }
        }

        if !finished && !buffer.is_empty() {
            let tail = std::mem::take(&mut buffer);
            if let SseData::Chunk(chunk) = parse_event(&tail)? {
                yield chunk;
            }
        }
    }
}

fn take_event(buffer: &mut Vec<u8>) -> Option<Vec<u8>> {
    let pos = buffer.windows(2).position(|window| window == b"\n\n")?;
    let event = buffer[..pos].to_vec();
    buffer.drain(..pos + 2);
    Some(event)
}

fn parse_event(raw: &[u8]) -> Result<SseData> {
    let text = std::str::from_utf8(raw)
        .map_err(|e| Error::AiProvider(format!("Invalid UTF-8 in event stream: {}", e)))?;

    let data_lines: Vec<&str> = text
        .lines()
        .filter(|line| !line.starts_with(':'))
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|value| value.strip_prefix(' ').unwrap_or(value))
        .collect();

    let data = data_lines.join("\n");
    let data = data.trim();
    if data.is_empty() {
        return Ok(SseData::Skip);
    }
    if data == DONE_MARKER {
        return Ok(SseData::Done);
    }

    let chunk: ChatCompletionChunk = serde_json::from_str(data).map_err(|e| {
        tracing::error!("Failed to parse stream chunk: {}\nData: {}", e, data);
        Error::AiProvider(format!("Failed to parse stream chunk: {}", e))
    })?;

    if let Some(error) = &chunk.error {
        tracing::error!("Inference backend reported a stream error: {}", error);
        return Err(Error::AiProvider(format!(
            "Backend reported an error mid-stream: {}",
            error
        )));
    }

    Ok(SseData::Chunk(chunk))
}
