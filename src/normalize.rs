//! Conversion of client chat turns into backend messages.
//!
//! Lossy on purpose: attachments without data are dropped, a missing mime
//! type falls back to JPEG, and nothing here ever fails.

use crate::ai::openai::types::{ChatMessage, ChatMessageContent, MessagePart};
use crate::models::ChatTurn;

/// One backend message per turn, in conversation order.
pub fn build_messages(turns: &[ChatTurn]) -> Vec<ChatMessage> {
    turns.iter().map(build_message).collect()
}

fn build_message(turn: &ChatTurn) -> ChatMessage {
    let content = if turn.images.is_empty() {
        ChatMessageContent::Text(turn.content.clone())
    } else {
        let mut parts = Vec::with_capacity(turn.images.len() + 1);
        if !turn.content.is_empty() {
            parts.push(MessagePart::text(turn.content.clone()));
        }
        parts.extend(
            turn.images
                .iter()
                .filter(|image| !image.data_base64.is_empty())
                .map(|image| MessagePart::inline_image(image.mime_type(), &image.data_base64)),
        );
        ChatMessageContent::Parts(parts)
    };

    ChatMessage {
        role: turn.role.as_str().to_string(),
        content,
    }
}
