//! Context-size estimation.
//!
//! The budget check before every turn needs a cheap token count for the
//! brain's whole history; the provider's exact tokenizer is not available
//! locally, so a characters-per-token heuristic is used. It over-counts
//! slightly for code-heavy content, which errs toward earlier
//! summarization.

use fiscus_domain::chat::Message;

const CHARS_PER_TOKEN: usize = 4;
/// Fixed per-message framing overhead (role tags, separators).
const PER_MESSAGE_OVERHEAD: usize = 4;

/// Estimate the token count of one message.
pub fn estimate_message_tokens(message: &Message) -> u32 {
    (message.content.char_len() / CHARS_PER_TOKEN + PER_MESSAGE_OVERHEAD) as u32
}

/// Estimate the total token count of a conversation.
pub fn estimate_conversation_tokens(messages: &[Message]) -> u32 {
    messages.iter().map(estimate_message_tokens).sum()
}
