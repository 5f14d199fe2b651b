use crate::Result;
use crate::llm::{CompletionRequest, LLM, Message};
use crate::tools::{Tool, ToolCall, ToolDefinition};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

/// Replaces the middle of a long history with an LLM-written summary.
///
/// The first two messages (system and user prompt) and the last `keep_last`
/// messages are kept verbatim.
pub struct CompactHistory {
    llm: Arc<dyn LLM + Send + Sync>,
    keep_last: usize,
    token_budget: usize,
}

impl CompactHistory {
    pub fn new(llm: Arc<dyn LLM + Send + Sync>, keep_last: usize, token_budget: usize) -> Box<Self> {
        Box::new(Self {
            llm,
            keep_last: keep_last.max(1),
            token_budget,
        })
    }

    pub fn token_budget(&self) -> usize {
        self.token_budget
    }

    pub async fn compact(&self, mut messages: Vec<Message>) -> Result<Vec<Message>> {
        if messages.len() <= 2 + self.keep_last {
            return Ok(messages);
        }

        // tool results must stay next to the assistant message that requested them
        let mut split = messages.len() - self.keep_last;
        while split > 2 && matches!(messages[split], Message::Tool { .. }) {
            split -= 1;
        }
        if split <= 2 {
            return Ok(messages);
        }

        let last_messages = messages.split_off(split);
        let before = messages.len();

        messages.push(Message::User(PROMPT.to_string()));

        let result = self
            .llm
            .completion(CompletionRequest {
                messages: &messages,
                tools: &[],
            })
            .await?;

        messages.truncate(2);
        messages.push(Message::Assistant(result.content, vec![]));
        messages.extend(last_messages);

        info!(
            compacted = before - 2,
            kept = messages.len(),
            "history compacted"
        );
        Ok(messages)
    }
}

const PROMPT: &str = "To keep the conversation from growing too long, write a summary of the chat history so far.
Instructions:
- Compress the information and be as succinct as possible. The summary must not exceed 1000 words.
- Preserve key findings, open questions and source URLs. Anything saved in the notebook can still be read later.
- You are a researcher: keep everything you will need to complete the task.";

#[async_trait]
impl Tool for CompactHistory {
    fn definition(&self) -> Result<ToolDefinition> {
        Ok(ToolDefinition::without_args(
            "compact_history",
            &format!(
                "Replace the chat history with a concise summary that preserves the key findings. The last {} messages are kept unchanged. Save important details to the notebook first. This runs automatically when the history grows too long.",
                self.keep_last
            ),
        ))
    }

    async fn invoke(&mut self, call: &ToolCall, messages: Vec<Message>) -> Result<Vec<Message>> {
        let mut messages = self.compact(messages).await?;
        messages.push(call.reply("history compacted"));
        Ok(messages)
    }
}
