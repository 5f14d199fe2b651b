use crate::Result;
use crate::llm::Message;
use crate::tools::CompactHistory;
use async_trait::async_trait;

mod logger;
pub use logger::MessageLogger;

/// Runs after every agent step with the full history, and may rewrite it.
#[async_trait]
pub trait Callback {
    async fn call(&mut self, messages: Vec<Message>) -> Result<Vec<Message>>;
}

#[async_trait]
impl Callback for CompactHistory {
    async fn call(&mut self, messages: Vec<Message>) -> Result<Vec<Message>> {
        if messages.iter().map(Message::ntokens).sum::<usize>() > self.token_budget() {
            return self.compact(messages).await;
        }
        Ok(messages)
    }
}
