use crate::Result;
use crate::tools::{ToolCall, ToolDefinition};
use async_trait::async_trait;
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};

mod openai;
pub use openai::OpenAI;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Message {
    User(String),
    Assistant(String, Vec<ToolCall>),
    System(String),
    Tool {
        id: String,
        name: String,
        result: String,
    },
}

impl Message {
    /// Rough token estimate, about four characters per token.
    pub fn ntokens(&self) -> usize {
        let chars = match self {
            Message::User(text) | Message::System(text) => text.len(),
            Message::Assistant(text, calls) => {
                text.len()
                    + calls
                        .iter()
                        .map(|c| c.name.len() + c.args.len())
                        .sum::<usize>()
            }
            Message::Tool { name, result, .. } => name.len() + result.len(),
        };
        chars.div_ceil(4)
    }

    pub fn get_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.hash(&mut hasher);
        hasher.finish()
    }

    /// The text body, without tool calls.
    pub fn text(&self) -> &str {
        match self {
            Message::User(text) | Message::System(text) | Message::Assistant(text, _) => text,
            Message::Tool { result, .. } => result,
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Message::System(text) => write!(f, "#### System\n{text}\n\n"),
            Message::User(text) => write!(f, "#### User\n{text}\n\n"),
            Message::Assistant(text, calls) => {
                write!(f, "#### Assistant\n{text}\n")?;
                for call in calls {
                    write!(f, "{call}")?;
                }
                writeln!(f)
            }
            Message::Tool { id, name, result } => {
                write!(f, "#### Tool {name} ({id})\n{result}\n\n")
            }
        }
    }
}

pub struct CompletionRequest<'a> {
    pub messages: &'a [Message],
    pub tools: &'a [ToolDefinition],
}

pub struct CompletionResponse {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
}

#[async_trait]
pub trait LLM {
    async fn completion<'a>(&self, request: CompletionRequest<'a>) -> Result<CompletionResponse>;
}
