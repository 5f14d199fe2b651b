use crate::Result;
use crate::llm::Message;
use async_trait::async_trait;
use schemars::JsonSchema;
use schemars::r#gen::SchemaSettings;

mod notebook;
pub use notebook::Notebook;

mod compact_history;
pub use compact_history::CompactHistory;

#[derive(Debug, Clone, PartialEq)]
pub struct ToolDefinition {
    pub name: String,
    pub desc: String,
    pub params: serde_json::Value,
}

impl ToolDefinition {
    /// Parameters described by the JSON schema of `P`, with nested types
    /// inlined since function-calling APIs do not resolve `$ref`.
    pub fn new<P: JsonSchema>(name: &str, desc: &str) -> Result<Self> {
        let schema = SchemaSettings::draft07()
            .with(|s| {
                s.inline_subschemas = true;
                s.meta_schema = None;
            })
            .into_generator()
            .into_root_schema_for::<P>();
        let params = serde_json::to_value(&schema.schema)?;
        Ok(Self {
            name: name.to_string(),
            desc: desc.to_string(),
            params,
        })
    }

    pub fn without_args(name: &str, desc: &str) -> Self {
        Self {
            name: name.to_string(),
            desc: desc.to_string(),
            params: serde_json::json!({ "type": "object", "properties": {} }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub args: String,
}

impl ToolCall {
    pub fn args<O: for<'de> serde::Deserialize<'de>>(&self) -> Result<O> {
        let args = serde_json::from_str(&self.args)?;
        Ok(args)
    }

    /// The tool message answering this call.
    pub fn reply(&self, result: impl Into<String>) -> Message {
        Message::Tool {
            id: self.id.clone(),
            name: self.name.clone(),
            result: result.into(),
        }
    }
}

impl std::fmt::Display for ToolCall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "- {} ({})\n\t- `{}`\n", self.name, self.id, self.args)
    }
}

#[async_trait]
pub trait Tool {
    fn definition(&self) -> Result<ToolDefinition>;

    async fn invoke(&mut self, args: &ToolCall, messages: Vec<Message>) -> Result<Vec<Message>>;
}

/// A tool that answers a call with a single message and never needs the history.
#[async_trait]
pub trait FunctionalTool {
    fn definition(&self) -> Result<ToolDefinition>;

    async fn invoke_fn(&mut self, args: &ToolCall) -> Result<Message>;
}

#[async_trait]
impl<T> Tool for T
where
    T: FunctionalTool + Send + Sync,
{
    fn definition(&self) -> Result<ToolDefinition> {
        FunctionalTool::definition(self)
    }

    async fn invoke(
        &mut self,
        args: &ToolCall,
        mut messages: Vec<Message>,
    ) -> Result<Vec<Message>> {
        let result = FunctionalTool::invoke_fn(self, args).await?;
        messages.push(result);
        Ok(messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Deserialize, JsonSchema)]
    #[allow(dead_code)]
    enum Topic {
        #[serde(rename = "general")]
        General,
        #[serde(rename = "news")]
        News,
    }

    #[derive(Deserialize, JsonSchema)]
    #[allow(dead_code)]
    struct SearchArgs {
        query: String,
        topic: Option<Topic>,
    }

    #[test]
    fn nested_schemas_are_inlined() {
        let def = ToolDefinition::new::<SearchArgs>("search", "search the web").unwrap();
        let text = def.params.to_string();
        assert!(!text.contains("$ref"));
        assert!(!text.contains("$schema"));
        assert_eq!(def.params["properties"]["query"]["type"], "string");
    }

    #[test]
    fn reply_answers_the_call() {
        let call = ToolCall {
            id: "call_9".to_string(),
            name: "notebook_list".to_string(),
            args: "{}".to_string(),
        };
        assert_eq!(
            call.reply("ok"),
            Message::Tool {
                id: "call_9".to_string(),
                name: "notebook_list".to_string(),
                result: "ok".to_string(),
            }
        );
    }
}
