use crate::Result;
use crate::llm::Message;
use crate::tools::{FunctionalTool, Tool, ToolCall, ToolDefinition};
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Named notes shared by every agent holding a clone.
///
/// The coordinator and its subagents each get their own tool instances over
/// the same pages, so findings written by one agent can be read by the others.
#[derive(Clone, Default)]
pub struct Notebook {
    pages: Arc<Mutex<BTreeMap<String, String>>>,
}

impl Notebook {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn names(&self) -> Vec<String> {
        self.pages.lock().await.keys().cloned().collect()
    }

    pub async fn read(&self, name: &str) -> Option<String> {
        self.pages.lock().await.get(name).cloned()
    }

    pub async fn write(&self, name: String, content: String) {
        self.pages.lock().await.insert(name, content);
    }

    pub async fn append(&self, name: String, content: String) {
        let mut pages = self.pages.lock().await;
        let page = pages.entry(name).or_default();
        if !page.is_empty() && !page.ends_with('\n') {
            page.push('\n');
        }
        page.push_str(&content);
    }

    async fn list_page(&self) -> String {
        let names = self.names().await;
        if names.is_empty() {
            return "The notebook is empty.".to_string();
        }
        let mut s = "Notebook pages:\n".to_string();
        for name in names {
            s.push_str(&format!("- {name}\n"));
        }
        s
    }

    pub fn tools(&self) -> Vec<Box<dyn Tool + Send>> {
        vec![
            Box::new(NotebookList(self.clone())),
            Box::new(NotebookRead(self.clone())),
            Box::new(NotebookWrite(self.clone())),
            Box::new(NotebookAppend(self.clone())),
        ]
    }
}

struct NotebookList(Notebook);

#[async_trait]
impl FunctionalTool for NotebookList {
    fn definition(&self) -> Result<ToolDefinition> {
        Ok(ToolDefinition::without_args(
            "notebook_list",
            "list the pages in the shared research notebook",
        ))
    }

    async fn invoke_fn(&mut self, call: &ToolCall) -> Result<Message> {
        Ok(call.reply(self.0.list_page().await))
    }
}

#[derive(Deserialize, JsonSchema)]
struct ReadArgs {
    /// page name, e.g. "langgraph-notes"
    name: String,
}

struct NotebookRead(Notebook);

#[async_trait]
impl FunctionalTool for NotebookRead {
    fn definition(&self) -> Result<ToolDefinition> {
        ToolDefinition::new::<ReadArgs>(
            "notebook_read",
            "read a page from the shared research notebook",
        )
    }

    async fn invoke_fn(&mut self, call: &ToolCall) -> Result<Message> {
        let args: ReadArgs = call.args()?;
        let result = match self.0.read(&args.name).await {
            Some(content) => format!("page {}:\n{}", args.name, content),
            None => format!("page {} does not exist", args.name),
        };
        Ok(call.reply(result))
    }
}

#[derive(Deserialize, JsonSchema)]
struct WriteArgs {
    name: String,
    content: String,
}

struct NotebookWrite(Notebook);

#[async_trait]
impl FunctionalTool for NotebookWrite {
    fn definition(&self) -> Result<ToolDefinition> {
        ToolDefinition::new::<WriteArgs>(
            "notebook_write",
            "create or replace a page in the shared research notebook",
        )
    }

    async fn invoke_fn(&mut self, call: &ToolCall) -> Result<Message> {
        let args: WriteArgs = call.args()?;
        let result = format!("page {} written", args.name);
        self.0.write(args.name, args.content).await;
        Ok(call.reply(result))
    }
}

struct NotebookAppend(Notebook);

#[async_trait]
impl FunctionalTool for NotebookAppend {
    fn definition(&self) -> Result<ToolDefinition> {
        ToolDefinition::new::<WriteArgs>(
            "notebook_append",
            "append to a page in the shared research notebook, creating it if needed",
        )
    }

    async fn invoke_fn(&mut self, call: &ToolCall) -> Result<Message> {
        let args: WriteArgs = call.args()?;
        let result = format!("page {} updated", args.name);
        self.0.append(args.name, args.content).await;
        Ok(call.reply(result))
    }
}
