//! Research agent factories.
//!
//! Three kinds share one toolbox: `simple` (search only), `memory` (search
//! plus the notebook and history compaction) and `coordinator` (fans work
//! out to parallel sub-agents that share the coordinator's notebook).

use std::fmt;
use std::sync::Arc;

use agent::callbacks::Callback;
use agent::llm::{self, Message};
use agent::tools::{CompactHistory, FunctionalTool, Notebook, ToolCall, ToolDefinition};
use agent::{Agent, AgentBuilder, Result, StopCondition};
use async_trait::async_trait;
use clap::ValueEnum;
use schemars::JsonSchema;
use serde::Deserialize;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::search::InternetSearch;

const SIMPLE_PROMPT: &str = include_str!("prompts/simple.md");
const MEMORY_PROMPT: &str = include_str!("prompts/memory.md");
const COORDINATOR_PROMPT: &str = include_str!("prompts/coordinator.md");
const SUBAGENT_PROMPT: &str = include_str!("prompts/subagent.md");

/// Messages kept verbatim when the history is compacted.
const KEEP_LAST: usize = 4;
/// Estimated tokens above which the history is compacted automatically.
const TOKEN_BUDGET: usize = 20_000;

pub const COMPLETE_TASK: &str = "complete_task";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum AgentKind {
    #[default]
    Simple,
    Memory,
    Coordinator,
}

impl AgentKind {
    fn prompt(self) -> &'static str {
        match self {
            AgentKind::Simple => SIMPLE_PROMPT,
            AgentKind::Memory => MEMORY_PROMPT,
            AgentKind::Coordinator => COORDINATOR_PROMPT,
        }
    }
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AgentKind::Simple => "simple",
            AgentKind::Memory => "memory",
            AgentKind::Coordinator => "coordinator",
        })
    }
}

/// Done once `complete_task` has answered in the latest step.
pub struct TaskCompleted;

impl StopCondition for TaskCompleted {
    fn done(&self, history: &[Message]) -> bool {
        history
            .iter()
            .rev()
            .take_while(|m| !matches!(m, Message::Assistant(..)))
            .any(|m| matches!(m, Message::Tool { name, .. } if name == COMPLETE_TASK))
    }
}

/// The result the agent handed to `complete_task`.
pub fn final_report(history: &[Message]) -> Option<&str> {
    history.iter().rev().find_map(|m| match m {
        Message::Tool { name, result, .. } if name == COMPLETE_TASK => Some(result.as_str()),
        _ => None,
    })
}

#[derive(Deserialize, JsonSchema)]
struct CompleteTaskArgs {
    /// the complete answer, with cited sources
    result: String,
}

struct CompleteTask;

#[async_trait]
impl FunctionalTool for CompleteTask {
    fn definition(&self) -> Result<ToolDefinition> {
        ToolDefinition::new::<CompleteTaskArgs>(
            COMPLETE_TASK,
            "finish your task and hand the final result back",
        )
    }

    async fn invoke_fn(&mut self, call: &ToolCall) -> Result<Message> {
        let args: CompleteTaskArgs = call.args()?;
        Ok(call.reply(args.result))
    }
}

/// What every agent of a run is built from.
#[derive(Clone)]
pub struct Toolbox {
    pub llm: Arc<dyn llm::LLM + Send + Sync>,
    pub search: InternetSearch,
    pub notebook: Notebook,
    pub max_steps: usize,
}

impl Toolbox {
    fn builder(&self, name: &str, prompt: &str) -> AgentBuilder {
        AgentBuilder::new()
            .name(name)
            .llm(self.llm.clone())
            .system_prompt(prompt)
            .max_steps(self.max_steps)
            .tool(Box::new(CompleteTask))
            .tool(Box::new(self.search.clone()))
            .stop_condition(Box::new(TaskCompleted))
    }

    fn with_memory(&self, builder: AgentBuilder) -> AgentBuilder {
        builder
            .tools(self.notebook.tools())
            .tool(CompactHistory::new(self.llm.clone(), KEEP_LAST, TOKEN_BUDGET))
            .callback(CompactHistory::new(self.llm.clone(), KEEP_LAST, TOKEN_BUDGET))
    }

    fn subagent(&self, name: &str) -> Result<Agent> {
        self.with_memory(self.builder(name, SUBAGENT_PROMPT)).build()
    }
}

/// Build the agent for `kind`. `transcript` runs after every step, after
/// history compaction.
pub fn build_agent(
    kind: AgentKind,
    toolbox: &Toolbox,
    transcript: Option<Box<dyn Callback + Send>>,
) -> Result<Agent> {
    let name = format!("research::{kind}");
    let mut builder = toolbox.builder(&name, kind.prompt());

    match kind {
        AgentKind::Simple => {}
        AgentKind::Memory => builder = toolbox.with_memory(builder),
        AgentKind::Coordinator => {
            let subagents: SubAgentHandles = Arc::new(Mutex::new(JoinSet::new()));
            builder = toolbox
                .with_memory(builder)
                .tool(Box::new(StartSubAgent {
                    subagents: subagents.clone(),
                    toolbox: toolbox.clone(),
                    started: 0,
                }))
                .tool(Box::new(WaitForSubAgent(subagents)));
        }
    }

    if let Some(transcript) = transcript {
        builder = builder.callback(transcript);
    }

    builder.build()
}

type SubAgentHandles = Arc<Mutex<JoinSet<Result<String>>>>;

#[derive(Deserialize, JsonSchema)]
struct StartSubAgentArgs {
    /// a focused research task, with enough context to work on it alone
    task: String,
}

struct StartSubAgent {
    subagents: SubAgentHandles,
    toolbox: Toolbox,
    started: usize,
}

#[async_trait]
impl FunctionalTool for StartSubAgent {
    fn definition(&self) -> Result<ToolDefinition> {
        ToolDefinition::new::<StartSubAgentArgs>(
            "start_subagent",
            "start a research sub-agent that investigates one task in parallel with the others",
        )
    }

    async fn invoke_fn(&mut self, call: &ToolCall) -> Result<Message> {
        let args: StartSubAgentArgs = call.args()?;
        self.started += 1;
        let name = format!("research::subagent-{}", self.started);

        let mut agent = self.toolbox.subagent(&name)?;
        let task = args.task.clone();
        self.subagents.lock().await.spawn(async move {
            let history = agent.run_task(&task).await?;
            final_report(&history).map(str::to_string).ok_or_else(|| {
                agent::Error::AgentWorkflowError(format!(
                    "{} stopped without calling {COMPLETE_TASK}",
                    agent.name()
                ))
            })
        });

        info!(subagent = %name, task = %args.task, "sub-agent started");
        Ok(call.reply(format!(
            "Research sub-agent {name} started for task: {}",
            args.task
        )))
    }
}

struct WaitForSubAgent(SubAgentHandles);

#[async_trait]
impl FunctionalTool for WaitForSubAgent {
    fn definition(&self) -> Result<ToolDefinition> {
        Ok(ToolDefinition::without_args(
            "wait_for_subagent",
            "wait for the next research sub-agent to finish and return its summary",
        ))
    }

    async fn invoke_fn(&mut self, call: &ToolCall) -> Result<Message> {
        let result = match self.0.lock().await.join_next().await {
            Some(joined) => match joined? {
                Ok(report) => format!("Sub-agent result:\n{report}"),
                Err(err) => {
                    warn!(error = %err, "sub-agent failed");
                    format!("A sub-agent failed: {err}")
                }
            },
            None => {
                "no sub-agents are currently active, start a new sub-agent before waiting"
                    .to_string()
            }
        };

        Ok(call.reply(result))
    }
}
