//! Workflow service
//!
//! Drives one incoming message through SESSION, MISSION, the FUNCTION agents chosen by
//! MISSION, and CHECKER, then assembles the final result. Calls within a run are
//! strictly sequential; separate runs share the registry and transport and may overlap.

use crate::agent::AgentRegistry;
use crate::config::{default_stages, validate_stages, ConfigError, StageDefinition, WorkflowConfig};
use crate::error::{WorkflowError, WorkflowResult};
use crate::observability::WorkflowMetrics;
use crate::protocol::{
    AgentDescriptor, AgentReply, AgentSummary, AgentType, ChatTurn, FinalResult, IncomingMessage,
};
use crate::transport::AgentTransport;
use crate::workflow::WorkflowContext;
use crate::workflow_span;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn, Instrument};
use uuid::Uuid;

/// Model label used when none is configured
pub const DEFAULT_MODEL: &str = "workflow-1.0";

/// Assistant turn recorded when MISSION selects no function agent
pub const NO_FUNCTION_AGENT_MESSAGE: &str = "No function agent available";

const DYNAMIC_PROMPT_HEADER: &str = "Active function agents and their capabilities:";

/// Pipeline driver over an injected registry and transport
pub struct WorkflowService {
    registry: Arc<AgentRegistry>,
    transport: Arc<dyn AgentTransport>,
    stages: Vec<StageDefinition>,
    model: String,
    metrics: Arc<WorkflowMetrics>,
}

impl WorkflowService {
    /// Service with the default four-stage workflow
    pub fn new(registry: Arc<AgentRegistry>, transport: Arc<dyn AgentTransport>) -> Self {
        Self {
            registry,
            transport,
            stages: default_stages(),
            model: DEFAULT_MODEL.to_string(),
            metrics: Arc::new(WorkflowMetrics::new()),
        }
    }

    /// Service using the stages and model label of a loaded configuration
    pub fn from_config(
        config: &WorkflowConfig,
        registry: Arc<AgentRegistry>,
        transport: Arc<dyn AgentTransport>,
    ) -> Result<Self, ConfigError> {
        Self::new(registry, transport)
            .with_model(config.client.model.clone())
            .with_stages(config.workflow.stages.clone())
    }

    /// Replace the stage list; it must still be SESSION, MISSION, FUNCTION, CHECKER
    pub fn with_stages(mut self, stages: Vec<StageDefinition>) -> Result<Self, ConfigError> {
        validate_stages(&stages)?;
        self.stages = stages;
        Ok(self)
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<WorkflowMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn registry(&self) -> &Arc<AgentRegistry> {
        &self.registry
    }

    pub fn transport(&self) -> &Arc<dyn AgentTransport> {
        &self.transport
    }

    pub fn metrics(&self) -> &Arc<WorkflowMetrics> {
        &self.metrics
    }

    pub fn stages(&self) -> &[StageDefinition] {
        &self.stages
    }

    /// Run the full pipeline for one message
    ///
    /// Any unresolved required agent, malformed MISSION reply or exhausted agent call
    /// aborts the run; no partial result is returned.
    pub async fn process_message(&self, message: &IncomingMessage) -> WorkflowResult<FinalResult> {
        let run_id = format!("chatcmpl-{}", Uuid::new_v4());
        let span = workflow_span!(run_id = %run_id, user_id = %message.user_id());

        async {
            let started = Instant::now();
            self.metrics.run_started();
            info!(
                session_id = message.session_id().unwrap_or_default(),
                content_len = message.content().len(),
                "Processing message"
            );

            match self.run(&run_id, message).await {
                Ok(result) => {
                    self.metrics.run_completed(started.elapsed());
                    info!(
                        duration_ms = started.elapsed().as_millis() as u64,
                        stages = ?result.system.stage_keys(),
                        "Workflow completed"
                    );
                    Ok(result)
                }
                Err(e) => {
                    self.metrics.run_failed(started.elapsed());
                    error!(
                        duration_ms = started.elapsed().as_millis() as u64,
                        error = %e,
                        "Workflow failed"
                    );
                    Err(e)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn run(&self, run_id: &str, message: &IncomingMessage) -> WorkflowResult<FinalResult> {
        let mut context = WorkflowContext::from_message(message, self.model.clone());
        let mut last_reply: Option<AgentReply> = None;

        // SESSION
        let (step, stage) = self.stage(AgentType::Session)?;
        context.current_step = step;
        if let Some(agent) = self.resolve(stage)? {
            let reply = self.call_agent(&agent, stage, &context).await?;
            context.prepend_messages(reply.messages().cloned());
            context.workflow_data.session = Some(reply.clone());
            last_reply = Some(reply);
        }

        // MISSION
        let (step, stage) = self.stage(AgentType::Mission)?;
        context.current_step = step;
        let targets = match self.resolve(stage)? {
            Some(agent) => {
                let summaries = self.registry.describe_function_agents();
                context.dynamic_prompt = Some(build_dynamic_prompt(&summaries));
                let reply = self.call_agent(&agent, stage, &context).await;
                context.dynamic_prompt = None;
                let reply = reply?;

                context.workflow_data.mission = Some(reply.clone());
                let targets = parse_target_agents(&reply)?;
                debug!(targets = ?targets, "MISSION selected function agents");
                last_reply = Some(reply);
                targets
            }
            None => Vec::new(),
        };

        // FUNCTION
        let (step, stage) = self.stage(AgentType::Function)?;
        context.current_step = step;
        if let Some(reply) = self.run_function_agents(stage, &targets, &mut context).await? {
            last_reply = Some(reply);
        }

        // CHECKER
        let (step, stage) = self.stage(AgentType::Checker)?;
        context.current_step = step;
        if let Some(agent) = self.resolve(stage)? {
            let reply = self.call_agent(&agent, stage, &context).await?;
            context.workflow_data.checker = Some(reply.clone());
            last_reply = Some(reply);
        }

        let final_reply =
            last_reply.ok_or_else(|| WorkflowError::agent_call("no stage produced a reply"))?;
        Ok(FinalResult::new(run_id, &final_reply, context.workflow_data))
    }

    /// Call each target in order; returns the last FUNCTION reply, if any
    async fn run_function_agents(
        &self,
        stage: &StageDefinition,
        targets: &[String],
        context: &mut WorkflowContext,
    ) -> WorkflowResult<Option<AgentReply>> {
        let function_agents = self.registry.get_by_type(AgentType::Function);
        context.workflow_data.function = Some(BTreeMap::new());
        let mut last_reply = None;

        for target in targets {
            let Some(agent) = function_agents
                .iter()
                .find(|agent| agent.name() == target.as_str())
            else {
                warn!(agent = %target, "Function agent not registered, skipping");
                self.metrics.function_agent_skipped();
                continue;
            };

            let reply = self.call_agent(agent, stage, context).await?;
            if let Some(turn) = reply.first_message() {
                context.push_message(turn.clone());
            }
            context
                .workflow_data
                .function
                .get_or_insert_with(BTreeMap::new)
                .insert(target.clone(), reply.clone());
            last_reply = Some(reply);
        }

        if targets.is_empty() {
            warn!("No function agent selected");
            context.push_message(ChatTurn::assistant(NO_FUNCTION_AGENT_MESSAGE));
        }

        Ok(last_reply)
    }

    fn stage(&self, agent_type: AgentType) -> WorkflowResult<(usize, &StageDefinition)> {
        self.stages
            .iter()
            .enumerate()
            .find(|(_, stage)| stage.agent_type == agent_type)
            .ok_or_else(|| {
                WorkflowError::Config(ConfigError::InvalidWorkflow(format!(
                    "no {agent_type} stage configured"
                )))
            })
    }

    /// First registered agent for a stage; missing agents fail required stages only
    fn resolve(&self, stage: &StageDefinition) -> WorkflowResult<Option<AgentDescriptor>> {
        match self.registry.first_of_type(stage.agent_type) {
            Some(agent) => Ok(Some(agent)),
            None if stage.required => {
                error!(stage = %stage.agent_type, "No agent registered for required stage");
                Err(WorkflowError::agent_call(format!(
                    "no {} agent",
                    stage.agent_type
                )))
            }
            None => {
                warn!(
                    stage = %stage.agent_type,
                    "No agent registered for optional stage, skipping"
                );
                Ok(None)
            }
        }
    }

    async fn call_agent(
        &self,
        agent: &AgentDescriptor,
        stage: &StageDefinition,
        context: &WorkflowContext,
    ) -> WorkflowResult<AgentReply> {
        debug!(
            agent = %agent.name(),
            stage = %stage.agent_type,
            current_step = context.current_step,
            workflow_data = ?context.workflow_data.stage_keys(),
            "Invoking agent"
        );

        let request = context.to_service_request();
        let result = self
            .transport
            .call_service(agent, &request, stage.timeout())
            .await;
        self.metrics.agent_called(stage.agent_type, result.is_ok());

        match &result {
            Ok(reply) => debug!(
                agent = %agent.name(),
                choices = reply.choices.len(),
                total_tokens = reply.usage.total_tokens,
                "Agent replied"
            ),
            Err(e) => error!(agent = %agent.name(), error = %e, "Agent call failed"),
        }
        result
    }

    /// Release the transport's network resources
    pub async fn close(&self) {
        self.transport.close().await;
        info!("Workflow service closed");
    }
}

/// Prompt handed to MISSION: one `name: capability` line per FUNCTION agent
pub fn build_dynamic_prompt(agents: &[AgentSummary]) -> String {
    let mut prompt = String::from(DYNAMIC_PROMPT_HEADER);
    for agent in agents {
        prompt.push('\n');
        prompt.push_str(&agent.name);
        prompt.push_str(": ");
        prompt.push_str(&agent.capabilities);
    }
    prompt
}

/// Read the ordered `target_agents` list from a MISSION reply
///
/// The first choice's content must be a JSON object. A missing `target_agents` field
/// means no targets; any other shape is a malformed reply.
pub fn parse_target_agents(reply: &AgentReply) -> WorkflowResult<Vec<String>> {
    let content = reply
        .content()
        .ok_or_else(|| WorkflowError::malformed_reply("MISSION reply has no content"))?;

    let parsed: Value = serde_json::from_str(content).map_err(|e| {
        WorkflowError::malformed_reply(format!("MISSION reply content is not JSON: {e}"))
    })?;

    let object = parsed.as_object().ok_or_else(|| {
        WorkflowError::malformed_reply("MISSION reply content is not a JSON object")
    })?;

    let Some(targets) = object.get("target_agents") else {
        warn!("MISSION reply has no target_agents field");
        return Ok(Vec::new());
    };

    targets
        .as_array()
        .ok_or_else(|| WorkflowError::malformed_reply("target_agents is not a list"))?
        .iter()
        .map(|target| {
            target.as_str().map(str::to_string).ok_or_else(|| {
                WorkflowError::malformed_reply(format!(
                    "target_agents entry {target} is not a string"
                ))
            })
        })
        .collect()
}
