//! Wire and domain types shared by the registry, the agent client and the workflow driver
//!
//! The request/reply shapes follow the agent service contract: every agent accepts a
//! chat-completion style request and answers with an `{object, choices, usage}` reply.

use crate::error::{WorkflowError, WorkflowResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use url::Url;

/// Endpoint key every agent must expose for liveness checks
pub const HEALTH_ENDPOINT: &str = "health";
/// Endpoint key every agent must expose for service calls
pub const SERVICE_ENDPOINT: &str = "service";
/// Property key carrying a FUNCTION agent's capability tag
pub const CAPABILITY_PROPERTY: &str = "capability";

/// Agent classification; each pipeline stage is bound to one type
///
/// Variants are ordered by stage position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AgentType {
    #[serde(alias = "session")]
    Session,
    #[serde(alias = "mission")]
    Mission,
    #[serde(alias = "function")]
    Function,
    #[serde(alias = "checker")]
    Checker,
}

impl AgentType {
    /// Stage order of the default workflow
    pub const ALL: [AgentType; 4] = [
        AgentType::Session,
        AgentType::Mission,
        AgentType::Function,
        AgentType::Checker,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentType::Session => "SESSION",
            AgentType::Mission => "MISSION",
            AgentType::Function => "FUNCTION",
            AgentType::Checker => "CHECKER",
        }
    }
}

impl fmt::Display for AgentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Registration payload for an agent, validated into an [`AgentDescriptor`]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentRegistration {
    pub name: String,
    #[serde(rename = "type")]
    pub agent_type: AgentType,
    pub endpoints: HashMap<String, String>,
    #[serde(default)]
    pub properties: HashMap<String, Value>,
}

/// A registered remote agent
///
/// Construction guarantees a non-empty name and absolute http(s) URLs for both the
/// `health` and `service` endpoints.
///
/// # Examples
/// ```
/// use workflow_manager::protocol::{AgentDescriptor, AgentType};
///
/// let agent = AgentDescriptor::from_urls(
///     "calculator",
///     AgentType::Function,
///     "http://127.0.0.1:8003/health",
///     "http://127.0.0.1:8003/service",
/// )
/// .unwrap()
/// .with_property("capability", "math");
///
/// assert_eq!(agent.capability(), Some("math"));
/// assert_eq!(agent.service_endpoint(), "http://127.0.0.1:8003/service");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(try_from = "AgentRegistration")]
pub struct AgentDescriptor {
    name: String,
    #[serde(rename = "type")]
    agent_type: AgentType,
    endpoints: HashMap<String, String>,
    properties: HashMap<String, Value>,
}

impl AgentDescriptor {
    /// Create a descriptor, failing if a required endpoint is missing or malformed
    pub fn new(
        name: impl Into<String>,
        agent_type: AgentType,
        endpoints: HashMap<String, String>,
        properties: HashMap<String, Value>,
    ) -> WorkflowResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(WorkflowError::invalid_descriptor(
                "agent name must not be empty",
            ));
        }

        for key in [HEALTH_ENDPOINT, SERVICE_ENDPOINT] {
            let raw = endpoints.get(key).ok_or_else(|| {
                WorkflowError::invalid_descriptor(format!(
                    "agent '{name}' is missing required endpoint '{key}'"
                ))
            })?;
            validate_endpoint_url(&name, key, raw)?;
        }

        Ok(Self {
            name,
            agent_type,
            endpoints,
            properties,
        })
    }

    /// Convenience constructor from the two required endpoint URLs
    pub fn from_urls(
        name: impl Into<String>,
        agent_type: AgentType,
        health_url: impl Into<String>,
        service_url: impl Into<String>,
    ) -> WorkflowResult<Self> {
        let endpoints = HashMap::from([
            (HEALTH_ENDPOINT.to_string(), health_url.into()),
            (SERVICE_ENDPOINT.to_string(), service_url.into()),
        ]);
        Self::new(name, agent_type, endpoints, HashMap::new())
    }

    /// Builder method to attach a property
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn agent_type(&self) -> AgentType {
        self.agent_type
    }

    pub fn endpoints(&self) -> &HashMap<String, String> {
        &self.endpoints
    }

    pub fn properties(&self) -> &HashMap<String, Value> {
        &self.properties
    }

    pub fn health_endpoint(&self) -> &str {
        self.endpoint(HEALTH_ENDPOINT)
    }

    pub fn service_endpoint(&self) -> &str {
        self.endpoint(SERVICE_ENDPOINT)
    }

    /// Capability tag advertised through the `capability` property
    pub fn capability(&self) -> Option<&str> {
        self.properties
            .get(CAPABILITY_PROPERTY)
            .and_then(Value::as_str)
    }

    pub fn is_function_agent(&self) -> bool {
        self.agent_type == AgentType::Function
    }

    fn endpoint(&self, key: &str) -> &str {
        self.endpoints.get(key).map(String::as_str).unwrap_or("")
    }
}

impl TryFrom<AgentRegistration> for AgentDescriptor {
    type Error = WorkflowError;

    fn try_from(registration: AgentRegistration) -> Result<Self, Self::Error> {
        Self::new(
            registration.name,
            registration.agent_type,
            registration.endpoints,
            registration.properties,
        )
    }
}

fn validate_endpoint_url(agent: &str, key: &str, raw: &str) -> WorkflowResult<()> {
    let url = Url::parse(raw).map_err(|e| {
        WorkflowError::invalid_descriptor(format!(
            "agent '{agent}' endpoint '{key}' is not a valid URL ({raw}): {e}"
        ))
    })?;

    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(WorkflowError::invalid_descriptor(format!(
            "agent '{agent}' endpoint '{key}' uses unsupported scheme '{other}'"
        ))),
    }
}

/// Summary of a FUNCTION agent handed to the MISSION agent
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentSummary {
    pub name: String,
    #[serde(rename = "type")]
    pub agent_type: AgentType,
    pub capabilities: String,
}

impl From<&AgentDescriptor> for AgentSummary {
    fn from(agent: &AgentDescriptor) -> Self {
        Self {
            name: agent.name().to_string(),
            agent_type: agent.agent_type(),
            capabilities: agent.capability().unwrap_or_default().to_string(),
        }
    }
}

/// A user message entering the workflow
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IncomingMessage {
    user_id: String,
    content: String,
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default = "Utc::now")]
    timestamp: DateTime<Utc>,
    #[serde(default)]
    metadata: HashMap<String, Value>,
}

impl IncomingMessage {
    pub fn new(
        user_id: impl Into<String>,
        content: impl Into<String>,
        session_id: Option<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            content: content.into(),
            session_id,
            timestamp: Utc::now(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_metadata(mut self, metadata: HashMap<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn metadata(&self) -> &HashMap<String, Value> {
        &self.metadata
    }
}

/// One conversation turn
///
/// `content` may be null on the wire (for example an assistant turn carrying only
/// tool calls). Undeclared keys such as `name` are kept in `extra`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatTurn {
    pub role: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ChatTurn {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: Some(content.into()),
            extra: Map::new(),
        }
    }

    /// Content as text; a null content reads as empty
    pub fn text(&self) -> &str {
        self.content.as_deref().unwrap_or_default()
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new("user", content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new("assistant", content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new("system", content)
    }
}

/// A single choice inside an agent reply
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Choice {
    #[serde(default)]
    pub index: u32,
    pub message: ChatTurn,
    #[serde(default)]
    pub finish_reason: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Token usage counters reported by an agent
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Normalized agent reply
///
/// Any fields beyond the declared ones (top-level `created` or `model`, per-choice
/// `logprobs`, `usage.prompt_tokens_details` and so on) are preserved in the `extra`
/// maps, so a reply serializes back to the body the agent sent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentReply {
    pub object: String,
    pub choices: Vec<Choice>,
    #[serde(default)]
    pub usage: Usage,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AgentReply {
    /// Build a reply with one assistant choice
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            object: "chat.completion".to_string(),
            choices: vec![Choice {
                index: 0,
                message: ChatTurn::assistant(content),
                finish_reason: Some("stop".to_string()),
                extra: Map::new(),
            }],
            usage: Usage::default(),
            extra: Map::new(),
        }
    }

    /// Validate a raw reply body and convert it into a typed reply
    ///
    /// A reply is valid only when it carries an `object` tag and a non-empty
    /// `choices` list.
    pub fn parse(body: Value) -> WorkflowResult<Self> {
        let fields = body
            .as_object()
            .ok_or_else(|| WorkflowError::malformed_reply("reply is not a JSON object"))?;

        for required in ["object", "choices"] {
            if !fields.contains_key(required) {
                return Err(WorkflowError::malformed_reply(format!(
                    "reply is missing required field '{required}'"
                )));
            }
        }

        let reply: AgentReply = serde_json::from_value(body)
            .map_err(|e| WorkflowError::malformed_reply(format!("reply has invalid shape: {e}")))?;
        reply.validate()?;
        Ok(reply)
    }

    /// Check the structural invariants of a reply
    pub fn validate(&self) -> WorkflowResult<()> {
        if self.object.is_empty() {
            return Err(WorkflowError::malformed_reply("reply has an empty object tag"));
        }
        if self.choices.is_empty() {
            return Err(WorkflowError::malformed_reply("reply has no choices"));
        }
        Ok(())
    }

    /// Message of the first choice
    pub fn first_message(&self) -> Option<&ChatTurn> {
        self.choices.first().map(|choice| &choice.message)
    }

    /// Content of the first choice
    pub fn content(&self) -> Option<&str> {
        self.first_message()
            .and_then(|message| message.content.as_deref())
    }

    /// Messages of all choices, in order
    pub fn messages(&self) -> impl Iterator<Item = &ChatTurn> {
        self.choices.iter().map(|choice| &choice.message)
    }

    /// All top-level fields of this reply as a JSON object
    pub fn to_fields(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(fields)) => fields,
            _ => Map::new(),
        }
    }
}

/// Per-stage replies accumulated during one run
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct WorkflowData {
    #[serde(rename = "SESSION", default, skip_serializing_if = "Option::is_none")]
    pub session: Option<AgentReply>,
    #[serde(rename = "MISSION", default, skip_serializing_if = "Option::is_none")]
    pub mission: Option<AgentReply>,
    #[serde(rename = "FUNCTION", default, skip_serializing_if = "Option::is_none")]
    pub function: Option<BTreeMap<String, AgentReply>>,
    #[serde(rename = "CHECKER", default, skip_serializing_if = "Option::is_none")]
    pub checker: Option<AgentReply>,
}

impl WorkflowData {
    /// Names of the stages that have produced data so far
    pub fn stage_keys(&self) -> Vec<&'static str> {
        let mut keys = Vec::new();
        if self.session.is_some() {
            keys.push(AgentType::Session.as_str());
        }
        if self.mission.is_some() {
            keys.push(AgentType::Mission.as_str());
        }
        if self.function.is_some() {
            keys.push(AgentType::Function.as_str());
        }
        if self.checker.is_some() {
            keys.push(AgentType::Checker.as_str());
        }
        keys
    }
}

/// Payload POSTed to an agent's service endpoint
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceRequest {
    pub model: String,
    pub messages: Vec<ChatTurn>,
    pub user_id: String,
    pub session_id: Option<String>,
    pub workflow_data: WorkflowData,
    pub current_step: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dynamic_prompt: Option<String>,
}

/// Aggregated result of a completed workflow run
///
/// Serializes as `{id, <final reply fields>, system}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FinalResult {
    pub id: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
    pub system: WorkflowData,
}

impl FinalResult {
    /// Spread `reply` under a freshly generated id
    pub fn new(id: impl Into<String>, reply: &AgentReply, system: WorkflowData) -> Self {
        let mut fields = reply.to_fields();
        fields.remove("id");
        fields.remove("system");
        Self {
            id: id.into(),
            fields,
            system,
        }
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn reply_json(content: &str) -> Value {
        json!({
            "object": "chat.completion",
            "created": 1700000000,
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": content},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 10, "completion_tokens": 20, "total_tokens": 30}
        })
    }

    #[test]
    fn test_descriptor_requires_health_and_service() {
        let endpoints = HashMap::from([(
            "service".to_string(),
            "http://localhost:8001/service".to_string(),
        )]);
        let result = AgentDescriptor::new("session", AgentType::Session, endpoints, HashMap::new());
        assert!(matches!(result, Err(WorkflowError::InvalidDescriptor { .. })));

        let endpoints = HashMap::from([(
            "health".to_string(),
            "http://localhost:8001/health".to_string(),
        )]);
        let result = AgentDescriptor::new("session", AgentType::Session, endpoints, HashMap::new());
        assert!(matches!(result, Err(WorkflowError::InvalidDescriptor { .. })));
    }

    #[test]
    fn test_descriptor_rejects_bad_urls() {
        let result = AgentDescriptor::from_urls(
            "session",
            AgentType::Session,
            "not a url",
            "http://localhost:8001/service",
        );
        assert!(result.is_err());

        let result = AgentDescriptor::from_urls(
            "session",
            AgentType::Session,
            "ftp://localhost/health",
            "http://localhost:8001/service",
        );
        assert!(result.unwrap_err().to_string().contains("unsupported scheme"));
    }

    #[test]
    fn test_descriptor_rejects_empty_name() {
        let result = AgentDescriptor::from_urls(
            "  ",
            AgentType::Checker,
            "http://localhost/health",
            "http://localhost/service",
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_descriptor_deserialization_validates() {
        let valid = json!({
            "name": "calculator",
            "type": "FUNCTION",
            "endpoints": {
                "health": "http://127.0.0.1:8003/health",
                "service": "http://127.0.0.1:8003/service"
            },
            "properties": {"capability": "math"}
        });
        let agent: AgentDescriptor = serde_json::from_value(valid).unwrap();
        assert_eq!(agent.name(), "calculator");
        assert!(agent.is_function_agent());
        assert_eq!(agent.capability(), Some("math"));

        let missing_service = json!({
            "name": "calculator",
            "type": "function",
            "endpoints": {"health": "http://127.0.0.1:8003/health"}
        });
        let result: Result<AgentDescriptor, _> = serde_json::from_value(missing_service);
        assert!(result.is_err());
    }

    #[test]
    fn test_descriptor_serializes_type_field() {
        let agent = AgentDescriptor::from_urls(
            "checker",
            AgentType::Checker,
            "http://localhost/health",
            "http://localhost/service",
        )
        .unwrap();
        let value = serde_json::to_value(&agent).unwrap();
        assert_eq!(value["type"], "CHECKER");
        assert_eq!(value["endpoints"]["service"], "http://localhost/service");
    }

    #[test]
    fn test_incoming_message_defaults() {
        let before = Utc::now();
        let message = IncomingMessage::new("user-1", "hello", None);
        assert_eq!(message.user_id(), "user-1");
        assert_eq!(message.content(), "hello");
        assert!(message.session_id().is_none());
        assert!(message.metadata().is_empty());
        assert!(message.timestamp() >= before);

        let parsed: IncomingMessage =
            serde_json::from_value(json!({"user_id": "u", "content": "c"})).unwrap();
        assert!(parsed.metadata().is_empty());
        assert!(parsed.session_id().is_none());
    }

    #[test]
    fn test_reply_parse_accepts_valid_reply() {
        let reply = AgentReply::parse(reply_json("hi")).unwrap();
        assert_eq!(reply.object, "chat.completion");
        assert_eq!(reply.content(), Some("hi"));
        assert_eq!(reply.usage.total_tokens, 30);
        assert_eq!(reply.extra["created"], 1700000000);
    }

    #[test]
    fn test_reply_parse_rejects_missing_choices() {
        let err = AgentReply::parse(json!({"object": "chat.completion"})).unwrap_err();
        assert!(matches!(err, WorkflowError::MalformedReply { .. }));
        assert!(err.to_string().contains("choices"));
    }

    #[test]
    fn test_reply_parse_rejects_empty_choices_and_non_objects() {
        let err = AgentReply::parse(json!({"object": "chat.completion", "choices": []}));
        assert!(err.is_err());

        let err = AgentReply::parse(json!(["not", "an", "object"]));
        assert!(err.is_err());
    }

    #[test]
    fn test_reply_fields_preserve_extra_keys() {
        let reply = AgentReply::parse(reply_json("ok")).unwrap();
        let fields = reply.to_fields();
        assert!(fields.contains_key("object"));
        assert!(fields.contains_key("choices"));
        assert!(fields.contains_key("usage"));
        assert!(fields.contains_key("created"));
    }

    #[test]
    fn test_reply_keeps_undeclared_nested_fields() {
        let body = json!({
            "object": "chat.completion",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": "ok", "name": "checker"},
                "finish_reason": "stop",
                "logprobs": {"content": []}
            }],
            "usage": {
                "prompt_tokens": 1,
                "completion_tokens": 2,
                "total_tokens": 3,
                "prompt_tokens_details": {"cached_tokens": 0}
            }
        });
        let reply = AgentReply::parse(body.clone()).unwrap();

        let data = WorkflowData {
            checker: Some(reply.clone()),
            ..Default::default()
        };
        let result = FinalResult::new("chatcmpl-fresh", &reply, data);
        let value = serde_json::to_value(&result).unwrap();

        assert_eq!(value["choices"], body["choices"]);
        assert_eq!(value["usage"], body["usage"]);
        assert_eq!(value["system"]["CHECKER"], body);
    }

    #[test]
    fn test_reply_accepts_null_content() {
        let body = json!({
            "object": "chat.completion",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": null, "tool_calls": []},
                "finish_reason": "tool_calls"
            }]
        });
        let reply = AgentReply::parse(body).unwrap();

        assert_eq!(reply.content(), None);
        assert_eq!(reply.first_message().map(ChatTurn::text), Some(""));
        let value = serde_json::to_value(&reply).unwrap();
        assert_eq!(value["choices"][0]["message"]["content"], Value::Null);
        assert_eq!(value["choices"][0]["message"]["tool_calls"], json!([]));
    }

    #[test]
    fn test_workflow_data_serializes_stage_keys() {
        let mut data = WorkflowData {
            session: Some(AgentReply::assistant("s")),
            ..Default::default()
        };
        let value = serde_json::to_value(&data).unwrap();
        assert!(value.get("SESSION").is_some());
        assert!(value.get("FUNCTION").is_none());

        data.function = Some(BTreeMap::new());
        let value = serde_json::to_value(&data).unwrap();
        assert_eq!(value["FUNCTION"], json!({}));
        assert_eq!(data.stage_keys(), vec!["SESSION", "FUNCTION"]);
    }

    #[test]
    fn test_final_result_spreads_reply_and_keeps_fresh_id() {
        let mut reply = AgentReply::parse(reply_json("checked")).unwrap();
        reply
            .extra
            .insert("id".to_string(), json!("agent-supplied-id"));

        let result = FinalResult::new("chatcmpl-fresh", &reply, WorkflowData::default());
        let value = serde_json::to_value(&result).unwrap();

        assert_eq!(value["id"], "chatcmpl-fresh");
        assert_eq!(value["object"], "chat.completion");
        assert_eq!(value["choices"][0]["message"]["content"], "checked");
        assert!(value.get("system").is_some());
    }

    #[test]
    fn test_service_request_omits_absent_dynamic_prompt() {
        let request = ServiceRequest {
            model: "workflow-1.0".to_string(),
            messages: vec![ChatTurn::user("hi")],
            user_id: "u".to_string(),
            session_id: None,
            workflow_data: WorkflowData::default(),
            current_step: 0,
            dynamic_prompt: None,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert!(value.get("dynamic_prompt").is_none());
        assert_eq!(value["messages"][0]["role"], "user");
        assert_eq!(value["workflow_data"], json!({}));
    }
}
