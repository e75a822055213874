//! HTTP front door
//!
//! Thin warp layer over [`WorkflowService`]: message intake, agent administration,
//! health and metrics. Every failure is answered with `{"status":"error","message":...}`
//! and the status code from [`WorkflowError::to_error_response`].

use crate::error::{WorkflowError, WorkflowResult};
use crate::protocol::{AgentDescriptor, AgentRegistration, IncomingMessage};
use crate::workflow::WorkflowService;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{info, warn};
use warp::http::StatusCode;
use warp::hyper::body::Bytes;
use warp::reply::{Json, WithStatus};
use warp::{Filter, Rejection, Reply};

/// Largest request body accepted by any route
const MAX_BODY_BYTES: u64 = 1024 * 1024;

type JsonReply = WithStatus<Json>;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    service: Arc<WorkflowService>,
}

impl AppState {
    pub fn new(service: Arc<WorkflowService>) -> Self {
        Self { service }
    }

    pub fn service(&self) -> &Arc<WorkflowService> {
        &self.service
    }
}

#[derive(Debug, Deserialize)]
struct UnregisterRequest {
    name: String,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    agents: usize,
    timestamp: u64,
}

/// Every front-door route
pub fn routes(state: AppState) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let message = warp::path!("message")
        .and(warp::post())
        .and(body())
        .and(with_state(state.clone()))
        .and_then(handle_message);

    let register = warp::path!("agent" / "register")
        .and(warp::post())
        .and(body())
        .and(with_state(state.clone()))
        .and_then(handle_register);

    let unregister = warp::path!("agent" / "unregister")
        .and(warp::post())
        .and(body())
        .and(with_state(state.clone()))
        .and_then(handle_unregister);

    let agents = warp::path!("agents")
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(handle_list_agents);

    let agents_health = warp::path!("agents" / "health")
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(handle_agents_health);

    let health = warp::path!("health")
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(handle_health);

    let metrics = warp::path!("metrics")
        .and(warp::get())
        .and(with_state(state))
        .and_then(handle_metrics);

    message
        .or(register)
        .or(unregister)
        .or(agents_health)
        .or(agents)
        .or(health)
        .or(metrics)
}

/// Bind and serve until `shutdown` resolves
pub async fn serve<F>(state: AppState, addr: SocketAddr, shutdown: F) -> Result<(), warp::Error>
where
    F: Future<Output = ()> + Send + 'static,
{
    let (bound, server) =
        warp::serve(routes(state)).try_bind_with_graceful_shutdown(addr, shutdown)?;
    info!(address = %bound, "Front door listening");
    server.await;
    info!("Front door stopped");
    Ok(())
}

fn with_state(state: AppState) -> impl Filter<Extract = (AppState,), Error = Infallible> + Clone {
    warp::any().map(move || state.clone())
}

fn body() -> impl Filter<Extract = (Bytes,), Error = Rejection> + Clone {
    warp::body::content_length_limit(MAX_BODY_BYTES).and(warp::body::bytes())
}

fn parse_body<T: DeserializeOwned>(body: &[u8]) -> WorkflowResult<T> {
    serde_json::from_slice(body)
        .map_err(|e| WorkflowError::invalid_input(format!("invalid request body: {e}")))
}

fn success(data: impl Serialize) -> JsonReply {
    warp::reply::with_status(
        warp::reply::json(&json!({ "status": "success", "data": data })),
        StatusCode::OK,
    )
}

fn acknowledged(message: String) -> JsonReply {
    warp::reply::with_status(
        warp::reply::json(&json!({ "status": "success", "message": message })),
        StatusCode::OK,
    )
}

fn failure(error: &WorkflowError) -> JsonReply {
    let response = error.to_error_response();
    let status =
        StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    warp::reply::with_status(warp::reply::json(&response), status)
}

async fn handle_message(body: Bytes, state: AppState) -> Result<JsonReply, Infallible> {
    let message: IncomingMessage = match parse_body(&body) {
        Ok(message) => message,
        Err(e) => {
            warn!(error = %e, "Rejected message");
            return Ok(failure(&e));
        }
    };

    Ok(match state.service.process_message(&message).await {
        Ok(result) => success(result),
        Err(e) => failure(&e),
    })
}

async fn handle_register(body: Bytes, state: AppState) -> Result<JsonReply, Infallible> {
    let parsed = parse_body::<AgentRegistration>(&body).and_then(AgentDescriptor::try_from);
    let descriptor = match parsed {
        Ok(descriptor) => descriptor,
        Err(e) => {
            warn!(error = %e, "Rejected agent registration");
            return Ok(failure(&e));
        }
    };

    let name = descriptor.name().to_string();
    Ok(match state.service.registry().register(descriptor) {
        Ok(()) => acknowledged(format!("Agent {name} registered")),
        Err(e) => failure(&e),
    })
}

async fn handle_unregister(body: Bytes, state: AppState) -> Result<JsonReply, Infallible> {
    let request: UnregisterRequest = match parse_body(&body) {
        Ok(request) => request,
        Err(e) => return Ok(failure(&e)),
    };

    Ok(match state.service.registry().unregister(&request.name) {
        Ok(_) => acknowledged(format!("Agent {} unregistered", request.name)),
        Err(e) => failure(&e),
    })
}

async fn handle_list_agents(state: AppState) -> Result<JsonReply, Infallible> {
    Ok(success(state.service.registry().all()))
}

async fn handle_agents_health(state: AppState) -> Result<JsonReply, Infallible> {
    let mut report = BTreeMap::new();
    for agent in state.service.registry().all() {
        let healthy = state.service.transport().check_health(&agent).await;
        report.insert(agent.name().to_string(), healthy);
    }
    Ok(success(report))
}

async fn handle_health(state: AppState) -> Result<JsonReply, Infallible> {
    let response = HealthResponse {
        status: "healthy",
        agents: state.service.registry().len(),
        timestamp: current_timestamp(),
    };
    Ok(warp::reply::with_status(
        warp::reply::json(&response),
        StatusCode::OK,
    ))
}

async fn handle_metrics(state: AppState) -> Result<JsonReply, Infallible> {
    Ok(warp::reply::with_status(
        warp::reply::json(&state.service.metrics().snapshot()),
        StatusCode::OK,
    ))
}

fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
