//! Event payload shapes as Marathon sends them on the event bus
//!
//! Every field is defaulted so that a payload missing optional keys (older or
//! newer Marathon versions) still decodes. Application and group definitions
//! embedded in some events are kept as raw JSON.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `api_post_event`
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EventApiRequest {
    pub event_type: String,
    pub client_ip: String,
    pub timestamp: String,
    pub uri: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_definition: Option<Value>,
}

/// `status_update_event`
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EventStatusUpdate {
    pub event_type: String,
    pub timestamp: String,
    pub slave_id: String,
    pub task_id: String,
    pub task_status: String,
    pub app_id: String,
    pub host: String,
    pub ports: Vec<u32>,
    pub version: String,
}

/// `app_terminated_event`
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EventAppTerminated {
    pub event_type: String,
    pub timestamp: String,
    pub app_id: String,
}

/// `framework_message_event`
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EventFrameworkMessage {
    pub event_type: String,
    pub executor_id: String,
    pub message: String,
    pub slave_id: String,
    pub timestamp: String,
}

/// `subscribe_event` and `unsubscribe_event`
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EventSubscription {
    pub event_type: String,
    pub callback_url: String,
    pub client_ip: String,
    pub timestamp: String,
}

/// `event_stream_attached` and `event_stream_detached`
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EventStreamAttachment {
    pub event_type: String,
    pub remote_address: String,
    pub timestamp: String,
}

/// Health check definition carried by the health check events
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HealthCheckDefinition {
    pub grace_period_seconds: f64,
    pub interval_seconds: f64,
    pub max_consecutive_failures: f64,
    pub path: String,
    pub port_index: f64,
    pub protocol: String,
    pub timeout_seconds: f64,
}

/// `add_health_check_event`, `remove_health_check_event` and
/// `failed_health_check_event`
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EventHealthCheck {
    pub event_type: String,
    pub timestamp: String,
    pub app_id: String,
    /// Only set on failed health checks
    pub task_id: String,
    pub health_check: HealthCheckDefinition,
}

/// `health_status_changed_event`
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EventHealthCheckChanged {
    pub event_type: String,
    pub timestamp: String,
    pub app_id: String,
    pub task_id: String,
    pub version: String,
    pub alive: bool,
}

/// `group_change_success` and `group_change_failed`
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EventGroupChange {
    pub event_type: String,
    pub group_id: String,
    pub timestamp: String,
    pub version: String,
    /// Only set when the change failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// `deployment_success` and `deployment_failed`
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EventDeploymentResult {
    pub event_type: String,
    pub id: String,
    pub timestamp: String,
}

/// A single action of a deployment plan
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeploymentStep {
    pub action: String,
    pub app: String,
}

/// The plan a deployment executes
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeploymentPlan {
    pub id: String,
    pub version: String,
    pub steps: Vec<DeploymentStep>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<Value>,
}

/// `deployment_info`, `deployment_step_success` and `deployment_step_failure`
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EventDeploymentStep {
    pub event_type: String,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_step: Option<DeploymentStep>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<DeploymentPlan>,
}
