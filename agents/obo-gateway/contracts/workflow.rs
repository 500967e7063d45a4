//! Workflow request, progress and result contracts

use chrono::{DateTime, Utc};
use obo_core::DelegationChain;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Default scenario when the caller names none
pub const DEFAULT_SCENARIO: &str = "laptop_procurement";

/// Lifecycle of a workflow request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl WorkflowStatus {
    /// Completed and Failed are final
    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkflowStatus::Completed | WorkflowStatus::Failed)
    }
}

/// Status of one downstream agent step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityStatus {
    Idle,
    Running,
    Completed,
    Failed,
}

/// Caller-supplied constraints on the optimization
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Constraints {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget_limit: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery_time: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality_requirement: Option<String>,
}

impl Constraints {
    pub fn is_empty(&self) -> bool {
        self.budget_limit.is_none()
            && self.delivery_time.is_none()
            && self.quality_requirement.is_none()
    }
}

/// What the caller asked the workflow to do
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowInput {
    #[serde(default = "default_optimization_type")]
    pub optimization_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scenario: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constraints: Option<Constraints>,

    /// Free-form parameters passed through untouched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<serde_json::Map<String, serde_json::Value>>,
}

fn default_optimization_type() -> String {
    "laptop_supply_chain".to_string()
}

impl Default for WorkflowInput {
    fn default() -> Self {
        Self {
            optimization_type: default_optimization_type(),
            scenario: None,
            constraints: None,
            parameters: None,
        }
    }
}

/// One completed downstream step. Append-only within a request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentActivity {
    pub id: u32,
    pub timestamp: DateTime<Utc>,
    pub agent_name: String,
    pub action: String,
    pub delegation: DelegationChain,
    pub status: ActivityStatus,
    pub details: String,
}

/// One reasoning entry of a result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reasoning {
    pub decision: String,
    pub agent: String,
    pub rationale: String,
}

/// Result of a completed workflow
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowResult {
    pub request_id: Uuid,

    /// Whether the downstream response carried the structured-analysis marker
    pub structured: bool,

    /// Whether the response text reads as a finished analysis
    pub completion_detected: bool,

    pub reasoning: Vec<Reasoning>,

    /// Character count of the full downstream response
    pub response_chars: usize,

    pub completed_at: DateTime<Utc>,
}

/// Progress view of a workflow request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRequest {
    pub id: Uuid,
    pub status: WorkflowStatus,
    pub progress_percentage: f64,
    pub current_step: String,
    pub activities: Vec<AgentActivity>,

    /// Set in the same write that flips the status to Completed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<WorkflowResult>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowRequest {
    pub fn pending(id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id,
            status: WorkflowStatus::Pending,
            progress_percentage: 0.0,
            current_step: "Initializing workflow".to_string(),
            activities: Vec::new(),
            result: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serialization() {
        assert_eq!(
            serde_json::to_string(&WorkflowStatus::Completed).unwrap(),
            "\"completed\""
        );
        assert!(WorkflowStatus::Failed.is_terminal());
        assert!(!WorkflowStatus::Running.is_terminal());
    }

    #[test]
    fn test_input_defaults() {
        let input: WorkflowInput = serde_json::from_str("{}").unwrap();
        assert_eq!(input.optimization_type, "laptop_supply_chain");
        assert!(input.constraints.is_none());
    }

    #[test]
    fn test_pending_request() {
        let req = WorkflowRequest::pending(Uuid::new_v4());
        assert_eq!(req.status, WorkflowStatus::Pending);
        assert_eq!(req.progress_percentage, 0.0);
        assert!(req.activities.is_empty());
        assert!(req.result.is_none());
    }
}
