//! Shared progress/result store.
//!
//! One lock guards both maps. Completion writes the result and flips the
//! status in the same critical section, so a reader that sees `Completed`
//! always finds the result.

use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::{Notify, RwLock};
use uuid::Uuid;

use crate::contracts::{AgentActivity, WorkflowRequest, WorkflowResult, WorkflowStatus};

#[derive(Default)]
struct State {
    requests: HashMap<Uuid, WorkflowRequest>,
    results: HashMap<Uuid, WorkflowResult>,
}

#[derive(Default)]
pub struct WorkflowStore {
    state: RwLock<State>,
    settled: Notify,
}

impl WorkflowStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_pending(&self, id: Uuid) {
        self.state
            .write()
            .await
            .requests
            .insert(id, WorkflowRequest::pending(id));
    }

    /// Record progress; the first write moves Pending to Running.
    ///
    /// Returns false if the request is gone or already terminal.
    pub async fn progress(&self, id: Uuid, percentage: f64, step: impl Into<String>) -> bool {
        let mut state = self.state.write().await;
        let Some(request) = state.requests.get_mut(&id) else {
            return false;
        };
        if request.status.is_terminal() {
            return false;
        }
        request.status = WorkflowStatus::Running;
        request.progress_percentage = percentage.clamp(0.0, 100.0);
        request.current_step = step.into();
        request.updated_at = Utc::now();
        true
    }

    pub async fn complete(
        &self,
        id: Uuid,
        activity: AgentActivity,
        result: WorkflowResult,
        step: impl Into<String>,
    ) -> bool {
        let updated = {
            let mut state = self.state.write().await;
            let State { requests, results } = &mut *state;
            match requests.get_mut(&id) {
                Some(request) if !request.status.is_terminal() => {
                    results.insert(id, result.clone());
                    request.activities.push(activity);
                    request.result = Some(result);
                    request.progress_percentage = 100.0;
                    request.current_step = step.into();
                    request.updated_at = Utc::now();
                    request.status = WorkflowStatus::Completed;
                    true
                }
                _ => false,
            }
        };
        self.settled.notify_waiters();
        updated
    }

    /// Mark failed with progress reset to 0 and `Error: <message>` as the step
    pub async fn fail(&self, id: Uuid, message: &str) -> bool {
        let updated = {
            let mut state = self.state.write().await;
            match state.requests.get_mut(&id) {
                Some(request) if !request.status.is_terminal() => {
                    request.status = WorkflowStatus::Failed;
                    request.progress_percentage = 0.0;
                    request.current_step = format!("Error: {}", message);
                    request.updated_at = Utc::now();
                    true
                }
                _ => false,
            }
        };
        self.settled.notify_waiters();
        updated
    }

    pub async fn get(&self, id: Uuid) -> Option<WorkflowRequest> {
        self.state.read().await.requests.get(&id).cloned()
    }

    pub async fn get_result(&self, id: Uuid) -> Option<WorkflowResult> {
        self.state.read().await.results.get(&id).cloned()
    }

    /// Every request, oldest first
    pub async fn list(&self) -> Vec<WorkflowRequest> {
        let mut all: Vec<_> = self.state.read().await.requests.values().cloned().collect();
        all.sort_by_key(|r| r.created_at);
        all
    }

    pub async fn clear(&self) {
        let mut state = self.state.write().await;
        state.requests.clear();
        state.results.clear();
        drop(state);
        self.settled.notify_waiters();
    }

    /// Future that resolves on the next terminal transition or clear
    pub fn settled(&self) -> tokio::sync::futures::Notified<'_> {
        self.settled.notified()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::{ActivityStatus, Reasoning};
    use obo_core::DelegationChain;

    fn activity() -> AgentActivity {
        AgentActivity {
            id: 1,
            timestamp: Utc::now(),
            agent_name: "agent".into(),
            action: "optimization_step".into(),
            delegation: DelegationChain::build("alice", "agent", "s", None).unwrap(),
            status: ActivityStatus::Completed,
            details: "ok".into(),
        }
    }

    fn result(id: Uuid) -> WorkflowResult {
        WorkflowResult {
            request_id: id,
            structured: false,
            completion_detected: false,
            reasoning: vec![Reasoning {
                decision: "d".into(),
                agent: "agent".into(),
                rationale: "r".into(),
            }],
            response_chars: 2,
            completed_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_lifecycle() {
        let store = WorkflowStore::new();
        let id = Uuid::new_v4();
        store.insert_pending(id).await;
        assert_eq!(store.get(id).await.unwrap().status, WorkflowStatus::Pending);

        assert!(store.progress(id, 30.0, "Calling agent").await);
        assert_eq!(store.get(id).await.unwrap().status, WorkflowStatus::Running);

        assert!(store.complete(id, activity(), result(id), "Workflow completed").await);
        let request = store.get(id).await.unwrap();
        assert_eq!(request.status, WorkflowStatus::Completed);
        assert_eq!(request.progress_percentage, 100.0);
        assert_eq!(request.activities.len(), 1);
        assert!(store.get_result(id).await.is_some());
    }

    #[tokio::test]
    async fn test_terminal_is_final() {
        let store = WorkflowStore::new();
        let id = Uuid::new_v4();
        store.insert_pending(id).await;
        assert!(store.fail(id, "boom").await);

        assert!(!store.progress(id, 50.0, "late").await);
        assert!(!store.complete(id, activity(), result(id), "late").await);

        let request = store.get(id).await.unwrap();
        assert_eq!(request.status, WorkflowStatus::Failed);
        assert_eq!(request.progress_percentage, 0.0);
        assert_eq!(request.current_step, "Error: boom");
        assert!(store.get_result(id).await.is_none());
    }

    #[tokio::test]
    async fn test_unknown_and_clear() {
        let store = WorkflowStore::new();
        let id = Uuid::new_v4();
        assert!(store.get(id).await.is_none());
        assert!(!store.progress(id, 1.0, "x").await);

        store.insert_pending(id).await;
        assert_eq!(store.list().await.len(), 1);
        store.clear().await;
        assert!(store.list().await.is_empty());
    }
}
