//! Outbound message composition and result synthesis.
//!
//! Structured output is recognized by a marker string in the response text.
//! With the marker the result carries a short rationale taken from the text;
//! without it a fallback reasoning entry is produced.

use chrono::Utc;
use uuid::Uuid;

use crate::contracts::{Reasoning, WorkflowInput, WorkflowResult, DEFAULT_SCENARIO};

pub const STRUCTURED_MARKER: &str = "Supply Chain Optimization Analysis";

pub const RATIONALE_MAX_CHARS: usize = 200;

const COMPLETION_INDICATORS: &[&str] = &["complete", "completed", "finished", "done", "recommendations"];

/// Text sent to the downstream agent for `input`
pub fn compose_message(input: &WorkflowInput) -> String {
    let mut parts = vec![
        "optimize laptop supply chain".to_string(),
        format!(
            "scenario: {}",
            input.scenario.as_deref().unwrap_or(DEFAULT_SCENARIO)
        ),
    ];

    if let Some(constraints) = input.constraints.as_ref().filter(|c| !c.is_empty()) {
        let mut items = Vec::new();
        if let Some(budget) = constraints.budget_limit {
            items.push(format!("budget limit: ${}", group_thousands(budget)));
        }
        if let Some(delivery) = &constraints.delivery_time {
            items.push(format!("delivery time: {}", delivery));
        }
        if let Some(quality) = &constraints.quality_requirement {
            items.push(format!("quality: {}", quality));
        }
        parts.push(format!("constraints: {}", items.join(", ")));
    }

    parts.join(". ")
}

pub fn is_completion_text(text: &str) -> bool {
    let lower = text.to_lowercase();
    COMPLETION_INDICATORS.iter().any(|word| lower.contains(word))
}

/// First [`RATIONALE_MAX_CHARS`] characters plus an ellipsis
pub fn excerpt(text: &str) -> String {
    let prefix: String = text.chars().take(RATIONALE_MAX_CHARS).collect();
    format!("{}...", prefix)
}

pub fn synthesize(request_id: Uuid, agent_id: &str, text: &str) -> WorkflowResult {
    let structured = text.contains(STRUCTURED_MARKER);

    let reasoning = if structured {
        Reasoning {
            decision: "Supply chain optimization analysis received".to_string(),
            agent: agent_id.to_string(),
            rationale: excerpt(text),
        }
    } else {
        Reasoning {
            decision: "Agent response received".to_string(),
            agent: agent_id.to_string(),
            rationale: "Downstream agent returned unstructured output".to_string(),
        }
    };

    WorkflowResult {
        request_id,
        structured,
        completion_detected: is_completion_text(text),
        reasoning: vec![reasoning],
        response_chars: text.chars().count(),
        completed_at: Utc::now(),
    }
}

fn group_thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::Constraints;

    #[test]
    fn test_compose_without_constraints() {
        assert_eq!(
            compose_message(&WorkflowInput::default()),
            "optimize laptop supply chain. scenario: laptop_procurement"
        );
    }

    #[test]
    fn test_compose_with_constraints() {
        let input = WorkflowInput {
            scenario: Some("q4_refresh".into()),
            constraints: Some(Constraints {
                budget_limit: Some(125_000),
                delivery_time: Some("2 weeks".into()),
                quality_requirement: Some("enterprise".into()),
            }),
            ..Default::default()
        };
        assert_eq!(
            compose_message(&input),
            "optimize laptop supply chain. scenario: q4_refresh. constraints: budget limit: $125,000, delivery time: 2 weeks, quality: enterprise"
        );
    }

    #[test]
    fn test_group_thousands() {
        assert_eq!(group_thousands(0), "0");
        assert_eq!(group_thousands(999), "999");
        assert_eq!(group_thousands(1000), "1,000");
        assert_eq!(group_thousands(1234567), "1,234,567");
    }

    #[test]
    fn test_completion_text() {
        assert!(is_completion_text("Optimization COMPLETE"));
        assert!(is_completion_text("Here are my recommendations"));
        assert!(!is_completion_text("still working"));
    }

    #[test]
    fn test_structured_result() {
        let text = format!("# {}\n{}", STRUCTURED_MARKER, "x".repeat(500));
        let result = synthesize(Uuid::new_v4(), "supply-chain-agent", &text);

        assert!(result.structured);
        let first = &result.reasoning[0];
        assert_eq!(first.agent, "supply-chain-agent");
        assert!(first.rationale.ends_with("..."));
        assert_eq!(first.rationale.chars().count(), RATIONALE_MAX_CHARS + 3);
        assert!(text.starts_with(first.rationale.trim_end_matches("...")));
        assert_eq!(result.response_chars, text.chars().count());
    }

    #[test]
    fn test_fallback_result() {
        let result = synthesize(Uuid::new_v4(), "supply-chain-agent", "plain text reply");
        assert!(!result.structured);
        assert_eq!(result.reasoning.len(), 1);
        assert_eq!(result.reasoning[0].decision, "Agent response received");
    }

    #[test]
    fn test_excerpt_is_char_safe() {
        let text = "é".repeat(300);
        assert_eq!(excerpt(&text).chars().count(), RATIONALE_MAX_CHARS + 3);
    }
}
