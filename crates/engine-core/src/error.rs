#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    #[error("plan has {steps} steps, exceeding MaxSteps={max}")]
    PlanTooLarge { steps: usize, max: usize },

    #[error("no template registered under '{0}'")]
    UnknownTemplate(String),

    #[error("template '{template}' requires variable '{variable}'")]
    MissingVariable { template: String, variable: String },

    #[error("no tool registered under '{0}'")]
    UnknownTool(String),

    #[error("schema violation for tool '{tool}': {reason}")]
    SchemaViolation { tool: String, reason: String },

    #[error("dependency cycle detected among steps: {0:?}")]
    CircularDependency(Vec<String>),

    #[error("could not derive a tool chain from description: '{0}'")]
    UnrecognizedTask(String),

    #[error("step '{step_id}' failed: {message}")]
    StepFailed { step_id: String, message: String },

    #[error("step '{step_id}' timed out after {elapsed_ms}ms")]
    Timeout { step_id: String, elapsed_ms: u64 },

    #[error("no plan with id '{0}'")]
    PlanNotFound(String),

    #[error("no checkpoint with id '{0}'")]
    CheckpointNotFound(String),

    #[error("illegal transition from {from} to {to}")]
    IllegalStateTransition { from: String, to: String },

    #[error("rate limited: retry after {retry_after_secs:?}s")]
    RateLimit { retry_after_secs: Option<u64> },

    #[error("retryable server error: {0}")]
    RetryableServer(String),

    #[error("permanent client error: {0}")]
    PermanentClient(String),

    #[error("snapshot integrity check failed for hash {expected}: found {actual}")]
    SnapshotIntegrity { expected: String, actual: String },

    #[error("manual intervention required: {reason}{}", suggestion_suffix(.suggested_command))]
    ManualInterventionRequired {
        reason: String,
        suggested_command: Option<String>,
    },

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

fn suggestion_suffix(cmd: &Option<String>) -> String {
    match cmd {
        Some(c) => format!(" (suggested: `{c}`)"),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_plan_too_large() {
        let err = EngineError::PlanTooLarge { steps: 12, max: 10 };
        assert_eq!(
            err.to_string(),
            "plan has 12 steps, exceeding MaxSteps=10"
        );
    }

    #[test]
    fn test_display_unknown_template() {
        let err = EngineError::UnknownTemplate("deploy".into());
        assert_eq!(err.to_string(), "no template registered under 'deploy'");
    }

    #[test]
    fn test_display_missing_variable() {
        let err = EngineError::MissingVariable {
            template: "deploy".into(),
            variable: "ENV".into(),
        };
        assert_eq!(
            err.to_string(),
            "template 'deploy' requires variable 'ENV'"
        );
    }

    #[test]
    fn test_display_unknown_tool() {
        let err = EngineError::UnknownTool("frobnicate".into());
        assert_eq!(err.to_string(), "no tool registered under 'frobnicate'");
    }

    #[test]
    fn test_display_schema_violation() {
        let err = EngineError::SchemaViolation {
            tool: "write_file".into(),
            reason: "missing required key 'path'".into(),
        };
        assert_eq!(
            err.to_string(),
            "schema violation for tool 'write_file': missing required key 'path'"
        );
    }

    #[test]
    fn test_display_circular_dependency() {
        let err = EngineError::CircularDependency(vec!["a".into(), "b".into()]);
        assert_eq!(
            err.to_string(),
            "dependency cycle detected among steps: [\"a\", \"b\"]"
        );
    }

    #[test]
    fn test_display_unrecognized_task() {
        let err = EngineError::UnrecognizedTask("do something vague".into());
        assert_eq!(
            err.to_string(),
            "could not derive a tool chain from description: 'do something vague'"
        );
    }

    #[test]
    fn test_display_step_failed() {
        let err = EngineError::StepFailed {
            step_id: "s1".into(),
            message: "boom".into(),
        };
        assert_eq!(err.to_string(), "step 's1' failed: boom");
    }

    #[test]
    fn test_display_timeout() {
        let err = EngineError::Timeout {
            step_id: "s1".into(),
            elapsed_ms: 5000,
        };
        assert_eq!(err.to_string(), "step 's1' timed out after 5000ms");
    }

    #[test]
    fn test_display_plan_not_found() {
        let err = EngineError::PlanNotFound("01ARZ".into());
        assert_eq!(err.to_string(), "no plan with id '01ARZ'");
    }

    #[test]
    fn test_display_checkpoint_not_found() {
        let err = EngineError::CheckpointNotFound("chk-1".into());
        assert_eq!(err.to_string(), "no checkpoint with id 'chk-1'");
    }

    #[test]
    fn test_display_illegal_state_transition() {
        let err = EngineError::IllegalStateTransition {
            from: "Completed".into(),
            to: "Executing".into(),
        };
        assert_eq!(
            err.to_string(),
            "illegal transition from Completed to Executing"
        );
    }

    #[test]
    fn test_display_rate_limit() {
        let err = EngineError::RateLimit {
            retry_after_secs: Some(30),
        };
        assert_eq!(err.to_string(), "rate limited: retry after Some(30)s");
    }

    #[test]
    fn test_display_retryable_server() {
        let err = EngineError::RetryableServer("503".into());
        assert_eq!(err.to_string(), "retryable server error: 503");
    }

    #[test]
    fn test_display_permanent_client() {
        let err = EngineError::PermanentClient("400".into());
        assert_eq!(err.to_string(), "permanent client error: 400");
    }

    #[test]
    fn test_display_snapshot_integrity() {
        let err = EngineError::SnapshotIntegrity {
            expected: "abc".into(),
            actual: "def".into(),
        };
        assert_eq!(
            err.to_string(),
            "snapshot integrity check failed for hash abc: found def"
        );
    }

    #[test]
    fn test_display_manual_intervention_with_suggestion() {
        let err = EngineError::ManualInterventionRequired {
            reason: "commit already pushed".into(),
            suggested_command: Some("git push --force-with-lease".into()),
        };
        assert_eq!(
            err.to_string(),
            "manual intervention required: commit already pushed (suggested: `git push --force-with-lease`)"
        );
    }

    #[test]
    fn test_display_manual_intervention_without_suggestion() {
        let err = EngineError::ManualInterventionRequired {
            reason: "refusing".into(),
            suggested_command: None,
        };
        assert_eq!(err.to_string(), "manual intervention required: refusing");
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<EngineError>();
    }

    #[test]
    fn test_display_boundary_values() {
        let err = EngineError::PlanTooLarge {
            steps: usize::MAX,
            max: 0,
        };
        assert!(err.to_string().contains(&usize::MAX.to_string()));

        let err = EngineError::UnknownTool(String::new());
        assert_eq!(err.to_string(), "no tool registered under ''");
    }
}
