//! Exit codes for the CLI

use keel_core::error::{EngineError, GraphError, KeelError};

/// Success
pub const SUCCESS: i32 = 0;

/// General error
pub const ERROR: i32 = 1;

/// Configuration error
pub const CONFIG_ERROR: i32 = 2;

/// Git or cached checkout error
pub const GIT_ERROR: i32 = 3;

/// Discovery or dependency graph error
pub const GRAPH_ERROR: i32 = 4;

/// Every module is released or blocked
pub const NOTHING_TO_RELEASE: i32 = 5;

/// The API diff found breaking changes
pub const BREAKING: i32 = 6;

/// User cancelled
pub const CANCELLED: i32 = 130;

/// Exit code for a failed command
pub fn for_error(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<KeelError>() {
        Some(KeelError::Config(_)) => CONFIG_ERROR,
        Some(KeelError::Git(_)) | Some(KeelError::Cache(_)) => GIT_ERROR,
        Some(KeelError::Graph(GraphError::NoSuitableLeaf)) => NOTHING_TO_RELEASE,
        Some(KeelError::Graph(_)) | Some(KeelError::Discovery(_)) => GRAPH_ERROR,
        Some(KeelError::Engine(EngineError::Cancelled(_))) => CANCELLED,
        _ => ERROR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_core::error::ConfigError;
    use std::path::PathBuf;

    #[test]
    fn test_error_mapping() {
        let err: anyhow::Error = KeelError::from(GraphError::NoSuitableLeaf).into();
        assert_eq!(for_error(&err), NOTHING_TO_RELEASE);

        let err: anyhow::Error = KeelError::from(GraphError::Cycle {
            modules: vec!["example.com/a".to_string()],
        })
        .into();
        assert_eq!(for_error(&err), GRAPH_ERROR);

        let err: anyhow::Error =
            KeelError::from(ConfigError::NotFound(PathBuf::from("/x"))).into();
        assert_eq!(for_error(&err), CONFIG_ERROR);

        let err: anyhow::Error = KeelError::from(EngineError::Cancelled("verdict")).into();
        assert_eq!(for_error(&err), CANCELLED);

        assert_eq!(for_error(&anyhow::anyhow!("boom")), ERROR);
    }
}
