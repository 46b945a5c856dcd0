use thiserror::Error;

pub type DispatchResult<T> = std::result::Result<T, DispatchError>;

/// Ways a dispatch can fail. `ApiUnavailable` is consumed by the dispatcher
/// itself (it triggers the CLI fallback) and never reaches a caller.
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("{0}")]
    NoProjectRoot(String),

    #[error("settings need attention:\n- {}", .0.join("\n- "))]
    InvalidConfiguration(Vec<String>),

    #[error("failed to launch {program}: {source}")]
    ToolLaunchFailed {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{output}")]
    ToolExitedNonZero { code: i32, output: String },

    #[error("{0}")]
    ResultParseError(String),

    /// The tool ran but reported failure in its payload.
    #[error("{0}")]
    ToolReportedFailure(String),

    #[error("map API unavailable: {0}")]
    ApiUnavailable(String),
}

impl DispatchError {
    /// Stable machine-readable name, used in session-protocol results.
    pub fn kind(&self) -> &'static str {
        match self {
            DispatchError::NoProjectRoot(_) => "no_project_root",
            DispatchError::InvalidConfiguration(_) => "invalid_configuration",
            DispatchError::ToolLaunchFailed { .. } => "tool_launch_failed",
            DispatchError::ToolExitedNonZero { .. } => "tool_exited_non_zero",
            DispatchError::ResultParseError(_) => "result_parse_error",
            DispatchError::ToolReportedFailure(_) => "tool_reported_failure",
            DispatchError::ApiUnavailable(_) => "api_unavailable",
        }
    }

    pub(crate) fn exited(code: i32, output: &str, fallback: &str) -> Self {
        let trimmed = output.trim();
        DispatchError::ToolExitedNonZero {
            code,
            output: if trimmed.is_empty() {
                fallback.to_string()
            } else {
                trimmed.to_string()
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuration_errors_render_as_a_list() {
        let err = DispatchError::InvalidConfiguration(vec!["a is bad".into(), "b is bad".into()]);
        assert_eq!(err.to_string(), "settings need attention:\n- a is bad\n- b is bad");
    }

    #[test]
    fn empty_output_uses_fallback_message() {
        let err = DispatchError::exited(2, "  \n", "index build failed.");
        assert_eq!(err.to_string(), "index build failed.");
        assert_eq!(err.kind(), "tool_exited_non_zero");
    }
}
