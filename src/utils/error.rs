use thiserror::Error;

#[derive(Error, Debug)]
pub enum SimError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("CSV processing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Configuration error in '{field}': {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Invalid value '{value}' for '{field}': {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration field: {field}")]
    MissingConfigError { field: String },

    #[error("Unknown node: {node_id}")]
    UnknownNode { node_id: String },

    #[error("Seed data error: {message}")]
    SeedDataError { message: String },

    #[error("Provisioning step '{step}' failed with exit code {exit_code}: {stderr}")]
    ProvisionStepFailed {
        step: String,
        exit_code: i32,
        stderr: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Io,
    Configuration,
    Data,
    Simulation,
    Provisioning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Medium,
    High,
    Critical,
}

impl SimError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            SimError::IoError(_) => ErrorCategory::Io,
            SimError::ConfigValidationError { .. }
            | SimError::InvalidConfigValueError { .. }
            | SimError::MissingConfigError { .. } => ErrorCategory::Configuration,
            SimError::SerializationError(_)
            | SimError::CsvError(_)
            | SimError::SeedDataError { .. } => ErrorCategory::Data,
            SimError::UnknownNode { .. } => ErrorCategory::Simulation,
            SimError::ProvisionStepFailed { .. } => ErrorCategory::Provisioning,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self.category() {
            ErrorCategory::Configuration => ErrorSeverity::High,
            ErrorCategory::Data => ErrorSeverity::Medium,
            ErrorCategory::Simulation => ErrorSeverity::High,
            ErrorCategory::Io | ErrorCategory::Provisioning => ErrorSeverity::Critical,
        }
    }

    /// Process exit code for the binaries.
    ///
    /// Provisioning failures hand back the failing tool's own code.
    pub fn exit_code(&self) -> i32 {
        if let SimError::ProvisionStepFailed { exit_code, .. } = self {
            return *exit_code;
        }
        match self.severity() {
            ErrorSeverity::Medium => 2,
            ErrorSeverity::High => 1,
            ErrorSeverity::Critical => 3,
        }
    }

    pub fn recovery_suggestion(&self) -> String {
        match self {
            SimError::IoError(_) => {
                "Check that the working directory exists and is writable".to_string()
            }
            SimError::SerializationError(_) | SimError::SeedDataError { .. } => {
                "Check users.json and initial_transactions.json in the data directory".to_string()
            }
            SimError::CsvError(_) => "Check free space in the output directory".to_string(),
            SimError::ConfigValidationError { field, .. }
            | SimError::InvalidConfigValueError { field, .. }
            | SimError::MissingConfigError { field } => {
                format!("Fix '{}' in the configuration file", field)
            }
            SimError::UnknownNode { .. } => {
                "Use one of the node ids declared in the [nodes] table".to_string()
            }
            SimError::ProvisionStepFailed { step, .. } => format!(
                "Make sure python3 and network access are available, then re-run ({})",
                step
            ),
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            SimError::ProvisionStepFailed { step, .. } => {
                format!("Environment setup stopped at step: {}", step)
            }
            SimError::ConfigValidationError { .. }
            | SimError::InvalidConfigValueError { .. }
            | SimError::MissingConfigError { .. } => format!("Invalid configuration: {}", self),
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SimError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provision_failure_keeps_tool_exit_code() {
        let err = SimError::ProvisionStepFailed {
            step: "install runtime dependencies".to_string(),
            exit_code: 7,
            stderr: String::new(),
        };
        assert_eq!(err.exit_code(), 7);
        assert_eq!(err.category(), ErrorCategory::Provisioning);
    }

    #[test]
    fn configuration_errors_are_high_severity() {
        let err = SimError::MissingConfigError {
            field: "nodes".to_string(),
        };
        assert_eq!(err.severity(), ErrorSeverity::High);
        assert_eq!(err.exit_code(), 1);
        assert!(err.recovery_suggestion().contains("nodes"));
    }

    #[test]
    fn every_error_exits_non_zero() {
        let errors = [
            SimError::IoError(std::io::Error::other("disk gone")),
            SimError::SeedDataError {
                message: "users.json: bad".to_string(),
            },
            SimError::UnknownNode {
                node_id: "THIES".to_string(),
            },
            SimError::InvalidConfigValueError {
                field: "nodes".to_string(),
                value: "1".to_string(),
                reason: "At least two replica nodes are required".to_string(),
            },
        ];
        let codes: Vec<i32> = errors.iter().map(SimError::exit_code).collect();
        assert_eq!(codes, vec![3, 2, 1, 1]);
    }
}
