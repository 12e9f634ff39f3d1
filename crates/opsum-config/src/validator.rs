//! Configuration validation.

use crate::error::ConfigError;
use crate::schema::Config;

/// Validation result.
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: ValidationWarning) {
        self.warnings.push(warning);
    }
}

/// A validation error.
#[derive(Debug)]
pub struct ValidationError {
    pub path: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// A validation warning.
#[derive(Debug)]
pub struct ValidationWarning {
    pub path: String,
    pub message: String,
}

impl ValidationWarning {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Configuration validator.
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration.
    pub fn validate(config: &Config) -> Result<ValidationResult, ConfigError> {
        let mut result = ValidationResult::default();

        Self::validate_summary(config, &mut result);
        Self::validate_logging(config, &mut result);
        Self::validate_simulation(config, &mut result);

        Ok(result)
    }

    /// Validate and turn the first error into a `ConfigError`.
    pub fn ensure_valid(config: &Config) -> Result<ValidationResult, ConfigError> {
        let result = Self::validate(config)?;
        if let Some(first) = result.errors.first() {
            return Err(ConfigError::InvalidValue {
                field: first.path.clone(),
                message: first.message.clone(),
            });
        }
        Ok(result)
    }

    fn validate_summary(config: &Config, result: &mut ValidationResult) {
        let summary = &config.summary;

        if summary.idle_time_ms == 0 {
            result.add_error(ValidationError::new(
                "summary.idle_time_ms",
                "idle_time_ms must be greater than 0",
            ));
        }

        if summary.max_time_ms == 0 {
            result.add_error(ValidationError::new(
                "summary.max_time_ms",
                "max_time_ms must be greater than 0",
            ));
        }

        if summary.max_ops == 0 {
            result.add_error(ValidationError::new(
                "summary.max_ops",
                "max_ops must be greater than 0",
            ));
        }

        if summary.max_ack_wait_time_ms == 0 {
            result.add_error(ValidationError::new(
                "summary.max_ack_wait_time_ms",
                "max_ack_wait_time_ms must be greater than 0",
            ));
        }

        // Idle summaries never fire if max_time always wins first
        if summary.idle_time_ms >= summary.max_time_ms && summary.max_time_ms > 0 {
            result.add_warning(ValidationWarning::new(
                "summary.idle_time_ms",
                "idle_time_ms is not shorter than max_time_ms, idle summaries will not happen",
            ));
        }

        if summary.max_ack_wait_time_ms < summary.idle_time_ms {
            result.add_warning(ValidationWarning::new(
                "summary.max_ack_wait_time_ms",
                "max_ack_wait_time_ms is shorter than idle_time_ms, summaries may time out before the sequencer answers",
            ));
        }
    }

    fn validate_logging(config: &Config, result: &mut ValidationResult) {
        if config.logging.level.trim().is_empty() {
            result.add_error(ValidationError::new(
                "logging.level",
                "Log level cannot be empty",
            ));
        }

        if config.logging.directory.is_some() && config.logging.max_log_files == 0 {
            result.add_warning(ValidationWarning::new(
                "logging.max_log_files",
                "max_log_files is 0, rotated log files will not be pruned",
            ));
        }
    }

    fn validate_simulation(config: &Config, result: &mut ValidationResult) {
        if config.simulation.ops == 0 {
            result.add_warning(ValidationWarning::new(
                "simulation.ops",
                "Simulation sequences no ops, only startup will be exercised",
            ));
        }

        if config.simulation.ack_delay_ms >= config.summary.max_ack_wait_time_ms {
            result.add_warning(ValidationWarning::new(
                "simulation.ack_delay_ms",
                format!(
                    "ack_delay_ms ({}) is not below max_ack_wait_time_ms ({}), every summary will time out",
                    config.simulation.ack_delay_ms, config.summary.max_ack_wait_time_ms
                ),
            ));
        }
    }
}

#[cfg(test)]
#[path = "validator_tests.rs"]
mod tests;
