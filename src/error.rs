use std::error::Error;

use std::fmt;
use std::fmt::{Display, Formatter};

#[derive(Debug, PartialEq)]
pub enum SweeperError {
    MissingField(&'static str),
    InvalidConfig { key: String, value: String },
    Provider { operation: &'static str, message: String },
    PartialFailure { operation: &'static str, message: String },
    UnexpectedRecord { id: String, expected: &'static str },
}

impl SweeperError {
    pub fn provider<E: Display>(operation: &'static str, error: E) -> Self {
        SweeperError::Provider {
            operation,
            message: error.to_string(),
        }
    }

    pub fn invalid_config(key: &str, value: &str) -> Self {
        SweeperError::InvalidConfig {
            key: key.to_string(),
            value: value.to_string(),
        }
    }
}

impl Display for SweeperError {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match *self {
            SweeperError::MissingField(field) => write!(f, "{} is missing from the response", field),
            SweeperError::InvalidConfig { ref key, ref value } => {
                write!(f, "Invalid value {:?} for {}", value, key)
            }
            SweeperError::Provider {
                operation,
                ref message,
            } => write!(f, "{} failed: {}", operation, message),
            SweeperError::PartialFailure {
                operation,
                ref message,
            } => write!(f, "{} partially failed: {}", operation, message),
            SweeperError::UnexpectedRecord { ref id, expected } => {
                write!(f, "{} is not a record of kind {}", id, expected)
            }
        }
    }
}

impl Error for SweeperError {}
