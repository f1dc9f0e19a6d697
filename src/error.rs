//! Error types for the S20 protocol.

use std::io;
use std::net::Ipv4Addr;

use thiserror::Error;

use crate::command::Task;
use crate::response::ResponseSet;

/// Result type alias for S20 operations.
pub type Result<T> = std::result::Result<T, OrviboError>;

/// Errors that can occur while talking to S20 devices.
#[derive(Debug, Error)]
pub enum OrviboError {
    /// Invalid parameter provided.
    #[error("Invalid parameter '{parameter}': {reason}")]
    InvalidParameter {
        /// Name of the invalid parameter.
        parameter: String,
        /// Description of why the parameter is invalid.
        reason: String,
    },

    /// A received frame cannot be used for the requested purpose.
    #[error("Invalid response: {reason}")]
    InvalidResponse {
        /// Description of the response error.
        reason: String,
    },

    /// The task code is known but no frame can be built for it.
    #[error("Unsupported task: {task}")]
    UnsupportedTask {
        /// Name of the task.
        task: String,
    },

    /// A task produced a zero-length frame.
    #[error("Empty frame for task {task}")]
    EmptyFrame {
        /// Task that was being formed.
        task: Task,
    },

    /// Socket creation, option, bind, send or receive failure.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Retries were exhausted without the required responses.
    #[error("{task}: required response {required} not received after {attempts} attempt(s)")]
    RequirementNotMet {
        /// Task that failed.
        task: Task,
        /// Response categories the task needed.
        required: ResponseSet,
        /// Number of send attempts made.
        attempts: u32,
    },

    /// No catalog record matches a user supplied identifier.
    #[error("Device not matched: >{identifier}<")]
    DeviceNotFound {
        /// The identifier as given by the caller.
        identifier: String,
    },

    /// A broadcast discovery produced no devices.
    #[error("No devices found")]
    NoDevicesFound,

    /// A post-write read-table did not reflect the requested values.
    #[error("{}", write_mismatch_message(.name, .password))]
    WriteNotConfirmed {
        /// The device name was requested but not set.
        name: bool,
        /// The password was requested but not set.
        password: bool,
    },

    /// Device data file syntax error.
    #[error("Device data file, line {line}: {reason}")]
    InvalidDataFile {
        /// 1-based line number.
        line: usize,
        /// Description of the problem.
        reason: String,
    },
}

fn write_mismatch_message(name: &bool, password: &bool) -> String {
    match (*name, *password) {
        (true, true) => "Device name NOT set. Password NOT set.".to_string(),
        (true, false) => "Device name NOT set.".to_string(),
        (false, true) => "Password NOT set.".to_string(),
        (false, false) => "Write not confirmed.".to_string(),
    }
}

impl OrviboError {
    /// Creates a new `InvalidParameter` error.
    ///
    /// # Example
    ///
    /// ```
    /// use orvibo_s20::OrviboError;
    ///
    /// let err = OrviboError::invalid_parameter("name", "must not exceed 16 bytes");
    /// ```
    pub fn invalid_parameter(parameter: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            parameter: parameter.into(),
            reason: reason.into(),
        }
    }

    /// Creates a new `InvalidResponse` error.
    ///
    /// # Example
    ///
    /// ```
    /// use orvibo_s20::OrviboError;
    ///
    /// let err = OrviboError::invalid_response("frame too short");
    /// ```
    pub fn invalid_response(reason: impl Into<String>) -> Self {
        Self::InvalidResponse {
            reason: reason.into(),
        }
    }

    /// Creates a new `DeviceNotFound` error.
    pub fn device_not_found(identifier: impl Into<String>) -> Self {
        Self::DeviceNotFound {
            identifier: identifier.into(),
        }
    }

    /// Creates a new `InvalidDataFile` error.
    pub fn invalid_data_file(line: usize, reason: impl Into<String>) -> Self {
        Self::InvalidDataFile {
            line,
            reason: reason.into(),
        }
    }

    /// Creates a `DeviceNotFound` error for an address identifier.
    pub(crate) fn address_not_found(address: Ipv4Addr) -> Self {
        Self::device_not_found(address.to_string())
    }

    /// Returns whether this is a hard transport failure.
    ///
    /// Transport failures abort a multi-device sweep; every other error is
    /// reported for the device at hand and the sweep continues.
    ///
    /// # Example
    ///
    /// ```
    /// use orvibo_s20::OrviboError;
    /// use std::io;
    ///
    /// let err = OrviboError::from(io::Error::new(io::ErrorKind::AddrInUse, "busy"));
    /// assert!(err.is_transport());
    /// assert!(!OrviboError::NoDevicesFound.is_transport());
    /// ```
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Io(_))
    }
}
