//! Error types and ABI result codes
// Copyright 2025 Francisco F. Pinochet
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.


use thiserror::Error;

/// Result type for interop operations
pub type InteropResult<T> = Result<T, InteropError>;

/// Result code returned by every fallible ABI function
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultCode {
    Success = 0,
    UnknownError = 0x8000_0000,
    InvalidParameter = 0x8000_0001,
    InvalidOperation = 0x8000_0002,
    /// The call was made from a thread on which it would deadlock
    WrongThread = 0x8000_0003,
    NotFound = 0x8000_0004,
    InvalidNativeHandle = 0x8000_0005,
    NotInitialized = 0x8000_0006,
    Unsupported = 0x8000_0007,
    OutOfRange = 0x8000_0008,
    BufferTooSmall = 0x8000_0009,
    PeerConnectionClosed = 0x8000_0101,
    InvalidMediaKind = 0x8000_0401,
}

impl ResultCode {
    pub fn is_success(self) -> bool {
        self == ResultCode::Success
    }
}

/// Errors that can occur in the interop layer
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InteropError {
    /// Unexpected internal failure, including caught panics
    #[error("Unknown error: {0}")]
    Unknown(String),

    /// Invalid or missing argument
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Operation not valid in the current state
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// Call issued from a thread the backend forbids
    #[error("Wrong thread: {0}")]
    WrongThread(String),

    /// Item not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Null, released, or wrong-family handle
    #[error("Invalid native handle: {0}")]
    InvalidNativeHandle(String),

    /// Library is not initialized
    #[error("Library not initialized")]
    NotInitialized,

    /// Operation not supported by this object
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// Value outside of the accepted range
    #[error("Out of range: {0}")]
    OutOfRange(String),

    /// Caller buffer too small; `required` includes the terminator
    #[error("Buffer too small: {required} bytes required")]
    BufferTooSmall { required: usize },

    /// Peer connection already closed
    #[error("Peer connection closed")]
    PeerConnectionClosed,

    /// Audio track used where video is expected, or the reverse
    #[error("Invalid media kind: expected {expected}, got {actual}")]
    InvalidMediaKind { expected: String, actual: String },
}

impl InteropError {
    /// Result code reported across the ABI for this error
    pub fn code(&self) -> ResultCode {
        match self {
            InteropError::Unknown(_) => ResultCode::UnknownError,
            InteropError::InvalidParameter(_) => ResultCode::InvalidParameter,
            InteropError::InvalidOperation(_) => ResultCode::InvalidOperation,
            InteropError::WrongThread(_) => ResultCode::WrongThread,
            InteropError::NotFound(_) => ResultCode::NotFound,
            InteropError::InvalidNativeHandle(_) => ResultCode::InvalidNativeHandle,
            InteropError::NotInitialized => ResultCode::NotInitialized,
            InteropError::Unsupported(_) => ResultCode::Unsupported,
            InteropError::OutOfRange(_) => ResultCode::OutOfRange,
            InteropError::BufferTooSmall { .. } => ResultCode::BufferTooSmall,
            InteropError::PeerConnectionClosed => ResultCode::PeerConnectionClosed,
            InteropError::InvalidMediaKind { .. } => ResultCode::InvalidMediaKind,
        }
    }
}

impl From<InteropError> for ResultCode {
    fn from(err: InteropError) -> Self {
        err.code()
    }
}

impl<T> From<InteropResult<T>> for ResultCode {
    fn from(result: InteropResult<T>) -> Self {
        match result {
            Ok(_) => ResultCode::Success,
            Err(err) => err.code(),
        }
    }
}

impl From<std::io::Error> for InteropError {
    fn from(err: std::io::Error) -> Self {
        InteropError::Unknown(err.to_string())
    }
}
