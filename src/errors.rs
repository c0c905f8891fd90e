// SPDX-License-Identifier: MPL-2.0

//! Error types for the capture/render/encode pipeline
//!
//! Overload drops (coalesced producer frames, superseded encoder submissions)
//! are deliberately not represented here; they are counted in
//! [`crate::stats::PipelineStats`].

use std::fmt;

/// Result type alias using PipelineError
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Main pipeline error type
#[derive(Debug, Clone)]
pub enum PipelineError {
    /// GPU setup failed (shader compile/link, texture or target allocation).
    /// Fatal to the GPU context that triggered it.
    Setup(SetupError),
    /// The frame producer could not be opened
    DeviceUnavailable(String),
    /// The codec/muxer could not be configured; fatal to that session only
    EncodeConfig(String),
    /// The codec failed while a session was running; partial output is kept
    MidStreamEncode(String),
    /// A command was issued outside the documented grammar
    ContractViolation(String),
    /// A bounded command queue was full; the command was not delivered
    QueueFull(&'static str),
    /// The receiving thread has exited
    Disconnected(&'static str),
    /// Configuration errors
    Config(String),
    /// Filesystem errors
    Io(String),
}

/// GPU setup failures
#[derive(Debug, Clone)]
pub enum SetupError {
    /// No usable adapter or device
    NoAdapter(String),
    /// Shader module failed to compile or the pipeline failed to link
    ShaderCompile { program: String, message: String },
    /// Texture or framebuffer allocation failed
    Allocation(String),
    /// The presentation surface rejected the configuration
    Surface(String),
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::Setup(e) => write!(f, "GPU setup failed: {}", e),
            PipelineError::DeviceUnavailable(msg) => write!(f, "Capture device unavailable: {}", msg),
            PipelineError::EncodeConfig(msg) => write!(f, "Encoder configuration failed: {}", msg),
            PipelineError::MidStreamEncode(msg) => write!(f, "Encoding failed mid-stream: {}", msg),
            PipelineError::ContractViolation(msg) => write!(f, "Contract violation: {}", msg),
            PipelineError::QueueFull(queue) => write!(f, "{} queue is full", queue),
            PipelineError::Disconnected(thread) => write!(f, "{} thread has exited", thread),
            PipelineError::Config(msg) => write!(f, "Configuration error: {}", msg),
            PipelineError::Io(msg) => write!(f, "I/O error: {}", msg),
        }
    }
}

impl fmt::Display for SetupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SetupError::NoAdapter(msg) => write!(f, "No GPU adapter: {}", msg),
            SetupError::ShaderCompile { program, message } => {
                write!(f, "Program '{}' failed to build: {}", program, message)
            }
            SetupError::Allocation(msg) => write!(f, "Allocation failed: {}", msg),
            SetupError::Surface(msg) => write!(f, "Surface error: {}", msg),
        }
    }
}

impl std::error::Error for PipelineError {}
impl std::error::Error for SetupError {}

impl PipelineError {
    /// Whether the error only affects a recording session and leaves the
    /// render/display path running
    pub fn is_session_scoped(&self) -> bool {
        matches!(
            self,
            PipelineError::EncodeConfig(_) | PipelineError::MidStreamEncode(_)
        )
    }
}

impl From<SetupError> for PipelineError {
    fn from(err: SetupError) -> Self {
        PipelineError::Setup(err)
    }
}

impl From<std::io::Error> for PipelineError {
    fn from(err: std::io::Error) -> Self {
        PipelineError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        PipelineError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_scoped_errors() {
        assert!(PipelineError::EncodeConfig("x".into()).is_session_scoped());
        assert!(PipelineError::MidStreamEncode("x".into()).is_session_scoped());
        assert!(!PipelineError::Setup(SetupError::Allocation("x".into())).is_session_scoped());
        assert!(!PipelineError::DeviceUnavailable("x".into()).is_session_scoped());
    }

    #[test]
    fn test_display_includes_program_name() {
        let err = PipelineError::from(SetupError::ShaderCompile {
            program: "convolution".into(),
            message: "bad token".into(),
        });
        let text = err.to_string();
        assert!(text.contains("convolution"));
        assert!(text.contains("bad token"));
    }
}
