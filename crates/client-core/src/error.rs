//! Error types and handling for the client-core library
//!
//! This module defines all error types that can occur while coordinating a
//! consultation session and provides guidance on how to handle them.
//!
//! # Error Categories
//!
//! Errors are categorized to help with recovery strategies:
//!
//! - **Credential Errors** - The signaling backend refused the session; fatal,
//!   surface the backend's message to the user
//! - **Transport Errors** - Problems joining or keeping the media session
//!   alive; usually recoverable with retry or reconnection
//! - **Capture Errors** - Camera/microphone acquisition problems; the session
//!   degrades rather than failing, unless no usable media remains
//! - **Binding Errors** - A track could not be attached to its rendering
//!   surface; retried with bounded attempts, then reported as a warning
//! - **State Errors** - Invalid operation for the current session state
//!
//! # Error Handling Guide
//!
//! Only a small set of errors should end the call: a rejected credential, an
//! exhausted transport join, an exhausted reconnection, and a join with no
//! usable media. Everything else is absorbed and retried internally.
//!
//! ```rust
//! use medilink_client_core::ClientError;
//!
//! let err = ClientError::credential_rejected("Appointment not found");
//! assert!(!err.is_recoverable());
//! assert!(err.is_fatal_to_session());
//! // The backend's message is surfaced verbatim to the user.
//! assert_eq!(err.user_friendly_message(), "Appointment not found");
//! ```

use crate::client::types::{ConnectionState, TrackKind};

/// Result type for client operations
pub type ClientResult<T> = std::result::Result<T, ClientError>;

/// Errors that can occur during session coordination
#[derive(thiserror::Error, Debug, Clone)]
pub enum ClientError {
    /// Credential and signaling errors
    #[error("Credential rejected: {message}")]
    CredentialRejected { message: String },

    #[error("Signaling backend unreachable: {reason}")]
    SignalingUnreachable { reason: String },

    #[error("Signaling response missing field: {field}")]
    IncompleteCredential { field: String },

    /// Transport errors
    #[error("Transport join failed: {reason}")]
    TransportJoin { reason: String },

    #[error("Transport failed: {reason}")]
    TransportFailed { reason: String },

    #[error("Transport degraded: connectivity is {state}")]
    TransportDegraded { state: String },

    #[error("Reconnection window of {seconds}s elapsed without resumption")]
    ReconnectTimeout { seconds: u64 },

    /// Capture errors
    #[error("Capture permission denied for {kind}")]
    CaptureDenied { kind: TrackKind },

    #[error("No capture device available for {kind}")]
    CaptureUnavailable { kind: TrackKind },

    #[error("Capture constraints unsatisfiable for {kind}")]
    ConstraintsUnsatisfiable { kind: TrackKind },

    #[error("No usable media: neither camera nor microphone could be acquired")]
    NoUsableMedia,

    #[error("Constraint application failed for {kind}: {reason}")]
    ConstraintApply { kind: TrackKind, reason: String },

    /// Binding errors
    #[error("No ready sink for slot {slot}")]
    SinkNotReady { slot: String },

    #[error("Failed to bind track {track_id} after {attempts} attempts")]
    BindFailed { track_id: String, attempts: u32 },

    /// Session state errors
    #[error("Invalid session state for {operation}: current state is {current:?}")]
    InvalidSessionState {
        operation: String,
        current: ConnectionState,
    },

    #[error("No active session")]
    NoActiveSession,

    #[error("Participant not found: {identity}")]
    ParticipantNotFound { identity: String },

    #[error("Track not found: {track_id}")]
    TrackNotFound { track_id: String },

    #[error("Local track not found for {kind}")]
    LocalTrackNotFound { kind: TrackKind },

    /// Configuration errors
    #[error("Invalid configuration: {field} - {reason}")]
    InvalidConfiguration { field: String, reason: String },

    /// Generic errors
    #[error("Internal error: {message}")]
    InternalError { message: String },

    #[error("Operation timeout after {duration_ms}ms")]
    OperationTimeout { duration_ms: u64 },
}

impl ClientError {
    /// Create a credential rejection carrying the backend's message verbatim
    pub fn credential_rejected(message: impl Into<String>) -> Self {
        Self::CredentialRejected {
            message: message.into(),
        }
    }

    /// Create a signaling unreachable error
    pub fn signaling_unreachable(reason: impl Into<String>) -> Self {
        Self::SignalingUnreachable {
            reason: reason.into(),
        }
    }

    /// Create a transport join error
    pub fn transport_join(reason: impl Into<String>) -> Self {
        Self::TransportJoin {
            reason: reason.into(),
        }
    }

    /// Create a transport failure error
    pub fn transport_failed(reason: impl Into<String>) -> Self {
        Self::TransportFailed {
            reason: reason.into(),
        }
    }

    /// Create a constraint application error
    pub fn constraint_apply(kind: TrackKind, reason: impl Into<String>) -> Self {
        Self::ConstraintApply {
            kind,
            reason: reason.into(),
        }
    }

    /// Create a bind failure error
    pub fn bind_failed(track_id: impl Into<String>, attempts: u32) -> Self {
        Self::BindFailed {
            track_id: track_id.into(),
            attempts,
        }
    }

    /// Create a sink-not-ready error for the given slot
    pub fn sink_not_ready(slot: impl Into<String>) -> Self {
        Self::SinkNotReady { slot: slot.into() }
    }

    /// Create an invalid state error
    pub fn invalid_state(operation: impl Into<String>, current: ConnectionState) -> Self {
        Self::InvalidSessionState {
            operation: operation.into(),
            current,
        }
    }

    /// Create an internal error
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::InternalError {
            message: message.into(),
        }
    }

    /// Check if this error is recoverable by retrying the operation
    ///
    /// Used by the retry combinator to decide whether another attempt makes
    /// sense. Permission and authorization problems never recover on retry.
    pub fn is_recoverable(&self) -> bool {
        match self {
            // Recoverable errors
            ClientError::SignalingUnreachable { .. }
            | ClientError::TransportJoin { .. }
            | ClientError::TransportFailed { .. }
            | ClientError::TransportDegraded { .. }
            | ClientError::SinkNotReady { .. }
            | ClientError::OperationTimeout { .. } => true,

            // Non-recoverable errors
            ClientError::CredentialRejected { .. }
            | ClientError::IncompleteCredential { .. }
            | ClientError::CaptureDenied { .. }
            | ClientError::CaptureUnavailable { .. }
            | ClientError::ConstraintsUnsatisfiable { .. }
            | ClientError::NoUsableMedia
            | ClientError::InvalidConfiguration { .. } => false,

            // Context-dependent errors
            _ => false,
        }
    }

    /// Check if this error is a credential/authorization problem
    pub fn is_credential_error(&self) -> bool {
        matches!(
            self,
            ClientError::CredentialRejected { .. } | ClientError::IncompleteCredential { .. }
        )
    }

    /// Check if this error ends the call from the user's point of view
    ///
    /// Everything outside this set is absorbed and retried internally.
    pub fn is_fatal_to_session(&self) -> bool {
        matches!(
            self,
            ClientError::CredentialRejected { .. }
                | ClientError::IncompleteCredential { .. }
                | ClientError::TransportJoin { .. }
                | ClientError::ReconnectTimeout { .. }
                | ClientError::NoUsableMedia
        )
    }

    /// Get the error category for logging and metrics
    pub fn category(&self) -> &'static str {
        match self {
            ClientError::CredentialRejected { .. }
            | ClientError::SignalingUnreachable { .. }
            | ClientError::IncompleteCredential { .. } => "signaling",

            ClientError::TransportJoin { .. }
            | ClientError::TransportFailed { .. }
            | ClientError::TransportDegraded { .. }
            | ClientError::ReconnectTimeout { .. } => "transport",

            ClientError::CaptureDenied { .. }
            | ClientError::CaptureUnavailable { .. }
            | ClientError::ConstraintsUnsatisfiable { .. }
            | ClientError::NoUsableMedia
            | ClientError::ConstraintApply { .. } => "capture",

            ClientError::SinkNotReady { .. } | ClientError::BindFailed { .. } => "binding",

            ClientError::InvalidSessionState { .. }
            | ClientError::NoActiveSession
            | ClientError::ParticipantNotFound { .. }
            | ClientError::TrackNotFound { .. }
            | ClientError::LocalTrackNotFound { .. } => "session",

            ClientError::InvalidConfiguration { .. } => "configuration",

            ClientError::InternalError { .. } | ClientError::OperationTimeout { .. } => "internal",
        }
    }

    /// Get a user-friendly message suitable for the call screen
    ///
    /// Credential rejections carry the backend's message through verbatim;
    /// everything else maps to a short, non-technical sentence.
    pub fn user_friendly_message(&self) -> String {
        match self {
            ClientError::CredentialRejected { message } => message.clone(),
            ClientError::IncompleteCredential { .. } => {
                "The consultation could not be authorized. Please try again.".to_string()
            }
            ClientError::SignalingUnreachable { .. } => {
                "Could not reach the consultation service. Please check your connection.".to_string()
            }
            ClientError::TransportJoin { .. } | ClientError::TransportFailed { .. } => {
                "Could not connect to the consultation. Please check your network and try again."
                    .to_string()
            }
            ClientError::TransportDegraded { .. } | ClientError::ReconnectTimeout { .. } => {
                "The connection was lost and could not be restored.".to_string()
            }
            ClientError::CaptureDenied { kind } => {
                format!("Permission to use your {} was denied.", kind.device_name())
            }
            ClientError::CaptureUnavailable { kind } => {
                format!("No {} could be found on this device.", kind.device_name())
            }
            ClientError::NoUsableMedia => {
                "No camera or microphone is available. Please check your devices and permissions."
                    .to_string()
            }
            ClientError::BindFailed { .. } | ClientError::SinkNotReady { .. } => {
                "Video is temporarily unavailable.".to_string()
            }
            _ => "An unexpected error occurred.".to_string(),
        }
    }
}
