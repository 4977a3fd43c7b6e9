//! Signaling backend boundary
//!
//! The consultation backend authorizes sessions: given an appointment and a
//! role-qualified identity it returns a short-lived join token and the room
//! name, or a refusal with a human-readable message. The wire contract is
//! `POST /join {appointmentId, identity} -> {success, token, roomName,
//! message?}`; this module carries the serde DTOs for that exchange and the
//! [`SignalingApi`] trait an application implements over its HTTP stack.
//!
//! A refusal (`success = false`) is a [`ClientError::CredentialRejected`]
//! whose message is surfaced to the user verbatim; the controller never
//! retries it.

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::client::types::{JoinCredential, JoinRequest};
use crate::error::{ClientError, ClientResult};

/// Wire request for the join authorization call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinTokenRequest {
    /// Appointment the consultation belongs to
    pub appointment_id: String,
    /// Role-qualified identity requesting to join
    pub identity: String,
}

impl JoinTokenRequest {
    /// Build the wire request for a join
    pub fn from_join(request: &JoinRequest) -> Self {
        Self {
            appointment_id: request.appointment_id.clone(),
            identity: request.identity(),
        }
    }
}

/// Wire response from the join authorization call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinTokenResponse {
    /// Whether the session was authorized
    pub success: bool,
    /// Join token, present on success
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Room name the token is scoped to, present on success
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_name: Option<String>,
    /// Refusal reason, present on failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl JoinTokenResponse {
    /// Convert the wire response into a usable credential
    ///
    /// Refusals become [`ClientError::CredentialRejected`] with the backend's
    /// message passed through untouched. A success response missing its token
    /// or room name is treated as a malformed credential, not a refusal.
    pub fn into_credential(self) -> ClientResult<JoinCredential> {
        if !self.success {
            let message = self
                .message
                .unwrap_or_else(|| "Session authorization refused".to_string());
            return Err(ClientError::credential_rejected(message));
        }
        let token = self.token.ok_or_else(|| ClientError::IncompleteCredential {
            field: "token".to_string(),
        })?;
        let room_name = self
            .room_name
            .ok_or_else(|| ClientError::IncompleteCredential {
                field: "roomName".to_string(),
            })?;
        Ok(JoinCredential {
            token,
            room_name,
            issued_at: Utc::now(),
        })
    }
}

/// The signaling/credential collaborator
///
/// Implementations perform the actual HTTP call; network failures map to
/// [`ClientError::SignalingUnreachable`].
#[async_trait]
pub trait SignalingApi: Send + Sync {
    /// Request authorization to join the consultation for an appointment
    async fn request_join_token(
        &self,
        request: &JoinTokenRequest,
    ) -> ClientResult<JoinTokenResponse>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::types::ParticipantRole;

    #[test]
    fn test_request_wire_format() {
        let join = JoinRequest::new("apt-42", ParticipantRole::Patient);
        let request = JoinTokenRequest::from_join(&join);
        let json = serde_json::to_string(&request).unwrap();
        assert_eq!(
            json,
            r#"{"appointmentId":"apt-42","identity":"patient-apt-42"}"#
        );
    }

    #[test]
    fn test_success_response_parses() {
        let json = r#"{"success":true,"token":"jwt-abc","roomName":"consult-apt-42"}"#;
        let response: JoinTokenResponse = serde_json::from_str(json).unwrap();
        let credential = response.into_credential().unwrap();
        assert_eq!(credential.token, "jwt-abc");
        assert_eq!(credential.room_name, "consult-apt-42");
    }

    #[test]
    fn test_refusal_surfaces_message_verbatim() {
        let json = r#"{"success":false,"message":"Appointment not found"}"#;
        let response: JoinTokenResponse = serde_json::from_str(json).unwrap();
        let err = response.into_credential().unwrap_err();
        match err {
            ClientError::CredentialRejected { message } => {
                assert_eq!(message, "Appointment not found");
            }
            other => panic!("expected CredentialRejected, got {:?}", other),
        }
    }

    #[test]
    fn test_success_without_token_is_malformed() {
        let response = JoinTokenResponse {
            success: true,
            token: None,
            room_name: Some("consult-apt-42".to_string()),
            message: None,
        };
        let err = response.into_credential().unwrap_err();
        assert!(matches!(err, ClientError::IncompleteCredential { .. }));
        assert!(err.is_credential_error());
    }
}
