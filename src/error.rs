// MIT License - Copyright (c) 2026 Peter Wright

use crate::constants::panel_error_description;

/// Hex rendering used in diagnostics for raw panel bytes.
pub fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// All errors surfaced by the client.
#[derive(Debug, thiserror::Error)]
pub enum AceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Connection timeout")]
    ConnectionTimeout,

    #[error("No response for {op} within {timeout_ms} ms")]
    CommandTimeout { op: String, timeout_ms: u64 },

    #[error("Socket disconnected")]
    Disconnected,

    #[error("Operation aborted")]
    Aborted,

    #[error("Response channel closed")]
    ChannelClosed,

    #[error("Invalid frame: {reason}")]
    InvalidFrame { reason: String },

    #[error("Protocol error: {details}")]
    Protocol { details: String },

    /// A response with the error header. The error bytes are surfaced
    /// verbatim alongside the hex of the whole decrypted reply.
    #[error("Panel error {}{} (response {response_hex})", to_hex(.code), describe_code(.code))]
    Panel {
        code: Vec<u8>,
        response_hex: String,
    },

    #[error("Session key exchange failed: {details}")]
    KeyExchangeFailed { details: String },

    #[error("Login rejected (status {status:#04x})")]
    LoginRejected { status: u8 },

    #[error("Arming blocked by {} zone(s) in fault: {zones:?}", .zones.len())]
    ArmFaults { zones: Vec<u16> },

    #[error("Arming blocked by {} active zone(s): {zones:?}", .zones.len())]
    ArmActiveZones { zones: Vec<u16> },

    #[error("Arming blocked by {} inhibited zone(s): {zones:?}", .zones.len())]
    ArmInhibited { zones: Vec<u16> },

    #[error("Force arm failed (state {state:#06x})")]
    ForceArmFailed { state: u16 },

    #[error("Arming did not complete in time")]
    ArmTimeout,

    #[error("{op} rejected by the panel")]
    ControlRejected { op: &'static str },

    #[error("Invalid {kind} id {id} (known: {max})")]
    InvalidObjectId {
        kind: &'static str,
        id: u16,
        max: u16,
    },
}

fn describe_code(code: &[u8]) -> String {
    code.first()
        .and_then(|&c| panel_error_description(c))
        .map(|d| format!(" ({})", d))
        .unwrap_or_default()
}

impl AceError {
    /// Whether the connection should be retried after this error.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AceError::Io(_)
                | AceError::ConnectionTimeout
                | AceError::CommandTimeout { .. }
                | AceError::Disconnected
                | AceError::ChannelClosed
                | AceError::InvalidFrame { .. }
        )
    }

    /// Build a panel error from the decrypted reply (header included).
    pub fn panel(plaintext: &[u8]) -> Self {
        AceError::Panel {
            code: plaintext.get(1..).unwrap_or_default().to_vec(),
            response_hex: to_hex(plaintext),
        }
    }
}

pub type Result<T> = std::result::Result<T, AceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panel_error_carries_code_and_hex() {
        let err = AceError::panel(&[0xF0, 0x02, 0x10]);
        match &err {
            AceError::Panel { code, response_hex } => {
                assert_eq!(code, &vec![0x02, 0x10]);
                assert_eq!(response_hex, "f00210");
            }
            other => panic!("unexpected error {other:?}"),
        }
        let msg = err.to_string();
        assert!(msg.contains("0210"));
        assert!(msg.contains("Not authorized"));
    }

    #[test]
    fn test_panel_error_unknown_code() {
        let err = AceError::panel(&[0xF0, 0xEE]);
        assert!(err.to_string().contains("ee"));
    }

    #[test]
    fn test_retryable_classification() {
        assert!(AceError::Disconnected.is_retryable());
        assert!(AceError::CommandTimeout {
            op: "ping".into(),
            timeout_ms: 5000
        }
        .is_retryable());
        assert!(!AceError::LoginRejected { status: 1 }.is_retryable());
        assert!(!AceError::ArmTimeout.is_retryable());
    }

    #[test]
    fn test_to_hex() {
        assert_eq!(to_hex(&[0xA0, 0x00, 0x00]), "a00000");
        assert_eq!(to_hex(&[]), "");
    }
}
