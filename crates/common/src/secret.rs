//! Secret types for protecting session tokens from accidental logging.
//!
//! Re-exports the [`secrecy`] types. The webcam and screen session tokens are
//! opaque credentials handed to the client by the application server; they
//! are held as [`SecretString`] so that any `Debug` output or `tracing` field
//! that captures a session slot shows `[REDACTED]` instead of the token.
//!
//! # Example
//!
//! ```rust
//! use common::secret::{ExposeSecret, SecretString};
//!
//! #[derive(Debug)]
//! struct SessionSlot {
//!     kind: &'static str,
//!     token: Option<SecretString>,
//! }
//!
//! let slot = SessionSlot {
//!     kind: "webcam",
//!     token: Some(SecretString::from("wss://media?sessionId=s1&token=tok_abc")),
//! };
//!
//! // Debug output hides the token
//! assert!(!format!("{slot:?}").contains("tok_abc"));
//!
//! // The transport receives the value through an explicit call
//! let raw: &str = slot.token.as_ref().map(|t| t.expose_secret()).unwrap_or_default();
//! assert!(raw.ends_with("tok_abc"));
//! ```

pub use secrecy::{ExposeSecret, SecretBox, SecretString};

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[test]
    fn test_debug_is_redacted() {
        let secret = SecretString::from("tok_hunter2");
        let debug_str = format!("{secret:?}");

        assert!(debug_str.contains("REDACTED"));
        assert!(!debug_str.contains("tok_hunter2"));
    }

    #[test]
    fn test_expose_secret_returns_inner_value() {
        let secret = SecretString::from("tok_password123");
        assert_eq!(secret.expose_secret(), "tok_password123");
    }

    #[test]
    fn test_session_tokens_are_redacted_in_structs() {
        #[allow(dead_code)]
        #[derive(Debug)]
        struct Tokens {
            session_id: String,
            webcam: SecretString,
            screen: SecretString,
        }

        let tokens = Tokens {
            session_id: "daily-standup".to_string(),
            webcam: SecretString::from("tok_webcam_123"),
            screen: SecretString::from("tok_screen_456"),
        };

        let debug_str = format!("{tokens:?}");

        assert!(debug_str.contains("daily-standup"));
        assert!(debug_str.contains("REDACTED"));
        assert!(!debug_str.contains("tok_webcam_123"));
        assert!(!debug_str.contains("tok_screen_456"));
    }

    #[test]
    fn test_deserialize_token_payload() {
        #[allow(dead_code)]
        #[derive(Debug, Deserialize)]
        struct TokenResponse {
            session_id: String,
            token: SecretString,
        }

        let json = r#"{"session_id": "s1", "token": "tok_from_server"}"#;
        let resp: TokenResponse = serde_json::from_str(json).expect("deserialize");

        assert_eq!(resp.token.expose_secret(), "tok_from_server");

        let debug = format!("{resp:?}");
        assert!(!debug.contains("tok_from_server"));
        assert!(debug.contains("REDACTED"));
    }

    #[test]
    fn test_clone_works() {
        let secret = SecretString::from("cloneable");
        let cloned = secret.clone();
        assert_eq!(cloned.expose_secret(), "cloneable");
    }
}
