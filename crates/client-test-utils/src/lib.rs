//! # Conference Client Test Utilities
//!
//! Mock transport and fixtures for exercising the conference client without
//! a media SDK.
//!
//! ## Modules
//!
//! - `mock_transport` - In-memory [`MediaTransport`] that records every call
//! - `fixtures` - Identities, join requests and transport events
//! - `harness` - Components wired around a mock transport
//!
//! ## Usage
//!
//! ```rust,ignore
//! use client_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let transport = MockTransport::builder()
//!         .deny_publish(SessionKind::Screen)
//!         .build();
//!
//!     let coordinator = DualSessionCoordinator::new(
//!         Arc::new(transport.clone()),
//!         test_context(),
//!     );
//!
//!     // Run your test, then inspect transport.calls()
//! }
//! ```
//!
//! [`MediaTransport`]: conference_client::transport::MediaTransport

pub mod fixtures;
pub mod harness;
pub mod mock_transport;

pub use fixtures::*;
pub use harness::ClientHarness;
pub use mock_transport::{MockTransport, MockTransportBuilder, TransportCall};
