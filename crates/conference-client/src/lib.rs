//! Conference Client Core
//!
//! Participant and stream state for a client that keeps two independent
//! media sessions against a conferencing backend:
//!
//! - a **webcam** session carrying the camera (and usually microphone)
//! - a **screen** session carrying the screen share
//!
//! The same person therefore shows up as two connections. The directory
//! merges them into one participant while letting each stream be enabled,
//! enlarged and removed on its own.
//!
//! # Architecture
//!
//! ```text
//! ConferenceClient
//! ├── ActionOrchestrator (user intents: camera, mic, screen, nickname)
//! │   ├── DualSessionCoordinator (webcam + screen sessions, publish, capture)
//! │   │   └── dyn MediaTransport (SDK seam)
//! │   ├── ParticipantDirectory (local + remotes, watch snapshots)
//! │   └── SttSubscriptionManager (transcription subscriptions, retry task)
//! └── SessionEvents (TransportEvent loop -> directory / coordinator)
//! ```
//!
//! # Key Design Decisions
//!
//! - **Single writer**: the directory owns participants behind one lock and
//!   publishes immutable snapshots; consumers never hold references
//! - **Fresh screen publisher**: every screen share creates a new publisher
//! - **Single live audio**: camera and screen never both carry live audio
//! - **Non-fatal publish**: missing capability is reported, not raised
//!
//! # Modules
//!
//! - [`client`] - Wiring and lifecycle
//! - [`config`] - Configuration from environment
//! - [`errors`] - Error types
//! - [`transport`] - Media transport trait and value types

pub mod client;
pub mod config;
pub mod coordinator;
pub mod directory;
pub mod errors;
pub mod events;
pub mod metadata;
pub mod observability;
pub mod orchestrator;
pub mod participant;
pub mod snapshot;
pub mod stt;
pub mod transport;

pub use client::{event_channel, ConferenceClient};
pub use config::Config;
pub use errors::ClientError;
pub use orchestrator::{ActionOrchestrator, JoinRequest};
