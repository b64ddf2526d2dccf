//! `kora-core` — shared foundation for the Kora assistant daemon.
//!
//! Holds the pieces every other crate needs: the figment-based boot
//! configuration, the mutable runtime override store, the error taxonomy,
//! and the transport-facing types (inbound messages, media, the `Transport`
//! trait that channel adapters implement).

pub mod config;
pub mod error;
pub mod runtime;
pub mod types;

pub use config::KoraConfig;
pub use error::{ErrorKind, KoraError};
pub use runtime::RuntimeStore;
pub use types::{
    ChatId, DomainId, InboundMessage, MediaItem, MediaKind, RouteDecision, Transport, UserId,
};
