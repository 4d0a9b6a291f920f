#![doc = include_str!("../README.md")]

pub mod api;
pub mod archive;
pub mod clock;
pub mod config;
pub mod consumer;
pub mod email;
pub mod envelope;
pub mod publisher;
pub mod secret;
pub mod shutdown;
pub mod telemetry;
pub mod transport;
pub mod validation;

#[doc(inline)]
pub use envelope::Envelope;

#[doc(inline)]
pub use email::{CorrelationId, Email, EmailData, QueuedMessage};

#[doc(inline)]
pub use transport::{Transport, TransportError, TransportErrorKind};

#[doc(inline)]
pub use validation::{AuthError, ValidationError, Validator};

#[doc(inline)]
pub use publisher::Publisher;

#[doc(inline)]
pub use archive::{ArchiveError, Archiver, StorageKey};

#[doc(inline)]
pub use consumer::{
    ConsumerHook, DefaultConsumerHook, Poller, PollerConfig, ProcessError, Processor,
};

#[doc(inline)]
pub use config::{Config, ConfigError};
