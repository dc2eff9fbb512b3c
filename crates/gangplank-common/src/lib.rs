//! Shared lifecycle and protocol types for the Gangplank plugin SDK.
//!
//! Both sides of a plugin — the webview page (`gangplank-page`) and the
//! extension host (`gangplank-host`) — build on the types here:
//! - The [`Unit`] lifecycle contract (`init` / `run` / `stop`) and the
//!   [`UnitRegistry`] that drives it.
//! - [`ReadinessSignal`], the one-shot latch behind every readiness
//!   handshake step.
//! - The remote-call envelope ([`RemoteMessage`]), target addressing
//!   ([`CallTarget`]), and explicit dispatch tables ([`CallTable`],
//!   [`CallRouter`]).
//! - The transport seam ([`MessageTransport`], [`Messaging`]) and the
//!   in-process [`LocalTransport`].
//! - Localization ([`L10nTable`]) and log levels ([`LogLevel`]).

pub mod errors;
pub mod l10n;
pub mod lifecycle;
pub mod loglevel;
pub mod message;
pub mod protocol;
pub mod readiness;
pub mod transport;

pub use errors::SdkError;
pub use l10n::L10nTable;
pub use lifecycle::{Unit, UnitRegistry};
pub use loglevel::LogLevel;
pub use message::{
    call_handler, new_correlation_id, CallArgs, CallHandler, CallRouter, CallTable, CallTarget,
    HostApiRegistry, RemoteMessage, HOST_API_PREFIX,
};
pub use readiness::ReadinessSignal;
pub use transport::{CallQueue, LocalTransport, MessageEndpoint, MessageTransport, Messaging};

pub type Result<T> = std::result::Result<T, SdkError>;
