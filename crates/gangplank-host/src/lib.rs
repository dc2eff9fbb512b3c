//! Extension-host side of the Gangplank plugin SDK.
//!
//! One [`HostCoordinator`] per extension-host process owns the backend
//! units, the webview containers, and the readiness handshake with the
//! page side:
//! - Units are registered once, `init` concurrently, `run` sequentially
//!   only after the page reports its own units initialized.
//! - Each [`WebviewContainer`] wraps one host-IDE webview surface, renders
//!   its HTML, and queues outbound calls until that page's initialization
//!   signal resolves.
//! - Host-IDE events reach the page through the subscription-gated
//!   `gangplank-relay`.
//!
//! The host IDE itself — webview panels, output channels, the extension
//! context — is an external collaborator reached through the traits in
//! [`context`].

pub mod builtin;
pub mod container;
pub mod context;
pub mod coordinator;
pub mod html;

pub use builtin::DefaultBackendUnit;
pub use container::WebviewContainer;
pub use context::{HostContext, OutputSink, TemplateKind, WebviewOptions, WebviewSurface};
pub use coordinator::{HostCoordinator, HostCoordinatorBuilder};
pub use html::{TemplateEngine, TemplateRegistry};
