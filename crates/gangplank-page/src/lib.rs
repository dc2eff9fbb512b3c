//! Webview-page side of the Gangplank plugin SDK.
//!
//! One [`PageCoordinator`] per page mirrors the host coordinator from the
//! other side of the boundary: it waits for the DOM, initializes the
//! frontend units, performs the readiness handshake
//! (`plugin.onPageInit`), and queues remote calls until the host confirms
//! backend readiness. The browser DOM is an external collaborator reached
//! through the [`dom::PageDom`] trait.

pub mod builtin;
pub mod coordinator;
pub mod dom;
pub mod handlers;

pub use builtin::DefaultFrontendUnit;
pub use coordinator::{PageCoordinator, PageCoordinatorBuilder};
pub use dom::{
    ContextMenuEvent, ContextMenuHook, DomReadyState, MenuItem, OnceHostApi, PageDom, PageHostApi,
};
pub use handlers::{EventHandler, EventHandlerTable, HandlerId};
