//! Wire-level function ids for the built-in operations of both sides.
//!
//! Host-addressed built-ins are bare dotted ids; the single page-addressed
//! built-in is [`ON_EVENT`], which every container's page exposes.

/// Page → host: the page finished initializing its unit set. The host
/// replies with the boolean outcome of its own unit initialization; this
/// exchange is the readiness handshake.
pub const ON_PAGE_INIT: &str = "plugin.onPageInit";

pub const LOG: &str = "plugin.log";
pub const SUBSCRIBE_EVENT: &str = "plugin.subscribeEvent";
pub const UNSUBSCRIBE_EVENT: &str = "plugin.unsubscribeEvent";
pub const UNSUBSCRIBE_ALL_EVENTS: &str = "plugin.unsubscribeAllEvents";
pub const FIRE_EVENT: &str = "plugin.fireEvent";
pub const CREATE_WEBVIEW_PANEL: &str = "plugin.createWebviewPanel";
pub const CREATE_WEBVIEW_VIEW_DIALOG: &str = "plugin.createWebviewViewDialog";
pub const DISPOSE_WEBVIEW_CONTAINER: &str = "plugin.disposeWebviewContainer";
pub const GET_EXTENSION_PATH: &str = "plugin.getExtensionPath";
pub const PACKAGE_JSON: &str = "plugin.packageJson";

/// Host → page: deliver one relayed or fired event.
pub const ON_EVENT: &str = "plugin.onEvent";

/// Sender identity the extension host uses on its envelopes.
pub const HOST_SENDER: &str = "host";
