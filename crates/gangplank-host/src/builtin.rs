//! The built-in default backend unit.
//!
//! Every coordinator appends one of these after the author-supplied units.
//! Its call table is the host side of the wire protocol: the readiness
//! handshake, logging, event subscription, container management, and the
//! manifest/path accessors. Registration is an explicit table — nothing is
//! discovered by reflection.

use std::future::Future;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use serde_json::Value;

use gangplank_common::message::{call_handler, CallHandler, CallTable};
use gangplank_common::{protocol, LogLevel, RemoteMessage, Result, SdkError, Unit};

use crate::context::WebviewOptions;
use crate::coordinator::HostCoordinator;

pub(crate) const UNIT_NAME: &str = "gangplank.default-backend";

pub struct DefaultBackendUnit {
    coordinator: Weak<HostCoordinator>,
}

impl DefaultBackendUnit {
    pub(crate) fn new(coordinator: Weak<HostCoordinator>) -> Arc<Self> {
        Arc::new(Self { coordinator })
    }
}

fn str_arg(message: &RemoteMessage, index: usize) -> String {
    message
        .args
        .get(index)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Bind a handler to the coordinator through a weak reference; calls after
/// the coordinator is gone fail with `Stopped`.
fn with_coordinator<F, Fut>(weak: &Weak<HostCoordinator>, f: F) -> CallHandler
where
    F: Fn(Arc<HostCoordinator>, RemoteMessage) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    let weak = weak.clone();
    call_handler(move |message| {
        let pending = weak.upgrade().map(|coordinator| f(coordinator, message));
        async move {
            match pending {
                Some(fut) => fut.await,
                None => Err(SdkError::Stopped),
            }
        }
    })
}

#[async_trait]
impl Unit for DefaultBackendUnit {
    fn name(&self) -> &str {
        UNIT_NAME
    }

    fn calls(&self) -> CallTable {
        let w = &self.coordinator;
        CallTable::new()
            .expose(
                protocol::ON_PAGE_INIT,
                with_coordinator(w, |c, m| async move {
                    // The ack waits for this side's own init phase, so the
                    // page never observes "ready" before every backend
                    // unit initialized.
                    let ok = c.init_done.wait().await;
                    match c.container(&m.from) {
                        Some(container) => {
                            container.page_ready().resolve(true);
                        }
                        None => {
                            tracing::warn!(from = %m.from, "page init from unknown container");
                        }
                    }
                    c.page_init.resolve(true);
                    Ok(Value::Bool(ok))
                }),
            )
            .expose(
                protocol::LOG,
                with_coordinator(w, |c, m| async move {
                    let level = LogLevel::parse(&str_arg(&m, 0));
                    c.log(level, &str_arg(&m, 1));
                    Ok(Value::Bool(true))
                }),
            )
            .expose(
                protocol::SUBSCRIBE_EVENT,
                with_coordinator(w, |c, m| async move {
                    Ok(Value::Bool(c.relay().subscribe(&str_arg(&m, 0))))
                }),
            )
            .expose(
                protocol::UNSUBSCRIBE_EVENT,
                with_coordinator(w, |c, m| async move {
                    c.relay().unsubscribe(&str_arg(&m, 0));
                    Ok(Value::Bool(true))
                }),
            )
            .expose(
                protocol::UNSUBSCRIBE_ALL_EVENTS,
                with_coordinator(w, |c, _m| async move {
                    c.relay().unsubscribe_all();
                    Ok(Value::Bool(true))
                }),
            )
            .expose(
                protocol::FIRE_EVENT,
                with_coordinator(w, |c, m| async move {
                    let event_type = str_arg(&m, 0);
                    let payload = m.args.get(1).cloned().unwrap_or(Value::Null);
                    c.broadcast_event(&event_type, &payload).await;
                    Ok(Value::Bool(true))
                }),
            )
            .expose(
                protocol::CREATE_WEBVIEW_PANEL,
                with_coordinator(w, |c, m| async move {
                    let options: WebviewOptions =
                        serde_json::from_value(m.args.first().cloned().unwrap_or(Value::Null))?;
                    let override_existing =
                        m.args.get(1).and_then(Value::as_bool).unwrap_or(false);
                    c.create_webview_panel(options, override_existing)?;
                    Ok(Value::Bool(true))
                }),
            )
            .expose(
                protocol::CREATE_WEBVIEW_VIEW_DIALOG,
                with_coordinator(w, |c, m| async move {
                    let mut options: WebviewOptions =
                        serde_json::from_value(m.args.first().cloned().unwrap_or(Value::Null))?;
                    options.target_area = "dialog".to_string();
                    c.create_webview_panel(options, false)?;
                    Ok(Value::Bool(true))
                }),
            )
            .expose(
                protocol::DISPOSE_WEBVIEW_CONTAINER,
                with_coordinator(w, |c, m| async move {
                    let view_type = str_arg(&m, 0);
                    c.dispose(Some(&view_type))?;
                    Ok(Value::Bool(true))
                }),
            )
            .expose(
                protocol::GET_EXTENSION_PATH,
                with_coordinator(w, |c, _m| async move {
                    Ok(Value::String(
                        c.extension_path().to_string_lossy().into_owned(),
                    ))
                }),
            )
            .expose(
                protocol::PACKAGE_JSON,
                with_coordinator(w, |c, _m| async move { Ok(c.manifest().clone()) }),
            )
    }
}
