//! The built-in default frontend unit: the page side of the wire protocol.

use std::future::Future;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use serde_json::Value;

use gangplank_common::message::{call_handler, CallHandler, CallTable};
use gangplank_common::{protocol, LogLevel, RemoteMessage, Result, SdkError, Unit};

use crate::coordinator::PageCoordinator;

pub(crate) const UNIT_NAME: &str = "gangplank.default-frontend";

pub struct DefaultFrontendUnit {
    coordinator: Weak<PageCoordinator>,
}

impl DefaultFrontendUnit {
    pub(crate) fn new(coordinator: Weak<PageCoordinator>) -> Arc<Self> {
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

fn with_coordinator<F, Fut>(weak: &Weak<PageCoordinator>, f: F) -> CallHandler
where
    F: Fn(Arc<PageCoordinator>, RemoteMessage) -> Fut + Send + Sync + 'static,
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
impl Unit for DefaultFrontendUnit {
    fn name(&self) -> &str {
        UNIT_NAME
    }

    fn calls(&self) -> CallTable {
        let w = &self.coordinator;
        CallTable::new()
            .expose(
                protocol::ON_EVENT,
                with_coordinator(w, |c, m| async move {
                    let event_type = str_arg(&m, 0);
                    let payload = m.args.get(1).cloned().unwrap_or(Value::Null);
                    let dispatched = c.on_event(&event_type, &payload);
                    Ok(Value::from(dispatched))
                }),
            )
            .expose(
                protocol::LOG,
                with_coordinator(w, |_c, m| async move {
                    let level = LogLevel::parse(&str_arg(&m, 0));
                    let message = str_arg(&m, 1);
                    match level {
                        LogLevel::Debug => tracing::debug!(target: "gangplank", "{message}"),
                        LogLevel::Info => tracing::info!(target: "gangplank", "{message}"),
                        LogLevel::Warn => tracing::warn!(target: "gangplank", "{message}"),
                        LogLevel::Error => tracing::error!(target: "gangplank", "{message}"),
                    }
                    Ok(Value::Bool(true))
                }),
            )
    }
}
