//! In-process transport over named channels.
//!
//! An [`IpcBus`] routes `invoke(channel, payload)` calls to whatever function
//! was registered for that channel with [`IpcBus::handle`], much like a main
//! process and its renderers talk over an IPC bridge. Payloads stay
//! structured [`Value`]s, so no text framing happens.

use crate::{
    envelope::{Request, Response},
    handler::Handler,
    transport::{Transport, TransportError},
    types::Value,
};
use futures::future::BoxFuture;
use std::{
    collections::HashMap,
    fmt,
    future::Future,
    sync::{Arc, PoisonError, RwLock},
};
use tokio::{
    runtime::Handle,
    sync::{mpsc, oneshot},
};
use tracing::debug;

/// The channel the RPC handler is registered on.
pub const RPC_CHANNEL: &str = "rpc:call";

struct Invocation {
    payload: Value,
    reply: oneshot::Sender<Value>,
}

#[derive(Clone, Default)]
pub struct IpcBus {
    channels: Arc<RwLock<HashMap<String, mpsc::UnboundedSender<Invocation>>>>,
}

impl IpcBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `f` for `channel`, replacing any previous registration.
    ///
    /// Every invocation runs in its own task on the current tokio runtime, so
    /// slow calls do not hold up the others. Fails with
    /// [`TransportError::NoRuntime`] outside a runtime.
    pub fn handle<F, Fut>(&self, channel: impl Into<String>, f: F) -> Result<(), TransportError>
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Value> + Send + 'static,
    {
        let runtime = Handle::try_current().map_err(|_| TransportError::NoRuntime)?;
        let channel = channel.into();
        let (tx, mut rx) = mpsc::unbounded_channel::<Invocation>();
        let f = Arc::new(f);

        let name = channel.clone();
        runtime.spawn(async move {
            while let Some(Invocation { payload, reply }) = rx.recv().await {
                let f = f.clone();
                tokio::spawn(async move {
                    // the caller may have timed out and gone away
                    _ = reply.send(f(payload).await);
                });
            }
            debug!(channel = %name, "ipc channel closed");
        });

        self.channels
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(channel, tx);
        Ok(())
    }

    /// Unregisters `channel`. Invocations already in flight still complete.
    pub fn remove_handler(&self, channel: &str) -> bool {
        self.channels
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(channel)
            .is_some()
    }

    pub async fn invoke(&self, channel: &str, payload: Value) -> Result<Value, TransportError> {
        let sender = self
            .channels
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(channel)
            .cloned()
            .ok_or_else(|| TransportError::ChannelNotFound(channel.to_owned()))?;

        let (reply, response) = oneshot::channel();
        sender
            .send(Invocation { payload, reply })
            .map_err(|_| TransportError::Closed(channel.to_owned()))?;
        response
            .await
            .map_err(|_| TransportError::Closed(channel.to_owned()))
    }
}

impl fmt::Debug for IpcBus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let channels = self.channels.read().unwrap_or_else(PoisonError::into_inner);
        f.debug_set().entries(channels.keys()).finish()
    }
}

/// Serves `handler` on [`RPC_CHANNEL`].
pub fn register(bus: &IpcBus, handler: Handler) -> Result<(), TransportError> {
    bus.handle(RPC_CHANNEL, move |payload| {
        let handler = handler.clone();
        async move { handler.handle_value(payload).await.into_value() }
    })
}

/// Client side of the IPC adapter.
#[derive(Debug, Clone)]
pub struct IpcTransport {
    bus: IpcBus,
    channel: String,
}

impl IpcTransport {
    pub fn new(bus: IpcBus) -> Self {
        Self::with_channel(bus, RPC_CHANNEL)
    }

    pub fn with_channel(bus: IpcBus, channel: impl Into<String>) -> Self {
        Self {
            bus,
            channel: channel.into(),
        }
    }
}

impl Transport for IpcTransport {
    fn send(&self, request: Request) -> BoxFuture<'_, Result<Response, TransportError>> {
        Box::pin(async move {
            let reply = self.bus.invoke(&self.channel, request.into_value()).await?;
            Response::from_value(reply).ok_or_else(|| {
                TransportError::InvalidResponse("reply is not a response envelope".to_owned())
            })
        })
    }
}
