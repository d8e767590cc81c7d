pub mod http;
pub mod ipc;

use crate::{
    envelope::{Request, Response},
    handler::Handler,
};
use futures::future::BoxFuture;
use std::sync::Arc;
use thiserror::Error;

/// Carries one [`Request`] to a [`Handler`] somewhere and brings back its
/// [`Response`].
///
/// Dropping the returned future abandons the call; that is how the client
/// enforces its timeout.
pub trait Transport: Send + Sync {
    fn send(&self, request: Request) -> BoxFuture<'_, Result<Response, TransportError>>;
}

/// Direct in-process loopback, no marshaling at all.
impl Transport for Handler {
    fn send(&self, request: Request) -> BoxFuture<'_, Result<Response, TransportError>> {
        Box::pin(async move { Ok(self.handle_request(request).await) })
    }
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn send(&self, request: Request) -> BoxFuture<'_, Result<Response, TransportError>> {
        (**self).send(request)
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("RPC call failed: {reason}")]
    Status { status: u16, reason: String },

    #[error("RPC call failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("no handler registered for channel '{0}'")]
    ChannelNotFound(String),

    #[error("channel '{0}' closed before replying")]
    Closed(String),

    #[error("IPC handlers must be registered inside a tokio runtime")]
    NoRuntime,
}
