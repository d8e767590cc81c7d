//! Typed remote procedure calls over pluggable transports.
//!
//! A [`Handler`] owns an [`EndpointMap`] of named async functions and turns a
//! [`Request`] envelope into a [`Response`] envelope without ever failing. A
//! [`Client`] builds requests, sends them through a [`Transport`] and turns
//! responses back into Rust values. Values beyond plain JSON (dates,
//! non-finite floats) survive the wire through the [`Serializer`] both ends
//! share.
//!
//! ```
//! use rpcwire::{Client, EndpointMap, Handler};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let endpoints = EndpointMap::new()
//!     .with("ping", || async { anyhow::Ok("pong") })
//!     .with("add", |a: i64, b: i64| async move { anyhow::Ok(a + b) });
//!
//! // a Handler is itself an in-process transport
//! let client = Client::new(Handler::new(endpoints));
//! let pong: String = client.call("ping", ()).await.unwrap();
//! let sum: i64 = client.call("add", (5, 3)).await.unwrap();
//! assert_eq!((pong.as_str(), sum), ("pong", 8));
//! # }
//! ```

mod macros;

pub mod client;
pub mod endpoint;
pub mod envelope;
pub mod handler;
pub mod serializer;
pub mod transport;
pub mod types;

pub use client::{Client, ClientConfig, ClientError, IntoParams};
pub use endpoint::{EndpointMap, IntoEndpoint};
pub use envelope::{ErrorCode, ErrorObject, Request, Response};
pub use futures::future::BoxFuture;
pub use handler::Handler;
pub use serializer::{Passthrough, Serializer, TaggedJson};
pub use transport::{Transport, TransportError};
pub use types::{Decode, Encode, Json, Type, Value, ValueError};
