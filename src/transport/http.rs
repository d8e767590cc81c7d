//! JSON over HTTP: `POST <path>` with the request envelope as the body.
//!
//! | outcome                              | status |
//! |--------------------------------------|--------|
//! | `{"data": ..}`                       | 200    |
//! | `{"error": ..}` from the handler     | 400    |
//! | body could not be read               | 500    |
//! | any method other than `POST`         | 405    |

pub mod client;
pub mod server;

pub use client::HttpTransport;
pub use server::{router, router_with_limit, start_server, HttpServerConfig};

pub const DEFAULT_PATH: &str = "/rpc";
pub const DEFAULT_MAX_BODY_BYTES: usize = 2 * 1024 * 1024;
