use crate::{
    envelope::{Request, Response},
    transport::{Transport, TransportError},
};
use futures::future::BoxFuture;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

/// Client side of the HTTP adapter.
///
/// A failed status whose body is an error envelope comes back as that
/// envelope (so [`ClientError::Remote`](crate::ClientError::Remote) with its
/// code); any other failed status is [`TransportError::Status`].
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    url: String,
    headers: HeaderMap,
}

impl HttpTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), url)
    }

    pub fn with_client(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
            headers: HeaderMap::new(),
        }
    }

    /// Adds a header sent with every call.
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn post(&self, request: Request) -> Result<Response, TransportError> {
        let response = self
            .client
            .post(&self.url)
            .headers(self.headers.clone())
            .json(&request)
            .send()
            .await?;
        let status = response.status();
        let body = response.bytes().await?;

        if status.is_success() {
            return serde_json::from_slice(&body)
                .map_err(|e| TransportError::InvalidResponse(e.to_string()));
        }

        // A failed status that still carries an error envelope came from the
        // handler (or the adapter) and keeps its code.
        match serde_json::from_slice::<Response>(&body) {
            Ok(Response::Error(error)) => Ok(Response::Error(error)),
            _ => Err(TransportError::Status {
                status: status.as_u16(),
                reason: status
                    .canonical_reason()
                    .unwrap_or("unknown status")
                    .to_owned(),
            }),
        }
    }
}

impl Transport for HttpTransport {
    fn send(&self, request: Request) -> BoxFuture<'_, Result<Response, TransportError>> {
        Box::pin(self.post(request))
    }
}
