use crate::{
    envelope::{ErrorCode, ErrorObject, Request, Response},
    serializer::{Serializer, SerializerError, SharedSerializer, TaggedJson},
    transport::{Transport, TransportError},
    types::{Decode, Encode, Value, ValueError},
};
use std::{fmt, sync::Arc, time::Duration};
use thiserror::Error;
use tokio::time;
use tracing::{debug, warn};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(30_000);

#[derive(Clone)]
pub struct ClientConfig {
    /// Upper bound for one call, transmission and reply included.
    pub timeout: Duration,
    pub serializer: SharedSerializer,
}

impl ClientConfig {
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn serializer(mut self, serializer: impl Serializer + 'static) -> Self {
        self.serializer = Arc::new(serializer);
        self
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            serializer: Arc::new(TaggedJson),
        }
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("RPC call timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The handler answered with an error envelope.
    #[error("{message}")]
    Remote {
        message: String,
        code: Option<ErrorCode>,
    },

    #[error("serializer: {0}")]
    Serializer(#[from] SerializerError),

    #[error("encoding params: {0}")]
    Encode(ValueError),

    #[error("decoding result: {0}")]
    Decode(ValueError),
}

impl ClientError {
    /// The remote error code, if the handler sent one.
    pub fn code(&self) -> Option<&ErrorCode> {
        match self {
            ClientError::Remote { code, .. } => code.as_ref(),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ClientError::Timeout(_))
    }
}

impl From<ErrorObject> for ClientError {
    fn from(ErrorObject { message, code }: ErrorObject) -> Self {
        ClientError::Remote { message, code }
    }
}

/// Calls endpoints through a [`Transport`].
///
/// ```no_run
/// # async fn demo() -> Result<(), rpcwire::ClientError> {
/// use rpcwire::{transport::http::HttpTransport, Client};
///
/// let client = Client::new(HttpTransport::new("http://127.0.0.1:3000/rpc"));
/// let sum: i64 = client.call("add", (5, 3)).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Client<T> {
    transport: T,
    config: ClientConfig,
}

impl<T: Transport> Client<T> {
    pub fn new(transport: T) -> Self {
        Self::with_config(transport, ClientConfig::default())
    }

    pub fn with_config(transport: T, config: ClientConfig) -> Self {
        Self { transport, config }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn update_config(&mut self, update: impl FnOnce(&mut ClientConfig)) {
        update(&mut self.config);
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub async fn call<P, R>(&self, endpoint: &str, params: P) -> Result<R, ClientError>
    where
        P: IntoParams,
        R: Decode,
    {
        let params = params.into_params().map_err(ClientError::Encode)?;
        let value = self.call_value(endpoint, params).await?;
        R::decode(value).map_err(ClientError::Decode)
    }

    /// Untyped variant of [`call`](Client::call).
    pub async fn call_value(&self, endpoint: &str, params: Vec<Value>) -> Result<Value, ClientError> {
        let serializer = &self.config.serializer;
        let params = params
            .into_iter()
            .map(|param| serializer.serialize(param))
            .collect::<Result<Vec<_>, _>>()?;
        let request = Request::new(endpoint, params);

        debug!(endpoint, "calling");
        // the transport future is dropped on expiry, which cancels it
        let response = match time::timeout(self.config.timeout, self.transport.send(request)).await {
            Ok(response) => response?,
            Err(_) => {
                warn!(endpoint, timeout_ms = self.config.timeout.as_millis() as u64, "call timed out");
                return Err(ClientError::Timeout(self.config.timeout));
            }
        };

        match response {
            Response::Data(data) => Ok(serializer.deserialize(data)?),
            Response::Error(error) => Err(error.into()),
        }
    }
}

/// Positional parameters for [`Client::call`]: tuples of [`Encode`] values
/// or a ready-made `Vec<Value>`.
pub trait IntoParams {
    fn into_params(self) -> Result<Vec<Value>, ValueError>;
}

impl IntoParams for Vec<Value> {
    fn into_params(self) -> Result<Vec<Value>, ValueError> {
        Ok(self)
    }
}

macro_rules! impl_into_params {
    ($($arg:ident),*) => {
        #[allow(non_snake_case)]
        impl<$($arg: Encode,)*> IntoParams for ($($arg,)*) {
            fn into_params(self) -> Result<Vec<Value>, ValueError> {
                let ($($arg,)*) = self;
                Ok(vec![$($arg.encode()?),*])
            }
        }
    };
}

impl_into_params!();
impl_into_params!(A1);
impl_into_params!(A1, A2);
impl_into_params!(A1, A2, A3);
impl_into_params!(A1, A2, A3, A4);
impl_into_params!(A1, A2, A3, A4, A5);
impl_into_params!(A1, A2, A3, A4, A5, A6);
