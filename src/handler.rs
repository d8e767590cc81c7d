use crate::{
    endpoint::EndpointMap,
    envelope::{ErrorObject, Request, Response},
    serializer::{Serializer, SharedSerializer, TaggedJson},
    types::Value,
};
use std::{fmt, sync::Arc};
use tracing::{debug, warn};

/// The dispatch core shared by every transport adapter.
///
/// Neither [`handle_value`](Handler::handle_value) nor
/// [`handle_request`](Handler::handle_request) can fail: every problem ends up
/// in the returned [`Response`]. Cloning is cheap and clones share the same
/// endpoints and serializer.
#[derive(Clone)]
pub struct Handler {
    inner: Arc<Inner>,
}

struct Inner {
    endpoints: EndpointMap,
    serializer: SharedSerializer,
}

impl Handler {
    /// A handler using the default [`TaggedJson`] serializer.
    pub fn new(endpoints: EndpointMap) -> Self {
        Self::with_serializer(endpoints, TaggedJson)
    }

    pub fn with_serializer(endpoints: EndpointMap, serializer: impl Serializer + 'static) -> Self {
        Self::with_shared_serializer(endpoints, Arc::new(serializer))
    }

    pub fn with_shared_serializer(endpoints: EndpointMap, serializer: SharedSerializer) -> Self {
        Self {
            inner: Arc::new(Inner {
                endpoints,
                serializer,
            }),
        }
    }

    pub fn endpoints(&self) -> &EndpointMap {
        &self.inner.endpoints
    }

    /// Checks the shape of an untyped request, then dispatches it.
    pub async fn handle_value(&self, raw: Value) -> Response {
        match Request::from_value(raw) {
            Ok(request) => self.handle_request(request).await,
            Err(error) => {
                debug!("rejected malformed request");
                Response::Error(error)
            }
        }
    }

    pub async fn handle_request(&self, request: Request) -> Response {
        let Request { endpoint, params } = request;
        if endpoint.is_empty() {
            return Response::Error(ErrorObject::invalid_request());
        }

        debug!(endpoint = %endpoint, params = params.len(), "dispatching");
        match self.dispatch(&endpoint, params).await {
            Ok(data) => Response::Data(data),
            Err(error) => {
                warn!(
                    endpoint = %endpoint,
                    code = error.code.as_ref().map(|c| c.as_str()).unwrap_or_default(),
                    "call failed: {}",
                    error.message
                );
                Response::Error(error)
            }
        }
    }

    async fn dispatch(&self, name: &str, params: Vec<Value>) -> Result<Value, ErrorObject> {
        let Inner {
            endpoints,
            serializer,
        } = &*self.inner;

        let endpoint = endpoints
            .get(name)
            .ok_or_else(|| ErrorObject::endpoint_not_found(name))?;
        let params = params
            .into_iter()
            .map(|param| serializer.deserialize(param))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| ErrorObject::internal(format!("invalid parameters: {e}")))?;

        let retval = endpoint.call(params).await?;
        serializer
            .serialize(retval)
            .map_err(|e| ErrorObject::internal(e.to_string()))
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Handler")
            .field("endpoints", &self.inner.endpoints)
            .finish_non_exhaustive()
    }
}
