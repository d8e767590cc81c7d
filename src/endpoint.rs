use crate::{
    envelope::ErrorObject,
    types::{Decode, Encode, Value, ValueError},
};
use futures::{
    future::{ready, BoxFuture},
    FutureExt,
};
use std::{
    any::Any, collections::BTreeMap, fmt, future::Future, marker::PhantomData,
    panic::AssertUnwindSafe, sync::Arc,
};
use thiserror::Error;

/// Maps endpoint names to type-erased async functions.
///
/// Endpoints are registered with [`insert`](EndpointMap::insert) and the map
/// is frozen once it is handed to a [`Handler`](crate::Handler).
#[derive(Default, Clone)]
pub struct EndpointMap {
    endpoints: BTreeMap<String, Arc<dyn DynamicEndpoint>>,
}

impl EndpointMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `endpoint` under `name`, replacing any previous entry.
    ///
    /// Any `Fn(A1, .., An) -> impl Future<Output = Result<R, E>>` with up to
    /// six parameters works, where every `Ai: Decode`, `R: Encode` and
    /// `E: Display`.
    pub fn insert<F, Args>(&mut self, name: impl Into<String>, endpoint: F) -> &mut Self
    where
        F: IntoEndpoint<Args>,
        Args: 'static,
    {
        let typed = TypedEndpoint {
            endpoint,
            _args: PhantomData,
        };
        self.endpoints.insert(name.into(), Arc::new(typed));
        self
    }

    pub fn with<F, Args>(mut self, name: impl Into<String>, endpoint: F) -> Self
    where
        F: IntoEndpoint<Args>,
        Args: 'static,
    {
        self.insert(name, endpoint);
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.endpoints.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.endpoints.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    pub(crate) fn get(&self, name: &str) -> Option<Endpoint> {
        self.endpoints.get(name).cloned().map(Endpoint)
    }

    pub async fn call(&self, name: &str, params: Vec<Value>) -> CallResult {
        Ok(self
            .get(name)
            .ok_or_else(|| DispatchError::NoSuchEndpoint(name.to_owned()))?
            .call(params)
            .await?)
    }
}

impl fmt::Debug for EndpointMap {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_set().entries(self.names()).finish()
    }
}

pub type CallResult = Result<Value, DispatchError>;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Endpoint '{0}' not found")]
    NoSuchEndpoint(String),

    #[error(transparent)]
    Call(#[from] CallError),
}

#[derive(Debug, Error)]
pub enum CallError {
    #[error("invalid parameter {index}: {source}")]
    Param { index: usize, source: ValueError },

    #[error("invalid return value: {0}")]
    Result(ValueError),

    /// The endpoint returned `Err`; holds its message.
    #[error("{0}")]
    Failed(String),

    #[error("{0}")]
    Panicked(String),
}

impl From<CallError> for ErrorObject {
    fn from(err: CallError) -> Self {
        ErrorObject::internal(err.to_string())
    }
}

impl From<DispatchError> for ErrorObject {
    fn from(err: DispatchError) -> Self {
        match err {
            DispatchError::NoSuchEndpoint(name) => ErrorObject::endpoint_not_found(&name),
            DispatchError::Call(err) => err.into(),
        }
    }
}

/// A registered endpoint, cheap to clone out of the map.
#[derive(Clone)]
pub(crate) struct Endpoint(Arc<dyn DynamicEndpoint>);

impl Endpoint {
    /// Runs the endpoint; a panic inside it is reported as [`CallError::Panicked`].
    pub(crate) async fn call(&self, params: Vec<Value>) -> Result<Value, CallError> {
        let endpoint = self.0.clone();
        AssertUnwindSafe(async move { endpoint.call(params).await })
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| Err(CallError::Panicked(panic_message(payload))))
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        String::new()
    }
}

/// An async function that can be called with positional [`Value`] params.
///
/// `Args` is the tuple of parameter types; it only exists to keep the
/// per-arity implementations apart.
pub trait IntoEndpoint<Args>: Send + Sync + 'static {
    fn invoke(&self, params: Vec<Value>) -> BoxFuture<'static, Result<Value, CallError>>;
}

// Missing params decode from Null, extra params are ignored.
macro_rules! impl_into_endpoint {
    ($($arg:ident),*) => {
        #[allow(non_snake_case, unused_mut, unused_variables, unused_assignments)]
        impl<F, Fut, R, E, $($arg,)*> IntoEndpoint<($($arg,)*)> for F
        where
            F: Fn($($arg),*) -> Fut + Send + Sync + 'static,
            Fut: Future<Output = Result<R, E>> + Send + 'static,
            R: Encode + Send + 'static,
            E: fmt::Display + Send + 'static,
            $($arg: Decode + Send + 'static,)*
        {
            fn invoke(&self, params: Vec<Value>) -> BoxFuture<'static, Result<Value, CallError>> {
                let mut params = params.into_iter();
                let mut index = 0;
                $(
                    let $arg = match $arg::decode(params.next().unwrap_or(Value::Null)) {
                        Ok(arg) => arg,
                        Err(source) => {
                            return Box::pin(ready(Err(CallError::Param { index, source })));
                        }
                    };
                    index += 1;
                )*
                let fut = (self)($($arg),*);
                Box::pin(async move {
                    let retval = fut.await.map_err(|e| CallError::Failed(e.to_string()))?;
                    retval.encode().map_err(CallError::Result)
                })
            }
        }
    };
}

impl_into_endpoint!();
impl_into_endpoint!(A1);
impl_into_endpoint!(A1, A2);
impl_into_endpoint!(A1, A2, A3);
impl_into_endpoint!(A1, A2, A3, A4);
impl_into_endpoint!(A1, A2, A3, A4, A5);
impl_into_endpoint!(A1, A2, A3, A4, A5, A6);

/// A type-erased version of [`IntoEndpoint`]
trait DynamicEndpoint: Send + Sync {
    fn call(&self, params: Vec<Value>) -> BoxFuture<'static, Result<Value, CallError>>;
}

struct TypedEndpoint<F, Args> {
    endpoint: F,
    _args: PhantomData<fn() -> Args>,
}

impl<F, Args> DynamicEndpoint for TypedEndpoint<F, Args>
where
    F: IntoEndpoint<Args>,
    Args: 'static,
{
    fn call(&self, params: Vec<Value>) -> BoxFuture<'static, Result<Value, CallError>> {
        self.endpoint.invoke(params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;

    async fn add(a: i64, b: i64) -> Result<i64, Infallible> {
        Ok(a + b)
    }

    async fn greet(name: String, excited: Option<bool>) -> Result<String, Infallible> {
        let bang = if excited.unwrap_or(false) { "!" } else { "." };
        Ok(format!("Hello, {name}{bang}"))
    }

    fn endpoints() -> EndpointMap {
        EndpointMap::new()
            .with("add", add)
            .with("greet", greet)
            .with("ping", || async { Ok::<_, Infallible>("pong") })
            .with("fail", || async { Err::<(), _>("Test error") })
            .with("panic", || async {
                if true {
                    panic!("endpoint blew up");
                }
                Ok::<(), Infallible>(())
            })
    }

    #[tokio::test]
    async fn positional_params() {
        let map = endpoints();
        let sum = map
            .call("add", vec![Value::Int(5), Value::Int(3)])
            .await
            .unwrap();
        assert_eq!(sum, Value::Int(8));
        assert_eq!(
            map.call("ping", vec![Value::from("ignored")]).await.unwrap(),
            Value::from("pong")
        );
    }

    #[tokio::test]
    async fn missing_params_are_null() {
        let map = endpoints();
        let greeting = map
            .call("greet", vec![Value::from("world")])
            .await
            .unwrap();
        assert_eq!(greeting, Value::from("Hello, world."));

        let err = map.call("add", vec![Value::Int(1)]).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid parameter 1: type mismatch: expected Int, found Null"
        );
    }

    #[tokio::test]
    async fn failures_keep_their_message() {
        let map = endpoints();
        let err = map.call("fail", vec![]).await.unwrap_err();
        assert_eq!(err.to_string(), "Test error");

        let err = map.call("panic", vec![]).await.unwrap_err();
        assert!(matches!(err, DispatchError::Call(CallError::Panicked(ref m)) if m == "endpoint blew up"));
    }

    #[tokio::test]
    async fn unknown_names() {
        let err = endpoints().call("nonExistent", vec![]).await.unwrap_err();
        assert_eq!(
            ErrorObject::from(err),
            ErrorObject::endpoint_not_found("nonExistent")
        );
    }

    #[test]
    fn lists_names() {
        let map = endpoints();
        assert_eq!(
            map.names().collect::<Vec<_>>(),
            ["add", "fail", "greet", "panic", "ping"]
        );
        assert!(map.contains("ping"));
        assert_eq!(map.len(), 5);
    }
}
