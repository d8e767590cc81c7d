/// Builds a `Vec<Value>` of positional params.
///
/// ```
/// use rpcwire::{params, Value};
///
/// assert_eq!(params![5, "x"], vec![Value::Int(5), Value::from("x")]);
/// ```
#[macro_export]
macro_rules! params {
    () => {
        ::std::vec::Vec::<$crate::Value>::new()
    };
    ($($param:expr),+ $(,)?) => {
        vec![$($crate::Value::from($param)),+]
    };
}
