//! Listener callables, one variant per payload shape

use super::{Payload, PayloadShape};
use crate::error::TaskError;
use crate::value::Value;
use std::fmt;
use std::sync::Arc;

/// A callable subscribed to a signal.
///
/// The variant fixes the arity; connecting a listener to a signal of a
/// different shape fails with `BadListener`.
#[derive(Clone)]
pub enum Listener {
    /// `fn()`
    Unit(Arc<dyn Fn() + Send + Sync>),
    /// `fn(value)`
    Value(Arc<dyn Fn(Value) + Send + Sync>),
    /// `fn(int)`
    Int(Arc<dyn Fn(i64) + Send + Sync>),
    /// `fn(str)`
    Text(Arc<dyn Fn(String) + Send + Sync>),
    /// `fn(error)`
    Error(Arc<dyn Fn(TaskError) + Send + Sync>),
    /// `fn(value, str)`
    ValueText(Arc<dyn Fn(Value, String) + Send + Sync>),
}

impl Listener {
    /// Listener for `finished`
    pub fn unit(f: impl Fn() + Send + Sync + 'static) -> Self {
        Listener::Unit(Arc::new(f))
    }

    /// Listener for `result` or `obj`
    pub fn value(f: impl Fn(Value) + Send + Sync + 'static) -> Self {
        Listener::Value(Arc::new(f))
    }

    /// Listener for `progress`
    pub fn int(f: impl Fn(i64) + Send + Sync + 'static) -> Self {
        Listener::Int(Arc::new(f))
    }

    /// Listener for `info`
    pub fn text(f: impl Fn(String) + Send + Sync + 'static) -> Self {
        Listener::Text(Arc::new(f))
    }

    /// Listener for `error`
    pub fn error(f: impl Fn(TaskError) + Send + Sync + 'static) -> Self {
        Listener::Error(Arc::new(f))
    }

    /// Listener for `imgtime`
    pub fn value_text(f: impl Fn(Value, String) + Send + Sync + 'static) -> Self {
        Listener::ValueText(Arc::new(f))
    }

    /// Payload shape this listener accepts
    pub fn shape(&self) -> PayloadShape {
        match self {
            Listener::Unit(_) => PayloadShape::Unit,
            Listener::Value(_) => PayloadShape::Value,
            Listener::Int(_) => PayloadShape::Int,
            Listener::Text(_) => PayloadShape::Text,
            Listener::Error(_) => PayloadShape::Error,
            Listener::ValueText(_) => PayloadShape::ValueText,
        }
    }

    /// Call the listener. Shapes were checked at connect and emit time, so a
    /// mismatch here is a core bug; it is logged and the call is dropped.
    pub(crate) fn invoke(&self, payload: Payload) {
        match (self, payload) {
            (Listener::Unit(f), Payload::Unit) => f(),
            (Listener::Value(f), Payload::Value(v)) => f(v),
            (Listener::Int(f), Payload::Int(n)) => f(n),
            (Listener::Text(f), Payload::Text(s)) => f(s),
            (Listener::Error(f), Payload::Error(e)) => f(e),
            (Listener::ValueText(f), Payload::ValueText(v, s)) => f(v, s),
            (listener, payload) => {
                tracing::error!(
                    listener = %listener.shape(),
                    payload = %payload.shape(),
                    "dropping delivery with mismatched payload"
                );
            }
        }
    }
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Listener{}", self.shape())
    }
}
