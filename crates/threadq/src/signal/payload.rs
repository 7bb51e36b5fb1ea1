//! Emission payloads

use super::{PayloadShape, SignalName};
use crate::error::{PoolError, PoolResult, TaskError};
use crate::value::Value;

/// One emission's data
#[derive(Debug, Clone)]
pub enum Payload {
    /// `finished`
    Unit,
    /// `result`, `obj`
    Value(Value),
    /// `progress`
    Int(i64),
    /// `info`
    Text(String),
    /// `error`
    Error(TaskError),
    /// `imgtime`
    ValueText(Value, String),
}

impl Payload {
    /// Shape of this payload
    pub fn shape(&self) -> PayloadShape {
        match self {
            Payload::Unit => PayloadShape::Unit,
            Payload::Value(_) => PayloadShape::Value,
            Payload::Int(_) => PayloadShape::Int,
            Payload::Text(_) => PayloadShape::Text,
            Payload::Error(_) => PayloadShape::Error,
            Payload::ValueText(..) => PayloadShape::ValueText,
        }
    }

    /// Validate against the signature of `signal`
    pub fn check(&self, signal: SignalName) -> PoolResult<()> {
        let expected = signal.shape();
        if self.shape() != expected {
            return Err(PoolError::BadPayload {
                signal,
                expected,
                found: self.shape().to_string(),
            });
        }
        if let (SignalName::Progress, Payload::Int(n)) = (signal, self) {
            if !(0..=100).contains(n) {
                return Err(PoolError::BadPayload {
                    signal,
                    expected,
                    found: format!("{} (outside 0..=100)", n),
                });
            }
        }
        Ok(())
    }
}

impl From<()> for Payload {
    fn from(_: ()) -> Self {
        Payload::Unit
    }
}

impl From<Value> for Payload {
    fn from(v: Value) -> Self {
        Payload::Value(v)
    }
}

impl From<i64> for Payload {
    fn from(n: i64) -> Self {
        Payload::Int(n)
    }
}

impl From<i32> for Payload {
    fn from(n: i32) -> Self {
        Payload::Int(n as i64)
    }
}

impl From<u8> for Payload {
    fn from(n: u8) -> Self {
        Payload::Int(n as i64)
    }
}

impl From<String> for Payload {
    fn from(s: String) -> Self {
        Payload::Text(s)
    }
}

impl From<&str> for Payload {
    fn from(s: &str) -> Self {
        Payload::Text(s.to_string())
    }
}

impl From<TaskError> for Payload {
    fn from(e: TaskError) -> Self {
        Payload::Error(e)
    }
}

impl From<(Value, String)> for Payload {
    fn from((v, s): (Value, String)) -> Self {
        Payload::ValueText(v, s)
    }
}

impl From<(Value, &str)> for Payload {
    fn from((v, s): (Value, &str)) -> Self {
        Payload::ValueText(v, s.to_string())
    }
}
