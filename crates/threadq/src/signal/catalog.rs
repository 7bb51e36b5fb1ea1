//! Closed catalog of signal names and their payload shapes

use crate::error::PoolError;
use std::fmt;
use std::str::FromStr;

/// Shape of the payload a signal carries
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum PayloadShape {
    /// No payload
    Unit,
    /// One opaque value
    Value,
    /// One integer
    Int,
    /// One string
    Text,
    /// Error tag, message and diagnostic
    Error,
    /// Opaque value paired with a string label
    ValueText,
}

impl fmt::Display for PayloadShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PayloadShape::Unit => "()",
            PayloadShape::Value => "(value)",
            PayloadShape::Int => "(int)",
            PayloadShape::Text => "(str)",
            PayloadShape::Error => "(kind, message, diagnostic)",
            PayloadShape::ValueText => "(value, str)",
        };
        f.pad(s)
    }
}

/// Name of a signal in a task's [`SignalSet`](super::SignalSet)
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum SignalName {
    /// Task completed, success or failure
    Finished,
    /// Final return value of the operation
    Result,
    /// Progress percentage 0-100
    Progress,
    /// Failure details
    Error,
    /// Free-form text notification
    Info,
    /// Free-form object delivery
    Obj,
    /// Paired data and label delivery
    ImgTime,
}

impl SignalName {
    /// Number of signals in the catalog
    pub const COUNT: usize = 7;

    /// Every signal, in catalog order
    pub const ALL: [SignalName; Self::COUNT] = [
        SignalName::Finished,
        SignalName::Result,
        SignalName::Progress,
        SignalName::Error,
        SignalName::Info,
        SignalName::Obj,
        SignalName::ImgTime,
    ];

    /// Canonical lowercase name
    pub fn as_str(self) -> &'static str {
        match self {
            SignalName::Finished => "finished",
            SignalName::Result => "result",
            SignalName::Progress => "progress",
            SignalName::Error => "error",
            SignalName::Info => "info",
            SignalName::Obj => "obj",
            SignalName::ImgTime => "imgtime",
        }
    }

    /// Declared payload shape
    pub fn shape(self) -> PayloadShape {
        match self {
            SignalName::Finished => PayloadShape::Unit,
            SignalName::Result | SignalName::Obj => PayloadShape::Value,
            SignalName::Progress => PayloadShape::Int,
            SignalName::Error => PayloadShape::Error,
            SignalName::Info => PayloadShape::Text,
            SignalName::ImgTime => PayloadShape::ValueText,
        }
    }

    /// Parameter name under which the handle is injected into task arguments.
    ///
    /// `finished` and `error` belong to the runtime and are never injected.
    pub fn injected_param(self) -> Option<&'static str> {
        match self {
            SignalName::Progress => Some("progress_callback"),
            SignalName::Result => Some("result_callback"),
            SignalName::Obj => Some("obj_callback"),
            SignalName::Info => Some("info_callback"),
            SignalName::ImgTime => Some("imgtime_callback"),
            SignalName::Finished | SignalName::Error => None,
        }
    }

    /// Reverse of [`SignalName::injected_param`]
    pub fn from_injected_param(param: &str) -> Option<SignalName> {
        Self::ALL
            .iter()
            .copied()
            .find(|s| s.injected_param() == Some(param))
    }

    /// `result` and `error` are the task outcome; at most one of them fires
    pub fn is_outcome(self) -> bool {
        matches!(self, SignalName::Result | SignalName::Error)
    }

    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for SignalName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for SignalName {
    type Err = PoolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|name| name.as_str() == s)
            .ok_or_else(|| PoolError::BadSignalName(s.to_string()))
    }
}

/// Parameter names the runtime injects into every task; user inputs may not use them
pub const RESERVED_PARAMS: [&str; 5] = [
    "progress_callback",
    "result_callback",
    "obj_callback",
    "info_callback",
    "imgtime_callback",
];
