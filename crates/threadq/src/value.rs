//! Opaque values passed through task inputs, results and signals

use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Type-erased, shareable value.
///
/// Cloning a `Value` clones the `Arc`, never the data behind it. Thread
/// safety of the wrapped data is the caller's business; the core only moves
/// the handle around.
#[derive(Clone)]
pub struct Value {
    inner: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
}

impl Value {
    /// Wrap any shareable value.
    ///
    /// Wrapping a `Value` returns it unchanged instead of nesting it.
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        let boxed: Box<dyn Any + Send + Sync> = Box::new(value);
        match boxed.downcast::<Value>() {
            Ok(value) => *value,
            Err(boxed) => Self {
                inner: Arc::from(boxed),
                type_name: std::any::type_name::<T>(),
            },
        }
    }

    /// Wrap an existing `Arc` without re-allocating
    pub fn from_arc<T: Any + Send + Sync>(value: Arc<T>) -> Self {
        Self {
            inner: value,
            type_name: std::any::type_name::<T>(),
        }
    }

    /// The unit value, used as the result of operations that return `()`
    pub fn unit() -> Self {
        Self::new(())
    }

    /// Borrow the wrapped value if it has type `T`
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }

    /// Get a shared handle to the wrapped value if it has type `T`
    pub fn downcast_arc<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.inner.clone().downcast::<T>().ok()
    }

    /// Check the wrapped type
    pub fn is<T: Any>(&self) -> bool {
        self.inner.is::<T>()
    }

    /// Rust type name of the wrapped value, for diagnostics
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Whether both values point at the same allocation
    pub fn ptr_eq(&self, other: &Value) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(s) = self.downcast_ref::<String>() {
            return write!(f, "Value({:?})", s);
        }
        if let Some(s) = self.downcast_ref::<&'static str>() {
            return write!(f, "Value({:?})", s);
        }
        if let Some(n) = self.downcast_ref::<i64>() {
            return write!(f, "Value({})", n);
        }
        if let Some(n) = self.downcast_ref::<i32>() {
            return write!(f, "Value({})", n);
        }
        write!(f, "Value(<{}>)", self.type_name)
    }
}

/// Cooperative stop predicate shared between a submitter and a running task.
///
/// The task polls [`StopFlag::is_running`] and returns once it turns false.
/// Pass it through the submission inputs like any other value.
#[derive(Clone, Debug)]
pub struct StopFlag {
    running: Arc<AtomicBool>,
}

impl StopFlag {
    /// New flag in the running state
    pub fn new() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Whether the holder should keep going
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Ask every holder to stop
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }

    /// Re-arm the flag
    pub fn restart(&self) {
        self.running.store(true, Ordering::Release);
    }
}

impl Default for StopFlag {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_downcast() {
        let v = Value::new(42i64);
        assert!(v.is::<i64>());
        assert!(!v.is::<i32>());
        assert_eq!(v.downcast_ref::<i64>(), Some(&42));
        assert!(v.downcast_ref::<String>().is_none());
    }

    #[test]
    fn test_clone_shares_data() {
        let v = Value::new(vec![1u8, 2, 3]);
        let w = v.clone();
        assert!(v.ptr_eq(&w));
    }

    #[test]
    fn test_value_is_not_nested() {
        let v = Value::new(String::from("frame"));
        let w = Value::new(v.clone());
        assert!(w.ptr_eq(&v));
        assert_eq!(w.downcast_ref::<String>().map(String::as_str), Some("frame"));
    }

    #[test]
    fn test_from_arc_keeps_allocation() {
        let data = Arc::new(5u32);
        let v = Value::from_arc(data.clone());
        let back = v.downcast_arc::<u32>().unwrap();
        assert!(Arc::ptr_eq(&data, &back));
    }

    #[test]
    fn test_debug_output() {
        assert_eq!(format!("{:?}", Value::new(String::from("r"))), "Value(\"r\")");
        assert_eq!(format!("{:?}", Value::new(1234i64)), "Value(1234)");
        assert!(format!("{:?}", Value::unit()).contains("()"));
    }

    #[test]
    fn test_stop_flag() {
        let flag = StopFlag::new();
        let other = flag.clone();
        assert!(other.is_running());
        flag.stop();
        assert!(!other.is_running());
        flag.restart();
        assert!(other.is_running());
    }
}
