use std::sync::Arc;

use derive_more::Display;

use crate::*;

/// Failures reported by the RHI.
#[derive(Clone, Debug, Display)]
pub enum Error {
    /// The caller violated an API contract: wrong usage flags,
    /// out-of-range sub-resource, unmapped descriptor routing, exhausted
    /// fixed-size heap, or an operation in the wrong state.
    #[display(fmt = "precondition violated: {}", _0)]
    Precondition(String),
    /// A native call failed on the named device.
    #[display(fmt = "{} backend error on device {:?}: {}", backend, device, source)]
    Backend {
        backend: BackendKind,
        device: String,
        source: Arc<anyhow::Error>,
    },
    /// The completion-waiting task of a command queue terminated
    /// abnormally.
    #[display(fmt = "completion task of queue {:?} failed: {}", queue, source)]
    TaskFailed {
        queue: String,
        source: Box<Error>,
    },
    #[display(fmt = "device lost")]
    DeviceLost,
    /// A panic caught at a task boundary.
    #[display(fmt = "panicked: {}", _0)]
    Panicked(String),
    /// Surface settings the backend cannot satisfy. Callers may retry
    /// with relaxed settings.
    #[display(fmt = "incompatible surface settings: {}", _0)]
    Incompatible(String),
    #[display(fmt = "cannot load {:?}: {}", path, message)]
    Io {
        path: String,
        message: String,
    },
}

impl std::error::Error for Error {}

pub type DeviceResult<T> = std::result::Result<T, Error>;

impl Error {
    /// Converts a panic payload caught at a thread boundary.
    pub(crate) fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_owned()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "<non-string panic payload>".to_owned()
        };
        Error::Panicked(message)
    }

    pub fn is_precondition(&self) -> bool {
        matches!(self, Error::Precondition(_))
    }

    /// Returns the innermost error, looking through task failures.
    pub fn root_cause(&self) -> &Error {
        match self {
            Error::TaskFailed { source, .. } => source.root_cause(),
            err => err,
        }
    }
}

pub trait ResultExt<T> {
    /// Wraps a native failure with the device it originated from.
    fn on_device(self, device: &Device) -> DeviceResult<T>;
}

impl<T> ResultExt<T> for anyhow::Result<T> {
    fn on_device(self, device: &Device) -> DeviceResult<T> {
        self.map_err(|source| Error::Backend {
            backend: device.backend().kind(),
            device: device.name().to_owned(),
            source: Arc::new(source),
        })
    }
}
