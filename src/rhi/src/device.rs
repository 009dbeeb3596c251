use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::*;

/// A logical device: the backend translating neutral requests plus the
/// GPU executing submitted work.
pub struct Device {
    name: String,
    backend: Box<dyn Backend>,
    gpu: SoftGpu,
    next_resource_id: AtomicU64,
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Device")
            .field("name", &self.name)
            .field("backend", &self.backend.kind())
            .field("gpu", &self.gpu.mode())
            .finish()
    }
}

impl Device {
    pub fn new(
        name: impl Into<String>,
        backend: Box<dyn Backend>,
        gpu: SoftGpu,
    ) -> Arc<Self> {
        let name = name.into();
        debug!("creating {} device {:?} ({:?} execution)",
            backend.kind(), name, gpu.mode());
        Arc::new(Device {
            name,
            backend,
            gpu,
            next_resource_id: AtomicU64::new(1),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn backend(&self) -> &dyn Backend {
        &*self.backend
    }

    pub fn gpu(&self) -> &SoftGpu {
        &self.gpu
    }

    pub(crate) fn next_resource_id(&self) -> ResourceId {
        ResourceId(self.next_resource_id.fetch_add(1, Ordering::Relaxed))
    }
}

impl Named for Device {
    fn name(&self) -> Option<&str> {
        Some(&self.name)
    }
}
