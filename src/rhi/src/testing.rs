use std::sync::Arc;

use crate::*;

static INIT_LOGGING: std::sync::Once = std::sync::Once::new();

fn init_logging() {
    INIT_LOGGING.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}

pub(crate) fn test_settings(backend: BackendKind, gpu_mode: ExecutionMode) ->
    ContextSettings
{
    ContextSettings {
        name: "test_context".to_owned(),
        backend,
        gpu_mode,
        ..Default::default()
    }
}

#[derive(Debug)]
pub(crate) struct TestVars {
    pub(crate) context: Arc<Context>,
}

impl TestVars {
    pub(crate) fn new() -> Self {
        Self::with_backend(BackendKind::Null)
    }

    pub(crate) fn with_backend(backend: BackendKind) -> Self {
        Self::with_settings(test_settings(backend, ExecutionMode::Immediate))
    }

    /// A context whose GPU work stays pending until retired.
    pub(crate) fn manual(backend: BackendKind) -> Self {
        Self::with_settings(test_settings(backend, ExecutionMode::Manual))
    }

    pub(crate) fn with_settings(settings: ContextSettings) -> Self {
        init_logging();
        let context = Context::new(settings).unwrap();
        TestVars { context }
    }

    pub(crate) fn gpu(&self) -> &SoftGpu {
        self.context.device().gpu()
    }
}
