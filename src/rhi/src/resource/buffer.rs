use std::sync::Arc;

use derivative::Derivative;

use crate::*;

#[derive(Clone, Copy, Debug, Derivative, Eq, Hash, PartialEq)]
#[derivative(Default)]
pub enum BufferType {
    #[derivative(Default)]
    Data,
    Constant,
    Vertex,
    Index,
}

#[derive(Clone, Debug, Derivative)]
#[derivative(Default)]
pub struct BufferSettings {
    pub name: Option<String>,
    pub buffer_type: BufferType,
    pub usage: ResourceUsage,
    pub storage: StorageMode,
    pub size: u64,
    /// Size of one vertex or index. Required for vertex and index
    /// buffers.
    pub item_size: u32,
}

#[derive(Debug)]
pub struct Buffer {
    core: Arc<ResourceCore>,
    settings: BufferSettings,
    context: Arc<Context>,
}

impl Drop for Buffer {
    fn drop(&mut self) {
        self.context.resource_manager().release_pool()
            .add(Arc::clone(&self.core));
    }
}

impl Named for Buffer {
    fn name(&self) -> Option<&str> {
        self.settings.name.as_deref()
    }
}

impl Resource for Buffer {
    fn core(&self) -> &Arc<ResourceCore> {
        &self.core
    }

    fn context(&self) -> &Arc<Context> {
        &self.context
    }
}

fn validate(settings: &BufferSettings) -> DeviceResult<()> {
    precondition!(settings.size > 0, "buffer {:?} has zero size",
        settings.name);
    match settings.buffer_type {
        BufferType::Vertex => precondition!(settings.item_size > 0,
            "vertex buffer {:?} needs a vertex size", settings.name),
        BufferType::Index => precondition!(
            settings.item_size == 2 || settings.item_size == 4,
            "index buffer {:?} has index size {}; expected 2 or 4",
            settings.name, settings.item_size),
        BufferType::Data | BufferType::Constant => {},
    }
    if settings.item_size > 0 {
        precondition!(settings.size % settings.item_size as u64 == 0,
            "buffer {:?} size {} is not a multiple of item size {}",
            settings.name, settings.size, settings.item_size);
    }
    if settings.storage == StorageMode::Upload {
        precondition!(!settings.usage.intersects(ResourceUsage::SHADER_WRITE
                | ResourceUsage::RENDER_TARGET),
            "upload buffer {:?} cannot be written by the GPU ({:?})",
            settings.name, settings.usage);
    }
    Ok(())
}

impl Buffer {
    pub(crate) fn new(context: &Arc<Context>, settings: BufferSettings) ->
        DeviceResult<Self>
    {
        trace!("Buffer::new(settings: {:?})", settings);
        validate(&settings)?;
        let core = ResourceCore::new(
            context.device(),
            context.resource_manager(),
            ResourceDesc {
                name: settings.name.clone(),
                kind: ResourceKind::Buffer,
                usage: settings.usage,
                storage: settings.storage,
                size: settings.size,
                count: Default::default(),
                layout: vec![BytesRange::new(0, settings.size)],
                is_depth: false,
            },
        )?;
        Ok(Self {
            core,
            settings,
            context: Arc::clone(context),
        })
    }

    pub fn settings(&self) -> &BufferSettings {
        &self.settings
    }

    pub fn buffer_type(&self) -> BufferType {
        self.settings.buffer_type
    }

    pub fn size(&self) -> u64 {
        self.settings.size
    }

    /// Number of vertices or indices the buffer holds.
    pub fn item_count(&self) -> u64 {
        match self.settings.item_size {
            0 => 0,
            n => self.settings.size / n as u64,
        }
    }
}
