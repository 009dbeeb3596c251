use std::sync::Arc;

use derivative::Derivative;

use crate::*;

#[derive(Clone, Copy, Debug, Derivative, Eq, Hash, PartialEq)]
#[derivative(Default)]
pub enum TextureDimensions {
    Tex1D,
    #[derivative(Default)]
    Tex2D,
    Tex3D,
    Cube,
}

#[derive(Clone, Copy, Debug, Derivative, Eq, Hash, PartialEq)]
#[derivative(Default)]
pub struct TextureExtent {
    #[derivative(Default(value = "1"))]
    pub width: u32,
    #[derivative(Default(value = "1"))]
    pub height: u32,
    #[derivative(Default(value = "1"))]
    pub depth: u32,
}

impl From<(u32, u32)> for TextureExtent {
    fn from((width, height): (u32, u32)) -> Self {
        Self { width, height, depth: 1 }
    }
}

impl From<(u32, u32, u32)> for TextureExtent {
    fn from((width, height, depth): (u32, u32, u32)) -> Self {
        Self { width, height, depth }
    }
}

impl TextureExtent {
    pub fn mip(&self, level: u32) -> Self {
        Self {
            width: (self.width >> level).max(1),
            height: (self.height >> level).max(1),
            depth: (self.depth >> level).max(1),
        }
    }

    /// Length of the full mip chain.
    pub fn max_mip_levels(&self) -> u32 {
        let max = self.width.max(self.height).max(self.depth);
        32 - max.leading_zeros()
    }
}

#[derive(Clone, Debug, Derivative)]
#[derivative(Default)]
pub struct TextureSettings {
    pub name: Option<String>,
    pub dimensions: TextureDimensions,
    pub format: PixelFormat,
    pub extent: TextureExtent,
    #[derivative(Default(value = "1"))]
    pub array_length: u32,
    #[derivative(Default(value = "1"))]
    pub mip_levels: u32,
    pub usage: ResourceUsage,
    pub storage: StorageMode,
}

#[derive(Debug)]
pub struct Texture {
    core: Arc<ResourceCore>,
    settings: TextureSettings,
    context: Arc<Context>,
}

impl Drop for Texture {
    fn drop(&mut self) {
        self.context.resource_manager().release_pool()
            .add(Arc::clone(&self.core));
    }
}

impl Named for Texture {
    fn name(&self) -> Option<&str> {
        self.settings.name.as_deref()
    }
}

impl Resource for Texture {
    fn core(&self) -> &Arc<ResourceCore> {
        &self.core
    }

    fn context(&self) -> &Arc<Context> {
        &self.context
    }
}

fn validate(settings: &TextureSettings) -> DeviceResult<()> {
    let name = &settings.name;
    let extent = settings.extent;
    precondition!(settings.format != PixelFormat::Unknown,
        "texture {:?} has no pixel format", name);
    precondition!(extent.width > 0 && extent.height > 0 && extent.depth > 0
            && settings.array_length > 0,
        "texture {:?} has an empty extent {:?}", name, extent);
    match settings.dimensions {
        TextureDimensions::Tex1D => precondition!(
            extent.height == 1 && extent.depth == 1,
            "1D texture {:?} has extent {:?}", name, extent),
        TextureDimensions::Tex2D => precondition!(extent.depth == 1,
            "2D texture {:?} has depth {}", name, extent.depth),
        TextureDimensions::Tex3D => precondition!(settings.array_length == 1,
            "3D texture {:?} cannot be an array", name),
        TextureDimensions::Cube => precondition!(
            extent.width == extent.height && extent.depth == 1,
            "cube texture {:?} faces must be square, got {:?}", name, extent),
    }
    precondition!(
        settings.mip_levels >= 1
            && settings.mip_levels <= extent.max_mip_levels(),
        "texture {:?} requests {} mip levels; {:?} allows at most {}",
        name, settings.mip_levels, extent, extent.max_mip_levels());
    if settings.storage == StorageMode::Upload {
        precondition!(!settings.usage.intersects(ResourceUsage::SHADER_WRITE
                | ResourceUsage::RENDER_TARGET),
            "upload texture {:?} cannot be written by the GPU", name);
    }
    Ok(())
}

fn subresource_count(settings: &TextureSettings) -> SubResourceCount {
    let (depth, array_size) = match settings.dimensions {
        TextureDimensions::Tex3D => (settings.extent.depth, 1),
        TextureDimensions::Cube => (1, settings.array_length * 6),
        TextureDimensions::Tex1D | TextureDimensions::Tex2D =>
            (1, settings.array_length),
    };
    SubResourceCount::new(depth, array_size, settings.mip_levels)
}

/// Byte ranges of every sub-resource, in raw index order.
fn subresource_layout(settings: &TextureSettings, count: SubResourceCount) ->
    Vec<BytesRange>
{
    let texel = settings.format.size() as u64;
    let mut offset = 0;
    let mut layout = Vec::with_capacity(count.total() as usize);
    for raw in 0..count.total() {
        let mip = settings.extent.mip(count.index_of(raw).mip_level);
        let size = mip.width as u64 * mip.height as u64 * texel;
        layout.push(BytesRange::new(offset, size));
        offset += size;
    }
    layout
}

impl Texture {
    pub(crate) fn new(context: &Arc<Context>, settings: TextureSettings) ->
        DeviceResult<Self>
    {
        trace!("Texture::new(settings: {:?})", settings);
        validate(&settings)?;
        let count = subresource_count(&settings);
        let layout = subresource_layout(&settings, count);
        let size = layout.last().and_then(BytesRange::end).unwrap_or(0);
        let core = ResourceCore::new(
            context.device(),
            context.resource_manager(),
            ResourceDesc {
                name: settings.name.clone(),
                kind: ResourceKind::Texture,
                usage: settings.usage,
                storage: settings.storage,
                size,
                count,
                layout,
                is_depth: settings.format.is_depth(),
            },
        )?;
        Ok(Self {
            core,
            settings,
            context: Arc::clone(context),
        })
    }

    pub fn settings(&self) -> &TextureSettings {
        &self.settings
    }

    pub fn format(&self) -> PixelFormat {
        self.settings.format
    }

    pub fn extent(&self) -> TextureExtent {
        self.settings.extent
    }

    /// Byte size of a single sub-resource.
    pub fn subresource_size(&self, index: SubResourceIndex) -> DeviceResult<u64> {
        Ok(self.core.data_range(index, None)?.size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::*;

    #[test]
    fn mip_chain() {
        let extent = TextureExtent::from((16, 4));
        assert_eq!(extent.max_mip_levels(), 5);
        assert_eq!(extent.mip(3), TextureExtent::from((2, 1)));
        assert_eq!(extent.mip(9), TextureExtent::from((1, 1)));
    }

    #[test]
    fn cube_layout() {
        let vars = TestVars::new();
        let cube = vars.context.create_texture(TextureSettings {
            dimensions: TextureDimensions::Cube,
            format: PixelFormat::Rgba8Unorm,
            extent: (8, 8).into(),
            mip_levels: 2,
            ..Default::default()
        }).unwrap();
        let count = cube.subresource_count();
        assert_eq!(count, SubResourceCount::new(1, 6, 2));
        // One face: 8x8 then 4x4 texels of 4 bytes
        assert_eq!(cube.core().size(), 6 * (256 + 64));

        let face1_mip1 = SubResourceIndex::new(0, 1, 1);
        let range = cube.core().data_range(face1_mip1, None).unwrap();
        assert_eq!(range, BytesRange::new(256 + 64 + 256, 64));
        assert!(cube.subresource_size(SubResourceIndex::new(0, 6, 0)).is_err());
    }

    #[test]
    fn validation() {
        let vars = TestVars::new();
        let create = |settings| vars.context.create_texture(settings);
        assert!(create(TextureSettings {
            extent: (4, 4).into(),
            ..Default::default()
        }).unwrap_err().is_precondition());
        assert!(create(TextureSettings {
            dimensions: TextureDimensions::Cube,
            format: PixelFormat::R8Unorm,
            extent: (4, 8).into(),
            ..Default::default()
        }).is_err());
        assert!(create(TextureSettings {
            format: PixelFormat::R8Unorm,
            extent: (4, 4).into(),
            mip_levels: 4,
            ..Default::default()
        }).is_err());
        let volume = create(TextureSettings {
            dimensions: TextureDimensions::Tex3D,
            format: PixelFormat::R8Unorm,
            extent: (4, 4, 3).into(),
            ..Default::default()
        }).unwrap();
        assert_eq!(volume.subresource_count().total(), 3);
        assert_eq!(volume.core().size(), 48);
    }
}
