use std::sync::Arc;

use crate::*;

/// A resource bound with one usage, restricted to a range of
/// sub-resources or bytes.
#[derive(Clone, Debug)]
pub struct ResourceView {
    core: Arc<ResourceCore>,
    usage: ResourceUsage,
    subresource: SubResourceIndex,
    count: SubResourceCount,
    offset: u64,
    size: u64,
}

impl ResourceView {
    /// Views the whole of `resource`.
    pub fn new<R: Resource + ?Sized>(resource: &R, usage: ResourceUsage) ->
        DeviceResult<Self>
    {
        Self::from_core(resource.core(), usage)
    }

    pub(crate) fn from_core(core: &Arc<ResourceCore>, usage: ResourceUsage) ->
        DeviceResult<Self>
    {
        precondition!(usage.is_single(),
            "a view has exactly one usage, got {:?}", usage);
        precondition!(core.usage().contains(usage),
            "{:?} lacks {:?} usage (has {:?})",
            fmt_named(&**core), usage, core.usage());
        Ok(Self {
            core: Arc::clone(core),
            usage,
            subresource: Default::default(),
            count: core.subresource_count(),
            offset: 0,
            size: core.size(),
        })
    }

    /// Restricts the view to `count` sub-resources starting at `first`.
    pub fn with_subresources(
        mut self,
        first: SubResourceIndex,
        count: SubResourceCount,
    ) -> DeviceResult<Self> {
        let total = self.core.subresource_count();
        precondition!(
            first.depth_slice + count.depth <= total.depth
                && first.array_index + count.array_size <= total.array_size
                && first.mip_level + count.mip_levels <= total.mip_levels,
            "sub-resources {:?} + {:?} exceed {:?}", first, count, total);
        self.subresource = first;
        self.count = count;
        Ok(self)
    }

    /// Restricts a buffer view to a byte range.
    pub fn with_byte_range(mut self, offset: u64, size: u64) ->
        DeviceResult<Self>
    {
        precondition!(self.core.kind() == ResourceKind::Buffer,
            "byte ranges apply to buffer views only");
        let range = BytesRange::new(offset, size);
        precondition!(range.fits_within(self.core.size()),
            "byte range of {} bytes at {} exceeds buffer size {}",
            size, offset, self.core.size());
        self.offset = offset;
        self.size = size;
        Ok(self)
    }

    pub fn core(&self) -> &Arc<ResourceCore> {
        &self.core
    }

    pub fn resource_id(&self) -> ResourceId {
        self.core.id()
    }

    pub fn usage(&self) -> ResourceUsage {
        self.usage
    }

    pub fn subresource(&self) -> SubResourceIndex {
        self.subresource
    }

    pub fn subresource_count(&self) -> SubResourceCount {
        self.count
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Descriptor the view binds through, if its usage has one.
    pub fn descriptor(&self) -> Option<&Descriptor> {
        self.core.descriptor(self.usage)
    }

    /// State the resource must be in while bound through this view.
    pub fn required_state(&self) -> Option<ResourceState> {
        if self.usage == ResourceUsage::SHADER_WRITE {
            Some(ResourceState::UnorderedAccess)
        } else if self.usage == ResourceUsage::SHADER_READ {
            Some(ResourceState::ShaderResource)
        } else if self.usage == ResourceUsage::RENDER_TARGET {
            let depth = self.descriptor()
                .map_or(false, |d| d.heap_type() == DescriptorHeapType::DepthStencil);
            Some(if depth {
                ResourceState::DepthWrite
            } else {
                ResourceState::RenderTarget
            })
        } else {
            None
        }
    }
}
