use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use bitflags::bitflags;
use derivative::Derivative;
use derive_more::Display;
use parking_lot::Mutex;

use crate::*;

mod barrier;
mod buffer;
mod manager;
mod memory;
mod release_pool;
mod sampler;
mod subresource;
mod texture;
mod view;

pub use barrier::*;
pub use buffer::*;
pub use manager::*;
pub use memory::*;
pub use release_pool::*;
pub use sampler::*;
pub use subresource::*;
pub use texture::*;
pub use view::*;

/// Device-unique identifier of a resource or pipeline object.
#[derive(Clone, Copy, Debug, Display, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[display(fmt = "#{}", _0)]
pub struct ResourceId(pub(crate) u64);

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ResourceKind {
    Buffer,
    Texture,
    Sampler,
}

bitflags! {
    #[derive(Default)]
    pub struct ResourceUsage: u32 {
        const SHADER_READ = bit!(0);
        const SHADER_WRITE = bit!(1);
        const RENDER_TARGET = bit!(2);
        const READ_BACK = bit!(3);
    }
}

impl ResourceUsage {
    /// Usages which are bound through a descriptor.
    pub const DESCRIPTOR_USAGES: [ResourceUsage; 3] = [
        ResourceUsage::SHADER_READ,
        ResourceUsage::SHADER_WRITE,
        ResourceUsage::RENDER_TARGET,
    ];

    pub fn is_single(self) -> bool {
        self.bits().count_ones() == 1
    }
}

#[derive(Clone, Copy, Debug, Derivative, Eq, Hash, PartialEq)]
#[derivative(Default)]
pub enum StorageMode {
    /// Device-local; written through a staging upload.
    #[derivative(Default)]
    Private,
    /// Host-visible and written directly.
    Managed,
    /// Shared upload heap. The GPU may only read it, so its state never
    /// changes.
    Upload,
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ResourceState {
    Undefined,
    Common,
    VertexAndConstantBuffer,
    IndexBuffer,
    RenderTarget,
    UnorderedAccess,
    DepthWrite,
    DepthRead,
    ShaderResource,
    CopyDest,
    CopySource,
    GenericRead,
    Present,
}

#[derive(Debug)]
pub(crate) struct ResourceDesc {
    pub(crate) name: Option<String>,
    pub(crate) kind: ResourceKind,
    pub(crate) usage: ResourceUsage,
    pub(crate) storage: StorageMode,
    pub(crate) size: u64,
    pub(crate) count: SubResourceCount,
    pub(crate) layout: Vec<BytesRange>,
    pub(crate) is_depth: bool,
}

/// The API-neutral part of every resource. Handles share it with
/// command lists recording it and with the release pool.
pub struct ResourceCore {
    id: ResourceId,
    device: Arc<Device>,
    name: Option<String>,
    kind: ResourceKind,
    usage: ResourceUsage,
    storage: StorageMode,
    memory: Option<Arc<DeviceMemory>>,
    count: SubResourceCount,
    layout: Vec<BytesRange>,
    state: Mutex<ResourceState>,
    descriptors: SmallVec<(ResourceUsage, Descriptor), 3>,
    // Number of executing command list sets referencing this resource
    in_flight: AtomicU32,
}

impl fmt::Debug for ResourceCore {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ResourceCore")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("usage", &self.usage)
            .field("storage", &self.storage)
            .field("state", &*self.state.lock())
            .finish()
    }
}

impl Named for ResourceCore {
    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

impl ResourceCore {
    pub(crate) fn new(
        device: &Arc<Device>,
        manager: &ResourceManager,
        desc: ResourceDesc,
    ) -> DeviceResult<Arc<Self>> {
        trace!("ResourceCore::new(desc: {:?})", desc);
        let id = device.next_resource_id();

        let mut descriptors = SmallVec::new();
        for &usage in ResourceUsage::DESCRIPTOR_USAGES.iter() {
            if !desc.usage.contains(usage) { continue; }
            let ty = descriptor_heap_type(desc.kind, usage, desc.is_depth)?;
            descriptors.push((usage, manager.create_descriptor(ty, id)?));
        }

        let memory = if desc.kind == ResourceKind::Sampler {
            None
        } else {
            Some(device.gpu().allocate(desc.size).on_device(device)?)
        };

        let state = match (desc.storage, desc.kind) {
            (StorageMode::Upload, _) => ResourceState::GenericRead,
            (_, ResourceKind::Sampler) | (StorageMode::Managed, _) =>
                ResourceState::Common,
            (StorageMode::Private, _) => ResourceState::Undefined,
        };

        Ok(Arc::new(Self {
            id,
            device: Arc::clone(device),
            name: desc.name,
            kind: desc.kind,
            usage: desc.usage,
            storage: desc.storage,
            memory,
            count: desc.count,
            layout: desc.layout,
            state: Mutex::new(state),
            descriptors,
            in_flight: AtomicU32::new(0),
        }))
    }

    /// Creates a plain buffer core with no descriptors, used for upload
    /// and readback staging.
    pub(crate) fn staging(
        device: &Arc<Device>,
        name: &str,
        size: u64,
        storage: StorageMode,
    ) -> DeviceResult<Arc<Self>> {
        let memory = device.gpu().allocate(size).on_device(device)?;
        let state = if storage == StorageMode::Upload {
            ResourceState::GenericRead
        } else {
            ResourceState::Common
        };
        Ok(Arc::new(Self {
            id: device.next_resource_id(),
            device: Arc::clone(device),
            name: Some(name.to_owned()),
            kind: ResourceKind::Buffer,
            usage: ResourceUsage::empty(),
            storage,
            memory: Some(memory),
            count: Default::default(),
            layout: vec![BytesRange::new(0, size)],
            state: Mutex::new(state),
            descriptors: SmallVec::new(),
            in_flight: AtomicU32::new(0),
        }))
    }

    pub fn id(&self) -> ResourceId {
        self.id
    }

    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn usage(&self) -> ResourceUsage {
        self.usage
    }

    pub fn storage(&self) -> StorageMode {
        self.storage
    }

    pub fn size(&self) -> u64 {
        self.memory.as_ref().map_or(0, |mem| mem.size())
    }

    pub(crate) fn memory(&self) -> Option<&Arc<DeviceMemory>> {
        self.memory.as_ref()
    }

    pub fn subresource_count(&self) -> SubResourceCount {
        self.count
    }

    pub fn state(&self) -> ResourceState {
        *self.state.lock()
    }

    /// Upload-heap resources and samplers keep their creation state.
    pub fn is_state_fixed(&self) -> bool {
        self.storage == StorageMode::Upload || self.kind == ResourceKind::Sampler
    }

    pub fn descriptor(&self, usage: ResourceUsage) -> Option<&Descriptor> {
        self.descriptors.iter()
            .find(|(u, _)| *u == usage)
            .map(|(_, desc)| desc)
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &Descriptor> {
        self.descriptors.iter().map(|(_, desc)| desc)
    }

    pub fn in_flight_count(&self) -> u32 {
        self.in_flight.load(Ordering::Acquire)
    }

    pub(crate) fn begin_execution(&self) {
        self.in_flight.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn end_execution(&self) {
        let prev = self.in_flight.fetch_sub(1, Ordering::AcqRel);
        assert!(prev > 0, "unbalanced execution count on {:?}", self);
    }

    /// Transitions the tracked state, adding a barrier to `barriers`
    /// (created on first use). Returns false if nothing was recorded.
    pub fn set_state(
        self: &Arc<Self>,
        state: ResourceState,
        barriers: &mut Option<ResourceBarriers>,
    ) -> bool {
        if self.is_state_fixed() {
            if self.state() != state {
                debug!("keeping fixed state {:?} of {:?}; {:?} requested",
                    self.state(), fmt_named(&**self), state);
            }
            return false;
        }
        let mut current = self.state.lock();
        if *current == state { return false; }
        barriers.get_or_insert_with(Default::default)
            .add_transition(self, *current, state);
        *current = state;
        true
    }

    pub(crate) fn force_state(&self, state: ResourceState) {
        *self.state.lock() = state;
    }

    /// Resolves a sub-resource and optional range within it to absolute
    /// byte offsets.
    pub fn data_range(
        &self,
        index: SubResourceIndex,
        range: Option<BytesRange>,
    ) -> DeviceResult<BytesRange> {
        precondition!(self.memory.is_some(),
            "{:?} has no data storage", fmt_named(self));
        let raw = self.count.raw_index(index)?;
        let sub = self.layout[raw as usize];
        match range {
            None => Ok(sub),
            Some(range) => {
                precondition!(range.fits_within(sub.size),
                    "range {:?} exceeds sub-resource {:?} of {} bytes",
                    range, index, sub.size);
                Ok(BytesRange::new(sub.offset + range.offset, range.size))
            },
        }
    }

    pub(crate) fn write_bytes(&self, offset: u64, data: &[u8]) {
        if let Some(memory) = &self.memory {
            memory.write(offset, data);
        }
    }

    pub(crate) fn read_bytes(&self, offset: u64, len: u64) -> Vec<u8> {
        self.memory.as_ref().map_or_else(Vec::new, |mem| mem.read(offset, len))
    }
}

/// Common interface of resource handles.
pub trait Resource: Named {
    fn core(&self) -> &Arc<ResourceCore>;

    fn context(&self) -> &Arc<Context>;

    fn id(&self) -> ResourceId {
        self.core().id()
    }

    fn kind(&self) -> ResourceKind {
        self.core().kind()
    }

    fn usage(&self) -> ResourceUsage {
        self.core().usage()
    }

    fn state(&self) -> ResourceState {
        self.core().state()
    }

    fn set_state(
        &self,
        state: ResourceState,
        barriers: &mut Option<ResourceBarriers>,
    ) -> bool {
        self.core().set_state(state, barriers)
    }

    fn subresource_count(&self) -> SubResourceCount {
        self.core().subresource_count()
    }

    /// Writes sub-resource data. Private resources are staged and copied
    /// on `queue` at the next upload; host-visible ones are written at
    /// once and must not be referenced by executing command lists.
    fn set_data(
        &self,
        subresources: &[SubResource<'_>],
        queue: &CommandQueue,
    ) -> DeviceResult<()> {
        let core = self.core();
        trace!("Resource::set_data(self: {:?}, subresources: {}, queue: {:?})",
            fmt_named(&**core), subresources.len(), fmt_named(queue));

        let mut regions: SmallVec<(BytesRange, &[u8]), 4> = SmallVec::new();
        for sub in subresources.iter() {
            let target = core.data_range(sub.index, sub.range)?;
            precondition!(sub.data.len() as u64 <= target.size,
                "{} bytes of data do not fit in {:?} of {:?} ({} bytes)",
                sub.data.len(), sub.index, fmt_named(&**core), target.size);
            regions.push((target, sub.data));
        }
        if regions.is_empty() { return Ok(()); }

        if core.storage() != StorageMode::Private {
            precondition!(core.in_flight_count() == 0,
                "{:?} is referenced by executing command lists",
                fmt_named(&**core));
            for (target, data) in regions.iter() {
                core.write_bytes(target.offset, data);
            }
            return Ok(());
        }

        let total = regions.iter().map(|(_, data)| data.len() as u64).sum();
        let staging = ResourceCore::staging(
            core.device(), "upload_staging", total, StorageMode::Upload)?;
        let mut offset = 0;
        for (_, data) in regions.iter() {
            staging.write_bytes(offset, data);
            offset += data.len() as u64;
        }
        queue.record_upload(|list| {
            let mut offset = 0;
            for (target, data) in regions.iter() {
                let len = data.len() as u64;
                list.copy_region(&staging, offset, core, target.offset, len)?;
                offset += len;
            }
            Ok(())
        })?;
        self.context().request_deferred_action(DeferredAction::UploadResources);
        Ok(())
    }

    /// Reads back sub-resource data. Requires `READ_BACK` usage.
    fn get_data(
        &self,
        index: SubResourceIndex,
        range: Option<BytesRange>,
    ) -> DeviceResult<Vec<u8>> {
        let core = self.core();
        trace!("Resource::get_data(self: {:?}, index: {:?}, range: {:?})",
            fmt_named(&**core), index, range);
        precondition!(core.usage().contains(ResourceUsage::READ_BACK),
            "{:?} was not created with READ_BACK usage", fmt_named(&**core));
        let source = core.data_range(index, range)?;
        if core.storage() != StorageMode::Private {
            return Ok(core.read_bytes(source.offset, source.size));
        }

        let context = self.context();
        context.upload_resources()?;
        context.wait_for_gpu(WaitFor::ResourcesUploaded)?;

        let device = core.device();
        let readback = ResourceCore::staging(
            device, "readback_staging", source.size, StorageMode::Managed)?;
        let list = CommandList::new(
            device, CommandListType::Blit, Some("readback".to_owned()));
        list.copy_region(core, source.offset, &readback, 0, source.size)?;
        list.commit(false)?;
        let set = CommandListSet::new(vec![list], None)?;
        context.upload_queue().execute(&set, None)?;
        set.wait_for_gpu()?;
        Ok(readback.read_bytes(0, source.size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::*;

    #[test]
    fn fixed_state_skips_transitions() {
        let vars = TestVars::new();
        let upload = vars.context.create_buffer(BufferSettings {
            storage: StorageMode::Upload,
            size: 64,
            ..Default::default()
        }).unwrap();
        assert_eq!(upload.state(), ResourceState::GenericRead);
        let mut barriers = None;
        assert!(!upload.set_state(ResourceState::CopyDest, &mut barriers));
        assert!(barriers.is_none());
        assert_eq!(upload.state(), ResourceState::GenericRead);

        let private = vars.context.create_buffer(BufferSettings {
            size: 64,
            ..Default::default()
        }).unwrap();
        assert_eq!(private.state(), ResourceState::Undefined);
        assert!(private.set_state(ResourceState::CopyDest, &mut barriers));
        assert!(!private.set_state(ResourceState::CopyDest, &mut barriers));
        assert_eq!(barriers.as_ref().unwrap().len(), 1);
        assert_eq!(private.state(), ResourceState::CopyDest);
    }

    #[test]
    fn descriptors_follow_usage() {
        let vars = TestVars::new();
        let texture = vars.context.create_texture(TextureSettings {
            extent: (16, 16).into(),
            format: PixelFormat::Rgba8Unorm,
            usage: ResourceUsage::SHADER_READ | ResourceUsage::RENDER_TARGET,
            ..Default::default()
        }).unwrap();
        let core = texture.core();
        assert_eq!(core.descriptors().count(), 2);
        assert_eq!(core.descriptor(ResourceUsage::RENDER_TARGET).unwrap()
            .heap_type(), DescriptorHeapType::RenderTargets);
        assert_eq!(core.descriptor(ResourceUsage::SHADER_READ).unwrap()
            .heap_type(), DescriptorHeapType::ShaderResources);
        assert!(core.descriptor(ResourceUsage::SHADER_WRITE).is_none());

        let depth = vars.context.create_texture(TextureSettings {
            extent: (16, 16).into(),
            format: PixelFormat::Depth32Float,
            usage: ResourceUsage::RENDER_TARGET,
            ..Default::default()
        }).unwrap();
        assert_eq!(depth.core().descriptor(ResourceUsage::RENDER_TARGET)
            .unwrap().heap_type(), DescriptorHeapType::DepthStencil);
    }

    #[test]
    fn get_data_requires_read_back() {
        let vars = TestVars::new();
        let buffer = vars.context.create_buffer(BufferSettings {
            size: 16,
            ..Default::default()
        }).unwrap();
        let err = buffer.get_data(Default::default(), None).unwrap_err();
        assert!(err.is_precondition(), "{}", err);
    }

    #[test]
    fn private_round_trip() {
        let vars = TestVars::new();
        let context = &vars.context;
        let buffer = context.create_buffer(BufferSettings {
            size: 32,
            usage: ResourceUsage::READ_BACK,
            ..Default::default()
        }).unwrap();

        let data: Vec<u8> = (0..8).collect();
        let range = BytesRange::new(8, 8);
        buffer.set_data(&[SubResource {
            data: &data,
            index: Default::default(),
            range: Some(range),
        }], context.upload_queue()).unwrap();
        assert_eq!(context.deferred_action(), DeferredAction::UploadResources);

        let read = buffer.get_data(Default::default(), Some(range)).unwrap();
        assert_eq!(read, data);
        let whole = buffer.get_data(Default::default(), None).unwrap();
        assert_eq!(whole.len(), 32);
        assert_eq!(&whole[..8], &[0; 8]);
        assert_eq!(&whole[8..16], &data[..]);

        let err = buffer.get_data(Default::default(), Some(BytesRange::new(30, 4)))
            .unwrap_err();
        assert!(err.is_precondition());
    }

    #[test]
    fn overflowing_ranges_are_rejected() {
        let vars = TestVars::new();
        let context = &vars.context;
        let buffer = context.create_buffer(BufferSettings {
            size: 32,
            usage: ResourceUsage::READ_BACK,
            ..Default::default()
        }).unwrap();
        let range = BytesRange::new(u64::MAX, 2);

        let err = buffer.get_data(Default::default(), Some(range)).unwrap_err();
        assert!(err.is_precondition(), "{}", err);
        let err = buffer.set_data(&[SubResource {
            data: &[1, 2],
            index: Default::default(),
            range: Some(range),
        }], context.upload_queue()).unwrap_err();
        assert!(err.is_precondition(), "{}", err);
        assert!(!context.upload_queue().has_pending_uploads());
    }

    #[test]
    fn managed_writes_wait_for_gpu() {
        let vars = TestVars::manual(BackendKind::DirectX12);
        let context = &vars.context;
        let buffer = context.create_buffer(BufferSettings {
            storage: StorageMode::Managed,
            size: 4,
            usage: ResourceUsage::READ_BACK,
            ..Default::default()
        }).unwrap();
        let other = context.create_buffer(BufferSettings {
            storage: StorageMode::Managed,
            size: 4,
            ..Default::default()
        }).unwrap();

        let list = context.create_command_list(CommandListType::Blit, None);
        list.copy_buffer(&other, 0, &buffer, 0, 4).unwrap();
        list.commit(false).unwrap();
        let set = CommandListSet::new(vec![list], None).unwrap();
        context.upload_queue().execute(&set, None).unwrap();

        let sub = SubResource::new(&[1, 2, 3, 4]);
        let err = buffer.set_data(&[sub], context.upload_queue()).unwrap_err();
        assert!(err.is_precondition());

        vars.gpu().retire_all();
        context.upload_queue().complete_execution(None).unwrap();
        buffer.set_data(&[sub], context.upload_queue()).unwrap();
        assert_eq!(buffer.get_data(Default::default(), None).unwrap(),
            [1, 2, 3, 4]);
    }
}
