use std::ops::Range;
use std::sync::{Arc, Weak};

use base::RangeSet;
use derivative::Derivative;
use fnv::FnvHashMap;
use parking_lot::Mutex;

use crate::*;

#[derive(Clone, Copy, Debug, Derivative, Eq, PartialEq)]
#[derivative(Default)]
pub struct DescriptorHeapSettings {
    #[derivative(Default(value = "DescriptorHeapType::ShaderResources"))]
    pub ty: DescriptorHeapType,
    pub size: u32,
    /// Lets the heap grow past `size`. Growth is realised by the next
    /// `allocate`.
    pub deferred_allocation: bool,
    pub shader_visible: bool,
}

/// A typed array of descriptor slots.
#[derive(Debug)]
pub struct DescriptorHeap {
    settings: DescriptorHeapSettings,
    index: u32,
    // Size including deferred growth.
    deferred_size: u32,
    // Size of the native heap as last allocated.
    allocated_size: u32,
    free: RangeSet,
    resources: FnvHashMap<u32, ResourceId>,
}

impl DescriptorHeap {
    pub(crate) fn new(settings: DescriptorHeapSettings, index: u32) ->
        DeviceResult<Self>
    {
        precondition!(
            !settings.shader_visible || settings.ty.can_be_shader_visible(),
            "{:?} descriptor heaps cannot be shader-visible", settings.ty,
        );
        let mut heap = Self {
            settings,
            index,
            deferred_size: settings.size,
            allocated_size: 0,
            free: RangeSet::from(0..settings.size),
            resources: Default::default(),
        };
        if !settings.deferred_allocation {
            heap.allocate();
        }
        Ok(heap)
    }

    pub fn settings(&self) -> &DescriptorHeapSettings {
        &self.settings
    }

    pub fn ty(&self) -> DescriptorHeapType {
        self.settings.ty
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn is_shader_visible(&self) -> bool {
        self.settings.shader_visible
    }

    pub fn is_deferred(&self) -> bool {
        self.settings.deferred_allocation
    }

    pub fn deferred_size(&self) -> u32 {
        self.deferred_size
    }

    pub fn allocated_size(&self) -> u32 {
        self.allocated_size
    }

    pub fn used_size(&self) -> u32 {
        self.deferred_size - self.free.len()
    }

    pub fn is_allocated(&self) -> bool {
        self.allocated_size == self.deferred_size
    }

    pub fn resource_at(&self, slot: u32) -> Option<ResourceId> {
        self.resources.get(&slot).copied()
    }

    pub(crate) fn set_deferred_allocation(&mut self, deferred: bool) {
        self.settings.deferred_allocation = deferred;
        if !deferred {
            self.allocate();
        }
    }

    fn grow(&mut self, count: u32) -> DeviceResult<()> {
        precondition!(self.settings.deferred_allocation,
            "{:?} descriptor heap #{} is full ({} descriptors)",
            self.ty(), self.index, self.deferred_size);
        debug!("growing {:?} descriptor heap #{} from {} to {}",
            self.ty(), self.index, self.deferred_size,
            self.deferred_size + count);
        self.free.add(self.deferred_size..self.deferred_size + count);
        self.deferred_size += count;
        Ok(())
    }

    // Number of free slots at the end of the heap.
    fn free_tail(&self) -> u32 {
        self.free.iter().last()
            .filter(|r| r.end == self.deferred_size)
            .map_or(0, |r| r.end - r.start)
    }

    /// Takes the lowest free slot for `resource`.
    pub fn add_resource(&mut self, resource: ResourceId) -> DeviceResult<u32> {
        trace!("DescriptorHeap::add_resource(ty: {:?}, index: {}, resource: {})",
            self.ty(), self.index, resource);
        if self.free.is_empty() {
            self.grow(1)?;
        }
        let slot = self.free.take_first_fit(1)
            .ok_or_else(|| Error::Precondition(format!(
                "no free slot in {:?} descriptor heap #{}",
                self.ty(), self.index)))?
            .start;
        self.resources.insert(slot, resource);
        Ok(slot)
    }

    pub fn remove_resource(&mut self, slot: u32) {
        trace!("DescriptorHeap::remove_resource(ty: {:?}, index: {}, slot: {})",
            self.ty(), self.index, slot);
        assert!(slot < self.deferred_size && !self.free.contains(slot),
            "slot {} of {:?} descriptor heap #{} is not in use",
            slot, self.ty(), self.index);
        self.resources.remove(&slot);
        self.free.add(slot..slot + 1);
    }

    /// Reserves `len` contiguous slots.
    pub fn reserve_range(&mut self, len: u32) -> DeviceResult<Range<u32>> {
        trace!("DescriptorHeap::reserve_range(ty: {:?}, index: {}, len: {})",
            self.ty(), self.index, len);
        precondition!(len > 0, "cannot reserve an empty descriptor range");
        if let Some(range) = self.free.take_first_fit(len) {
            return Ok(range);
        }
        let tail = self.free_tail();
        self.grow(len - tail)?;
        self.free.take_first_fit(len).ok_or_else(|| Error::Precondition(
            format!("no room for {} descriptors in {:?} heap #{}",
                len, self.ty(), self.index)))
    }

    pub fn release_range(&mut self, range: Range<u32>) {
        trace!("DescriptorHeap::release_range(ty: {:?}, index: {}, range: {:?})",
            self.ty(), self.index, range);
        assert!(range.end <= self.deferred_size);
        self.free.add(range);
    }

    /// Re-creates the heap at its deferred size.
    pub fn allocate(&mut self) {
        if self.allocated_size != self.deferred_size {
            debug!("allocating {:?} descriptor heap #{} with {} descriptors",
                self.ty(), self.index, self.deferred_size);
        }
        self.allocated_size = self.deferred_size;
    }
}

/// A single descriptor slot. The slot is returned to its heap on drop,
/// unless the heap has been released first.
#[derive(Debug)]
pub struct Descriptor {
    heap: Weak<Mutex<DescriptorHeap>>,
    heap_type: DescriptorHeapType,
    heap_index: u32,
    slot: u32,
}

impl Drop for Descriptor {
    fn drop(&mut self) {
        if let Some(heap) = self.heap.upgrade() {
            heap.lock().remove_resource(self.slot);
        }
    }
}

impl Descriptor {
    pub(crate) fn new(
        heap: &Arc<Mutex<DescriptorHeap>>,
        resource: ResourceId,
    ) -> DeviceResult<Self> {
        let mut guard = heap.lock();
        let slot = guard.add_resource(resource)?;
        Ok(Self {
            heap: Arc::downgrade(heap),
            heap_type: guard.ty(),
            heap_index: guard.index(),
            slot,
        })
    }

    pub fn heap_type(&self) -> DescriptorHeapType {
        self.heap_type
    }

    pub fn heap_index(&self) -> u32 {
        self.heap_index
    }

    pub fn slot(&self) -> u32 {
        self.slot
    }
}

/// A contiguous run of slots, returned to its heap on drop.
#[derive(Debug)]
pub struct DescriptorRange {
    heap: Weak<Mutex<DescriptorHeap>>,
    heap_type: DescriptorHeapType,
    range: Range<u32>,
}

impl Drop for DescriptorRange {
    fn drop(&mut self) {
        if let Some(heap) = self.heap.upgrade() {
            heap.lock().release_range(self.range.clone());
        }
    }
}

impl DescriptorRange {
    pub(crate) fn new(heap: &Arc<Mutex<DescriptorHeap>>, len: u32) ->
        DeviceResult<Self>
    {
        let mut guard = heap.lock();
        let range = guard.reserve_range(len)?;
        Ok(Self {
            heap: Arc::downgrade(heap),
            heap_type: guard.ty(),
            range,
        })
    }

    pub fn heap_type(&self) -> DescriptorHeapType {
        self.heap_type
    }

    pub fn range(&self) -> Range<u32> {
        self.range.clone()
    }

    pub fn len(&self) -> u32 {
        self.range.end - self.range.start
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
