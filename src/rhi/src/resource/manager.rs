use std::sync::{Arc, Weak};

use derivative::Derivative;
use fnv::FnvHashMap;
use parking_lot::{Mutex, MutexGuard};

use crate::*;

#[derive(Clone, Debug, Derivative)]
#[derivative(Default)]
pub struct ResourceManagerSettings {
    pub deferred_heap_allocation: bool,
    /// Sizes of the CPU-only heaps receiving resource descriptors.
    #[derivative(Default(value = "default_heap_sizes()"))]
    pub default_heap_sizes: DescriptorCounts,
    /// Sizes of the heaps receiving program bindings tables.
    #[derivative(Default(value = "shader_visible_heap_sizes()"))]
    pub shader_visible_heap_sizes: DescriptorCounts,
}

fn default_heap_sizes() -> DescriptorCounts {
    base::enum_vec! {
        DescriptorHeapType::ShaderResources => 256,
        DescriptorHeapType::Samplers => 32,
        DescriptorHeapType::RenderTargets => 32,
        DescriptorHeapType::DepthStencil => 8,
    }
}

fn shader_visible_heap_sizes() -> DescriptorCounts {
    base::enum_vec! {
        DescriptorHeapType::ShaderResources => 1024,
        DescriptorHeapType::Samplers => 128,
        DescriptorHeapType::RenderTargets => 0,
        DescriptorHeapType::DepthStencil => 0,
    }
}

/// Owns the descriptor heaps and release pool of a context and keeps a
/// registry of live program bindings.
#[derive(Debug)]
pub struct ResourceManager {
    descriptors: Mutex<DescriptorManager>,
    bindings: Mutex<FnvHashMap<usize, Weak<ProgramBindings>>>,
    release_pool: ReleasePool,
}

fn bindings_key(bindings: &ProgramBindings) -> usize {
    bindings as *const ProgramBindings as usize
}

impl ResourceManager {
    pub fn new(frame_count: u32) -> Self {
        Self {
            descriptors: Default::default(),
            bindings: Default::default(),
            release_pool: ReleasePool::new(frame_count),
        }
    }

    /// Creates the default heaps of every type.
    pub fn initialize(&self, settings: &ResourceManagerSettings) ->
        DeviceResult<()>
    {
        trace!("ResourceManager::initialize(settings: {:?})", settings);
        let deferred = settings.deferred_heap_allocation;
        let mut descriptors = self.descriptors.lock();
        precondition!(descriptors.is_empty(),
            "resource manager is already initialized");
        *descriptors = DescriptorManager::new(deferred);
        for (ty, &size) in settings.default_heap_sizes.iter() {
            descriptors.create_descriptor_heap(DescriptorHeapSettings {
                ty,
                size,
                deferred_allocation: deferred,
                shader_visible: false,
            })?;
        }
        for (ty, &size) in settings.shader_visible_heap_sizes.iter() {
            if !ty.can_be_shader_visible() { continue; }
            descriptors.create_descriptor_heap(DescriptorHeapSettings {
                ty,
                size,
                deferred_allocation: deferred,
                shader_visible: true,
            })?;
        }
        Ok(())
    }

    pub fn descriptor_manager(&self) -> MutexGuard<'_, DescriptorManager> {
        self.descriptors.lock()
    }

    pub fn release_pool(&self) -> &ReleasePool {
        &self.release_pool
    }

    pub fn deferred_heap_allocation(&self) -> bool {
        self.descriptors.lock().deferred_allocation()
    }

    /// Switches allocation policy. Pending allocations are completed
    /// either way.
    pub fn set_deferred_heap_allocation(&self, deferred: bool) ->
        DeviceResult<()>
    {
        trace!("ResourceManager::set_deferred_heap_allocation(deferred: {})",
            deferred);
        let changed = {
            let mut descriptors = self.descriptors.lock();
            let changed = descriptors.deferred_allocation() != deferred;
            descriptors.set_deferred_heap_allocation(deferred);
            changed
        };
        if changed {
            self.complete_initialization()?;
        }
        Ok(())
    }

    /// Reserves descriptor tables of every live program bindings which
    /// does not have them yet, then allocates all heaps.
    pub fn complete_initialization(&self) -> DeviceResult<()> {
        trace!("ResourceManager::complete_initialization()");
        for bindings in self.live_program_bindings() {
            bindings.reserve_descriptors(self)?;
        }
        self.descriptors.lock().allocate_heaps();
        Ok(())
    }

    pub(crate) fn create_descriptor(
        &self,
        ty: DescriptorHeapType,
        resource: ResourceId,
    ) -> DeviceResult<Descriptor> {
        let heap = Arc::clone(self.descriptors.lock().default_descriptor_heap(ty)?);
        Descriptor::new(&heap, resource)
    }

    pub(crate) fn reserve_shader_visible_range(
        &self,
        ty: DescriptorHeapType,
        len: u32,
    ) -> DeviceResult<DescriptorRange> {
        let heap = Arc::clone(self.descriptors.lock()
            .default_shader_visible_descriptor_heap(ty)?);
        DescriptorRange::new(&heap, len)
    }

    /// Current heap sizes by type; see `DescriptorManager::heap_sizes`.
    pub fn get_descriptor_heap_sizes(
        &self,
        get_allocated: bool,
        for_shader_visible: bool,
    ) -> DescriptorCounts {
        self.descriptors.lock().heap_sizes(get_allocated, for_shader_visible)
    }

    pub fn add_program_bindings(&self, bindings: &Arc<ProgramBindings>) {
        let key = bindings_key(bindings);
        self.bindings.lock().insert(key, Arc::downgrade(bindings));
    }

    pub fn remove_program_bindings(&self, bindings: &ProgramBindings) {
        self.bindings.lock().remove(&bindings_key(bindings));
    }

    /// Strong references to all registered bindings still alive.
    /// Expired entries are pruned.
    pub fn live_program_bindings(&self) -> Vec<Arc<ProgramBindings>> {
        let mut registry = self.bindings.lock();
        let live: Vec<_> = registry.values().filter_map(Weak::upgrade).collect();
        let expired = registry.len() - live.len();
        if expired > 0 {
            debug!("pruning {} expired program bindings", expired);
            registry.retain(|_, weak| weak.strong_count() > 0);
        }
        live
    }

    pub fn program_bindings_count(&self) -> usize {
        self.bindings.lock().len()
    }

    /// Releases heaps and pooled resources. Must run before the device
    /// is destroyed.
    pub fn release(&self) {
        debug!("releasing resource manager");
        self.bindings.lock().clear();
        self.release_pool.release_all();
        self.descriptors.lock().release();
    }
}
