use std::sync::Arc;

use enum_map::EnumMap;
use parking_lot::Mutex;

use crate::*;

type HeapRef = Arc<Mutex<DescriptorHeap>>;

/// Owns every descriptor heap of a context, grouped by type.
#[derive(Debug, Default)]
pub struct DescriptorManager {
    heaps: EnumMap<DescriptorHeapType, Vec<HeapRef>>,
    deferred_allocation: bool,
}

impl DescriptorManager {
    pub fn new(deferred_allocation: bool) -> Self {
        Self {
            heaps: Default::default(),
            deferred_allocation,
        }
    }

    pub fn deferred_allocation(&self) -> bool {
        self.deferred_allocation
    }

    /// Creates a heap and returns its index among heaps of its type.
    pub fn create_descriptor_heap(
        &mut self,
        settings: DescriptorHeapSettings,
    ) -> DeviceResult<u32> {
        trace!("DescriptorManager::create_descriptor_heap(settings: {:?})",
            settings);
        let heaps = &mut self.heaps[settings.ty];
        let index = heaps.len() as u32;
        let heap = DescriptorHeap::new(settings, index)?;
        heaps.push(Arc::new(Mutex::new(heap)));
        Ok(index)
    }

    pub fn get_descriptor_heap(&self, ty: DescriptorHeapType, index: u32) ->
        DeviceResult<&HeapRef>
    {
        let heaps = &self.heaps[ty];
        heaps.get(index as usize).ok_or_else(|| Error::Precondition(format!(
            "{:?} descriptor heap index {} out of range (have {})",
            ty, index, heaps.len(),
        )))
    }

    fn first_heap(&self, ty: DescriptorHeapType, shader_visible: bool) ->
        DeviceResult<&HeapRef>
    {
        self.heaps[ty].iter()
            .find(|heap| heap.lock().is_shader_visible() == shader_visible)
            .ok_or_else(|| Error::Precondition(format!(
                "no {}{:?} descriptor heap",
                if shader_visible { "shader-visible " } else { "" }, ty,
            )))
    }

    /// Heap receiving resource descriptors of type `ty`.
    pub fn default_descriptor_heap(&self, ty: DescriptorHeapType) ->
        DeviceResult<&HeapRef>
    {
        self.first_heap(ty, false)
    }

    /// Heap receiving program bindings tables of type `ty`.
    pub fn default_shader_visible_descriptor_heap(
        &self,
        ty: DescriptorHeapType,
    ) -> DeviceResult<&HeapRef> {
        self.first_heap(ty, true)
    }

    pub fn heaps(&self) -> impl Iterator<Item = &HeapRef> {
        self.heaps.values().flatten()
    }

    pub fn set_deferred_heap_allocation(&mut self, deferred: bool) {
        self.deferred_allocation = deferred;
        for heap in self.heaps() {
            heap.lock().set_deferred_allocation(deferred);
        }
    }

    /// Allocates every heap at its current deferred size.
    pub fn allocate_heaps(&mut self) {
        for heap in self.heaps() {
            heap.lock().allocate();
        }
    }

    /// Sums heap sizes by type. With `get_allocated`, reports the sizes
    /// last allocated; otherwise the sizes currently required.
    pub fn heap_sizes(&self, get_allocated: bool, for_shader_visible: bool) ->
        DescriptorCounts
    {
        let mut sizes = DescriptorCounts::zero();
        for (ty, heaps) in self.heaps.iter() {
            for heap in heaps.iter() {
                let heap = heap.lock();
                if heap.is_shader_visible() != for_shader_visible { continue; }
                sizes[ty] += if get_allocated {
                    heap.allocated_size()
                } else {
                    heap.deferred_size()
                };
            }
        }
        sizes
    }

    /// Drops every heap. Outstanding descriptors become inert.
    pub fn release(&mut self) {
        debug!("releasing {} descriptor heaps", self.heaps().count());
        for heaps in self.heaps.values_mut() {
            heaps.clear();
        }
    }

    pub fn is_empty(&self) -> bool {
        self.heaps().next().is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(ty: DescriptorHeapType, size: u32, shader_visible: bool) ->
        DescriptorHeapSettings
    {
        DescriptorHeapSettings {
            ty,
            size,
            deferred_allocation: true,
            shader_visible,
        }
    }

    #[test]
    fn create_and_lookup() {
        use DescriptorHeapType as Ty;
        let mut manager = DescriptorManager::new(true);
        assert_eq!(manager.create_descriptor_heap(
            settings(Ty::ShaderResources, 8, false)).unwrap(), 0);
        assert_eq!(manager.create_descriptor_heap(
            settings(Ty::ShaderResources, 16, true)).unwrap(), 1);
        assert_eq!(manager.create_descriptor_heap(
            settings(Ty::Samplers, 4, true)).unwrap(), 0);

        let visible = manager
            .default_shader_visible_descriptor_heap(Ty::ShaderResources)
            .unwrap();
        assert_eq!(visible.lock().index(), 1);
        assert!(manager.get_descriptor_heap(Ty::Samplers, 1).is_err());
        assert!(manager
            .default_shader_visible_descriptor_heap(Ty::RenderTargets)
            .unwrap_err().is_precondition());

        let requested = manager.heap_sizes(false, true);
        assert_eq!(requested[Ty::ShaderResources], 16);
        assert_eq!(requested[Ty::Samplers], 4);
        assert!(manager.heap_sizes(true, true).is_zero());

        manager.allocate_heaps();
        assert_eq!(manager.heap_sizes(true, false)[Ty::ShaderResources], 8);

        manager.release();
        assert!(manager.is_empty());
    }

    #[test]
    fn toggling_deferred_allocation() {
        use DescriptorHeapType as Ty;
        let mut manager = DescriptorManager::new(true);
        manager.create_descriptor_heap(settings(Ty::Samplers, 1, false))
            .unwrap();
        let heap = Arc::clone(manager.get_descriptor_heap(Ty::Samplers, 0)
            .unwrap());
        heap.lock().add_resource(ResourceId(1)).unwrap();
        heap.lock().add_resource(ResourceId(2)).unwrap();

        manager.set_deferred_heap_allocation(false);
        assert!(!manager.deferred_allocation());
        assert_eq!(heap.lock().allocated_size(), 2);
        assert!(heap.lock().add_resource(ResourceId(3)).is_err());
    }
}
