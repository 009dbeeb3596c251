use std::sync::Arc;

use parking_lot::Mutex;

use crate::*;

#[derive(Debug, Default)]
struct PoolState {
    frames: Vec<Vec<Arc<ResourceCore>>>,
    frame_index: usize,
    released: bool,
}

/// Keeps dropped resources alive until the frame that dropped them has
/// finished on the GPU.
#[derive(Debug)]
pub struct ReleasePool {
    state: Mutex<PoolState>,
}

impl ReleasePool {
    pub fn new(frame_count: u32) -> Self {
        let frame_count = frame_count.max(1) as usize;
        Self {
            state: Mutex::new(PoolState {
                frames: vec![Vec::new(); frame_count],
                ..Default::default()
            }),
        }
    }

    pub fn frame_count(&self) -> usize {
        self.state.lock().frames.len()
    }

    /// Total number of resources waiting for release.
    pub fn len(&self) -> usize {
        self.state.lock().frames.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Queues `core` for release with the current frame. After teardown,
    /// the core is dropped at once.
    pub fn add(&self, core: Arc<ResourceCore>) {
        let mut state = self.state.lock();
        if state.released {
            return;
        }
        let index = state.frame_index;
        state.frames[index].push(core);
    }

    pub fn set_frame_index(&self, index: u32) {
        let mut state = self.state.lock();
        assert!((index as usize) < state.frames.len(),
            "frame index {} out of range", index);
        state.frame_index = index as usize;
    }

    /// Drops resources queued during frame `index`. The caller must have
    /// drained that frame's GPU work first.
    pub fn release_frame(&self, index: u32) {
        // Drop outside the lock; descriptors lock their heaps
        let released = {
            let mut state = self.state.lock();
            match state.frames.get_mut(index as usize) {
                Some(frame) => std::mem::take(frame),
                None => return,
            }
        };
        if !released.is_empty() {
            debug!("releasing {} resources of frame {}", released.len(), index);
        }
    }

    /// Drops everything and turns further additions into immediate
    /// drops.
    pub fn release_all(&self) {
        let released: Vec<_> = {
            let mut state = self.state.lock();
            state.released = true;
            state.frames.iter_mut().flat_map(std::mem::take).collect()
        };
        debug!("releasing all {} pooled resources", released.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::*;

    #[test]
    fn frames_release_independently() {
        let vars = TestVars::new();
        let pool = ReleasePool::new(2);
        let make = || ResourceCore::staging(
            vars.context.device(), "pooled", 4, StorageMode::Managed).unwrap();

        let first = make();
        let weak_first = Arc::downgrade(&first);
        pool.add(first);
        pool.set_frame_index(1);
        let second = make();
        let weak_second = Arc::downgrade(&second);
        pool.add(second);
        assert_eq!(pool.len(), 2);

        pool.release_frame(0);
        assert!(weak_first.upgrade().is_none());
        assert!(weak_second.upgrade().is_some());

        pool.release_all();
        assert!(weak_second.upgrade().is_none());

        let late = make();
        let weak_late = Arc::downgrade(&late);
        pool.add(late);
        assert!(weak_late.upgrade().is_none());
        assert!(pool.is_empty());
    }
}
