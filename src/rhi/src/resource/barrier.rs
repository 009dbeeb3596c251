use std::sync::Arc;

use crate::*;

/// An API-neutral state transition of one resource.
#[derive(Clone, Debug)]
pub struct ResourceBarrier {
    resource: Arc<ResourceCore>,
    before: ResourceState,
    after: ResourceState,
}

impl ResourceBarrier {
    pub fn new(
        resource: Arc<ResourceCore>,
        before: ResourceState,
        after: ResourceState,
    ) -> Self {
        Self { resource, before, after }
    }

    pub fn resource(&self) -> &Arc<ResourceCore> {
        &self.resource
    }

    pub fn before(&self) -> ResourceState {
        self.before
    }

    pub fn after(&self) -> ResourceState {
        self.after
    }
}

/// An ordered set of transitions with at most one entry per resource.
#[derive(Clone, Debug, Default)]
pub struct ResourceBarriers {
    barriers: Vec<ResourceBarrier>,
}

impl ResourceBarriers {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn is_empty(&self) -> bool {
        self.barriers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.barriers.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResourceBarrier> {
        self.barriers.iter()
    }

    /// Adds a transition. A second transition of the same resource is
    /// folded into the first; a fold ending where it started cancels.
    pub fn add_transition(
        &mut self,
        resource: &Arc<ResourceCore>,
        before: ResourceState,
        after: ResourceState,
    ) {
        let pos = self.barriers.iter()
            .position(|b| Arc::ptr_eq(&b.resource, resource));
        match pos {
            Some(pos) => {
                self.barriers[pos].after = after;
                if self.barriers[pos].before == after {
                    self.barriers.remove(pos);
                }
            },
            None if before != after => self.barriers.push(
                ResourceBarrier::new(Arc::clone(resource), before, after)),
            None => {},
        }
    }

    pub fn remove(&mut self, resource: &Arc<ResourceCore>) -> bool {
        let len = self.barriers.len();
        self.barriers.retain(|b| !Arc::ptr_eq(&b.resource, resource));
        self.barriers.len() != len
    }
}
