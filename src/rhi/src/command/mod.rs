use std::sync::Arc;

use derivative::Derivative;

use crate::*;

mod list;
mod parallel;
mod queue;
mod set;

pub use list::*;
pub use parallel::*;
pub use queue::*;
pub use set::*;

/// Command list and queue classes.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum CommandListType {
    /// Draws, copies, and presentation.
    Render,
    /// Render lists recorded concurrently and submitted together.
    ParallelRender,
    /// Copies only.
    Blit,
}

impl CommandListType {
    /// Whether a queue of this type can execute lists of type `list`.
    pub fn supports(self, list: CommandListType) -> bool {
        match self {
            Self::Render | Self::ParallelRender => true,
            Self::Blit => list == Self::Blit,
        }
    }

    pub fn is_render(self) -> bool {
        self != Self::Blit
    }
}

#[derive(Clone, Copy, Debug, Derivative, Eq, Hash, PartialEq)]
#[derivative(Default)]
pub struct DrawArgs {
    pub index_count: u32,
    pub start_index: u32,
    pub start_vertex: u32,
    #[derivative(Default(value = "1"))]
    pub instance_count: u32,
}

#[derive(Clone, Debug)]
pub(crate) struct CopyRegion {
    pub(crate) src: Arc<DeviceMemory>,
    pub(crate) src_offset: u64,
    pub(crate) dst: Arc<DeviceMemory>,
    pub(crate) dst_offset: u64,
    pub(crate) size: u64,
}

/// A recorded command in backend-neutral form, except for barriers
/// which are already translated.
#[derive(Clone, Debug)]
pub(crate) enum Command {
    Barriers(Vec<NativeBarrier>),
    Copy(CopyRegion),
    SetRenderState(ResourceId),
    SetProgramBindings(ResourceId),
    SetVertexBuffers(SmallVec<ResourceId, 4>),
    SetIndexBuffer(ResourceId),
    DrawIndexed(DrawArgs),
    PushDebugGroup(String),
    PopDebugGroup,
    Present,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_compatibility() {
        use CommandListType::*;
        assert!(Render.supports(Blit));
        assert!(Render.supports(ParallelRender));
        assert!(ParallelRender.supports(Render));
        assert!(Blit.supports(Blit));
        assert!(!Blit.supports(Render));
        assert!(!Blit.supports(ParallelRender));
    }
}
