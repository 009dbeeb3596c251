use base::EnumVector;
use enum_map::Enum;

use crate::*;

mod heap;
mod manager;

pub use heap::*;
pub use manager::*;

#[derive(Clone, Copy, Debug, Enum, Eq, Hash, PartialEq)]
pub enum DescriptorHeapType {
    ShaderResources,
    Samplers,
    RenderTargets,
    DepthStencil,
}

pub type DescriptorCounts = EnumVector<DescriptorHeapType, u32>;

impl DescriptorHeapType {
    /// Render target and depth-stencil descriptors are CPU-only.
    pub fn can_be_shader_visible(self) -> bool {
        matches!(self, Self::ShaderResources | Self::Samplers)
    }
}

/// Chooses the heap holding descriptors of a resource `kind` bound with
/// the single usage bit `usage`.
pub fn descriptor_heap_type(
    kind: ResourceKind,
    usage: ResourceUsage,
    is_depth: bool,
) -> DeviceResult<DescriptorHeapType> {
    use DescriptorHeapType as Ty;
    use ResourceKind as K;
    let ty = if usage == ResourceUsage::RENDER_TARGET {
        match kind {
            K::Texture if is_depth => Some(Ty::DepthStencil),
            K::Texture => Some(Ty::RenderTargets),
            _ => None,
        }
    } else if usage == ResourceUsage::SHADER_READ {
        match kind {
            K::Sampler => Some(Ty::Samplers),
            K::Buffer | K::Texture => Some(Ty::ShaderResources),
        }
    } else if usage == ResourceUsage::SHADER_WRITE {
        match kind {
            K::Buffer | K::Texture => Some(Ty::ShaderResources),
            K::Sampler => None,
        }
    } else {
        None
    };
    ty.ok_or_else(|| Error::Precondition(format!(
        "no descriptor heap for {:?} used as {:?}", kind, usage,
    )))
}
