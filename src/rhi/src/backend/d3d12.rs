use bitflags::bitflags;

use crate::*;

bitflags! {
    #[derive(Default)]
    pub struct D3D12ResourceStates: u32 {
        const COMMON = 0;
        const VERTEX_AND_CONSTANT_BUFFER = 0x1;
        const INDEX_BUFFER = 0x2;
        const RENDER_TARGET = 0x4;
        const UNORDERED_ACCESS = 0x8;
        const DEPTH_WRITE = 0x10;
        const DEPTH_READ = 0x20;
        const NON_PIXEL_SHADER_RESOURCE = 0x40;
        const PIXEL_SHADER_RESOURCE = 0x80;
        const INDIRECT_ARGUMENT = 0x200;
        const COPY_DEST = 0x400;
        const COPY_SOURCE = 0x800;
        const GENERIC_READ = Self::VERTEX_AND_CONSTANT_BUFFER.bits
            | Self::INDEX_BUFFER.bits
            | Self::NON_PIXEL_SHADER_RESOURCE.bits
            | Self::PIXEL_SHADER_RESOURCE.bits
            | Self::INDIRECT_ARGUMENT.bits
            | Self::COPY_SOURCE.bits;
        const PRESENT = 0;
    }
}

pub fn d3d12_resource_states(state: ResourceState) -> D3D12ResourceStates {
    type S = D3D12ResourceStates;
    match state {
        ResourceState::Undefined | ResourceState::Common => S::COMMON,
        ResourceState::VertexAndConstantBuffer =>
            S::VERTEX_AND_CONSTANT_BUFFER,
        ResourceState::IndexBuffer => S::INDEX_BUFFER,
        ResourceState::RenderTarget => S::RENDER_TARGET,
        ResourceState::UnorderedAccess => S::UNORDERED_ACCESS,
        ResourceState::DepthWrite => S::DEPTH_WRITE,
        ResourceState::DepthRead => S::DEPTH_READ,
        ResourceState::ShaderResource =>
            S::NON_PIXEL_SHADER_RESOURCE | S::PIXEL_SHADER_RESOURCE,
        ResourceState::CopyDest => S::COPY_DEST,
        ResourceState::CopySource => S::COPY_SOURCE,
        ResourceState::GenericRead => S::GENERIC_READ,
        ResourceState::Present => S::PRESENT,
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct D3D12Backend;

impl Backend for D3D12Backend {
    fn kind(&self) -> BackendKind {
        BackendKind::DirectX12
    }

    fn completion_policy(&self) -> CompletionPolicy {
        CompletionPolicy::QueueTimeline
    }

    fn translate_barrier(&self, barrier: &ResourceBarrier) -> NativeBarrier {
        NativeBarrier::D3D12 {
            resource: barrier.resource().id(),
            before: d3d12_resource_states(barrier.before()),
            after: d3d12_resource_states(barrier.after()),
        }
    }

    fn surface_caps(&self) -> SurfaceCaps {
        SurfaceCaps {
            color_formats: &[
                PixelFormat::Rgba8Unorm,
                PixelFormat::Bgra8Unorm,
                PixelFormat::Rgba16Float,
            ],
            depth_formats: &[
                PixelFormat::Depth32Float,
                PixelFormat::Depth24UnormStencil8,
            ],
            // Flip-model swap chains need at least two buffers.
            frame_buffers: 2..=8,
            immediate_present: true,
        }
    }
}
