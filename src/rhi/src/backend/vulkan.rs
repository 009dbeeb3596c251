use bitflags::bitflags;

use crate::*;

bitflags! {
    #[derive(Default)]
    pub struct VkAccessFlags: u32 {
        const INDEX_READ = 0x2;
        const VERTEX_ATTRIBUTE_READ = 0x4;
        const UNIFORM_READ = 0x8;
        const SHADER_READ = 0x20;
        const SHADER_WRITE = 0x40;
        const COLOR_ATTACHMENT_READ = 0x80;
        const COLOR_ATTACHMENT_WRITE = 0x100;
        const DEPTH_STENCIL_ATTACHMENT_READ = 0x200;
        const DEPTH_STENCIL_ATTACHMENT_WRITE = 0x400;
        const TRANSFER_READ = 0x800;
        const TRANSFER_WRITE = 0x1000;
        const HOST_READ = 0x2000;
        const MEMORY_READ = 0x8000;
    }
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[repr(i32)]
pub enum VkImageLayout {
    Undefined = 0,
    General = 1,
    ColorAttachmentOptimal = 2,
    DepthStencilAttachmentOptimal = 3,
    DepthStencilReadOnlyOptimal = 4,
    ShaderReadOnlyOptimal = 5,
    TransferSrcOptimal = 6,
    TransferDstOptimal = 7,
    PresentSrcKhr = 1000001002,
}

pub fn vk_access_flags(state: ResourceState) -> VkAccessFlags {
    type A = VkAccessFlags;
    match state {
        ResourceState::Undefined | ResourceState::Common => A::empty(),
        ResourceState::VertexAndConstantBuffer =>
            A::VERTEX_ATTRIBUTE_READ | A::UNIFORM_READ,
        ResourceState::IndexBuffer => A::INDEX_READ,
        ResourceState::RenderTarget =>
            A::COLOR_ATTACHMENT_READ | A::COLOR_ATTACHMENT_WRITE,
        ResourceState::UnorderedAccess => A::SHADER_READ | A::SHADER_WRITE,
        ResourceState::DepthWrite => A::DEPTH_STENCIL_ATTACHMENT_READ
            | A::DEPTH_STENCIL_ATTACHMENT_WRITE,
        ResourceState::DepthRead => A::DEPTH_STENCIL_ATTACHMENT_READ,
        ResourceState::ShaderResource => A::SHADER_READ,
        ResourceState::CopyDest => A::TRANSFER_WRITE,
        ResourceState::CopySource => A::TRANSFER_READ,
        ResourceState::GenericRead => A::MEMORY_READ | A::HOST_READ,
        ResourceState::Present => A::MEMORY_READ,
    }
}

pub fn vk_image_layout(state: ResourceState) -> VkImageLayout {
    type L = VkImageLayout;
    match state {
        ResourceState::Undefined => L::Undefined,
        ResourceState::Common | ResourceState::UnorderedAccess
            | ResourceState::GenericRead => L::General,
        ResourceState::VertexAndConstantBuffer | ResourceState::IndexBuffer
            | ResourceState::ShaderResource => L::ShaderReadOnlyOptimal,
        ResourceState::RenderTarget => L::ColorAttachmentOptimal,
        ResourceState::DepthWrite => L::DepthStencilAttachmentOptimal,
        ResourceState::DepthRead => L::DepthStencilReadOnlyOptimal,
        ResourceState::CopyDest => L::TransferDstOptimal,
        ResourceState::CopySource => L::TransferSrcOptimal,
        ResourceState::Present => L::PresentSrcKhr,
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct VulkanBackend;

impl Backend for VulkanBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Vulkan
    }

    fn completion_policy(&self) -> CompletionPolicy {
        CompletionPolicy::SubmissionFence
    }

    fn translate_barrier(&self, barrier: &ResourceBarrier) -> NativeBarrier {
        let resource = barrier.resource().id();
        let (before, after) = (barrier.before(), barrier.after());
        match barrier.resource().kind() {
            ResourceKind::Buffer => NativeBarrier::VulkanBuffer {
                resource,
                src_access: vk_access_flags(before),
                dst_access: vk_access_flags(after),
            },
            ResourceKind::Texture => NativeBarrier::VulkanImage {
                resource,
                src_access: vk_access_flags(before),
                dst_access: vk_access_flags(after),
                old_layout: vk_image_layout(before),
                new_layout: vk_image_layout(after),
            },
            ResourceKind::Sampler => NativeBarrier::None,
        }
    }

    fn surface_caps(&self) -> SurfaceCaps {
        SurfaceCaps {
            color_formats: &[
                PixelFormat::Bgra8Unorm,
                PixelFormat::Rgba8Unorm,
                PixelFormat::Rgba16Float,
            ],
            depth_formats: &[
                PixelFormat::Depth32Float,
                PixelFormat::Depth24UnormStencil8,
            ],
            frame_buffers: 2..=8,
            immediate_present: true,
        }
    }
}
