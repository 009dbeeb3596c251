use std::fmt;
use std::ops::RangeInclusive;

use derive_more::Display;

use crate::*;

mod d3d12;
mod null;
mod vulkan;

pub use d3d12::*;
pub use null::*;
pub use vulkan::*;

#[derive(Clone, Copy, Debug, Display, Eq, Hash, PartialEq)]
pub enum BackendKind {
    #[display(fmt = "null")]
    Null,
    #[display(fmt = "d3d12")]
    DirectX12,
    #[display(fmt = "vulkan")]
    Vulkan,
}

impl std::str::FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "null" => Ok(BackendKind::Null),
            "d3d12" | "dx12" | "directx12" => Ok(BackendKind::DirectX12),
            "vulkan" | "vk" => Ok(BackendKind::Vulkan),
            other => Err(format!("unknown backend {:?}", other)),
        }
    }
}

/// How the completion of a submitted command list set is observed.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum CompletionPolicy {
    /// Every submission on a queue signals the queue's timeline fence
    /// with the next value; a set is complete once the timeline passes
    /// its value.
    QueueTimeline,
    /// Each submitted set signals a fence of its own, which must be
    /// awaited explicitly before completion bookkeeping.
    SubmissionFence,
}

/// A barrier in the representation of a particular native API.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum NativeBarrier {
    None,
    D3D12 {
        resource: ResourceId,
        before: D3D12ResourceStates,
        after: D3D12ResourceStates,
    },
    VulkanBuffer {
        resource: ResourceId,
        src_access: VkAccessFlags,
        dst_access: VkAccessFlags,
    },
    VulkanImage {
        resource: ResourceId,
        src_access: VkAccessFlags,
        dst_access: VkAccessFlags,
        old_layout: VkImageLayout,
        new_layout: VkImageLayout,
    },
}

/// What a backend can present to.
#[derive(Clone, Debug)]
pub struct SurfaceCaps {
    pub color_formats: &'static [PixelFormat],
    pub depth_formats: &'static [PixelFormat],
    pub frame_buffers: RangeInclusive<u32>,
    /// Whether presentation without vertical sync is available.
    pub immediate_present: bool,
}

/// The per-API half of the RHI. Everything API-neutral lives in the
/// generic context, queue, and command list; a backend only decides how
/// neutral requests map onto its native model.
pub trait Backend: fmt::Debug + Send + Sync {
    fn kind(&self) -> BackendKind;

    fn completion_policy(&self) -> CompletionPolicy;

    fn translate_barrier(&self, barrier: &ResourceBarrier) -> NativeBarrier;

    fn surface_caps(&self) -> SurfaceCaps;

    fn check_surface(&self, settings: &SurfaceSettings, frame_buffers: u32) ->
        DeviceResult<()>
    {
        let caps = self.surface_caps();
        let kind = self.kind();
        if !caps.color_formats.contains(&settings.color_format) {
            return Err(Error::Incompatible(format!(
                "{} cannot present color format {:?}",
                kind, settings.color_format,
            )));
        }
        if let Some(depth) = settings.depth_format {
            if !caps.depth_formats.contains(&depth) {
                return Err(Error::Incompatible(format!(
                    "{} does not support depth format {:?}", kind, depth,
                )));
            }
        }
        if !caps.frame_buffers.contains(&frame_buffers) {
            return Err(Error::Incompatible(format!(
                "{} supports {:?} frame buffers, {} requested",
                kind, caps.frame_buffers, frame_buffers,
            )));
        }
        if !settings.vsync && !caps.immediate_present {
            return Err(Error::Incompatible(format!(
                "{} requires vertical sync", kind,
            )));
        }
        Ok(())
    }
}

/// Creates the backend implementation for `kind`.
pub fn create_backend(kind: BackendKind) -> Box<dyn Backend> {
    match kind {
        BackendKind::Null => Box::new(NullBackend),
        BackendKind::DirectX12 => Box::new(D3D12Backend),
        BackendKind::Vulkan => Box::new(VulkanBackend),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn surface(color: PixelFormat, vsync: bool) -> SurfaceSettings {
        SurfaceSettings {
            color_format: color,
            vsync,
            ..Default::default()
        }
    }

    #[test]
    fn surface_compatibility() {
        let d3d12 = create_backend(BackendKind::DirectX12);
        d3d12.check_surface(&surface(PixelFormat::Bgra8Unorm, true), 3)
            .unwrap();

        let err = d3d12.check_surface(&surface(PixelFormat::R8Unorm, true), 3)
            .unwrap_err();
        assert!(matches!(err, Error::Incompatible(_)));

        let err = d3d12.check_surface(&surface(PixelFormat::Bgra8Unorm, true), 9)
            .unwrap_err();
        assert!(matches!(err, Error::Incompatible(_)));

        let vulkan = create_backend(BackendKind::Vulkan);
        vulkan.check_surface(&surface(PixelFormat::Bgra8Unorm, false), 2)
            .unwrap();

        let null = create_backend(BackendKind::Null);
        null.check_surface(&surface(PixelFormat::R8Unorm, false), 1).unwrap();
    }

    #[test]
    fn completion_policies() {
        use CompletionPolicy::*;
        assert_eq!(create_backend(BackendKind::Null).completion_policy(),
            QueueTimeline);
        assert_eq!(create_backend(BackendKind::DirectX12).completion_policy(),
            QueueTimeline);
        assert_eq!(create_backend(BackendKind::Vulkan).completion_policy(),
            SubmissionFence);
    }

    #[test]
    fn parse_kind() {
        assert_eq!("d3d12".parse(), Ok(BackendKind::DirectX12));
        assert_eq!(" Vulkan".parse(), Ok(BackendKind::Vulkan));
        assert_eq!("null".parse(), Ok(BackendKind::Null));
        assert!("metal".parse::<BackendKind>().is_err());
    }
}
