use crate::*;

const ALL_COLOR_FORMATS: &[PixelFormat] = &[
    PixelFormat::R8Unorm,
    PixelFormat::Rgba8Unorm,
    PixelFormat::Bgra8Unorm,
    PixelFormat::Rgba16Float,
    PixelFormat::R32Float,
    PixelFormat::Rgba32Float,
];

const ALL_DEPTH_FORMATS: &[PixelFormat] = &[
    PixelFormat::Depth32Float,
    PixelFormat::Depth24UnormStencil8,
];

/// A backend with no native API behind it. Barriers translate to
/// nothing and any surface is accepted.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullBackend;

impl Backend for NullBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Null
    }

    fn completion_policy(&self) -> CompletionPolicy {
        CompletionPolicy::QueueTimeline
    }

    fn translate_barrier(&self, _: &ResourceBarrier) -> NativeBarrier {
        NativeBarrier::None
    }

    fn surface_caps(&self) -> SurfaceCaps {
        SurfaceCaps {
            color_formats: ALL_COLOR_FORMATS,
            depth_formats: ALL_DEPTH_FORMATS,
            frame_buffers: 1..=16,
            immediate_present: true,
        }
    }
}
