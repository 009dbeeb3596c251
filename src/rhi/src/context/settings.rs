use derivative::Derivative;

use crate::*;

/// Scale factors reported by the platform layer. Only used to convert
/// between device-independent units and pixels.
#[derive(Clone, Copy, Debug, Derivative, PartialEq)]
#[derivative(Default)]
pub struct ContentScale {
    #[derivative(Default(value = "1.0"))]
    pub scale_factor: f32,
    #[derivative(Default(value = "96"))]
    pub font_dpi: u32,
}

impl ContentScale {
    pub fn units_to_pixels(&self, units: f32) -> f32 {
        units * self.scale_factor
    }

    pub fn pixels_to_units(&self, pixels: f32) -> f32 {
        pixels / self.scale_factor
    }

    /// Converts a font size in points to pixels.
    pub fn points_to_pixels(&self, points: f32) -> f32 {
        points * self.font_dpi as f32 / 72.0
    }
}

#[derive(Clone, Debug, Derivative, PartialEq)]
#[derivative(Default)]
pub struct SurfaceSettings {
    /// Size of the swapchain images in pixels.
    pub frame_size: (u32, u32),
    #[derivative(Default(value = "PixelFormat::Bgra8Unorm"))]
    pub color_format: PixelFormat,
    pub depth_format: Option<PixelFormat>,
    #[derivative(Default(value = "true"))]
    pub vsync: bool,
    pub content_scale: ContentScale,
}

impl SurfaceSettings {
    pub fn frame_size_in_units(&self) -> (f32, f32) {
        let (w, h) = self.frame_size;
        (
            self.content_scale.pixels_to_units(w as f32),
            self.content_scale.pixels_to_units(h as f32),
        )
    }
}

#[derive(Clone, Debug, Derivative)]
#[derivative(Default)]
pub struct ContextSettings {
    #[derivative(Default(value = "\"context\".to_owned()"))]
    pub name: String,
    #[derivative(Default(value = "BackendKind::Null"))]
    pub backend: BackendKind,
    pub gpu_mode: ExecutionMode,
    #[derivative(Default(value = "3"))]
    pub frame_buffers_count: u32,
    #[derivative(Default(value = "DEFAULT_MAX_ALLOCATION_SIZE"))]
    pub max_allocation_size: u64,
    pub resource_manager: ResourceManagerSettings,
    /// Presentation surface; headless when absent.
    pub surface: Option<SurfaceSettings>,
}

fn parse_env<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Option<T> {
    let value = lookup(key)?;
    match value.parse() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            warn!("ignoring unparsable value {:?} of {}", value, key);
            None
        },
    }
}

impl ContextSettings {
    /// Overrides fields from `STRATA_*` environment variables.
    pub fn apply_env(&mut self) {
        self.apply_env_with(|key| std::env::var(key).ok());
    }

    pub fn apply_env_with(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(backend) = parse_env(&lookup, "STRATA_BACKEND") {
            self.backend = backend;
        }
        if let Some(count) = parse_env(&lookup, "STRATA_FRAME_BUFFERS") {
            self.frame_buffers_count = count;
        }
        if let Some(flag) = parse_env::<u8>(&lookup, "STRATA_DEFERRED_HEAPS") {
            match flag {
                0 | 1 => self.resource_manager.deferred_heap_allocation =
                    flag == 1,
                _ => warn!("ignoring STRATA_DEFERRED_HEAPS={}; expected 0 or 1",
                    flag),
            }
        }
        if let Some(mode) = parse_env(&lookup, "STRATA_GPU_MODE") {
            self.gpu_mode = mode;
        }
    }
}
