use std::sync::Arc;

use derivative::Derivative;

use crate::*;

#[derive(Clone, Copy, Debug, Derivative, Eq, Hash, PartialEq)]
#[derivative(Default)]
pub enum FillMode {
    #[derivative(Default)]
    Solid,
    Wireframe,
}

#[derive(Clone, Copy, Debug, Derivative, Eq, Hash, PartialEq)]
#[derivative(Default)]
pub enum CullMode {
    None,
    #[derivative(Default)]
    Back,
    Front,
}

#[derive(Clone, Copy, Debug, Derivative, Eq, Hash, PartialEq)]
#[derivative(Default)]
pub enum CompareFunction {
    Never,
    #[derivative(Default)]
    Less,
    LessEqual,
    Equal,
    GreaterEqual,
    Greater,
    NotEqual,
    Always,
}

#[derive(Clone, Copy, Debug, Derivative, Eq, Hash, PartialEq)]
#[derivative(Default)]
pub enum BlendFactor {
    Zero,
    #[derivative(Default)]
    One,
    SourceAlpha,
    OneMinusSourceAlpha,
}

#[derive(Clone, Copy, Debug, Derivative, Eq, Hash, PartialEq)]
#[derivative(Default)]
pub struct RasterizerSettings {
    pub fill_mode: FillMode,
    pub cull_mode: CullMode,
    pub front_counter_clockwise: bool,
    #[derivative(Default(value = "1"))]
    pub sample_count: u32,
}

#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct DepthSettings {
    pub enabled: bool,
    pub write_enabled: bool,
    pub compare: CompareFunction,
}

#[derive(Clone, Copy, Debug, Derivative, Eq, Hash, PartialEq)]
#[derivative(Default)]
pub struct BlendingSettings {
    pub enabled: bool,
    pub source: BlendFactor,
    #[derivative(Default(value = "BlendFactor::Zero"))]
    pub destination: BlendFactor,
}

#[derive(Clone, Debug)]
pub struct RenderStateSettings {
    pub name: Option<String>,
    pub program: Arc<Program>,
    pub rasterizer: RasterizerSettings,
    pub depth: DepthSettings,
    pub blending: BlendingSettings,
    pub color_formats: Vec<PixelFormat>,
    pub depth_format: Option<PixelFormat>,
}

impl RenderStateSettings {
    pub fn new(program: Arc<Program>) -> Self {
        Self {
            name: None,
            program,
            rasterizer: Default::default(),
            depth: Default::default(),
            blending: Default::default(),
            color_formats: vec![PixelFormat::Bgra8Unorm],
            depth_format: None,
        }
    }
}

/// Fixed-function pipeline state bound with a program.
#[derive(Debug)]
pub struct RenderState {
    id: ResourceId,
    settings: RenderStateSettings,
}

impl Named for RenderState {
    fn name(&self) -> Option<&str> {
        self.settings.name.as_deref()
    }
}

impl RenderState {
    pub(crate) fn new(device: &Device, settings: RenderStateSettings) ->
        DeviceResult<Self>
    {
        trace!("RenderState::new(settings: {:?})", settings);
        let name = &settings.name;
        let samples = settings.rasterizer.sample_count;
        precondition!(samples.is_power_of_two() && samples <= 16,
            "render state {:?} has invalid sample count {}", name, samples);
        for format in settings.color_formats.iter() {
            precondition!(*format != PixelFormat::Unknown && !format.is_depth(),
                "render state {:?} has invalid color format {:?}", name, format);
        }
        if let Some(format) = settings.depth_format {
            precondition!(format.is_depth(),
                "render state {:?} depth format {:?} is not a depth format",
                name, format);
        }
        precondition!(!settings.depth.enabled || settings.depth_format.is_some(),
            "render state {:?} enables depth testing without a depth format",
            name);
        Ok(Self {
            id: device.next_resource_id(),
            settings,
        })
    }

    pub fn id(&self) -> ResourceId {
        self.id
    }

    pub fn settings(&self) -> &RenderStateSettings {
        &self.settings
    }

    pub fn program(&self) -> &Arc<Program> {
        &self.settings.program
    }
}
