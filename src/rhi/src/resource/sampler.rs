use std::sync::Arc;

use derivative::Derivative;

use crate::*;

#[derive(Clone, Copy, Debug, Derivative, Eq, Hash, PartialEq)]
#[derivative(Default)]
pub enum Filter {
    Nearest,
    #[derivative(Default)]
    Linear,
}

#[derive(Clone, Copy, Debug, Derivative, Eq, Hash, PartialEq)]
#[derivative(Default)]
pub enum AddressMode {
    #[derivative(Default)]
    Repeat,
    MirroredRepeat,
    ClampToEdge,
    ClampToBorder,
}

#[derive(Clone, Debug, Derivative, PartialEq)]
#[derivative(Default)]
pub struct SamplerSettings {
    pub name: Option<String>,
    pub min_filter: Filter,
    pub mag_filter: Filter,
    pub mip_filter: Filter,
    pub address_mode: AddressMode,
    pub min_lod: f32,
    #[derivative(Default(value = "f32::MAX"))]
    pub max_lod: f32,
    #[derivative(Default(value = "1"))]
    pub max_anisotropy: u32,
}

#[derive(Debug)]
pub struct Sampler {
    core: Arc<ResourceCore>,
    settings: SamplerSettings,
    context: Arc<Context>,
}

impl Drop for Sampler {
    fn drop(&mut self) {
        self.context.resource_manager().release_pool()
            .add(Arc::clone(&self.core));
    }
}

impl Named for Sampler {
    fn name(&self) -> Option<&str> {
        self.settings.name.as_deref()
    }
}

impl Resource for Sampler {
    fn core(&self) -> &Arc<ResourceCore> {
        &self.core
    }

    fn context(&self) -> &Arc<Context> {
        &self.context
    }
}

impl Sampler {
    pub(crate) fn new(context: &Arc<Context>, settings: SamplerSettings) ->
        DeviceResult<Self>
    {
        trace!("Sampler::new(settings: {:?})", settings);
        precondition!(settings.min_lod <= settings.max_lod,
            "sampler {:?} has an empty LOD range {}..{}",
            settings.name, settings.min_lod, settings.max_lod);
        precondition!((1..=16).contains(&settings.max_anisotropy),
            "sampler {:?} anisotropy {} outside 1..=16",
            settings.name, settings.max_anisotropy);
        let core = ResourceCore::new(
            context.device(),
            context.resource_manager(),
            ResourceDesc {
                name: settings.name.clone(),
                kind: ResourceKind::Sampler,
                usage: ResourceUsage::SHADER_READ,
                storage: StorageMode::Private,
                size: 0,
                count: Default::default(),
                layout: Vec::new(),
                is_depth: false,
            },
        )?;
        Ok(Self {
            core,
            settings,
            context: Arc::clone(context),
        })
    }

    pub fn settings(&self) -> &SamplerSettings {
        &self.settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::*;

    #[test]
    fn sampler_descriptor() {
        let vars = TestVars::new();
        let sampler = vars.context.create_sampler(SamplerSettings {
            address_mode: AddressMode::ClampToEdge,
            ..Default::default()
        }).unwrap();
        let desc = sampler.core().descriptor(ResourceUsage::SHADER_READ)
            .unwrap();
        assert_eq!(desc.heap_type(), DescriptorHeapType::Samplers);
        assert!(sampler.core().is_state_fixed());
        let err = sampler.set_data(&[SubResource::new(&[0])],
            vars.context.render_queue()).unwrap_err();
        assert!(err.is_precondition());

        assert!(vars.context.create_sampler(SamplerSettings {
            min_lod: 2.0,
            max_lod: 1.0,
            ..Default::default()
        }).is_err());
    }
}
