use std::ops::Range;
use std::sync::Arc;

use derivative::Derivative;
use enum_map::EnumMap;
use fnv::FnvHashSet;
use parking_lot::Mutex;

use crate::*;

/// How often an argument's bindings may change.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ArgumentAccess {
    /// Bound once at creation.
    Constant,
    /// Bound once per frame slot.
    FrameConstant,
    /// May be rebound at any time.
    Mutable,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ProgramArgument {
    pub name: String,
    pub kind: ResourceKind,
    pub usage: ResourceUsage,
    pub access: ArgumentAccess,
}

impl ProgramArgument {
    pub fn new(
        name: impl Into<String>,
        kind: ResourceKind,
        usage: ResourceUsage,
        access: ArgumentAccess,
    ) -> Self {
        Self { name: name.into(), kind, usage, access }
    }

    fn heap_type(&self) -> DeviceResult<DescriptorHeapType> {
        descriptor_heap_type(self.kind, self.usage, false)
    }
}

#[derive(Clone, Debug, Default)]
pub struct ProgramSettings {
    pub name: Option<String>,
    pub arguments: Vec<ProgramArgument>,
}

/// The binding layout of a shader program.
#[derive(Debug)]
pub struct Program {
    id: ResourceId,
    settings: ProgramSettings,
}

impl Named for Program {
    fn name(&self) -> Option<&str> {
        self.settings.name.as_deref()
    }
}

impl Program {
    pub(crate) fn new(device: &Device, settings: ProgramSettings) ->
        DeviceResult<Self>
    {
        trace!("Program::new(settings: {:?})", settings);
        let mut names = FnvHashSet::default();
        for arg in settings.arguments.iter() {
            precondition!(names.insert(arg.name.as_str()),
                "duplicate program argument {:?}", arg.name);
            precondition!(arg.usage == ResourceUsage::SHADER_READ
                    || arg.usage == ResourceUsage::SHADER_WRITE,
                "argument {:?} has usage {:?}; expected SHADER_READ or \
                 SHADER_WRITE", arg.name, arg.usage);
            arg.heap_type()?;
        }
        Ok(Self {
            id: device.next_resource_id(),
            settings,
        })
    }

    pub fn id(&self) -> ResourceId {
        self.id
    }

    pub fn arguments(&self) -> &[ProgramArgument] {
        &self.settings.arguments
    }

    pub fn argument_index(&self, name: &str) -> Option<usize> {
        self.settings.arguments.iter().position(|arg| arg.name == name)
    }
}

/// Views bound to one program argument.
#[derive(Clone, Debug)]
pub struct ArgumentBinding {
    pub argument: String,
    pub views: Vec<ResourceView>,
}

impl ArgumentBinding {
    pub fn new(argument: impl Into<String>, views: Vec<ResourceView>) -> Self {
        Self { argument: argument.into(), views }
    }
}

type DescriptorTables = EnumMap<DescriptorHeapType, Option<DescriptorRange>>;

/// Resource views bound to every argument of a program, with descriptor
/// tables in the shader-visible heaps.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct ProgramBindings {
    id: ResourceId,
    program: Arc<Program>,
    frame_index: Option<u32>,
    counts: DescriptorCounts,
    views: Mutex<Vec<Vec<ResourceView>>>,
    // None until reserved
    tables: Mutex<Option<DescriptorTables>>,
    #[derivative(Debug = "ignore")]
    context: Arc<Context>,
}

impl Drop for ProgramBindings {
    fn drop(&mut self) {
        self.context.resource_manager().remove_program_bindings(self);
    }
}

fn check_views(arg: &ProgramArgument, views: &[ResourceView]) ->
    DeviceResult<()>
{
    precondition!(!views.is_empty(), "argument {:?} is not bound", arg.name);
    for view in views.iter() {
        precondition!(
            view.core().kind() == arg.kind && view.usage() == arg.usage,
            "argument {:?} expects {:?} with {:?}, got {:?} with {:?}",
            arg.name, arg.kind, arg.usage, view.core().kind(), view.usage());
    }
    Ok(())
}

impl ProgramBindings {
    pub(crate) fn new(
        context: &Arc<Context>,
        program: &Arc<Program>,
        bindings: Vec<ArgumentBinding>,
        frame_index: Option<u32>,
    ) -> DeviceResult<Arc<Self>> {
        trace!("ProgramBindings::new(program: {:?}, bindings: {}, frame: {:?})",
            fmt_named(&**program), bindings.len(), frame_index);
        let args = program.arguments();
        if args.iter().any(|arg| arg.access == ArgumentAccess::FrameConstant) {
            precondition!(frame_index.is_some(),
                "{:?} has frame-constant arguments but no frame index was given",
                fmt_named(&**program));
        }

        let mut views = vec![Vec::new(); args.len()];
        for binding in bindings {
            let index = program.argument_index(&binding.argument)
                .ok_or_else(|| Error::Precondition(format!(
                    "{:?} has no argument {:?}",
                    fmt_named(&**program), binding.argument)))?;
            views[index] = binding.views;
        }
        let mut counts = DescriptorCounts::zero();
        for (arg, views) in args.iter().zip(views.iter()) {
            check_views(arg, views)?;
            counts[arg.heap_type()?] += views.len() as u32;
        }

        let bindings = Arc::new(Self {
            id: context.device().next_resource_id(),
            program: Arc::clone(program),
            frame_index,
            counts,
            views: Mutex::new(views),
            tables: Mutex::new(None),
            context: Arc::clone(context),
        });
        let manager = context.resource_manager();
        manager.add_program_bindings(&bindings);
        if !manager.deferred_heap_allocation() {
            bindings.reserve_descriptors(manager)?;
        }
        Ok(bindings)
    }

    pub fn id(&self) -> ResourceId {
        self.id
    }

    pub fn program(&self) -> &Arc<Program> {
        &self.program
    }

    pub fn frame_index(&self) -> Option<u32> {
        self.frame_index
    }

    /// Shader-visible descriptors required, by heap type.
    pub fn descriptor_counts(&self) -> DescriptorCounts {
        self.counts
    }

    pub fn has_descriptors(&self) -> bool {
        self.tables.lock().is_some()
    }

    pub fn descriptor_range(&self, ty: DescriptorHeapType) ->
        Option<Range<u32>>
    {
        self.tables.lock().as_ref()?[ty].as_ref().map(DescriptorRange::range)
    }

    /// All bound views, in argument order.
    pub fn resource_views(&self) -> Vec<ResourceView> {
        self.views.lock().iter().flatten().cloned().collect()
    }

    /// Rebinds a mutable argument. The number of views cannot change.
    pub fn set_resource_views(&self, argument: &str, views: Vec<ResourceView>) ->
        DeviceResult<()>
    {
        trace!("ProgramBindings::set_resource_views(argument: {:?}, views: {})",
            argument, views.len());
        let index = self.program.argument_index(argument)
            .ok_or_else(|| Error::Precondition(format!(
                "{:?} has no argument {:?}",
                fmt_named(&*self.program), argument)))?;
        let arg = &self.program.arguments()[index];
        precondition!(arg.access == ArgumentAccess::Mutable,
            "argument {:?} is {:?} and cannot be rebound", arg.name, arg.access);
        check_views(arg, &views)?;
        let mut bound = self.views.lock();
        precondition!(bound[index].len() == views.len(),
            "argument {:?} has {} views; got {}",
            arg.name, bound[index].len(), views.len());
        bound[index] = views;
        Ok(())
    }

    pub(crate) fn reserve_descriptors(&self, manager: &ResourceManager) ->
        DeviceResult<()>
    {
        let mut tables = self.tables.lock();
        if tables.is_some() { return Ok(()); }
        let mut reserved = DescriptorTables::default();
        for (ty, &count) in self.counts.iter() {
            if count == 0 { continue; }
            reserved[ty] = Some(manager.reserve_shader_visible_range(ty, count)?);
        }
        *tables = Some(reserved);
        Ok(())
    }
}
