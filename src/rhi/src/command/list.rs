use std::sync::Arc;

use base::ByPtr;
use fnv::FnvHashSet;
use parking_lot::Mutex;

use crate::*;

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum CommandListState {
    /// Open for recording.
    Encoding,
    /// Closed and ready for submission.
    Committed,
    /// Submitted in a set which has not completed.
    Executing,
}

#[derive(Debug)]
struct Encoder {
    state: CommandListState,
    commands: Vec<Command>,
    committed: Option<Arc<[Command]>>,
    // Resources referenced by recorded commands, kept alive until reset
    retained: FnvHashSet<ByPtr<Arc<ResourceCore>>>,
    debug_depth: u32,
    present: bool,
    render_state: Option<Arc<RenderState>>,
    bindings: Option<Arc<ProgramBindings>>,
    index_count: Option<u64>,
}

impl Encoder {
    fn new() -> Self {
        Self {
            state: CommandListState::Encoding,
            commands: Vec::new(),
            committed: None,
            retained: Default::default(),
            debug_depth: 0,
            present: false,
            render_state: None,
            bindings: None,
            index_count: None,
        }
    }

    fn retain(&mut self, core: &Arc<ResourceCore>) {
        if !self.retained.contains(ByPtr::by_ptr(core)) {
            self.retained.insert(ByPtr::new(Arc::clone(core)));
        }
    }

    fn record_barriers(
        &mut self,
        backend: &dyn Backend,
        barriers: &ResourceBarriers,
    ) {
        let mut native = Vec::with_capacity(barriers.len());
        for barrier in barriers.iter() {
            let core = barrier.resource();
            if core.is_state_fixed() {
                debug!("skipping {:?} -> {:?} barrier of fixed-state {:?}",
                    barrier.before(), barrier.after(), fmt_named(&**core));
                continue;
            }
            core.force_state(barrier.after());
            native.push(backend.translate_barrier(barrier));
            self.retain(core);
        }
        if !native.is_empty() {
            self.commands.push(Command::Barriers(native));
        }
    }

    fn transition(
        &mut self,
        backend: &dyn Backend,
        core: &Arc<ResourceCore>,
        state: ResourceState,
    ) {
        let mut barriers = None;
        core.set_state(state, &mut barriers);
        if let Some(barriers) = barriers {
            self.record_barriers(backend, &barriers);
        }
        self.retain(core);
    }
}

/// Records commands for one submission. Lists are shared between the
/// recording thread and executing sets, so all methods take `&self`.
#[derive(Debug)]
pub struct CommandList {
    device: Arc<Device>,
    ty: CommandListType,
    name: Option<String>,
    encoder: Mutex<Encoder>,
}

impl Named for CommandList {
    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

impl CommandList {
    pub fn new(
        device: &Arc<Device>,
        ty: CommandListType,
        name: Option<String>,
    ) -> Arc<Self> {
        Arc::new(Self {
            device: Arc::clone(device),
            ty,
            name,
            encoder: Mutex::new(Encoder::new()),
        })
    }

    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    pub fn list_type(&self) -> CommandListType {
        self.ty
    }

    pub fn state(&self) -> CommandListState {
        self.encoder.lock().state
    }

    /// Number of commands recorded so far.
    pub fn command_count(&self) -> usize {
        let encoder = self.encoder.lock();
        encoder.committed.as_ref()
            .map_or(encoder.commands.len(), |commands| commands.len())
    }

    pub fn is_present(&self) -> bool {
        self.encoder.lock().present
    }

    /// Number of distinct resources the recorded commands reference.
    pub fn retained_count(&self) -> usize {
        self.encoder.lock().retained.len()
    }

    fn encode<R>(
        &self,
        f: impl FnOnce(&mut Encoder) -> DeviceResult<R>,
    ) -> DeviceResult<R> {
        let mut encoder = self.encoder.lock();
        precondition!(encoder.state == CommandListState::Encoding,
            "{:?} is {:?}, not encoding", fmt_named(self), encoder.state);
        f(&mut encoder)
    }

    fn encode_render<R>(
        &self,
        f: impl FnOnce(&mut Encoder) -> DeviceResult<R>,
    ) -> DeviceResult<R> {
        precondition!(self.ty.is_render(),
            "{:?} is a {:?} list and cannot record render commands",
            fmt_named(self), self.ty);
        self.encode(f)
    }

    /// Re-opens a committed list, dropping its commands and retained
    /// resources. Lists in any other state are left alone.
    pub fn reset(&self, debug_group: Option<&str>) {
        trace!("CommandList::reset(self: {:?}, debug_group: {:?})",
            fmt_named(self), debug_group);
        let mut encoder = self.encoder.lock();
        if encoder.state != CommandListState::Committed {
            debug!("not resetting {:?}: list is {:?}",
                fmt_named(self), encoder.state);
            return;
        }
        *encoder = Encoder::new();
        if let Some(label) = debug_group {
            encoder.commands.push(Command::PushDebugGroup(label.to_owned()));
            encoder.debug_depth = 1;
        }
    }

    /// Closes recording. Open debug groups are popped.
    pub fn commit(&self, present: bool) -> DeviceResult<()> {
        trace!("CommandList::commit(self: {:?}, present: {})",
            fmt_named(self), present);
        let ty = self.ty;
        self.encode(|encoder| {
            precondition!(!present || ty.is_render(),
                "blit lists cannot present");
            for _ in 0..encoder.debug_depth {
                encoder.commands.push(Command::PopDebugGroup);
            }
            encoder.debug_depth = 0;
            if present {
                encoder.commands.push(Command::Present);
            }
            encoder.present = present;
            let commands = std::mem::take(&mut encoder.commands);
            encoder.committed = Some(commands.into());
            encoder.state = CommandListState::Committed;
            Ok(())
        })
    }

    /// Records API-neutral transitions as native barriers. Transitions of
    /// fixed-state resources are skipped.
    pub fn set_resource_barriers(&self, barriers: &ResourceBarriers) ->
        DeviceResult<()>
    {
        trace!("CommandList::set_resource_barriers(self: {:?}, count: {})",
            fmt_named(self), barriers.len());
        let backend = self.device.backend();
        self.encode(|encoder| {
            encoder.record_barriers(backend, barriers);
            Ok(())
        })
    }

    pub fn set_render_state(&self, state: &Arc<RenderState>) ->
        DeviceResult<()>
    {
        trace!("CommandList::set_render_state(self: {:?}, state: {:?})",
            fmt_named(self), fmt_named(&**state));
        self.encode_render(|encoder| {
            encoder.commands.push(Command::SetRenderState(state.id()));
            encoder.render_state = Some(Arc::clone(state));
            Ok(())
        })
    }

    /// Binds program arguments, transitioning every bound resource to
    /// the state its view requires.
    pub fn set_program_bindings(&self, bindings: &Arc<ProgramBindings>) ->
        DeviceResult<()>
    {
        trace!("CommandList::set_program_bindings(self: {:?}, program: {:?})",
            fmt_named(self), fmt_named(&**bindings.program()));
        precondition!(bindings.has_descriptors(),
            "descriptor tables of {:?} bindings are not allocated yet",
            fmt_named(&**bindings.program()));
        let backend = self.device.backend();
        self.encode_render(|encoder| {
            for view in bindings.resource_views() {
                match view.required_state() {
                    Some(state) => encoder.transition(backend, view.core(), state),
                    None => encoder.retain(view.core()),
                }
            }
            encoder.commands.push(Command::SetProgramBindings(bindings.id()));
            encoder.bindings = Some(Arc::clone(bindings));
            Ok(())
        })
    }

    pub fn set_vertex_buffers(&self, buffers: &[&Buffer]) -> DeviceResult<()> {
        trace!("CommandList::set_vertex_buffers(self: {:?}, count: {})",
            fmt_named(self), buffers.len());
        for buffer in buffers.iter() {
            precondition!(buffer.buffer_type() == BufferType::Vertex,
                "{:?} is not a vertex buffer", fmt_named(*buffer));
        }
        let backend = self.device.backend();
        self.encode_render(|encoder| {
            let mut ids = SmallVec::new();
            for buffer in buffers.iter() {
                encoder.transition(backend, buffer.core(),
                    ResourceState::VertexAndConstantBuffer);
                ids.push(buffer.id());
            }
            encoder.commands.push(Command::SetVertexBuffers(ids));
            Ok(())
        })
    }

    pub fn set_index_buffer(&self, buffer: &Buffer) -> DeviceResult<()> {
        trace!("CommandList::set_index_buffer(self: {:?}, buffer: {:?})",
            fmt_named(self), fmt_named(buffer));
        precondition!(buffer.buffer_type() == BufferType::Index,
            "{:?} is not an index buffer", fmt_named(buffer));
        let backend = self.device.backend();
        self.encode_render(|encoder| {
            encoder.transition(backend, buffer.core(), ResourceState::IndexBuffer);
            encoder.commands.push(Command::SetIndexBuffer(buffer.id()));
            encoder.index_count = Some(buffer.item_count());
            Ok(())
        })
    }

    pub fn draw_indexed(&self, args: DrawArgs) -> DeviceResult<()> {
        trace!("CommandList::draw_indexed(self: {:?}, args: {:?})",
            fmt_named(self), args);
        self.encode_render(|encoder| {
            let state = encoder.render_state.as_ref().ok_or_else(||
                Error::Precondition("draw without a render state".to_owned()))?;
            let index_count = encoder.index_count.ok_or_else(||
                Error::Precondition("draw without an index buffer".to_owned()))?;
            let program = state.program();
            match &encoder.bindings {
                Some(bindings) => precondition!(
                    Arc::ptr_eq(bindings.program(), program),
                    "bound program bindings belong to another program"),
                None => precondition!(program.arguments().is_empty(),
                    "{:?} has arguments but no bindings are set",
                    fmt_named(&**program)),
            }
            let end = args.start_index as u64 + args.index_count as u64;
            precondition!(end <= index_count,
                "indices {}..{} exceed the {} in the index buffer",
                args.start_index, end, index_count);
            precondition!(args.instance_count > 0, "draw with zero instances");
            encoder.commands.push(Command::DrawIndexed(args));
            Ok(())
        })
    }

    /// Copies bytes between buffers.
    pub fn copy_buffer(
        &self,
        src: &Buffer,
        src_offset: u64,
        dst: &Buffer,
        dst_offset: u64,
        size: u64,
    ) -> DeviceResult<()> {
        precondition!(BytesRange::new(src_offset, size).fits_within(src.size())
                && BytesRange::new(dst_offset, size).fits_within(dst.size()),
            "copy of {} bytes from {:?}+{} to {:?}+{} is out of bounds",
            size, fmt_named(src), src_offset, fmt_named(dst), dst_offset);
        self.copy_region(src.core(), src_offset, dst.core(), dst_offset, size)
    }

    pub(crate) fn copy_region(
        &self,
        src: &Arc<ResourceCore>,
        src_offset: u64,
        dst: &Arc<ResourceCore>,
        dst_offset: u64,
        size: u64,
    ) -> DeviceResult<()> {
        trace!("CommandList::copy_region(self: {:?}, src: {:?}, dst: {:?}, \
            size: {})", fmt_named(self), fmt_named(&**src), fmt_named(&**dst),
            size);
        let (src_mem, dst_mem) = match (src.memory(), dst.memory()) {
            (Some(src), Some(dst)) => (Arc::clone(src), Arc::clone(dst)),
            _ => return Err(Error::Precondition(
                "copies need resources with data storage".to_owned())),
        };
        precondition!(dst.storage() != StorageMode::Upload,
            "{:?} lives in the upload heap and cannot be a copy target",
            fmt_named(&**dst));
        let backend = self.device.backend();
        self.encode(|encoder| {
            encoder.transition(backend, src, ResourceState::CopySource);
            encoder.transition(backend, dst, ResourceState::CopyDest);
            encoder.commands.push(Command::Copy(CopyRegion {
                src: src_mem,
                src_offset,
                dst: dst_mem,
                dst_offset,
                size,
            }));
            Ok(())
        })
    }

    pub fn push_debug_group(&self, name: &str) -> DeviceResult<()> {
        self.encode(|encoder| {
            encoder.commands.push(Command::PushDebugGroup(name.to_owned()));
            encoder.debug_depth += 1;
            Ok(())
        })
    }

    pub fn pop_debug_group(&self) -> DeviceResult<()> {
        self.encode(|encoder| {
            precondition!(encoder.debug_depth > 0, "no debug group to pop");
            encoder.commands.push(Command::PopDebugGroup);
            encoder.debug_depth -= 1;
            Ok(())
        })
    }

    /// Marks the list executing and returns its commands. The caller has
    /// checked that the list is committed.
    pub(crate) fn begin_execution(&self) -> Arc<[Command]> {
        let mut encoder = self.encoder.lock();
        encoder.state = CommandListState::Executing;
        for core in encoder.retained.iter() {
            core.begin_execution();
        }
        encoder.committed.clone().unwrap_or_else(|| Vec::new().into())
    }

    pub(crate) fn complete_execution(&self) {
        let mut encoder = self.encoder.lock();
        if encoder.state != CommandListState::Executing { return; }
        encoder.state = CommandListState::Committed;
        for core in encoder.retained.iter() {
            core.end_execution();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::*;

    fn buffer(vars: &TestVars, storage: StorageMode) -> Buffer {
        vars.context.create_buffer(BufferSettings {
            storage,
            size: 64,
            ..Default::default()
        }).unwrap()
    }

    #[test]
    fn empty_barriers_are_a_no_op() {
        let vars = TestVars::new();
        let list = vars.context.create_command_list(CommandListType::Render, None);
        list.push_debug_group("frame").unwrap();
        let count = list.command_count();
        list.set_resource_barriers(&ResourceBarriers::new()).unwrap();
        assert_eq!(list.command_count(), count);
        assert_eq!(list.retained_count(), 0);
    }

    #[test]
    fn fixed_state_barriers_are_skipped() {
        let vars = TestVars::with_backend(BackendKind::DirectX12);
        let list = vars.context.create_command_list(CommandListType::Blit, None);
        let upload = buffer(&vars, StorageMode::Upload);
        let private = buffer(&vars, StorageMode::Private);

        let mut barriers = ResourceBarriers::new();
        barriers.add_transition(upload.core(), ResourceState::GenericRead,
            ResourceState::CopyDest);
        list.set_resource_barriers(&barriers).unwrap();
        assert_eq!(list.command_count(), 0);
        assert_eq!(upload.state(), ResourceState::GenericRead);

        let mut barriers = ResourceBarriers::new();
        barriers.add_transition(private.core(), ResourceState::Undefined,
            ResourceState::CopyDest);
        list.set_resource_barriers(&barriers).unwrap();
        assert_eq!(list.command_count(), 1);
        assert_eq!(private.state(), ResourceState::CopyDest);
        assert_eq!(list.retained_count(), 1);
    }

    #[test]
    fn vulkan_barriers_carry_layouts() {
        let vars = TestVars::with_backend(BackendKind::Vulkan);
        let texture = vars.context.create_texture(TextureSettings {
            format: PixelFormat::Rgba8Unorm,
            extent: (4, 4).into(),
            ..Default::default()
        }).unwrap();
        let list = vars.context.create_command_list(CommandListType::Render, None);
        let mut barriers = None;
        assert!(texture.set_state(ResourceState::CopyDest, &mut barriers));
        list.set_resource_barriers(&barriers.unwrap()).unwrap();
        list.commit(false).unwrap();
        let commands = list.begin_execution();
        match &commands[0] {
            Command::Barriers(native) => match &native[0] {
                NativeBarrier::VulkanImage { old_layout, new_layout, .. } => {
                    assert_eq!(*old_layout, VkImageLayout::Undefined);
                    assert_eq!(*new_layout, VkImageLayout::TransferDstOptimal);
                },
                other => panic!("unexpected barrier {:?}", other),
            },
            other => panic!("unexpected command {:?}", other),
        }
        list.complete_execution();
    }

    #[test]
    fn lifecycle() {
        let vars = TestVars::new();
        let list = vars.context.create_command_list(CommandListType::Render, None);

        // Reset is ignored unless committed
        list.push_debug_group("a").unwrap();
        list.reset(None);
        assert_eq!(list.state(), CommandListState::Encoding);
        assert_eq!(list.command_count(), 1);

        list.push_debug_group("b").unwrap();
        list.commit(true).unwrap();
        assert_eq!(list.state(), CommandListState::Committed);
        // Two pushes, two closing pops, and the present marker
        assert_eq!(list.command_count(), 5);
        assert!(list.is_present());
        assert!(list.push_debug_group("late").unwrap_err().is_precondition());
        assert!(list.commit(false).is_err());

        list.reset(Some("frame"));
        assert_eq!(list.state(), CommandListState::Encoding);
        assert_eq!(list.command_count(), 1);
        list.commit(false).unwrap();
        assert_eq!(list.command_count(), 2);
    }

    #[test]
    fn blit_lists_reject_render_commands() {
        let vars = TestVars::new();
        let list = vars.context.create_command_list(CommandListType::Blit, None);
        assert!(list.draw_indexed(Default::default()).unwrap_err()
            .is_precondition());
        assert!(list.commit(true).is_err());
        assert!(list.pop_debug_group().is_err());
    }

    #[test]
    fn draw_preconditions() {
        let vars = TestVars::new();
        let context = &vars.context;
        let program = context.create_program(Default::default()).unwrap();
        let state = context.create_render_state(
            RenderStateSettings::new(program)).unwrap();
        let index = context.create_buffer(BufferSettings {
            buffer_type: BufferType::Index,
            size: 12,
            item_size: 2,
            ..Default::default()
        }).unwrap();
        let vertex = context.create_buffer(BufferSettings {
            buffer_type: BufferType::Vertex,
            size: 48,
            item_size: 12,
            ..Default::default()
        }).unwrap();

        let list = context.create_command_list(CommandListType::Render, None);
        let draw = DrawArgs { index_count: 6, ..Default::default() };
        assert!(list.draw_indexed(draw).is_err());
        list.set_render_state(&state).unwrap();
        assert!(list.draw_indexed(draw).is_err());
        assert!(list.set_index_buffer(&vertex).is_err());
        list.set_index_buffer(&index).unwrap();
        list.set_vertex_buffers(&[&vertex]).unwrap();
        list.draw_indexed(draw).unwrap();
        let too_many = DrawArgs { start_index: 1, ..draw };
        assert!(list.draw_indexed(too_many).unwrap_err().is_precondition());

        assert_eq!(index.state(), ResourceState::IndexBuffer);
        assert_eq!(vertex.state(), ResourceState::VertexAndConstantBuffer);
        assert_eq!(list.retained_count(), 2);
    }

    #[test]
    fn copy_bounds() {
        let vars = TestVars::new();
        let list = vars.context.create_command_list(CommandListType::Blit, None);
        let src = buffer(&vars, StorageMode::Managed);
        let dst = buffer(&vars, StorageMode::Private);

        list.copy_buffer(&src, 32, &dst, 0, 32).unwrap();
        let count = list.command_count();
        assert!(list.copy_buffer(&src, 33, &dst, 0, 32).unwrap_err()
            .is_precondition());
        assert!(list.copy_buffer(&src, u64::MAX, &dst, 0, 2).unwrap_err()
            .is_precondition());
        assert!(list.copy_buffer(&src, 0, &dst, 8, u64::MAX).unwrap_err()
            .is_precondition());
        assert_eq!(list.command_count(), count);
    }
}
