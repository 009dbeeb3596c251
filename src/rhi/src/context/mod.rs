use std::fmt;
use std::sync::{Arc, Weak};
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::*;

mod settings;

pub use settings::*;

/// Work postponed to the next synchronization point. Requests coalesce
/// to the strongest one.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum DeferredAction {
    None,
    UploadResources,
    CompleteInitialization,
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum WaitFor {
    /// All submitted render work.
    RenderComplete,
    /// Render work of the current frame slot.
    FramePresented,
    /// The last flushed upload of every queue.
    ResourcesUploaded,
}

#[derive(Debug, Default)]
struct FrameState {
    index: u32,
    number: u64,
}

/// Owns a device, its queues and resource manager, and drives the
/// frame cycle.
pub struct Context {
    settings: ContextSettings,
    device: Arc<Device>,
    resource_manager: ResourceManager,
    render_queue: Arc<CommandQueue>,
    upload_queue: Arc<CommandQueue>,
    queues: Mutex<Vec<Weak<CommandQueue>>>,
    deferred_action: Mutex<DeferredAction>,
    frame: Mutex<FrameState>,
    released: AtomicBool,
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let frame = self.frame.lock();
        f.debug_struct("Context")
            .field("name", &self.settings.name)
            .field("device", &self.device)
            .field("frame_index", &frame.index)
            .field("frame_number", &frame.number)
            .field("deferred_action", &*self.deferred_action.lock())
            .finish()
    }
}

impl Named for Context {
    fn name(&self) -> Option<&str> {
        Some(&self.settings.name)
    }
}

impl Context {
    pub fn new(settings: ContextSettings) -> DeviceResult<Arc<Self>> {
        trace!("Context::new(settings: {:?})", settings);
        precondition!(settings.frame_buffers_count > 0,
            "context needs at least one frame buffer");
        let backend = create_backend(settings.backend);
        if let Some(surface) = &settings.surface {
            backend.check_surface(surface, settings.frame_buffers_count)?;
        }
        let gpu = SoftGpu::with_max_allocation_size(
            settings.gpu_mode, settings.max_allocation_size);
        let device = Device::new(settings.name.clone(), backend, gpu);

        let resource_manager =
            ResourceManager::new(settings.frame_buffers_count);
        resource_manager.initialize(&settings.resource_manager)?;
        let render_queue = CommandQueue::new(
            &device, CommandListType::Render,
            format!("{}-render", settings.name))?;
        let upload_queue = CommandQueue::new(
            &device, CommandListType::Blit,
            format!("{}-upload", settings.name))?;

        Ok(Arc::new(Self {
            settings,
            device,
            resource_manager,
            render_queue,
            upload_queue,
            queues: Default::default(),
            deferred_action: Mutex::new(DeferredAction::None),
            frame: Default::default(),
            released: AtomicBool::new(false),
        }))
    }

    pub fn settings(&self) -> &ContextSettings {
        &self.settings
    }

    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    pub fn resource_manager(&self) -> &ResourceManager {
        &self.resource_manager
    }

    pub fn render_queue(&self) -> &Arc<CommandQueue> {
        &self.render_queue
    }

    /// The queue receiving resource uploads by default.
    pub fn upload_queue(&self) -> &Arc<CommandQueue> {
        &self.upload_queue
    }

    pub fn frame_buffers_count(&self) -> u32 {
        self.settings.frame_buffers_count
    }

    pub fn frame_index(&self) -> u32 {
        self.frame.lock().index
    }

    /// Number of frames presented so far.
    pub fn frame_number(&self) -> u64 {
        self.frame.lock().number
    }

    /// Default queues followed by every live queue created through the
    /// context.
    fn live_queues(&self) -> Vec<Arc<CommandQueue>> {
        let mut queues = vec![
            Arc::clone(&self.render_queue),
            Arc::clone(&self.upload_queue),
        ];
        let mut created = self.queues.lock();
        created.retain(|queue| queue.strong_count() > 0);
        queues.extend(created.iter().filter_map(Weak::upgrade));
        queues
    }

    pub fn create_buffer(self: &Arc<Self>, settings: BufferSettings) ->
        DeviceResult<Buffer>
    {
        Buffer::new(self, settings)
    }

    pub fn create_texture(self: &Arc<Self>, settings: TextureSettings) ->
        DeviceResult<Texture>
    {
        Texture::new(self, settings)
    }

    pub fn create_sampler(self: &Arc<Self>, settings: SamplerSettings) ->
        DeviceResult<Sampler>
    {
        Sampler::new(self, settings)
    }

    pub fn create_program(&self, settings: ProgramSettings) ->
        DeviceResult<Arc<Program>>
    {
        Ok(Arc::new(Program::new(&self.device, settings)?))
    }

    pub fn create_render_state(&self, settings: RenderStateSettings) ->
        DeviceResult<Arc<RenderState>>
    {
        Ok(Arc::new(RenderState::new(&self.device, settings)?))
    }

    /// Binds resources to a program's arguments. With deferred heap
    /// allocation the descriptor tables are reserved by the next
    /// `complete_initialization`.
    pub fn create_program_bindings(
        self: &Arc<Self>,
        program: &Arc<Program>,
        bindings: Vec<ArgumentBinding>,
        frame_index: Option<u32>,
    ) -> DeviceResult<Arc<ProgramBindings>> {
        let bindings = ProgramBindings::new(self, program, bindings, frame_index)?;
        if !bindings.has_descriptors() {
            self.request_deferred_action(DeferredAction::CompleteInitialization);
        }
        Ok(bindings)
    }

    pub fn create_command_queue(
        &self,
        ty: CommandListType,
        name: impl Into<String>,
    ) -> DeviceResult<Arc<CommandQueue>> {
        let queue = CommandQueue::new(&self.device, ty, name)?;
        self.queues.lock().push(Arc::downgrade(&queue));
        Ok(queue)
    }

    pub fn create_command_list(
        &self,
        ty: CommandListType,
        name: Option<String>,
    ) -> Arc<CommandList> {
        CommandList::new(&self.device, ty, name)
    }

    pub fn create_parallel_render_command_list(
        &self,
        count: usize,
        name: Option<String>,
    ) -> DeviceResult<ParallelRenderCommandList> {
        ParallelRenderCommandList::new(&self.device, count, name)
    }

    pub fn request_deferred_action(&self, action: DeferredAction) {
        let mut current = self.deferred_action.lock();
        if action > *current {
            trace!("Context::request_deferred_action(action: {:?})", action);
            *current = action;
        }
    }

    pub fn deferred_action(&self) -> DeferredAction {
        *self.deferred_action.lock()
    }

    fn perform_deferred_action(&self) -> DeviceResult<()> {
        match self.deferred_action() {
            DeferredAction::None => Ok(()),
            DeferredAction::UploadResources => self.upload_resources(),
            DeferredAction::CompleteInitialization =>
                self.complete_initialization(),
        }
    }

    /// Commits and executes the pending upload list of every queue.
    pub fn upload_resources(&self) -> DeviceResult<()> {
        trace!("Context::upload_resources(self: {:?})", fmt_named(self));
        {
            let mut action = self.deferred_action.lock();
            if *action == DeferredAction::UploadResources {
                *action = DeferredAction::None;
            }
        }
        for queue in self.live_queues() {
            queue.flush_uploads()?;
        }
        Ok(())
    }

    /// Reserves deferred descriptor tables, allocates heaps and uploads
    /// pending resource data.
    pub fn complete_initialization(&self) -> DeviceResult<()> {
        trace!("Context::complete_initialization(self: {:?})",
            fmt_named(self));
        *self.deferred_action.lock() = DeferredAction::None;
        self.resource_manager.complete_initialization()?;
        for queue in self.live_queues() {
            queue.flush_uploads()?;
        }
        Ok(())
    }

    pub fn wait_for_gpu(&self, wait_for: WaitFor) -> DeviceResult<()> {
        trace!("Context::wait_for_gpu(self: {:?}, wait_for: {:?})",
            fmt_named(self), wait_for);
        match wait_for {
            WaitFor::RenderComplete =>
                self.render_queue.complete_execution(None),
            WaitFor::FramePresented => self.render_queue
                .complete_execution(Some(self.frame_index())),
            WaitFor::ResourcesUploaded => {
                for queue in self.live_queues() {
                    queue.wait_for_uploads()?;
                }
                Ok(())
            },
        }
    }

    /// Ends the current frame: performs deferred actions, moves to the
    /// next frame slot and waits until that slot's previous work has
    /// completed, then releases resources dropped during it.
    pub fn present(&self) -> DeviceResult<()> {
        trace!("Context::present(self: {:?})", fmt_named(self));
        self.perform_deferred_action()?;
        let index = {
            let mut frame = self.frame.lock();
            frame.number += 1;
            frame.index = (frame.index + 1) % self.settings.frame_buffers_count;
            debug!("frame {} begins in slot {}", frame.number, frame.index);
            frame.index
        };
        for queue in self.live_queues() {
            queue.complete_execution(Some(index))?;
        }
        let pool = self.resource_manager.release_pool();
        pool.release_frame(index);
        pool.set_frame_index(index);
        Ok(())
    }

    /// Drains every queue and releases descriptor heaps and pooled
    /// resources. Runs once; also called on drop.
    pub fn release(&self) {
        if self.released.swap(true, Ordering::AcqRel) { return; }
        debug!("releasing context {:?}", self.settings.name);
        let gpu = self.device.gpu();
        if gpu.mode() == ExecutionMode::Manual {
            let retired = gpu.retire_all();
            if retired > 0 {
                debug!("retired {} pending submissions for teardown", retired);
            }
        }
        for queue in self.live_queues() {
            if let Err(err) = queue.complete_execution(None) {
                error!("draining queue {:?} failed: {}", fmt_named(&*queue), err);
            }
        }
        self.resource_manager.release();
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        self.release();
    }
}
