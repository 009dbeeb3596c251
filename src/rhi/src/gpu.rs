use std::collections::VecDeque;
use std::sync::Arc;

use derivative::Derivative;
use parking_lot::Mutex;

use crate::*;

/// Default upper bound on a single allocation.
pub const DEFAULT_MAX_ALLOCATION_SIZE: u64 = 1 << 30;

/// When submitted work executes.
#[derive(Clone, Copy, Debug, Derivative, Eq, Hash, PartialEq)]
#[derivative(Default)]
pub enum ExecutionMode {
    /// Work runs to completion inside `submit`.
    #[derivative(Default)]
    Immediate,
    /// Work stays pending until explicitly retired, which makes
    /// in-flight states observable.
    Manual,
}

impl std::str::FromStr for ExecutionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "immediate" => Ok(ExecutionMode::Immediate),
            "manual" => Ok(ExecutionMode::Manual),
            other => Err(format!("unknown GPU execution mode {:?}", other)),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct GpuStats {
    pub submissions: u64,
    pub barriers: u64,
    pub copies: u64,
    pub copied_bytes: u64,
    pub state_binds: u64,
    pub binding_binds: u64,
    pub vertex_buffer_binds: u64,
    pub index_buffer_binds: u64,
    pub draws: u64,
    /// Indices processed across all instances.
    pub indices_drawn: u64,
    pub debug_groups: u64,
    pub presents: u64,
}

#[derive(Debug)]
pub(crate) struct Submission {
    pub(crate) queue: String,
    pub(crate) commands: Vec<Arc<[Command]>>,
    pub(crate) fence: Arc<Fence>,
    pub(crate) value: u64,
}

#[derive(Debug, Default)]
struct GpuState {
    pending: VecDeque<Submission>,
    stats: GpuStats,
    lost: bool,
}

/// Executes recorded commands on the host. Copies move real bytes
/// between device memory blocks so uploads and readbacks can be
/// observed; everything else is counted.
#[derive(Debug)]
pub struct SoftGpu {
    mode: ExecutionMode,
    max_allocation_size: u64,
    state: Mutex<GpuState>,
}

impl SoftGpu {
    pub fn new(mode: ExecutionMode) -> Self {
        Self::with_max_allocation_size(mode, DEFAULT_MAX_ALLOCATION_SIZE)
    }

    pub fn with_max_allocation_size(mode: ExecutionMode, max: u64) -> Self {
        Self {
            mode,
            max_allocation_size: max,
            state: Default::default(),
        }
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    pub fn stats(&self) -> GpuStats {
        self.state.lock().stats
    }

    /// Number of submissions not yet executed.
    pub fn pending_count(&self) -> usize {
        self.state.lock().pending.len()
    }

    pub fn is_lost(&self) -> bool {
        self.state.lock().lost
    }

    pub(crate) fn allocate(&self, size: u64) ->
        anyhow::Result<Arc<DeviceMemory>>
    {
        if size > self.max_allocation_size {
            anyhow::bail!(
                "allocation of {} bytes exceeds the limit of {} bytes",
                size, self.max_allocation_size,
            );
        }
        Ok(Arc::new(DeviceMemory::new(size)))
    }

    pub(crate) fn submit(&self, submission: Submission) -> DeviceResult<()> {
        let mut state = self.state.lock();
        if state.lost {
            return Err(Error::DeviceLost);
        }
        trace!("SoftGpu::submit(queue: {:?}, lists: {}, value: {})",
            submission.queue, submission.commands.len(), submission.value);
        state.stats.submissions += 1;
        match self.mode {
            ExecutionMode::Immediate => execute(&mut state.stats, submission),
            ExecutionMode::Manual => state.pending.push_back(submission),
        }
        Ok(())
    }

    /// Executes up to `count` of the oldest pending submissions and
    /// returns how many ran.
    pub fn retire(&self, count: usize) -> usize {
        let mut state = self.state.lock();
        let mut retired = 0;
        while retired < count {
            let submission = match state.pending.pop_front() {
                Some(submission) => submission,
                None => break,
            };
            execute(&mut state.stats, submission);
            retired += 1;
        }
        retired
    }

    pub fn retire_all(&self) -> usize {
        self.retire(usize::MAX)
    }

    /// Simulates losing the device. Pending work is discarded and every
    /// fence it would have signaled is poisoned.
    pub fn lose_device(&self) {
        let mut state = self.state.lock();
        warn!("device lost with {} pending submissions", state.pending.len());
        state.lost = true;
        for submission in state.pending.drain(..) {
            submission.fence.lose();
        }
    }
}

fn execute(stats: &mut GpuStats, submission: Submission) {
    for list in submission.commands.iter() {
        for command in list.iter() {
            execute_command(stats, command);
        }
    }
    submission.fence.signal(submission.value);
}

fn execute_command(stats: &mut GpuStats, command: &Command) {
    match command {
        Command::Barriers(barriers) => stats.barriers += barriers.len() as u64,
        Command::Copy(region) => {
            let data = region.src.read(region.src_offset, region.size);
            region.dst.write(region.dst_offset, &data);
            stats.copies += 1;
            stats.copied_bytes += region.size;
        },
        Command::SetRenderState(id) => {
            trace!("gpu: render state {}", id);
            stats.state_binds += 1;
        },
        Command::SetProgramBindings(id) => {
            trace!("gpu: program bindings {}", id);
            stats.binding_binds += 1;
        },
        Command::SetVertexBuffers(ids) => {
            trace!("gpu: vertex buffers {:?}", ids);
            stats.vertex_buffer_binds += ids.len() as u64;
        },
        Command::SetIndexBuffer(id) => {
            trace!("gpu: index buffer {}", id);
            stats.index_buffer_binds += 1;
        },
        Command::DrawIndexed(args) => {
            stats.draws += 1;
            stats.indices_drawn +=
                args.index_count as u64 * args.instance_count as u64;
        },
        Command::PushDebugGroup(label) => {
            trace!("gpu: begin {:?}", label);
            stats.debug_groups += 1;
        },
        Command::PopDebugGroup => {},
        Command::Present => stats.presents += 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn copy_submission(
        fence: &Arc<Fence>,
        value: u64,
        src: &Arc<DeviceMemory>,
        dst: &Arc<DeviceMemory>,
    ) -> Submission {
        let commands: Arc<[Command]> = vec![Command::Copy(CopyRegion {
            src: Arc::clone(src),
            src_offset: 0,
            dst: Arc::clone(dst),
            dst_offset: 0,
            size: src.size(),
        })].into();
        Submission {
            queue: "test".to_owned(),
            commands: vec![commands],
            fence: Arc::clone(fence),
            value,
        }
    }

    #[test]
    fn manual_retire() {
        let gpu = SoftGpu::new(ExecutionMode::Manual);
        let src = gpu.allocate(4).unwrap();
        let dst = gpu.allocate(4).unwrap();
        src.write(0, &[1, 2, 3, 4]);
        let fence = Arc::new(Fence::new(0));

        gpu.submit(copy_submission(&fence, 1, &src, &dst)).unwrap();
        gpu.submit(copy_submission(&fence, 2, &src, &dst)).unwrap();
        assert_eq!(gpu.pending_count(), 2);
        assert_eq!(dst.read(0, 4), [0; 4]);
        assert_eq!(fence.value(), 0);

        assert_eq!(gpu.retire(1), 1);
        assert_eq!(fence.value(), 1);
        assert_eq!(dst.read(0, 4), [1, 2, 3, 4]);
        assert_eq!(gpu.retire_all(), 1);
        assert_eq!(fence.value(), 2);

        let stats = gpu.stats();
        assert_eq!(stats.submissions, 2);
        assert_eq!(stats.copies, 2);
        assert_eq!(stats.copied_bytes, 8);
    }

    #[test]
    fn draw_commands_are_counted() {
        let gpu = SoftGpu::new(ExecutionMode::Immediate);
        let fence = Arc::new(Fence::new(0));
        let commands: Arc<[Command]> = vec![
            Command::PushDebugGroup("draws".to_owned()),
            Command::SetRenderState(ResourceId(1)),
            Command::SetVertexBuffers(
                [ResourceId(2), ResourceId(3)].iter().copied().collect()),
            Command::SetIndexBuffer(ResourceId(4)),
            Command::DrawIndexed(DrawArgs {
                index_count: 6,
                instance_count: 3,
                ..Default::default()
            }),
            Command::DrawIndexed(DrawArgs {
                index_count: 4,
                ..Default::default()
            }),
            Command::PopDebugGroup,
        ].into();
        gpu.submit(Submission {
            queue: "test".to_owned(),
            commands: vec![commands],
            fence: Arc::clone(&fence),
            value: 1,
        }).unwrap();
        assert_eq!(fence.value(), 1);

        let stats = gpu.stats();
        assert_eq!(stats.state_binds, 1);
        assert_eq!(stats.binding_binds, 0);
        assert_eq!(stats.vertex_buffer_binds, 2);
        assert_eq!(stats.index_buffer_binds, 1);
        assert_eq!(stats.draws, 2);
        assert_eq!(stats.indices_drawn, 6 * 3 + 4);
        assert_eq!(stats.debug_groups, 1);
    }

    #[test]
    fn lost_device_poisons_fences() {
        let gpu = SoftGpu::new(ExecutionMode::Manual);
        let mem = gpu.allocate(1).unwrap();
        let fence = Arc::new(Fence::new(0));
        gpu.submit(copy_submission(&fence, 1, &mem, &mem)).unwrap();
        gpu.lose_device();
        assert!(fence.is_lost());
        assert!(matches!(fence.wait(1), Err(Error::DeviceLost)));
        let res = gpu.submit(copy_submission(&fence, 2, &mem, &mem));
        assert!(matches!(res, Err(Error::DeviceLost)));
    }

    #[test]
    fn allocation_limit() {
        let gpu = SoftGpu::with_max_allocation_size(ExecutionMode::Immediate, 16);
        assert!(gpu.allocate(16).is_ok());
        assert!(gpu.allocate(17).is_err());
    }
}
