use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use parking_lot::{Condvar, Mutex};

use crate::*;

#[derive(Debug, Default)]
struct Fifo {
    sets: VecDeque<Arc<CommandListSet>>,
    shutdown: bool,
}

/// State shared with the completion-waiting task.
#[derive(Debug)]
struct Shared {
    name: String,
    fifo: Mutex<Fifo>,
    cond: Condvar,
    failure: Mutex<Option<Error>>,
    running: AtomicBool,
}

impl Shared {
    fn fail(&self, err: Error) {
        let err = Error::TaskFailed {
            queue: self.name.clone(),
            source: Box::new(err),
        };
        *self.failure.lock() = Some(err.clone());
        let mut fifo = self.fifo.lock();
        abandon_all(&mut fifo, &err);
        self.cond.notify_all();
    }
}

fn abandon_all(fifo: &mut Fifo, err: &Error) {
    if !fifo.sets.is_empty() {
        warn!("abandoning {} executing sets: {}", fifo.sets.len(), err);
    }
    for set in fifo.sets.drain(..) {
        set.abandon(err.clone());
    }
}

fn is_front(fifo: &Fifo, set: &Arc<CommandListSet>) -> bool {
    fifo.sets.front().map_or(false, |front| Arc::ptr_eq(front, set))
}

/// Body of the completion-waiting task: completes sets strictly in
/// submission order until shutdown.
fn wait_for_completions(shared: &Shared) -> DeviceResult<()> {
    loop {
        let set = {
            let mut fifo = shared.fifo.lock();
            loop {
                if let Some(set) = fifo.sets.front() {
                    break Arc::clone(set);
                }
                if fifo.shutdown {
                    return Ok(());
                }
                shared.cond.wait(&mut fifo);
            }
        };
        if let Some((fence, value)) = set.completion_fence() {
            fence.wait(value)?;
        }
        let mut fifo = shared.fifo.lock();
        // complete_execution may have drained it meanwhile
        if is_front(&fifo, &set) {
            fifo.sets.pop_front();
            shared.cond.notify_all();
            set.complete()?;
        }
    }
}

/// An ordered submission channel to the GPU. Every queue owns one
/// completion-waiting thread which observes GPU completion of submitted
/// sets in FIFO order and runs their completion callbacks.
#[derive(Debug)]
pub struct CommandQueue {
    device: Arc<Device>,
    ty: CommandListType,
    policy: CompletionPolicy,
    shared: Arc<Shared>,
    // Serializes submission; holds the last timeline value used
    submit_lock: Mutex<u64>,
    timeline: Arc<Fence>,
    waiter: Mutex<Option<JoinHandle<DeviceResult<()>>>>,
    upload: Mutex<Option<Arc<CommandList>>>,
    last_upload: Mutex<Option<Arc<CommandListSet>>>,
}

impl Named for CommandQueue {
    fn name(&self) -> Option<&str> {
        Some(&self.shared.name)
    }
}

impl CommandQueue {
    pub fn new(
        device: &Arc<Device>,
        ty: CommandListType,
        name: impl Into<String>,
    ) -> DeviceResult<Arc<Self>> {
        let name = name.into();
        let policy = device.backend().completion_policy();
        trace!("CommandQueue::new(ty: {:?}, name: {:?}, policy: {:?})",
            ty, name, policy);
        let shared = Arc::new(Shared {
            name: name.clone(),
            fifo: Default::default(),
            cond: Condvar::new(),
            failure: Mutex::new(None),
            running: AtomicBool::new(true),
        });
        let task_shared = Arc::clone(&shared);
        let waiter = thread::Builder::new()
            .name(format!("{}-completion", name))
            .spawn(move || {
                let shared = task_shared;
                debug!("completion task of queue {:?} started", shared.name);
                let result = panic::catch_unwind(AssertUnwindSafe(||
                    wait_for_completions(&shared)))
                    .unwrap_or_else(|payload| Err(Error::from_panic(payload)));
                if let Err(err) = &result {
                    error!("completion task of queue {:?} failed: {}",
                        shared.name, err);
                    shared.fail(err.clone());
                }
                shared.running.store(false, Ordering::Release);
                debug!("completion task of queue {:?} stopped", shared.name);
                result
            })
            .map_err(anyhow::Error::from)
            .on_device(device)?;
        Ok(Arc::new(Self {
            device: Arc::clone(device),
            ty,
            policy,
            timeline: Arc::new(Fence::new(0).with_name(format!("{}-timeline", name))),
            shared,
            submit_lock: Mutex::new(0),
            waiter: Mutex::new(Some(waiter)),
            upload: Mutex::new(None),
            last_upload: Mutex::new(None),
        }))
    }

    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    pub fn list_type(&self) -> CommandListType {
        self.ty
    }

    pub fn completion_policy(&self) -> CompletionPolicy {
        self.policy
    }

    /// Number of submitted sets not yet completed.
    pub fn executing_count(&self) -> usize {
        self.shared.fifo.lock().sets.len()
    }

    pub fn is_completion_task_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    fn check_task(&self) -> DeviceResult<()> {
        match &*self.shared.failure.lock() {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    /// Submits a set. Never blocks on the GPU. If the completion task has
    /// failed, its error is returned instead.
    pub fn execute(
        &self,
        set: &Arc<CommandListSet>,
        callback: Option<CompletionCallback>,
    ) -> DeviceResult<()> {
        trace!("CommandQueue::execute(self: {:?}, lists: {}, frame: {:?})",
            fmt_named(self), set.lists().len(), set.frame_index());
        self.check_task()?;
        set.check_submission(self.ty)?;

        let mut last_value = self.submit_lock.lock();
        let (fence, value) = match self.policy {
            CompletionPolicy::QueueTimeline => {
                *last_value += 1;
                (Arc::clone(&self.timeline), *last_value)
            },
            CompletionPolicy::SubmissionFence => {
                let fence = Fence::new(0)
                    .with_name(format!("{}-submission", self.shared.name));
                (Arc::new(fence), 1)
            },
        };
        let commands = set.begin_execution(Arc::clone(&fence), value, callback);
        let res = self.device.gpu().submit(Submission {
            queue: self.shared.name.clone(),
            commands,
            fence,
            value,
        });
        if let Err(err) = res {
            set.abandon(err.clone());
            return Err(err);
        }

        let mut fifo = self.shared.fifo.lock();
        fifo.sets.push_back(Arc::clone(set));
        self.shared.cond.notify_all();
        Ok(())
    }

    /// Synchronously drains executing sets from the front of the queue.
    /// With a frame index, draining stops at the first set not tagged
    /// with it; without one every set completes. The queue lock is not
    /// held while waiting on the GPU.
    pub fn complete_execution(&self, frame_index: Option<u32>) ->
        DeviceResult<()>
    {
        trace!("CommandQueue::complete_execution(self: {:?}, frame_index: {:?})",
            fmt_named(self), frame_index);
        let matches = |set: &Arc<CommandListSet>| match frame_index {
            Some(frame) => set.frame_index() == Some(frame),
            None => true,
        };

        let mut result = Ok(());
        loop {
            let set = match self.shared.fifo.lock().sets.front() {
                Some(set) if matches(set) => Arc::clone(set),
                _ => break,
            };
            if let Some((fence, value)) = set.completion_fence() {
                if let Err(err) = fence.wait(value) {
                    let mut fifo = self.shared.fifo.lock();
                    abandon_all(&mut fifo, &err);
                    self.shared.cond.notify_all();
                    return Err(err);
                }
            }
            let mut fifo = self.shared.fifo.lock();
            // The completion task may have retired it meanwhile
            if !is_front(&fifo, &set) { continue; }
            fifo.sets.pop_front();
            self.shared.cond.notify_all();
            if let Err(err) = set.complete() {
                error!("completion callback on queue {:?} failed: {}",
                    self.shared.name, err);
                if result.is_ok() {
                    result = Err(err);
                }
            }
        }
        result
    }

    /// Records into this queue's pending upload list, creating it on
    /// first use.
    pub fn record_upload(
        &self,
        record: impl FnOnce(&CommandList) -> DeviceResult<()>,
    ) -> DeviceResult<()> {
        let mut upload = self.upload.lock();
        let list = upload.get_or_insert_with(|| CommandList::new(
            &self.device,
            CommandListType::Blit,
            Some(format!("{}-upload", self.shared.name)),
        ));
        record(list)
    }

    pub fn has_pending_uploads(&self) -> bool {
        self.upload.lock().is_some()
    }

    /// Commits and executes the pending upload list, if any.
    pub(crate) fn flush_uploads(&self) -> DeviceResult<()> {
        let list = match self.upload.lock().take() {
            Some(list) => list,
            None => return Ok(()),
        };
        debug!("flushing {} upload commands on queue {:?}",
            list.command_count(), self.shared.name);
        list.commit(false)?;
        let set = CommandListSet::new(vec![list], None)?;
        self.execute(&set, None)?;
        *self.last_upload.lock() = Some(set);
        Ok(())
    }

    /// Blocks until the last flushed upload has finished on the GPU.
    pub(crate) fn wait_for_uploads(&self) -> DeviceResult<()> {
        let set = self.last_upload.lock().clone();
        match set {
            Some(set) => set.wait_for_gpu(),
            None => Ok(()),
        }
    }
}

impl Drop for CommandQueue {
    fn drop(&mut self) {
        if let Err(err) = self.complete_execution(None) {
            error!("draining queue {:?} failed: {}", self.shared.name, err);
        }
        {
            let mut fifo = self.shared.fifo.lock();
            fifo.shutdown = true;
            self.shared.cond.notify_all();
        }
        if let Some(waiter) = self.waiter.lock().take() {
            match waiter.join() {
                Ok(Ok(())) => {},
                // Already logged and latched by the task
                Ok(Err(_)) => {},
                Err(_) => error!("completion task of queue {:?} panicked",
                    self.shared.name),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::testing::*;

    fn committed_set(vars: &TestVars, frame: Option<u32>) ->
        Arc<CommandListSet>
    {
        let list = vars.context.create_command_list(CommandListType::Render, None);
        list.push_debug_group("work").unwrap();
        list.commit(false).unwrap();
        CommandListSet::new(vec![list], frame).unwrap()
    }

    fn queue(vars: &TestVars) -> Arc<CommandQueue> {
        vars.context.create_command_queue(CommandListType::Render, "test")
            .unwrap()
    }

    #[test]
    fn callbacks_fire_in_submission_order() {
        for &kind in [BackendKind::DirectX12, BackendKind::Vulkan].iter() {
            let vars = TestVars::manual(kind);
            let queue = queue(&vars);
            let order = Arc::new(Mutex::new(Vec::new()));
            let sets: Vec<_> = (0..8).map(|i| {
                let set = committed_set(&vars, None);
                let order = Arc::clone(&order);
                let callback = move |_: &CommandListSet| order.lock().push(i);
                queue.execute(&set, Some(Box::new(callback))).unwrap();
                set
            }).collect();
            assert_eq!(queue.executing_count(), 8);

            vars.gpu().retire_all();
            for set in sets.iter() {
                set.wait_until_completed().unwrap();
            }
            assert_eq!(*order.lock(), (0..8).collect::<Vec<_>>());
            assert_eq!(queue.executing_count(), 0);
        }
    }

    #[test]
    fn complete_execution_by_frame() {
        let vars = TestVars::manual(BackendKind::Vulkan);
        let queue = queue(&vars);
        let a = committed_set(&vars, Some(0));
        let b = committed_set(&vars, Some(1));
        queue.execute(&a, None).unwrap();
        queue.execute(&b, None).unwrap();

        vars.gpu().retire(1);
        queue.complete_execution(Some(0)).unwrap();
        assert_eq!(a.state(), ExecutionState::Complete);
        assert_eq!(b.state(), ExecutionState::Executing);

        // Dropping the queue blocks until B completes
        let context = Arc::clone(&vars.context);
        let retirer = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            context.device().gpu().retire_all();
        });
        drop(queue);
        assert_eq!(b.state(), ExecutionState::Complete);
        retirer.join().unwrap();
    }

    #[test]
    fn frame_drain_stops_at_other_frames() {
        let vars = TestVars::manual(BackendKind::DirectX12);
        let queue = queue(&vars);
        let a = committed_set(&vars, Some(1));
        let b = committed_set(&vars, Some(0));
        let c = committed_set(&vars, Some(1));
        queue.execute(&a, None).unwrap();
        queue.execute(&b, None).unwrap();
        queue.execute(&c, None).unwrap();

        // Nothing is retired, so any drain would block
        queue.complete_execution(Some(0)).unwrap();
        assert_eq!(a.state(), ExecutionState::Executing);
        assert_eq!(b.state(), ExecutionState::Executing);
        assert_eq!(queue.executing_count(), 3);

        vars.gpu().retire(1);
        queue.complete_execution(Some(1)).unwrap();
        assert_eq!(a.state(), ExecutionState::Complete);
        assert_eq!(b.state(), ExecutionState::Executing);
        assert_eq!(c.state(), ExecutionState::Executing);

        vars.gpu().retire_all();
        queue.complete_execution(None).unwrap();
        assert_eq!(c.state(), ExecutionState::Complete);
    }

    #[test]
    fn execute_does_not_wait_for_drain() {
        let vars = TestVars::manual(BackendKind::DirectX12);
        let queue = queue(&vars);
        let a = committed_set(&vars, None);
        queue.execute(&a, None).unwrap();

        let drainer = {
            let queue = Arc::clone(&queue);
            std::thread::spawn(move || queue.complete_execution(None))
        };
        std::thread::sleep(Duration::from_millis(20));
        let b = committed_set(&vars, None);
        queue.execute(&b, None).unwrap();
        assert_eq!(a.state(), ExecutionState::Executing);

        vars.gpu().retire_all();
        drainer.join().unwrap().unwrap();
        b.wait_until_completed().unwrap();
        assert_eq!(queue.executing_count(), 0);
    }

    #[test]
    fn unmatched_frame_drains_nothing() {
        let vars = TestVars::manual(BackendKind::DirectX12);
        let queue = queue(&vars);
        let a = committed_set(&vars, Some(0));
        queue.execute(&a, None).unwrap();
        queue.complete_execution(Some(5)).unwrap();
        assert_eq!(a.state(), ExecutionState::Executing);
        vars.gpu().retire_all();
        queue.complete_execution(None).unwrap();
        assert_eq!(a.state(), ExecutionState::Complete);
    }

    #[test]
    fn sets_can_be_resubmitted() {
        let vars = TestVars::new();
        let queue = queue(&vars);
        let set = committed_set(&vars, None);
        queue.execute(&set, None).unwrap();
        queue.complete_execution(None).unwrap();
        queue.execute(&set, None).unwrap();
        set.wait_until_completed().unwrap();
        assert_eq!(vars.gpu().stats().debug_groups, 2);
    }

    #[test]
    fn executing_set_is_rejected() {
        let vars = TestVars::manual(BackendKind::Null);
        let queue = queue(&vars);
        let set = committed_set(&vars, None);
        queue.execute(&set, None).unwrap();
        assert!(queue.execute(&set, None).unwrap_err().is_precondition());
        vars.gpu().retire_all();
    }

    #[test]
    fn panicking_callback_fails_task() {
        let vars = TestVars::manual(BackendKind::DirectX12);
        let queue = queue(&vars);
        let bad = committed_set(&vars, None);
        let callback = |_: &CommandListSet| panic!("callback failed");
        queue.execute(&bad, Some(Box::new(callback))).unwrap();
        vars.gpu().retire_all();
        bad.wait_until_completed().unwrap();
        while queue.is_completion_task_running() {
            std::thread::sleep(Duration::from_millis(1));
        }

        for _ in 0..2 {
            let set = committed_set(&vars, None);
            let err = queue.execute(&set, None).unwrap_err();
            match &err {
                Error::TaskFailed { queue, .. } => assert_eq!(queue, "test"),
                other => panic!("unexpected error {:?}", other),
            }
            assert_eq!(err.root_cause().to_string(), "panicked: callback failed");
        }
    }

    #[test]
    fn device_loss_fails_waiters() {
        let vars = TestVars::manual(BackendKind::Vulkan);
        let queue = queue(&vars);
        let set = committed_set(&vars, None);
        queue.execute(&set, None).unwrap();
        vars.gpu().lose_device();

        let err = set.wait_until_completed().unwrap_err();
        assert!(matches!(err.root_cause(), Error::DeviceLost), "{}", err);
        while queue.is_completion_task_running() {
            std::thread::sleep(Duration::from_millis(1));
        }
        let set = committed_set(&vars, None);
        assert!(matches!(queue.execute(&set, None),
            Err(Error::TaskFailed { .. })));
    }

    #[test]
    fn uploads_flush_as_one_set() {
        let vars = TestVars::new();
        let queue = queue(&vars);
        let src = vars.context.create_buffer(BufferSettings {
            storage: StorageMode::Managed,
            size: 4,
            ..Default::default()
        }).unwrap();
        let dst = vars.context.create_buffer(BufferSettings {
            size: 4,
            ..Default::default()
        }).unwrap();
        assert!(!queue.has_pending_uploads());
        for _ in 0..3 {
            queue.record_upload(|list| list.copy_buffer(&src, 0, &dst, 0, 4))
                .unwrap();
        }
        assert!(queue.has_pending_uploads());
        queue.flush_uploads().unwrap();
        queue.wait_for_uploads().unwrap();
        assert!(!queue.has_pending_uploads());
        assert_eq!(vars.gpu().stats().copies, 3);
    }
}
