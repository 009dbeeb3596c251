use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::*;

/// Execution state of a set as seen by its queue.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ExecutionState {
    /// Not submitted, or ready to be submitted again.
    Pending,
    /// Submitted; the GPU has not signaled completion yet.
    Executing,
    /// Completion observed and bookkeeping done.
    Complete,
}

pub type CompletionCallback = Box<dyn FnOnce(&CommandListSet) + Send>;

struct SetState {
    state: ExecutionState,
    fence: Option<(Arc<Fence>, u64)>,
    callback: Option<CompletionCallback>,
    // Set when the queue gave up on this set
    failure: Option<Error>,
}

impl std::fmt::Debug for SetState {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("SetState")
            .field("state", &self.state)
            .field("fence", &self.fence)
            .field("callback", &self.callback.is_some())
            .field("failure", &self.failure)
            .finish()
    }
}

/// Command lists submitted together.
#[derive(Debug)]
pub struct CommandListSet {
    lists: Vec<Arc<CommandList>>,
    frame_index: Option<u32>,
    state: Mutex<SetState>,
    cond: Condvar,
}

impl CommandListSet {
    pub fn new(lists: Vec<Arc<CommandList>>, frame_index: Option<u32>) ->
        DeviceResult<Arc<Self>>
    {
        precondition!(!lists.is_empty(), "empty command list set");
        for list in lists.iter() {
            precondition!(list.state() == CommandListState::Committed,
                "{:?} is {:?}; sets take committed lists",
                fmt_named(&**list), list.state());
        }
        Ok(Arc::new(Self {
            lists,
            frame_index,
            state: Mutex::new(SetState {
                state: ExecutionState::Pending,
                fence: None,
                callback: None,
                failure: None,
            }),
            cond: Condvar::new(),
        }))
    }

    pub fn lists(&self) -> &[Arc<CommandList>] {
        &self.lists
    }

    pub fn frame_index(&self) -> Option<u32> {
        self.frame_index
    }

    pub fn state(&self) -> ExecutionState {
        self.state.lock().state
    }

    /// Blocks until the GPU has finished the set. Completion bookkeeping
    /// on the queue may still be outstanding.
    pub fn wait_for_gpu(&self) -> DeviceResult<()> {
        let fence = {
            let state = self.state.lock();
            if let Some(err) = &state.failure {
                return Err(err.clone());
            }
            match state.state {
                ExecutionState::Pending => return Err(Error::Precondition(
                    "waiting on a set that was never executed".to_owned())),
                ExecutionState::Complete => return Ok(()),
                ExecutionState::Executing => state.fence.clone(),
            }
        };
        match fence {
            Some((fence, value)) => fence.wait(value),
            None => Ok(()),
        }
    }

    /// Blocks until the owning queue has marked the set complete.
    pub fn wait_until_completed(&self) -> DeviceResult<()> {
        let mut state = self.state.lock();
        loop {
            if let Some(err) = &state.failure {
                return Err(err.clone());
            }
            match state.state {
                ExecutionState::Pending => return Err(Error::Precondition(
                    "waiting on a set that was never executed".to_owned())),
                ExecutionState::Complete => return Ok(()),
                ExecutionState::Executing => self.cond.wait(&mut state),
            }
        }
    }

    /// Checks that the set may be submitted to a queue of type `ty`.
    pub(crate) fn check_submission(&self, ty: CommandListType) ->
        DeviceResult<()>
    {
        precondition!(self.state() != ExecutionState::Executing,
            "command list set is already executing");
        for list in self.lists.iter() {
            precondition!(ty.supports(list.list_type()),
                "a {:?} queue cannot execute {:?} list {:?}",
                ty, list.list_type(), fmt_named(&**list));
            precondition!(list.state() == CommandListState::Committed,
                "{:?} is {:?}; only committed lists can execute",
                fmt_named(&**list), list.state());
        }
        Ok(())
    }

    /// Marks the set executing and returns the commands of its lists.
    pub(crate) fn begin_execution(
        &self,
        fence: Arc<Fence>,
        value: u64,
        callback: Option<CompletionCallback>,
    ) -> Vec<Arc<[Command]>> {
        let mut state = self.state.lock();
        state.state = ExecutionState::Executing;
        state.fence = Some((fence, value));
        state.callback = callback;
        state.failure = None;
        self.lists.iter().map(|list| list.begin_execution()).collect()
    }

    pub(crate) fn completion_fence(&self) -> Option<(Arc<Fence>, u64)> {
        self.state.lock().fence.clone()
    }

    /// Finishes bookkeeping and runs the completion callback. A panic in
    /// the callback is returned as an error after the set is complete.
    pub(crate) fn complete(&self) -> DeviceResult<()> {
        let callback = {
            let mut state = self.state.lock();
            if state.state != ExecutionState::Executing { return Ok(()); }
            for list in self.lists.iter() {
                list.complete_execution();
            }
            state.state = ExecutionState::Complete;
            self.cond.notify_all();
            state.callback.take()
        };
        match callback {
            Some(callback) => panic::catch_unwind(AssertUnwindSafe(||
                callback(self))).map_err(Error::from_panic),
            None => Ok(()),
        }
    }

    /// Gives up on a set whose completion can no longer be observed.
    pub(crate) fn abandon(&self, err: Error) {
        let mut state = self.state.lock();
        if state.state != ExecutionState::Executing { return; }
        for list in self.lists.iter() {
            list.complete_execution();
        }
        state.callback = None;
        state.failure = Some(err);
        self.cond.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::*;

    #[test]
    fn requires_committed_lists() {
        let vars = TestVars::new();
        assert!(CommandListSet::new(vec![], None).unwrap_err()
            .is_precondition());
        let list = vars.context.create_command_list(CommandListType::Blit, None);
        assert!(CommandListSet::new(vec![Arc::clone(&list)], None).is_err());
        list.commit(false).unwrap();
        let set = CommandListSet::new(vec![list], Some(2)).unwrap();
        assert_eq!(set.frame_index(), Some(2));
        assert_eq!(set.state(), ExecutionState::Pending);
        assert!(set.wait_until_completed().is_err());
    }

    #[test]
    fn queue_type_compatibility() {
        let vars = TestVars::new();
        let list = vars.context.create_command_list(CommandListType::Render, None);
        list.commit(false).unwrap();
        let set = CommandListSet::new(vec![list], None).unwrap();
        assert!(set.check_submission(CommandListType::Render).is_ok());
        assert!(set.check_submission(CommandListType::ParallelRender).is_ok());
        assert!(set.check_submission(CommandListType::Blit).unwrap_err()
            .is_precondition());
    }

    #[test]
    fn callback_panic_is_reported() {
        let vars = TestVars::new();
        let list = vars.context.create_command_list(CommandListType::Blit, None);
        list.commit(false).unwrap();
        let set = CommandListSet::new(vec![Arc::clone(&list)], None).unwrap();
        let fence = Arc::new(Fence::new(1));
        let callback = |_: &CommandListSet| panic!("callback");
        set.begin_execution(fence, 1, Some(Box::new(callback)));
        assert_eq!(list.state(), CommandListState::Executing);
        let err = set.complete().unwrap_err();
        assert_eq!(err.to_string(), "panicked: callback");
        assert_eq!(set.state(), ExecutionState::Complete);
        assert_eq!(list.state(), CommandListState::Committed);
        set.wait_until_completed().unwrap();
    }
}
