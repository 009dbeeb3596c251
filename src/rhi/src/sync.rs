use std::time::{Duration, Instant};

use log::trace;
use parking_lot::{Condvar, Mutex};

use crate::*;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[must_use]
pub enum WaitResult {
    Success,
    Timeout,
}

/// A CPU-visible timeline fence. The GPU signals monotonically
/// increasing values; the CPU blocks until a value is reached.
#[derive(Debug)]
pub struct Fence {
    state: Mutex<FenceState>,
    cond: Condvar,
    name: Option<String>,
}

#[derive(Debug)]
struct FenceState {
    value: u64,
    lost: bool,
}

impl Fence {
    pub fn new(value: u64) -> Self {
        Self {
            state: Mutex::new(FenceState { value, lost: false }),
            cond: Condvar::new(),
            name: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn value(&self) -> u64 {
        self.state.lock().value
    }

    pub fn is_lost(&self) -> bool {
        self.state.lock().lost
    }

    pub fn signal(&self, value: u64) {
        trace!("Fence::signal(self: {:?}, value: {})", fmt_named(self), value);
        let mut state = self.state.lock();
        assert!(value >= state.value,
            "fence value went backwards: {} < {}", value, state.value);
        state.value = value;
        self.cond.notify_all();
    }

    /// Poisons the fence: waits on values not yet reached fail with
    /// `DeviceLost` instead of blocking forever.
    pub fn lose(&self) {
        let mut state = self.state.lock();
        state.lost = true;
        self.cond.notify_all();
    }

    /// Blocks until the fence reaches `value`. There is no timeout.
    pub fn wait(&self, value: u64) -> DeviceResult<()> {
        trace!("Fence::wait(self: {:?}, value: {})", fmt_named(self), value);
        let mut state = self.state.lock();
        loop {
            if state.value >= value { return Ok(()); }
            if state.lost { return Err(Error::DeviceLost); }
            self.cond.wait(&mut state);
        }
    }

    pub fn wait_timeout(&self, value: u64, timeout: Duration) ->
        DeviceResult<WaitResult>
    {
        trace!("Fence::wait_timeout(self: {:?}, value: {}, timeout: {:?})",
            fmt_named(self), value, timeout);
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        loop {
            if state.value >= value { return Ok(WaitResult::Success); }
            if state.lost { return Err(Error::DeviceLost); }
            if self.cond.wait_until(&mut state, deadline).timed_out() {
                return Ok(if state.value >= value {
                    WaitResult::Success
                } else {
                    WaitResult::Timeout
                });
            }
        }
    }
}

impl Named for Fence {
    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}
