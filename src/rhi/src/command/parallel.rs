use std::sync::Arc;

use crate::*;

/// A group of render lists recorded on worker threads and submitted as
/// one set. Barriers needed before any of the lists run are recorded on
/// a separate beginning list which executes first.
#[derive(Debug)]
pub struct ParallelRenderCommandList {
    name: Option<String>,
    beginning: Arc<CommandList>,
    lists: Vec<Arc<CommandList>>,
}

impl Named for ParallelRenderCommandList {
    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

impl ParallelRenderCommandList {
    pub fn new(device: &Arc<Device>, count: usize, name: Option<String>) ->
        DeviceResult<Self>
    {
        trace!("ParallelRenderCommandList::new(count: {}, name: {:?})",
            count, name);
        precondition!(count > 0, "parallel list {:?} needs at least one list",
            name);
        let label = |suffix: String| name.as_ref()
            .map(|name| format!("{} {}", name, suffix));
        let beginning = CommandList::new(
            device, CommandListType::ParallelRender,
            label("beginning".to_owned()));
        let lists = (0..count)
            .map(|i| CommandList::new(
                device, CommandListType::ParallelRender, label(i.to_string())))
            .collect();
        Ok(Self { name, beginning, lists })
    }

    pub fn lists(&self) -> &[Arc<CommandList>] {
        &self.lists
    }

    pub fn beginning_list(&self) -> &Arc<CommandList> {
        &self.beginning
    }

    pub fn set_beginning_barriers(&self, barriers: &ResourceBarriers) ->
        DeviceResult<()>
    {
        self.beginning.set_resource_barriers(barriers)
    }

    /// Runs `record(index, list)` for every list, each on its own scoped
    /// thread. The first error (or panic) is returned.
    pub fn record_parallel<F>(&self, record: F) -> DeviceResult<()>
    where
        F: Fn(usize, &CommandList) -> DeviceResult<()> + Sync,
    {
        trace!("ParallelRenderCommandList::record_parallel(self: {:?}, \
            lists: {})", fmt_named(self), self.lists.len());
        let record = &record;
        let res = crossbeam::scope(|s| {
            let handles: Vec<_> = self.lists.iter().enumerate()
                .map(|(i, list)| s.spawn(move |_| record(i, list)))
                .collect();
            handles.into_iter()
                .map(|handle| handle.join()
                    .unwrap_or_else(|payload| Err(Error::from_panic(payload))))
                .collect::<DeviceResult<Vec<()>>>()
        });
        match res {
            Ok(res) => res.map(|_| ()),
            Err(payload) => Err(Error::from_panic(payload)),
        }
    }

    /// Commits every list. Only the last list carries the present flag.
    pub fn commit(&self, present: bool) -> DeviceResult<()> {
        self.beginning.commit(false)?;
        let last = self.lists.len() - 1;
        for (i, list) in self.lists.iter().enumerate() {
            list.commit(present && i == last)?;
        }
        Ok(())
    }

    pub fn reset(&self, debug_group: Option<&str>) {
        self.beginning.reset(None);
        for list in self.lists.iter() {
            list.reset(debug_group);
        }
    }

    /// Builds the submission set, beginning list first.
    pub fn command_list_set(&self, frame_index: Option<u32>) ->
        DeviceResult<Arc<CommandListSet>>
    {
        let lists = std::iter::once(&self.beginning)
            .chain(self.lists.iter())
            .cloned()
            .collect();
        CommandListSet::new(lists, frame_index)
    }
}
