use crate::core::chain::Stream;
use std::cell::RefCell;
use std::rc::Rc;

/// Number of elements one combinator stage emitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageCount {
    pub stage: String,
    pub count: usize,
}

/// Shared handle to the per-stage counters of a pipeline.
///
/// Handles stay readable after the pipeline itself has been consumed.
#[derive(Debug, Clone, Default)]
pub struct StageCounts {
    stages: Rc<RefCell<Vec<StageCount>>>,
}

impl StageCounts {
    pub fn snapshot(&self) -> Vec<StageCount> {
        self.stages.borrow().clone()
    }

    pub fn get(&self, stage: &str) -> Option<usize> {
        self.stages
            .borrow()
            .iter()
            .find(|entry| entry.stage == stage)
            .map(|entry| entry.count)
    }

    /// Registers the next stage as `<index>:<name>` and counts what it emits.
    pub(crate) fn instrument<'a, T: 'a>(&self, name: &str, stream: Stream<'a, T>) -> Stream<'a, T> {
        let slot = {
            let mut stages = self.stages.borrow_mut();
            let index = stages.len();
            stages.push(StageCount {
                stage: format!("{}:{}", index, name),
                count: 0,
            });
            index
        };
        let stages = Rc::clone(&self.stages);
        Box::new(stream.inspect(move |item| {
            if item.is_ok() {
                stages.borrow_mut()[slot].count += 1;
            }
        }))
    }

    pub(crate) fn log(&self) {
        for entry in self.stages.borrow().iter() {
            tracing::debug!(stage = %entry.stage, count = entry.count, "stage drained");
        }
    }
}
