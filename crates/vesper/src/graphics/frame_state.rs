use super::managers::RenderJob;
use smallvec::SmallVec;

/// Render jobs of one manager.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderBatch {
    pub label: &'static str,
    pub jobs: Vec<RenderJob>,
}

/// Everything rendered in a single frame, collected from every manager after its update, in
/// manager order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameState {
    pub frame: u64,
    pub batches: SmallVec<[RenderBatch; 8]>,
}

impl FrameState {
    pub fn new(frame: u64) -> Self {
        Self {
            frame,
            batches: SmallVec::new(),
        }
    }

    /// Starts a new frame, keeping the batch allocations around.
    pub fn reset(&mut self, frame: u64) {
        self.frame = frame;
        self.batches.clear();
    }

    pub fn push(&mut self, label: &'static str, jobs: &[RenderJob]) {
        self.batches.push(RenderBatch {
            label,
            jobs: jobs.to_vec(),
        });
    }

    /// Jobs of the manager labeled `label`, empty if there's no such manager.
    pub fn jobs_of(&self, label: &str) -> &[RenderJob] {
        self.batches
            .iter()
            .find(|batch| batch.label == label)
            .map_or(&[], |batch| &batch.jobs)
    }

    pub fn job_count(&self) -> usize {
        self.batches.iter().map(|batch| batch.jobs.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.job_count() == 0
    }
}
