use smallvec::SmallVec;
use std::{
    collections::VecDeque,
    fmt, mem,
    time::{Duration, Instant},
};

/// Timing of a single engine frame.
#[derive(Default, Clone)]
pub struct FrameTiming {
    pub frame: u64,
    /// Time spent in the whole frame, including dirty handling between updates.
    pub total: Duration,
    /// Update time of each manager, in update order.
    pub managers: SmallVec<[(&'static str, Duration); 8]>,
}

impl FrameTiming {
    pub fn manager_time(&self, label: &str) -> Option<Duration> {
        self.managers
            .iter()
            .find(|(name, _)| *name == label)
            .map(|&(_, time)| time)
    }
}

impl fmt::Debug for FrameTiming {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameTiming")
            .field("frame", &self.frame)
            .field("total", &self.total)
            .field("managers", &self.managers)
            .finish()
    }
}

/// Records per-manager update times into a bounded frame history.
pub struct FrameProfiler {
    pub max_history_size: usize,
    history: VecDeque<FrameTiming>,
    frame_start: Option<Instant>,
    pending: FrameTiming,
}

impl FrameProfiler {
    pub fn new(max_history_size: usize) -> Self {
        Self {
            max_history_size: max_history_size.max(1),
            history: VecDeque::with_capacity(max_history_size.min(1024)),
            frame_start: None,
            pending: FrameTiming::default(),
        }
    }

    pub fn begin_frame(&mut self, frame: u64) {
        debug_assert!(self.frame_start.is_none(), "frame {frame} began twice");
        self.frame_start = Some(Instant::now());
        self.pending.frame = frame;
    }

    /// Runs `f`, recording its duration under `label`.
    pub fn measure<T>(&mut self, label: &'static str, f: impl FnOnce() -> T) -> T {
        let start = Instant::now();
        let result = f();
        self.pending.managers.push((label, start.elapsed()));
        result
    }

    pub fn finish_frame(&mut self) {
        let mut pending = mem::take(&mut self.pending);
        pending.total = self
            .frame_start
            .take()
            .map_or(Duration::ZERO, |start| start.elapsed());
        self.push(pending);
    }

    /// Drops a frame that failed halfway.
    pub fn abandon_frame(&mut self) {
        self.frame_start = None;
        self.pending = FrameTiming::default();
    }

    fn push(&mut self, timing: FrameTiming) {
        while self.history.len() >= self.max_history_size {
            self.history.pop_front();
        }
        self.history.push_back(timing);
    }

    pub fn history(&self) -> &VecDeque<FrameTiming> {
        &self.history
    }

    pub fn last_frame(&self) -> Option<&FrameTiming> {
        self.history.back()
    }

    pub fn average_frame_time(&self) -> Option<Duration> {
        average(self.history.iter().map(|timing| timing.total))
    }

    /// Average update time of a manager, over the frames it was measured in.
    pub fn average_of(&self, label: &str) -> Option<Duration> {
        average(self.history.iter().filter_map(|timing| timing.manager_time(label)))
    }

    /// Average update time of every manager of the last frame, in its update order.
    pub fn averages(&self) -> Vec<(&'static str, Duration)> {
        let Some(last) = self.last_frame() else {
            return Vec::new();
        };
        last.managers
            .iter()
            .filter_map(|&(label, _)| Some((label, self.average_of(label)?)))
            .collect()
    }

    pub fn clear(&mut self) {
        self.history.clear();
        self.abandon_frame();
    }
}

fn average(durations: impl Iterator<Item = Duration>) -> Option<Duration> {
    let (sum, count) = durations.fold((Duration::ZERO, 0u32), |(sum, count), duration| {
        (sum + duration, count + 1)
    });
    (count > 0).then(|| sum / count)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timing(frame: u64, millis: u64) -> FrameTiming {
        FrameTiming {
            frame,
            total: Duration::from_millis(millis * 2),
            managers: [("actors", Duration::from_millis(millis))].into_iter().collect(),
        }
    }

    #[test]
    fn history_is_bounded() {
        let mut profiler = FrameProfiler::new(3);
        for frame in 1..=5 {
            profiler.begin_frame(frame);
            profiler.measure("actors", || ());
            profiler.measure("cameras", || ());
            profiler.finish_frame();
        }

        let frames: Vec<_> = profiler.history().iter().map(|timing| timing.frame).collect();
        assert_eq!(frames, [3, 4, 5]);
        let labels: Vec<_> = profiler.last_frame().unwrap().managers.iter().map(|m| m.0).collect();
        assert_eq!(labels, ["actors", "cameras"]);
    }

    #[test]
    fn averages() {
        let mut profiler = FrameProfiler::new(10);
        assert_eq!(profiler.average_frame_time(), None);

        profiler.push(timing(1, 10));
        profiler.push(timing(2, 30));
        assert_eq!(profiler.average_of("actors"), Some(Duration::from_millis(20)));
        assert_eq!(profiler.average_frame_time(), Some(Duration::from_millis(40)));
        assert_eq!(profiler.average_of("cameras"), None);
        assert_eq!(profiler.averages(), [("actors", Duration::from_millis(20))]);
    }

    #[test]
    fn abandoned_frames_are_not_recorded() {
        let mut profiler = FrameProfiler::new(10);
        profiler.begin_frame(1);
        profiler.measure("actors", || ());
        profiler.abandon_frame();
        profiler.begin_frame(2);
        profiler.finish_frame();

        assert_eq!(profiler.history().len(), 1);
        assert!(profiler.last_frame().unwrap().managers.is_empty());
    }
}
