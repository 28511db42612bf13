// src/core/progress.rs

use std::fmt::Debug;

/// Receives coarse progress milestones from long-running store operations
/// (per file during backup and restore).
pub trait ProgressObserver: Debug {
    /// A new phase begins. `total` is the number of steps, when known.
    fn start(&self, label: &str, total: Option<u64>);
    /// Step `current` of the phase has been reached.
    fn update(&self, current: u64, detail: &str);
    /// The phase ended.
    fn finish(&self, label: &str);
}

/// Discards every milestone.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentProgress;

impl ProgressObserver for SilentProgress {
    fn start(&self, _label: &str, _total: Option<u64>) {}
    fn update(&self, _current: u64, _detail: &str) {}
    fn finish(&self, _label: &str) {}
}

/// Forwards milestones to the `log` facade at trace level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogProgress;

impl ProgressObserver for LogProgress {
    fn start(&self, label: &str, total: Option<u64>) {
        match total {
            Some(total) => log::debug!("{} ({} steps)", label, total),
            None => log::debug!("{}", label),
        }
    }

    fn update(&self, current: u64, detail: &str) {
        log::trace!("  [{}] {}", current, detail);
    }

    fn finish(&self, label: &str) {
        log::debug!("{} done.", label);
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::ProgressObserver;
    use std::cell::RefCell;

    /// Records every milestone, for assertions.
    #[derive(Debug, Default)]
    pub(crate) struct RecordingProgress {
        pub(crate) events: RefCell<Vec<String>>,
    }

    impl ProgressObserver for RecordingProgress {
        fn start(&self, label: &str, _total: Option<u64>) {
            self.events.borrow_mut().push(format!("start:{}", label));
        }
        fn update(&self, current: u64, _detail: &str) {
            self.events.borrow_mut().push(format!("update:{}", current));
        }
        fn finish(&self, label: &str) {
            self.events.borrow_mut().push(format!("finish:{}", label));
        }
    }
}
