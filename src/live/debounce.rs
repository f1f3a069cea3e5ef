//! Coalescing of file saves into incremental update batches.
//!
//! Saves accumulate until `file_saves_before_rebuild` is reached; from then on
//! every save restarts a quiet-period timer. When the timer fires the pending
//! file identifiers are drained as one batch.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::core::config::{AnalysisSettings, SuggestionSettings};

#[derive(Debug, Default)]
struct PendingSaves {
    files: Vec<String>,
    saves: usize,
}

impl PendingSaves {
    fn record(&mut self, file_id: &str) {
        self.files.retain(|pending| pending != file_id);
        self.files.push(file_id.to_string());
        self.saves += 1;
    }

    fn drain(&mut self) -> Vec<String> {
        self.saves = 0;
        std::mem::take(&mut self.files)
    }
}

/// Save debouncer feeding update batches to a channel.
///
/// Must be used from within a tokio runtime.
#[derive(Clone)]
pub struct SaveDebouncer {
    threshold: usize,
    quiet_period: Duration,
    pending: Arc<Mutex<PendingSaves>>,
    timer: Arc<Mutex<Option<JoinHandle<()>>>>,
    batches: mpsc::UnboundedSender<Vec<String>>,
}

impl SaveDebouncer {
    /// Debouncer and the receiving end of its batches
    pub fn new(
        threshold: usize,
        quiet_period: Duration,
    ) -> (Self, mpsc::UnboundedReceiver<Vec<String>>) {
        let (batches, receiver) = mpsc::unbounded_channel();
        let debouncer = Self {
            threshold: threshold.max(1),
            quiet_period,
            pending: Arc::new(Mutex::new(PendingSaves::default())),
            timer: Arc::new(Mutex::new(None)),
            batches,
        };
        (debouncer, receiver)
    }

    /// Debouncer configured from settings
    pub fn from_settings(
        suggestions: &SuggestionSettings,
        analysis: &AnalysisSettings,
    ) -> (Self, mpsc::UnboundedReceiver<Vec<String>>) {
        Self::new(
            suggestions.file_saves_before_rebuild,
            Duration::from_millis(analysis.quiet_period_ms),
        )
    }

    /// Record a save of `file_id`
    pub fn record_save(&self, file_id: &str) {
        let saves = {
            let mut pending = self.pending.lock();
            pending.record(file_id);
            pending.saves
        };
        trace!("Save {} of {}: {}", saves, self.threshold, file_id);
        if saves >= self.threshold {
            self.restart_timer();
        }
    }

    /// Pending file identifiers, most recently saved last
    pub fn pending(&self) -> Vec<String> {
        self.pending.lock().files.clone()
    }

    /// Saves recorded since the last batch
    pub fn save_count(&self) -> usize {
        self.pending.lock().saves
    }

    /// Whether a quiet-period timer is running
    pub fn timer_running(&self) -> bool {
        self.timer
            .lock()
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    /// Emit the pending batch now
    pub fn flush(&self) {
        if let Some(handle) = self.timer.lock().take() {
            handle.abort();
        }
        emit(&self.pending, &self.batches);
    }

    fn restart_timer(&self) {
        let mut timer = self.timer.lock();
        if let Some(handle) = timer.take() {
            handle.abort();
        }

        let pending = self.pending.clone();
        let batches = self.batches.clone();
        let quiet_period = self.quiet_period;
        *timer = Some(tokio::spawn(async move {
            tokio::time::sleep(quiet_period).await;
            emit(&pending, &batches);
        }));
    }
}

fn emit(pending: &Mutex<PendingSaves>, batches: &mpsc::UnboundedSender<Vec<String>>) {
    let files = pending.lock().drain();
    if files.is_empty() {
        return;
    }
    debug!("Quiet period elapsed with {} changed file(s)", files.len());
    if batches.send(files).is_err() {
        debug!("Update batch dropped; receiver closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUIET: Duration = Duration::from_millis(30);

    #[tokio::test]
    async fn saves_below_threshold_do_not_start_timer() {
        let (debouncer, mut batches) = SaveDebouncer::new(3, QUIET);
        debouncer.record_save("<App>/A.cs");
        debouncer.record_save("<App>/B.cs");

        assert!(!debouncer.timer_running());
        tokio::time::sleep(QUIET * 3).await;
        assert!(batches.try_recv().is_err());
        assert_eq!(debouncer.save_count(), 2);
    }

    #[tokio::test]
    async fn batch_is_deduplicated_most_recent_last() {
        let (debouncer, mut batches) = SaveDebouncer::new(3, QUIET);
        debouncer.record_save("<App>/A.cs");
        debouncer.record_save("<App>/B.cs");
        debouncer.record_save("<App>/A.cs");
        assert_eq!(debouncer.pending(), vec!["<App>/B.cs", "<App>/A.cs"]);

        let batch = batches.recv().await.unwrap();
        assert_eq!(batch, vec!["<App>/B.cs", "<App>/A.cs"]);
        assert_eq!(debouncer.save_count(), 0);
        assert!(debouncer.pending().is_empty());
    }

    #[tokio::test]
    async fn later_saves_restart_the_quiet_period() {
        let (debouncer, mut batches) = SaveDebouncer::new(1, Duration::from_millis(400));
        debouncer.record_save("<App>/A.cs");
        tokio::time::sleep(Duration::from_millis(100)).await;
        debouncer.record_save("<App>/B.cs");
        tokio::time::sleep(Duration::from_millis(350)).await;
        assert!(batches.try_recv().is_err());

        let batch = batches.recv().await.unwrap();
        assert_eq!(batch, vec!["<App>/A.cs", "<App>/B.cs"]);
    }

    #[tokio::test]
    async fn flush_emits_immediately() {
        let (debouncer, mut batches) = SaveDebouncer::new(10, QUIET);
        debouncer.record_save("<App>/A.cs");
        debouncer.flush();
        assert_eq!(batches.recv().await.unwrap(), vec!["<App>/A.cs"]);

        debouncer.flush();
        assert!(batches.try_recv().is_err());
    }
}
