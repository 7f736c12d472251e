use std::path::{Path, PathBuf};
use std::time::Duration;

use log::debug;

#[cfg(feature = "parallelism")]
use rayon::prelude::*;

use super::dispatch::{FormatDispatcher, ImportOptions, ImportOutcome, ImportState};

/// Reported once for every file a batch finishes, successful or not
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressEvent {
    /// The position of the file in the batch
    pub index: usize,
    pub total: usize,
    pub path: PathBuf,
    pub bytes: u64,
    pub elapsed: Duration,
    pub state: ImportState,
}

/// Imports many files independently. A file that fails to import is reported
/// in its own outcome and never stops the rest of the batch.
///
/// With the `parallelism` feature files are imported on the `rayon` thread
/// pool, so progress events may arrive out of order.
#[derive(Debug, Clone, Default)]
pub struct BatchImporter {
    dispatcher: FormatDispatcher,
}

impl BatchImporter {
    pub fn new(options: ImportOptions) -> Self {
        Self {
            dispatcher: FormatDispatcher::new(options),
        }
    }

    pub fn dispatcher(&self) -> &FormatDispatcher {
        &self.dispatcher
    }

    fn import_one<P, F>(&self, index: usize, total: usize, path: &P, on_progress: &F) -> ImportOutcome
    where
        P: AsRef<Path>,
        F: Fn(&ProgressEvent),
    {
        let outcome = self.dispatcher.import_path(path);
        debug!(
            "[{}/{total}] {} finished as {} in {:0.3} seconds",
            index + 1,
            outcome.source,
            outcome.state,
            outcome.elapsed.as_secs_f64()
        );
        on_progress(&ProgressEvent {
            index,
            total,
            path: path.as_ref().to_path_buf(),
            bytes: outcome.bytes_read,
            elapsed: outcome.elapsed,
            state: outcome.state,
        });
        outcome
    }

    /// Import every path, returning outcomes in the order of `paths`
    #[cfg(feature = "parallelism")]
    pub fn import_paths<P, F>(&self, paths: &[P], on_progress: F) -> Vec<ImportOutcome>
    where
        P: AsRef<Path> + Sync,
        F: Fn(&ProgressEvent) + Sync,
    {
        let total = paths.len();
        paths
            .par_iter()
            .enumerate()
            .map(|(index, path)| self.import_one(index, total, path, &on_progress))
            .collect()
    }

    /// Import every path, returning outcomes in the order of `paths`
    #[cfg(not(feature = "parallelism"))]
    pub fn import_paths<P, F>(&self, paths: &[P], on_progress: F) -> Vec<ImportOutcome>
    where
        P: AsRef<Path> + Sync,
        F: Fn(&ProgressEvent) + Sync,
    {
        let total = paths.len();
        paths
            .iter()
            .enumerate()
            .map(|(index, path)| self.import_one(index, total, path, &on_progress))
            .collect()
    }
}
