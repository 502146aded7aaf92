use std::sync::mpsc::{Receiver, Sender};
use std::thread;
use std::time::Instant;

use crate::analysis::ConfluenceAnalyzer;

use super::messages::{JobRequest, JobResult};

/// Spawn the confluence worker. The analyzer clone shares its result cache
/// with the engine's copy, so direct evaluations and worker evaluations
/// never repeat each other's work.
pub fn spawn_worker_thread(
    analyzer: ConfluenceAnalyzer,
    rx: Receiver<JobRequest>,
    tx: Sender<JobResult>,
) {
    thread::spawn(move || {
        while let Ok(req) = rx.recv() {
            let start = Instant::now();

            // Pure per-pair computation; all shared risk state stays with
            // the engine thread
            let outcome = analyzer.evaluate(&req.pair_name, &req.timeseries, req.now_ms);

            let result = JobResult {
                pair_name: req.pair_name,
                duration_ms: start.elapsed().as_millis(),
                outcome,
            };
            // Receiver gone means the engine is shutting down
            if tx.send(result).is_err() {
                break;
            }
        }
    });
}
