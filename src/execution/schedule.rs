//! Asynchronous graph execution.
//!
//! [`Graph::schedule`] moves a graph onto a worker thread and hands back a
//! [`ScheduledGraph`]; waiting on it returns the graph together with the
//! result of its run.

use crate::core::error::ProcessResult;
use crate::graph::structure::Graph;
use crossbeam::channel::{self, Receiver, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// A graph running on a background thread.
pub struct ScheduledGraph {
    handle: JoinHandle<(Graph, ProcessResult<()>)>,
    done: Receiver<()>,
}

impl Graph {
    /// Start processing on a worker thread.
    ///
    /// The graph is handed back by [`ScheduledGraph::wait`], so it can be
    /// neither edited nor scheduled again while it runs.
    pub fn schedule(self) -> ScheduledGraph {
        let (tx, done) = channel::bounded(1);
        let mut graph = self;
        log::debug!("scheduling graph {}", graph.id());
        let handle = thread::spawn(move || {
            let result = graph.process();
            // The receiver may already be gone if the handle was dropped.
            let _ = tx.send(());
            (graph, result)
        });
        ScheduledGraph { handle, done }
    }
}

impl ScheduledGraph {
    /// Whether the run has finished.
    pub fn is_finished(&self) -> bool {
        !self.done.is_empty() || self.handle.is_finished()
    }

    /// Block until the run finishes.
    pub fn wait(self) -> (Graph, ProcessResult<()>) {
        let _ = self.done.recv();
        self.join()
    }

    /// Return the outcome if the run already finished, the handle otherwise.
    pub fn try_wait(self) -> Result<(Graph, ProcessResult<()>), Self> {
        if self.is_finished() {
            Ok(self.wait())
        } else {
            Err(self)
        }
    }

    /// Wait at most `timeout` for the run to finish.
    pub fn wait_timeout(self, timeout: Duration) -> Result<(Graph, ProcessResult<()>), Self> {
        match self.done.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => Ok(self.join()),
            Err(RecvTimeoutError::Timeout) => Err(self),
        }
    }

    /// Join the worker, re-raising its panic if it had one.
    fn join(self) -> (Graph, ProcessResult<()>) {
        match self.handle.join() {
            Ok(outcome) => outcome,
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::core::error::ProcessError;
    use crate::core::types::{GraphState, ImageFormat};

    #[test]
    fn test_schedule_and_wait() {
        let mut graph = Graph::new(Context::new_shared());
        let a = graph.create_image(2, 1, ImageFormat::U8).unwrap();
        let b = graph.create_image(2, 1, ImageFormat::U8).unwrap();
        graph.write_image(a, &[0x0F, 0xF0]).unwrap();
        graph.add_node("org.khronos.openvx.not", &[a, b]).unwrap();
        graph.verify().unwrap();

        let (graph, result) = graph.schedule().wait();
        result.unwrap();
        assert_eq!(graph.state(), GraphState::Completed);
        assert_eq!(graph.read_image(b).unwrap(), vec![0xF0, 0x0F]);
    }

    #[test]
    fn test_schedule_unverified_reports_error() {
        let graph = Graph::new(Context::new_shared());
        let scheduled = graph.schedule();
        let (graph, result) = match scheduled.wait_timeout(Duration::from_secs(10)) {
            Ok(outcome) => outcome,
            Err(_) => panic!("run did not finish"),
        };
        assert!(matches!(result, Err(ProcessError::GraphNotVerified { .. })));
        assert_eq!(graph.state(), GraphState::Unverified);
    }
}
