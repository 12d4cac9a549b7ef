//! Node dispatch strategies.

use crate::core::error::{NodeId, ProcessResult};
use crate::execution::engine::ExecutionOptions;
use crate::execution::plan::ExecutionPlan;
use rayon::prelude::*;

/// How the nodes of a plan are dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheduler {
    /// One node at a time, in plan order.
    Sequential,
    /// Nodes of the same dependency level run concurrently.
    LevelParallel {
        /// Thread count for a dedicated pool (0 = global pool).
        max_threads: usize,
    },
}

impl Scheduler {
    /// Pick a scheduler for the given options.
    pub fn from_options(options: &ExecutionOptions) -> Self {
        if options.parallel {
            Scheduler::LevelParallel {
                max_threads: options.max_threads,
            }
        } else {
            Scheduler::Sequential
        }
    }

    /// Whether levels are dispatched concurrently.
    pub fn is_parallel(&self) -> bool {
        matches!(self, Scheduler::LevelParallel { .. })
    }

    /// Run `f` for every node of the plan.
    ///
    /// A level only starts once the previous one finished without error.
    /// When several nodes of a level fail, the error of the one earliest in
    /// plan order is returned.
    pub fn run<F>(&self, plan: &ExecutionPlan, f: F) -> ProcessResult<()>
    where
        F: Fn(NodeId) -> ProcessResult<()> + Sync,
    {
        match *self {
            Scheduler::Sequential => plan.order.iter().try_for_each(|&id| f(id)),
            Scheduler::LevelParallel { max_threads } => {
                if max_threads == 0 {
                    return run_levels(plan, &f);
                }
                match rayon::ThreadPoolBuilder::new().num_threads(max_threads).build() {
                    Ok(pool) => pool.install(|| run_levels(plan, &f)),
                    Err(e) => {
                        log::warn!("falling back to the global thread pool: {}", e);
                        run_levels(plan, &f)
                    }
                }
            }
        }
    }
}

fn run_levels<F>(plan: &ExecutionPlan, f: &F) -> ProcessResult<()>
where
    F: Fn(NodeId) -> ProcessResult<()> + Sync,
{
    for level in &plan.levels {
        if let [only] = level.as_slice() {
            f(*only)?;
            continue;
        }
        let results: Vec<ProcessResult<()>> = level.par_iter().map(|&id| f(id)).collect();
        results.into_iter().collect::<ProcessResult<()>>()?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ProcessError;
    use parking_lot::Mutex;

    fn plan() -> ExecutionPlan {
        let ids: Vec<NodeId> = (0..4).map(NodeId).collect();
        ExecutionPlan {
            order: ids.clone(),
            levels: vec![vec![ids[0]], vec![ids[1], ids[2]], vec![ids[3]]],
            ..ExecutionPlan::default()
        }
    }

    #[test]
    fn test_from_options() {
        assert_eq!(
            Scheduler::from_options(&ExecutionOptions::default()),
            Scheduler::Sequential
        );
        let options = ExecutionOptions::new().with_parallel(true).with_max_threads(2);
        assert_eq!(
            Scheduler::from_options(&options),
            Scheduler::LevelParallel { max_threads: 2 }
        );
    }

    #[test]
    fn test_sequential_follows_order() {
        let seen = Mutex::new(Vec::new());
        Scheduler::Sequential
            .run(&plan(), |id| {
                seen.lock().push(id);
                Ok(())
            })
            .unwrap();
        assert_eq!(seen.into_inner(), plan().order);
    }

    #[test]
    fn test_parallel_respects_levels() {
        let seen = Mutex::new(Vec::new());
        Scheduler::LevelParallel { max_threads: 2 }
            .run(&plan(), |id| {
                seen.lock().push(id);
                Ok(())
            })
            .unwrap();
        let seen = seen.into_inner();
        assert_eq!(seen.len(), 4);
        assert_eq!(seen[0], NodeId(0));
        assert_eq!(seen[3], NodeId(3));
    }

    #[test]
    fn test_parallel_stops_after_failing_level() {
        let seen = Mutex::new(Vec::new());
        let result = Scheduler::LevelParallel { max_threads: 0 }.run(&plan(), |id| {
            seen.lock().push(id);
            if id.0 >= 1 {
                Err(ProcessError::Abandoned { node: id })
            } else {
                Ok(())
            }
        });
        assert_eq!(result, Err(ProcessError::Abandoned { node: NodeId(1) }));
        assert!(!seen.into_inner().contains(&NodeId(3)));
    }
}
