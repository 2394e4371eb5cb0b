//! Launch context from the environment.
//!
//! The MPI launcher decides how many processes run; these helpers read what
//! the scheduler and the user *expected*, so [`Runtime::init()`] can log the
//! job's context and flag a group of the wrong size. Each getter returns
//! `None` if its variable is unset or unparsable.
//!
//! [`Runtime::init()`]: crate::Runtime::init
//!
//! # Environment Variables
//!
//! | Function | Variable | Description |
//! |----------|----------|-------------|
//! | `num_ranks()` | `FERRODM_NUM_RANKS` | Group size the job expects |
//! | `slurm_ntasks()` | `SLURM_NTASKS` | Tasks allocated by SLURM |
//! | `is_slurm_job()` | `SLURM_JOB_ID` | Set when running under SLURM |
//! | `local_rank()` | `SLURM_LOCALID`, `OMPI_COMM_WORLD_LOCAL_RANK`, `MPI_LOCALRANKID` | Rank within the node |

use std::env;

/// Variable naming the group size a job expects.
pub const NUM_RANKS_VAR: &str = "FERRODM_NUM_RANKS";

/// Check if running under SLURM job scheduler.
pub fn is_slurm_job() -> bool {
    env::var("SLURM_JOB_ID").is_ok()
}

/// Group size requested via `FERRODM_NUM_RANKS`.
pub fn num_ranks() -> Option<usize> {
    env::var(NUM_RANKS_VAR).ok().and_then(|s| s.trim().parse().ok())
}

/// Tasks allocated by SLURM (`SLURM_NTASKS`, or the first entry of
/// `SLURM_TASKS_PER_NODE` in its `"4(x2)"` format).
pub fn slurm_ntasks() -> Option<usize> {
    env::var("SLURM_NTASKS")
        .ok()
        .and_then(|s| s.parse().ok())
        .or_else(|| {
            env::var("SLURM_TASKS_PER_NODE")
                .ok()
                .and_then(|s| s.split('(').next().and_then(|n| n.parse().ok()))
        })
}

/// Rank of this process within its node, as exported by SLURM, Open MPI or
/// MPICH/Hydra.
pub fn local_rank() -> Option<usize> {
    ["SLURM_LOCALID", "OMPI_COMM_WORLD_LOCAL_RANK", "MPI_LOCALRANKID"]
        .iter()
        .find_map(|var| env::var(var).ok().and_then(|s| s.parse().ok()))
}

/// What the environment says about the job this process belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LaunchInfo {
    /// Whether the process runs inside a SLURM allocation.
    pub slurm_job: bool,
    /// Group size the job expects: `FERRODM_NUM_RANKS`, else SLURM's task
    /// count.
    pub expected_ranks: Option<usize>,
    /// Rank within the node, if the launcher exports it.
    pub local_rank: Option<usize>,
}

impl LaunchInfo {
    /// Read the launch context from the environment.
    pub fn from_env() -> Self {
        LaunchInfo {
            slurm_job: is_slurm_job(),
            expected_ranks: num_ranks().or_else(slurm_ntasks),
            local_rank: local_rank(),
        }
    }

    /// The expected group size, if one is known and differs from `size`.
    pub fn mismatch(&self, size: usize) -> Option<usize> {
        self.expected_ranks.filter(|&n| n != size)
    }
}
