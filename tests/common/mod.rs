//! Shared driver for the multi-process test programs.
//!
//! MPI can be initialized once per process, so each test file is a
//! `harness = false` program: `main` creates a [`Suite`], runs every case in
//! order and finalizes. A case asks for a group of `n` processes; it runs on
//! the first `n` ranks of the world and is skipped when the job is smaller.
//! `cargo test` therefore runs the single-process cases, and
//!
//! ```text
//! mpiexec -n 4 ./target/debug/deps/<test>-<hash>
//! ```
//!
//! runs all of them.

#![allow(dead_code)]

use ferrodm::{Communicator, Result, Runtime};

pub struct Suite {
    runtime: Runtime,
    world: Communicator,
    passed: usize,
    skipped: usize,
}

impl Suite {
    pub fn init() -> Self {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
        let runtime = Runtime::init().expect("MPI init failed");
        let world = runtime.world();
        Suite {
            runtime,
            world,
            passed: 0,
            skipped: 0,
        }
    }

    pub fn world(&self) -> &Communicator {
        &self.world
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    /// Run `case` on a group made of the first `n` processes.
    ///
    /// Processes outside the group only take part in the split and the
    /// closing barrier. Every case must leave the window registry empty.
    pub fn case<F>(&mut self, name: &str, n: usize, case: F)
    where
        F: FnOnce(&Communicator) -> Result<()>,
    {
        let rank = self.world.rank();
        if self.world.size() < n {
            if rank == 0 {
                println!("SKIP: {name} (needs {n} processes)");
            }
            self.skipped += 1;
            return;
        }

        let group = self.world.split((rank < n).then_some(0));
        if let Some(group) = group {
            assert_eq!(group.size(), n);
            if let Err(e) = case(&group) {
                panic!("{name} failed on rank {rank}: {e}");
            }
        }
        assert!(
            self.runtime.registry().is_empty(),
            "{name} leaked windows on rank {rank}: {:?}",
            self.runtime.registry().active()
        );

        self.world.barrier().expect("barrier after case failed");
        if rank == 0 {
            println!("PASS: {name}");
        }
        self.passed += 1;
    }

    /// Print the summary and finalize MPI.
    pub fn finish(self) {
        let Suite {
            runtime,
            world,
            passed,
            skipped,
        } = self;
        if world.rank() == 0 {
            println!("{passed} passed, {skipped} skipped on {} process(es)", world.size());
        }
        drop(world);
        runtime.finalize().expect("windows still registered at finalize");
    }
}
