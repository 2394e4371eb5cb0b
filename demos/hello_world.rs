//! Hello World example - initialize MPI and build a small distributed matrix.
//!
//! Run with: mpiexec -n 4 ./target/debug/examples/hello_world

use ferrodm::{DistributedMatrix, GlobalShape, Result, Runtime};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let runtime = Runtime::init()?;
    let world = runtime.world();
    let rank = world.rank();
    let size = world.size();

    let m = DistributedMatrix::<f64>::new(&world, GlobalShape::new(size * 2, 3))?;
    let (first, last) = m.local_rows_indices();
    println!("Hello from rank {rank} of {size}: rows {first}..={last}");

    // Synchronize before exiting
    world.barrier()?;

    if rank == 0 {
        println!("\nAll ranks reported in. Test passed!");
    }

    drop(m);
    drop(world);
    runtime.finalize()
}
