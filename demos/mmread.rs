//! Matrix Market example - read a coordinate file and distribute it.
//!
//! Run with: mpiexec -n 2 ./target/debug/examples/mmread path/to/matrix.mtx
//!
//! Without an argument a small built-in symmetric matrix is used.

use std::io::Cursor;

use ferrodm::{
    mmread, parse_matrix_market, partition_rows, CooMatrix, DistributedMatrix, HaloDepth, Result,
    Runtime,
};
use tracing_subscriber::EnvFilter;

const BUILTIN: &str = "\
%%MatrixMarket matrix coordinate real symmetric
% 4x4 tridiagonal
4 4 7
1 1 2.0
2 1 -1.0
2 2 2.0
3 2 -1.0
3 3 2.0
4 3 -1.0
4 4 2.0
";

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let runtime = Runtime::init()?;
    let world = runtime.world();

    // Every rank reads the whole file
    let coo: CooMatrix<f64> = match std::env::args().nth(1) {
        Some(path) => mmread(path)?,
        None => parse_matrix_market(Cursor::new(BUILTIN), true)?,
    };
    let shape = coo.shape();
    if world.rank() == 0 {
        println!(
            "read {}x{} matrix with {} stored entries",
            shape.rows,
            shape.cols,
            coo.len()
        );
        println!("CSR row pointers: {:?}", coo.to_csr().row_ptr());
    }

    let ranks = (1..=world.size())
        .rev()
        .find(|&p| partition_rows(shape, p).is_ok())
        .unwrap_or(1);
    if let Some(group) = world.split((world.rank() < ranks).then_some(0)) {
        let m = DistributedMatrix::from_coo(&group, &coo, HaloDepth::default())?;
        print!("{}", m.dump());
        group.barrier()?;

        let dense = m.to_dense()?;
        if group.rank() == 0 {
            assert_eq!(dense, coo.to_dense(), "Data mismatch!");
            println!("\nMatrix Market test passed!");
        }
    }
    world.barrier()?;

    drop(world);
    runtime.finalize()
}
