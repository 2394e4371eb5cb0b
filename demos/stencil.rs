//! Stencil example - 1D three-point averaging with halo exchange.
//!
//! Every rank owns a block of rows. Each sweep refreshes the ghost rows
//! from the neighbors and replaces each interior row by the mean of itself
//! and its two neighbors.
//!
//! Run with: mpiexec -n 4 ./target/debug/examples/stencil

use ferrodm::{
    partition_rows, transform, Communicator, DistributedMatrix, GlobalShape, HaloDepth, Result,
    RowCursor, Runtime,
};
use tracing_subscriber::EnvFilter;

const ROWS: usize = 16;
const COLS: usize = 4;
const SWEEPS: usize = 10;

fn average(cursor: &RowCursor<'_, f64>) -> Vec<f64> {
    let row = cursor.row();
    (0..COLS)
        .map(|c| match (cursor.value(-1, c), cursor.value(1, c)) {
            (Some(up), Some(down)) => (up + row.get(c).unwrap_or_default() + down) / 3.0,
            // boundary rows are held fixed
            _ => row.get(c).unwrap_or_default(),
        })
        .collect()
}

fn run(group: &Communicator, shape: GlobalShape) -> Result<()> {
    let halo = HaloDepth::symmetric(1);
    let mut a = DistributedMatrix::<f64>::with_halo(group, shape, halo)?;
    let mut b = DistributedMatrix::<f64>::with_halo(group, shape, halo)?;

    // Hot top edge, cold everywhere else
    for m in [&mut a, &mut b] {
        m.rows_mut().for_each(|mut row| {
            let v = if row.index() == 0 { 100.0 } else { 0.0 };
            row.fill(v);
        });
    }

    for _ in 0..SWEEPS {
        a.halo().exchange()?;
        {
            let input = a.rows();
            let mut output = b.rows_mut();
            transform(&input.subrange(0..ROWS)?, &mut output, 0, average)?;
        }
        std::mem::swap(&mut a, &mut b);
    }

    let dense = a.to_dense()?;
    if group.rank() == 0 {
        for (i, row) in dense.chunks(COLS).enumerate() {
            println!("row {i:2}: {:8.3}", row[0]);
        }
    }

    // Every rank gathered the same matrix
    let total: f64 = dense.iter().sum();
    assert!(group.all_equal(total)?, "ranks disagree!");
    if group.rank() == 0 {
        println!("\nStencil test passed!");
    }
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let runtime = Runtime::init()?;
    let world = runtime.world();

    // Largest group that splits the rows without an empty block
    let shape = GlobalShape::new(ROWS, COLS);
    let ranks = (1..=world.size())
        .rev()
        .find(|&p| partition_rows(shape, p).is_ok())
        .unwrap_or(1);
    if world.rank() == 0 {
        println!("running on {ranks} of {} ranks", world.size());
    }

    if let Some(group) = world.split((world.rank() < ranks).then_some(0)) {
        run(&group, shape)?;
    }
    world.barrier()?;

    drop(world);
    runtime.finalize()
}
