//! Row views, distributed iteration, `for_each` and `transform`.
//!
//! Run with: mpiexec -n 4 ./target/debug/deps/iteration-<hash>

mod common;

use common::Suite;
use ferrodm::{
    for_each, transform, DistributedMatrix, Error, GlobalShape, HaloDepth, RowKind, RowView,
};

fn main() {
    let mut suite = Suite::init();

    // ========================================================================
    // Iteration
    // ========================================================================
    suite.case("iteration covers all rows in order", 3, |world| {
        let m = DistributedMatrix::<f64>::with_halo(
            world,
            GlobalShape::new(9, 2),
            HaloDepth::symmetric(1),
        )?;
        let rows = m.rows();
        let iter = rows.iter();
        assert_eq!(iter.len(), 9);

        let indices: Vec<usize> = rows.iter().filter_map(|r| r.index()).collect();
        assert_eq!(indices, (0..9).collect::<Vec<_>>());
        let backwards: Vec<usize> = rows.iter().rev().filter_map(|r| r.index()).collect();
        assert_eq!(backwards, (0..9).rev().collect::<Vec<_>>());

        let (first, last) = m.local_rows_indices();
        assert_eq!((first, last), (world.rank() * 3, world.rank() * 3 + 2));
        for row in &rows {
            let i = row.index().unwrap();
            let kind = row.kind().unwrap();
            assert_eq!(row.is_local(), m.is_local_row(i));
            match kind {
                RowKind::Local => assert!(i >= first && i <= last),
                RowKind::PrevHalo => assert_eq!(i + 1, first),
                RowKind::NextHalo => assert_eq!(i, last + 1),
                RowKind::Remote => assert!(row.data().is_none()),
            }
            assert!(row.segment().unwrap().row_range().contains(&i));
            assert_eq!(row.len(), 2);
        }

        let local = rows.iter().local().count();
        assert_eq!(local, last - first + 1);
        let readable = rows.iter().readable().count();
        let halos = usize::from(first > 0) + usize::from(last + 1 < 9);
        assert_eq!(readable, local + halos);
        Ok(())
    });

    suite.case("for_each touches only local rows", 4, |world| {
        let mut m = DistributedMatrix::<i32>::builder(GlobalShape::new(10, 3))
            .halo(HaloDepth::symmetric(1))
            .fill(-1)
            .build(world)?;
        let rank = world.rank() as i32;
        let mut visited = Vec::new();
        for_each(&mut m.rows_mut(), |mut row| {
            visited.push(row.index());
            row.fill(rank);
        });

        let (first, last) = m.local_rows_indices();
        assert_eq!(visited, (first..=last).collect::<Vec<_>>());
        // ghost regions are untouched until an exchange
        let rows = m.rows();
        assert!(rows.prev_halo().iter().all(|&v| v == -1));
        assert!(rows.next_halo().iter().all(|&v| v == -1));
        drop(rows);

        m.fence()?;
        let dense = m.to_dense()?;
        // every row holds the rank that owns it: blocks of 3, 3, 3, 1
        let owners: Vec<i32> = dense.chunks(3).map(|row| row[0]).collect();
        assert_eq!(owners, vec![0, 0, 0, 1, 1, 1, 2, 2, 2, 3]);
        Ok(())
    });

    // ========================================================================
    // Transform
    // ========================================================================
    suite.case("transform reads neighbor rows", 3, |world| {
        let shape = GlobalShape::new(7, 2);
        let halo = HaloDepth::symmetric(1);
        let mut input = DistributedMatrix::<i64>::with_halo(world, shape, halo)?;
        let mut output = DistributedMatrix::<i64>::new(world, shape)?;

        input.rows_mut().for_each(|mut row| {
            let v = row.index() as i64;
            row[0] = v;
            row[1] = 10 * v;
        });
        input.halo().exchange()?;

        {
            let rows = input.rows();
            let mut out_rows = output.rows_mut();
            transform(&rows.subrange(0..7)?, &mut out_rows, 0, |cursor| {
                (0..2)
                    .map(|c| {
                        let up = cursor.value(-1, c).unwrap_or(0);
                        let down = cursor.value(1, c).unwrap_or(0);
                        up + down
                    })
                    .collect()
            })?;
        }

        output.fence()?;
        let dense = output.to_dense()?;
        let expected: Vec<i64> = (0..7i64)
            .flat_map(|i| {
                let up = if i > 0 { i - 1 } else { 0 };
                let down = if i < 6 { i + 1 } else { 0 };
                [up + down, 10 * (up + down)]
            })
            .collect();
        assert_eq!(dense, expected);
        Ok(())
    });

    suite.case("transform alignment errors", 2, |world| {
        let shape = GlobalShape::new(4, 1);
        let input = DistributedMatrix::<u32>::new(world, shape)?;
        let mut output = DistributedMatrix::<u32>::new(world, shape)?;

        let rows = input.rows();
        let mut out_rows = output.rows_mut();

        let shifted = transform(&rows.subrange(0..3)?, &mut out_rows, 1, |_| vec![1]);
        if world.rank() == 0 {
            // shifting by one pushes rank 0's last local row onto rank 1
            assert!(matches!(shifted, Err(Error::NotLocal(2))));
        } else {
            // rank 1's only local input in 0..3 is row 2, which lands on its own row 3
            assert!(shifted.is_ok());
        }
        assert!(matches!(
            transform(&rows.subrange(0..4)?, &mut out_rows, 1, |_| vec![1]),
            Err(Error::RowOutOfRange(5))
        ));
        assert!(matches!(
            transform(&rows.subrange(0..4)?, &mut out_rows, 0, |_| vec![1, 2]),
            Err(Error::InvalidBuffer)
        ));
        Ok(())
    });

    // ========================================================================
    // Cursors and row access
    // ========================================================================
    suite.case("cursor walks neighbors", 2, |world| {
        let mut m = DistributedMatrix::<u8>::with_halo(
            world,
            GlobalShape::new(6, 1),
            HaloDepth::new(2, 1),
        )?;
        m.rows_mut().for_each(|mut row| {
            let v = row.index() as u8;
            row[0] = v;
        });
        m.halo().exchange()?;

        let rows = m.rows();
        if world.rank() == 1 {
            let cursor = rows.cursor(3)?;
            assert!(cursor.is_local());
            assert_eq!(cursor.value(-1, 0), Some(2));
            assert_eq!(cursor.value(-2, 0), Some(1));
            assert_eq!(cursor.value(-3, 0), None);
            assert_eq!(cursor.neighbor(-3).unwrap().kind(), Some(RowKind::Remote));
            assert!(cursor.neighbor(-4).is_none());
            assert_eq!(cursor.row().get(0), Some(3));
        } else {
            let cursor = rows.cursor(2)?;
            assert_eq!(cursor.value(1, 0), Some(3));
            assert_eq!(cursor.value(2, 0), None);
            assert_eq!(cursor.kind(), RowKind::Local);
        }
        assert!(matches!(rows.cursor(6), Err(Error::RowOutOfRange(6))));
        Ok(())
    });

    suite.case("row writes are checked", 2, |world| {
        let mut m = DistributedMatrix::<f64>::with_halo(
            world,
            GlobalShape::new(4, 2),
            HaloDepth::symmetric(1),
        )?;
        let (first, _) = m.local_rows_indices();
        let foreign = if first == 0 { 2 } else { 1 };
        let mut rows = m.rows_mut();

        rows.assign(first, &[1.0, 2.0])?;
        assert_eq!(rows.get(first).unwrap().data(), Some(&[1.0, 2.0][..]));
        // halo rows are readable but not writable
        assert_eq!(rows.get(foreign).unwrap().kind().map(RowKind::is_halo), Some(true));
        assert!(matches!(rows.row_mut(foreign), Err(Error::NotLocal(_))));
        assert!(matches!(rows.assign(first, &[1.0]), Err(Error::InvalidBuffer)));
        assert!(matches!(rows.row_mut(4), Err(Error::RowOutOfRange(4))));
        Ok(())
    });

    suite.case("owned and borrowed rows", 2, |world| {
        let mut m = DistributedMatrix::<i64>::new(world, GlobalShape::new(4, 3))?;
        m.rows_mut().local_mut().fill(5);

        let rows = m.rows();
        let (first, _) = m.local_rows_indices();
        let remote = if first == 0 { 3 } else { 0 };

        let local = rows.get(first).unwrap();
        assert!(!local.owns_storage());
        let copy = local.to_owned_row()?;
        assert!(copy.owns_storage());
        assert_eq!(copy.index(), None);
        assert_eq!(copy.data(), Some(&[5, 5, 5][..]));

        let far = rows.get(remote).unwrap();
        assert_eq!(far.kind(), Some(RowKind::Remote));
        assert!(matches!(far.to_owned_row(), Err(Error::NotLocal(_))));

        let blank = RowView::<i64>::standalone(3);
        assert_eq!(blank.data(), Some(&[0, 0, 0][..]));
        assert!(!blank.is_local());
        Ok(())
    });

    suite.case("single process owns every row", 1, |world| {
        let mut m = DistributedMatrix::<u32>::new(world, GlobalShape::new(3, 2))?;
        for_each(&mut m.rows_mut(), |mut row| {
            let i = row.index() as u32;
            row.fill(i);
        });
        let rows = m.rows();
        assert_eq!(rows.iter().local().count(), 3);
        assert!(rows.iter().all(|r| r.kind() == Some(RowKind::Local)));
        assert_eq!(rows.local(), &[0, 0, 1, 1, 2, 2]);
        drop(rows);
        assert_eq!(m.to_dense()?, vec![0, 0, 1, 1, 2, 2]);
        Ok(())
    });

    suite.finish();
}
