//! Element trait and type tag mapping.
//!
//! This module provides the [`Element`] trait, a sealed trait for the scalar
//! types a distributed matrix can hold. Each type maps to its MPI datatype
//! through [`mpi::datatype::Equivalence`] and carries a [`DatatypeTag`]
//! that ranks compare when a memory window is created, so a group that
//! disagrees on the element type fails with a resource error instead of
//! reading garbage.
//!
//! # Supported Types
//!
//! | Rust Type | Tag Value |
//! |-----------|-----------|
//! | `f32`     | 0         |
//! | `f64`     | 1         |
//! | `i32`     | 2         |
//! | `i64`     | 3         |
//! | `u8`      | 4         |
//! | `u32`     | 5         |
//! | `u64`     | 6         |

use std::fmt::Debug;

use mpi::datatype::Equivalence;

/// Seals [`Element`] against outside implementations.
mod sealed {
    pub trait Sealed {}
}

/// Tag values identifying each element type across ranks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum DatatypeTag {
    /// 32-bit floating point
    F32 = 0,
    /// 64-bit floating point
    F64 = 1,
    /// 32-bit signed integer
    I32 = 2,
    /// 64-bit signed integer
    I64 = 3,
    /// 8-bit unsigned integer
    U8 = 4,
    /// 32-bit unsigned integer
    U32 = 5,
    /// 64-bit unsigned integer
    U64 = 6,
}

/// Trait for types that can be stored in a distributed matrix.
///
/// This is a **sealed trait**: it cannot be implemented outside this crate.
/// Supported types: [`f32`], [`f64`], [`i32`], [`i64`], [`u8`], [`u32`], [`u64`].
pub trait Element:
    sealed::Sealed + Equivalence + Copy + Default + PartialEq + Debug + Send + Sync + 'static
{
    /// The tag compared across ranks at window creation.
    const TAG: DatatypeTag;
    /// Additive identity; halo regions start out filled with it.
    const ZERO: Self;
    /// Value used for entries of `pattern` Matrix Market files.
    const ONE: Self;
}

macro_rules! impl_element {
    ($ty:ty, $tag:expr, $zero:expr, $one:expr) => {
        impl sealed::Sealed for $ty {}
        impl Element for $ty {
            const TAG: DatatypeTag = $tag;
            const ZERO: Self = $zero;
            const ONE: Self = $one;
        }
    };
}

impl_element!(f32, DatatypeTag::F32, 0.0, 1.0);
impl_element!(f64, DatatypeTag::F64, 0.0, 1.0);
impl_element!(i32, DatatypeTag::I32, 0, 1);
impl_element!(i64, DatatypeTag::I64, 0, 1);
impl_element!(u8, DatatypeTag::U8, 0, 1);
impl_element!(u32, DatatypeTag::U32, 0, 1);
impl_element!(u64, DatatypeTag::U64, 0, 1);
