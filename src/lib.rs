//! Arbitrary-precision signed integer arithmetic over machine-word limbs.
//!
//! Three layers, bottom up:
//!
//! - [`word`]: double-word multiplication, carry helpers, and the
//!   reciprocal-based 2-by-1 division primitive.
//! - [`limbs`] and [`radix`]: routines over little-endian word slices that
//!   own no memory — magnitude arithmetic, shifts, comparison, byte
//!   packing, and string conversion.
//! - [`BigInt`]: a sign-magnitude integer owning a limb buffer drawn from
//!   an abstract [`LimbAllocator`], with two's-complement bitwise
//!   semantics layered on top.

mod alloc;
mod bigint;
mod error;
pub mod limbs;
pub mod radix;
pub mod word;


pub use alloc::{
    LimbAllocator, NullAllocator, SystemAllocator, default_allocator, set_default_allocator,
};
pub use bigint::BigInt;
pub use error::Error;
pub use limbs::Endian;
pub use word::{LIMB_BITS, Limb, SignedLimb};
