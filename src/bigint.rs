//! Signed arbitrary-precision integer.
//!
//! A [`BigInt`] is a sign-magnitude value: a limb buffer holding the
//! absolute value little-endian, and a signed length whose magnitude is the
//! live limb count and whose sign is the value's sign. The buffer comes
//! from the allocator the value was constructed with and is kept
//! normalized (top limb non-zero) after every operation.
//!
//! Fallible `assign_*` methods implement reserve-then-commit: on error the
//! destination keeps its prior value. The operator impls are sugar over
//! them and follow std conventions instead (divide-by-zero panics,
//! allocation failure aborts through `handle_alloc_error`).

use std::alloc::Layout;
use std::cmp::Ordering;
use std::fmt;
use std::mem;
use std::ops::{Add, BitAnd, BitOr, BitXor, Div, Mul, Neg, Not, Rem, Sub};
use std::ptr;
use std::str::FromStr;

use crate::alloc::{LimbAllocator, default_allocator};
use crate::error::Error;
use crate::limbs::{self, Endian};
use crate::radix;
use crate::word::{LIMB_BITS, Limb, SignedLimb};

/// Signed arbitrary-precision integer backed by an abstract allocator.
pub struct BigInt {
    size: isize,
    capacity: usize,
    data: *mut Limb,
    alloc: &'static dyn LimbAllocator,
}

// The buffer is exclusively owned; shared references only ever read it.
unsafe impl Send for BigInt {}
unsafe impl Sync for BigInt {}

fn limb_layout(n: usize) -> Result<Layout, Error> {
    Layout::array::<Limb>(n).map_err(|_| Error::NotEnoughMemory)
}

fn alloc_failure(n: usize) -> ! {
    match Layout::array::<Limb>(n) {
        Ok(layout) => std::alloc::handle_alloc_error(layout),
        Err(_) => panic!("bigint: capacity overflow"),
    }
}

/// Temporary limb buffer drawn from a bigint's allocator, zero-filled.
struct Scratch {
    data: *mut Limb,
    len: usize,
    alloc: &'static dyn LimbAllocator,
}

impl Scratch {
    fn new(len: usize, alloc: &'static dyn LimbAllocator) -> Result<Scratch, Error> {
        debug_assert!(len > 0);
        let layout = limb_layout(len)?;
        let raw = alloc.allocate(layout);
        if raw.is_null() {
            return Err(Error::NotEnoughMemory);
        }
        let data = raw as *mut Limb;
        unsafe { ptr::write_bytes(data, 0, len) };
        Ok(Scratch { data, len, alloc })
    }

    fn limbs(&self) -> &[Limb] {
        unsafe { std::slice::from_raw_parts(self.data, self.len) }
    }

    fn limbs_mut(&mut self) -> &mut [Limb] {
        unsafe { std::slice::from_raw_parts_mut(self.data, self.len) }
    }
}

impl Drop for Scratch {
    fn drop(&mut self) {
        unsafe {
            let layout =
                Layout::from_size_align_unchecked(self.len * size_of::<Limb>(), align_of::<Limb>());
            self.alloc.deallocate(self.data as *mut u8, layout);
        }
    }
}

// ============================================================================
// Construction, destruction, assignment
// ============================================================================

impl BigInt {
    /// Zero, using the process default allocator. Allocates nothing.
    pub fn new() -> BigInt {
        BigInt::new_in(default_allocator())
    }

    /// Zero, owning the given allocator. Allocates nothing.
    pub fn new_in(alloc: &'static dyn LimbAllocator) -> BigInt {
        BigInt { size: 0, capacity: 0, data: ptr::null_mut(), alloc }
    }

    pub fn from_u64_in(value: u64, alloc: &'static dyn LimbAllocator) -> Result<BigInt, Error> {
        let mut r = BigInt::new_in(alloc);
        r.set_u64(value)?;
        Ok(r)
    }

    pub fn from_i64_in(value: i64, alloc: &'static dyn LimbAllocator) -> Result<BigInt, Error> {
        let mut r = BigInt::new_in(alloc);
        r.set_i64(value)?;
        Ok(r)
    }

    /// Copy of `self` in its own allocator.
    pub fn try_clone(&self) -> Result<BigInt, Error> {
        self.try_clone_in(self.alloc)
    }

    /// Copy of `self` in the given allocator.
    pub fn try_clone_in(&self, alloc: &'static dyn LimbAllocator) -> Result<BigInt, Error> {
        let mut r = BigInt::new_in(alloc);
        r.assign_bigint(self)?;
        Ok(r)
    }

    /// Replaces `self` with `value`, reusing the buffer when possible.
    #[cfg(target_pointer_width = "64")]
    pub fn set_u64(&mut self, value: u64) -> Result<(), Error> {
        self.assign_limb(value, false)
    }

    /// Replaces `self` with `value`, reusing the buffer when possible.
    #[cfg(not(target_pointer_width = "64"))]
    pub fn set_u64(&mut self, value: u64) -> Result<(), Error> {
        let lo = value as Limb;
        let hi = (value >> 32) as Limb;
        if hi == 0 {
            return self.assign_limb(lo, false);
        }
        self.reserve(2)?;
        let buf = self.buf(2);
        buf[0] = lo;
        buf[1] = hi;
        self.size = 2;
        Ok(())
    }

    /// Replaces `self` with `value`, reusing the buffer when possible.
    pub fn set_i64(&mut self, value: i64) -> Result<(), Error> {
        self.set_u64(value.unsigned_abs())?;
        if value < 0 {
            self.size = -self.size;
        }
        Ok(())
    }

    /// Replaces `self` with zero. Keeps the buffer.
    pub fn set_zero(&mut self) {
        self.size = 0;
    }

    /// Exchanges the two values, allocators included.
    pub fn swap(&mut self, other: &mut BigInt) {
        mem::swap(self, other);
    }

    /// The allocator this value draws its buffer from.
    pub fn allocator(&self) -> &'static dyn LimbAllocator {
        self.alloc
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn len(&self) -> usize {
        self.size.unsigned_abs()
    }

    /// Limbs of the absolute value, least significant first.
    pub fn magnitude(&self) -> &[Limb] {
        let n = self.len();
        if n == 0 { &[] } else { unsafe { std::slice::from_raw_parts(self.data, n) } }
    }

    fn buf(&mut self, n: usize) -> &mut [Limb] {
        debug_assert!(n <= self.capacity);
        if n == 0 { &mut [] } else { unsafe { std::slice::from_raw_parts_mut(self.data, n) } }
    }

    /// Grows the buffer to hold `n` limbs. The live prefix is preserved;
    /// on failure nothing changes. Fresh blocks are zero-filled.
    fn reserve(&mut self, n: usize) -> Result<(), Error> {
        if n > self.capacity {
            let layout = limb_layout(n)?;
            let raw = self.alloc.allocate(layout);
            if raw.is_null() {
                return Err(Error::NotEnoughMemory);
            }
            let new = raw as *mut Limb;
            unsafe {
                ptr::write_bytes(new, 0, n);
                let live = self.len();
                if live > 0 {
                    ptr::copy_nonoverlapping(self.data, new, live);
                }
                self.release();
            }
            self.data = new;
            self.capacity = n;
        }
        Ok(())
    }

    unsafe fn release(&mut self) {
        if self.capacity > 0 {
            unsafe {
                let layout = Layout::from_size_align_unchecked(
                    self.capacity * size_of::<Limb>(),
                    align_of::<Limb>(),
                );
                self.alloc.deallocate(self.data as *mut u8, layout);
            }
        }
    }

    /// Strips leading zero limbs from the first `n` and stamps the sign.
    fn commit(&mut self, n: usize, negative: bool) {
        let len = limbs::normal_len(self.buf(n));
        self.size = if negative { -(len as isize) } else { len as isize };
    }

    fn assign_limb(&mut self, value: Limb, negative: bool) -> Result<(), Error> {
        if value == 0 {
            self.size = 0;
            return Ok(());
        }
        self.reserve(1)?;
        self.buf(1)[0] = value;
        self.size = if negative { -1 } else { 1 };
        Ok(())
    }

    fn assign_bigint(&mut self, other: &BigInt) -> Result<(), Error> {
        let n = other.len();
        self.reserve(n)?;
        self.buf(n).copy_from_slice(other.magnitude());
        self.size = other.size;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Sign queries and in-place sign operations
    // ------------------------------------------------------------------

    /// -1, 0, or 1.
    pub fn sign(&self) -> i32 {
        self.size.signum() as i32
    }

    /// True for strictly negative values.
    pub fn signbit(&self) -> bool {
        self.size < 0
    }

    pub fn is_zero(&self) -> bool {
        self.size == 0
    }

    /// Replaces the value with its absolute value. Never fails.
    pub fn abs(&mut self) {
        self.size = self.size.abs();
    }

    /// Flips the sign. Zero stays signless. Never fails.
    pub fn negate(&mut self) {
        self.size = -self.size;
    }

    /// Bits needed to represent the absolute value.
    pub fn bit_width(&self) -> usize {
        limbs::bit_width(self.magnitude())
    }

    /// True when the absolute value is a power of two.
    pub fn has_single_bit(&self) -> bool {
        limbs::has_single_bit(self.magnitude())
    }

    /// Set bits in the absolute value.
    pub fn popcount(&self) -> usize {
        limbs::popcount(self.magnitude())
    }

    // ------------------------------------------------------------------
    // Addition and subtraction
    // ------------------------------------------------------------------

    /// self = a + b.
    pub fn assign_add(&mut self, a: &BigInt, b: &BigInt) -> Result<(), Error> {
        if a.size == 0 {
            return self.assign_bigint(b);
        }
        if b.size == 0 {
            return self.assign_bigint(a);
        }
        self.signed_add(a.magnitude(), a.size < 0, b.magnitude(), b.size < 0)
    }

    /// self = a - b; addition with `b`'s sign flipped.
    pub fn assign_sub(&mut self, a: &BigInt, b: &BigInt) -> Result<(), Error> {
        if b.size == 0 {
            return self.assign_bigint(a);
        }
        if a.size == 0 {
            self.assign_bigint(b)?;
            self.negate();
            return Ok(());
        }
        self.signed_add(a.magnitude(), a.size < 0, b.magnitude(), b.size >= 0)
    }

    /// self = ±|a| ± |b| over non-empty magnitudes with explicit signs.
    fn signed_add(
        &mut self,
        a: &[Limb],
        a_neg: bool,
        b: &[Limb],
        b_neg: bool,
    ) -> Result<(), Error> {
        if a_neg == b_neg {
            if a.len() >= b.len() {
                self.abs_add(a, b, a_neg)
            } else {
                self.abs_add(b, a, a_neg)
            }
        } else {
            match limbs::cmp(a, b) {
                Ordering::Greater => self.abs_sub(a, b, a_neg),
                Ordering::Less => self.abs_sub(b, a, b_neg),
                Ordering::Equal => {
                    self.size = 0;
                    Ok(())
                }
            }
        }
    }

    /// |self| = |a| + |b| with `a.len() >= b.len()`.
    fn abs_add(&mut self, a: &[Limb], b: &[Limb], negative: bool) -> Result<(), Error> {
        let an = a.len();
        let rn = an + 1;
        self.reserve(rn)?;
        let (low, top) = self.buf(rn).split_at_mut(an);
        top[0] = limbs::add(a, b, low);
        self.commit(rn, negative);
        Ok(())
    }

    /// |self| = |a| - |b| with |a| > |b|.
    fn abs_sub(&mut self, a: &[Limb], b: &[Limb], negative: bool) -> Result<(), Error> {
        let an = a.len();
        self.reserve(an)?;
        let borrow = limbs::sub(a, b, self.buf(an));
        debug_assert_eq!(borrow, 0);
        self.commit(an, negative);
        Ok(())
    }

    /// Mixed form: self = a ± b for a machine word with an explicit sign.
    fn add_limb(&mut self, a: &BigInt, b: Limb, b_neg: bool) -> Result<(), Error> {
        if b == 0 {
            return self.assign_bigint(a);
        }
        if a.size == 0 {
            return self.assign_limb(b, b_neg);
        }
        self.signed_add(a.magnitude(), a.size < 0, &[b], b_neg)
    }

    // ------------------------------------------------------------------
    // Multiplication
    // ------------------------------------------------------------------

    /// self = a * b.
    pub fn assign_mul(&mut self, a: &BigInt, b: &BigInt) -> Result<(), Error> {
        if a.size == 0 || b.size == 0 {
            self.size = 0;
            return Ok(());
        }
        let negative = (a.size < 0) != (b.size < 0);
        self.mul_magnitudes(a.magnitude(), b.magnitude(), negative)
    }

    fn mul_magnitudes(&mut self, a: &[Limb], b: &[Limb], negative: bool) -> Result<(), Error> {
        let (a, b) = if a.len() >= b.len() { (a, b) } else { (b, a) };
        let an = a.len();

        if b.len() == 1 {
            let rn = an + 1;
            self.reserve(rn)?;
            let (low, top) = self.buf(rn).split_at_mut(an);
            top[0] = limbs::mul_uint(a, b[0], low);
            self.commit(rn, negative);
        } else {
            let rn = an + b.len();
            self.reserve(rn)?;
            limbs::mul(a, b, self.buf(rn));
            self.commit(rn, negative);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Division
    // ------------------------------------------------------------------

    /// q = a / b, r = a % b, truncated toward zero: the remainder keeps the
    /// dividend's sign and `|r| < |b|`. Fails with `DivideByZero` leaving
    /// both destinations untouched.
    pub fn div_rem(q: &mut BigInt, r: &mut BigInt, a: &BigInt, b: &BigInt) -> Result<(), Error> {
        if b.size == 0 {
            return Err(Error::DivideByZero);
        }
        if a.size == 0 {
            q.size = 0;
            r.size = 0;
            return Ok(());
        }

        let q_neg = (a.size < 0) != (b.size < 0);
        let r_neg = a.size < 0;
        let (am, bm) = (a.magnitude(), b.magnitude());

        if limbs::cmp(am, bm) == Ordering::Less {
            r.assign_bigint(a)?;
            q.size = 0;
            return Ok(());
        }

        let (an, bn) = (am.len(), bm.len());
        if bn == 1 {
            q.reserve(an)?;
            r.reserve(1)?;
            let rem = limbs::div_uint(am, bm[0], q.buf(an));
            q.commit(an, q_neg);
            r.assign_limb(rem, r_neg)?;
            return Ok(());
        }

        let shift = bm[bn - 1].leading_zeros();
        let qn = an - bn + 1;
        let un = an + 1;
        q.reserve(qn)?;
        r.reserve(bn)?;

        let mut u = Scratch::new(un, q.alloc)?;
        if shift == 0 {
            let ub = u.limbs_mut();
            ub[..an].copy_from_slice(am);
            ub[an] = 0;
            limbs::div_rem(u.limbs_mut(), bm, q.buf(qn));
            r.buf(bn).copy_from_slice(&u.limbs()[..bn]);
        } else {
            let mut d = Scratch::new(bn, q.alloc)?;
            let d_spill = limbs::left_shift(bm, shift, d.limbs_mut());
            debug_assert_eq!(d_spill, 0);
            {
                let ub = u.limbs_mut();
                let spill = limbs::left_shift(am, shift, &mut ub[..an]);
                ub[an] = spill;
            }
            limbs::div_rem(u.limbs_mut(), d.limbs(), q.buf(qn));
            let low_spill = limbs::right_shift(&u.limbs()[..bn], shift, r.buf(bn));
            debug_assert_eq!(low_spill, 0);
        }

        q.commit(qn, q_neg);
        r.commit(bn, r_neg);
        Ok(())
    }

    /// self = a % b; division with the quotient discarded.
    pub fn assign_rem(&mut self, a: &BigInt, b: &BigInt) -> Result<(), Error> {
        let mut q = BigInt::new_in(self.alloc);
        BigInt::div_rem(&mut q, self, a, b)
    }

    /// self = a / d for a machine-word divisor; returns the remainder
    /// magnitude. The quotient keeps truncated-division signs, the
    /// remainder's sign is the dividend's.
    pub fn assign_div_limb(&mut self, a: &BigInt, d: Limb) -> Result<Limb, Error> {
        if d == 0 {
            return Err(Error::DivideByZero);
        }
        if a.size == 0 {
            self.size = 0;
            return Ok(0);
        }
        let an = a.len();
        self.reserve(an)?;
        let rem = limbs::div_uint(a.magnitude(), d, self.buf(an));
        self.commit(an, a.size < 0);
        Ok(rem)
    }

    // ------------------------------------------------------------------
    // Bitwise: infinite two's-complement over sign-magnitude
    // ------------------------------------------------------------------

    /// self = !a, as if `a` were an infinite two's-complement integer:
    /// ~a = -(a + 1).
    pub fn assign_not(&mut self, a: &BigInt) -> Result<(), Error> {
        self.add_limb(a, 1, false)?;
        self.negate();
        Ok(())
    }

    /// self = a & b under the two's-complement reading.
    pub fn assign_and(&mut self, a: &BigInt, b: &BigInt) -> Result<(), Error> {
        if a.size == 0 || b.size == 0 {
            self.size = 0;
            return Ok(());
        }
        self.and_views(a.magnitude(), a.size < 0, b.magnitude(), b.size < 0)
    }

    /// self = a | b under the two's-complement reading.
    pub fn assign_or(&mut self, a: &BigInt, b: &BigInt) -> Result<(), Error> {
        if a.size == 0 {
            return self.assign_bigint(b);
        }
        if b.size == 0 {
            return self.assign_bigint(a);
        }
        self.or_views(a.magnitude(), a.size < 0, b.magnitude(), b.size < 0)
    }

    /// self = a ^ b under the two's-complement reading.
    pub fn assign_xor(&mut self, a: &BigInt, b: &BigInt) -> Result<(), Error> {
        if a.size == 0 {
            return self.assign_bigint(b);
        }
        if b.size == 0 {
            return self.assign_bigint(a);
        }
        self.xor_views(a.magnitude(), a.size < 0, b.magnitude(), b.size < 0)
    }

    fn and_views(&mut self, a: &[Limb], a_neg: bool, b: &[Limb], b_neg: bool) -> Result<(), Error> {
        match (a_neg, b_neg) {
            (false, false) => {
                if a.len() >= b.len() {
                    self.and_pp(a, b)
                } else {
                    self.and_pp(b, a)
                }
            }
            (false, true) => self.and_pn(a, b),
            (true, false) => self.and_pn(b, a),
            (true, true) => {
                if a.len() >= b.len() {
                    self.and_nn(a, b)
                } else {
                    self.and_nn(b, a)
                }
            }
        }
    }

    fn or_views(&mut self, a: &[Limb], a_neg: bool, b: &[Limb], b_neg: bool) -> Result<(), Error> {
        match (a_neg, b_neg) {
            (false, false) => {
                if a.len() >= b.len() {
                    self.or_pp(a, b)
                } else {
                    self.or_pp(b, a)
                }
            }
            (false, true) => self.or_pn(a, b),
            (true, false) => self.or_pn(b, a),
            (true, true) => {
                if a.len() >= b.len() {
                    self.or_nn(a, b)
                } else {
                    self.or_nn(b, a)
                }
            }
        }
    }

    fn xor_views(&mut self, a: &[Limb], a_neg: bool, b: &[Limb], b_neg: bool) -> Result<(), Error> {
        match (a_neg, b_neg) {
            (false, false) => {
                if a.len() >= b.len() {
                    self.xor_pp(a, b)
                } else {
                    self.xor_pp(b, a)
                }
            }
            (false, true) => self.xor_pn(a, b),
            (true, false) => self.xor_pn(b, a),
            (true, true) => {
                if a.len() >= b.len() {
                    self.xor_nn(a, b)
                } else {
                    self.xor_nn(b, a)
                }
            }
        }
    }

    /// a & b, both positive; the result truncates to the shorter operand.
    fn and_pp(&mut self, a: &[Limb], b: &[Limb]) -> Result<(), Error> {
        let bn = b.len();
        self.reserve(bn)?;
        limbs::bit_and_n(&a[..bn], b, self.buf(bn));
        self.commit(bn, false);
        Ok(())
    }

    // a & -b = a & ~(b - 1)
    fn and_pn(&mut self, a: &[Limb], b: &[Limb]) -> Result<(), Error> {
        let an = a.len();
        self.reserve(an)?;
        let r = self.buf(an);
        let common = an.min(b.len());
        let mut c1: Limb = 1;
        for i in 0..common {
            let bv = b[i];
            r[i] = a[i] & !bv.wrapping_sub(c1);
            c1 = (bv < c1) as Limb;
        }
        // bits of b - 1 above its top are zero, so a's tail passes through
        for i in common..an {
            r[i] = a[i];
        }
        self.commit(an, false);
        Ok(())
    }

    // -a & -b = -(((a - 1) | (b - 1)) + 1), with a.len() >= b.len()
    fn and_nn(&mut self, a: &[Limb], b: &[Limb]) -> Result<(), Error> {
        let an = a.len();
        let bn = b.len();
        let rn = an + 1;
        self.reserve(rn)?;
        let r = self.buf(rn);
        let (mut c1, mut c2, mut c3): (Limb, Limb, Limb) = (1, 1, 1);
        for i in 0..bn {
            let av = a[i];
            let bv = b[i];
            let rv = (av.wrapping_sub(c1) | bv.wrapping_sub(c2)).wrapping_add(c3);
            c1 = (av < c1) as Limb;
            c2 = (bv < c2) as Limb;
            c3 = (rv < c3) as Limb;
            r[i] = rv;
        }
        for i in bn..an {
            let av = a[i];
            let rv = av.wrapping_sub(c1).wrapping_add(c3);
            c1 = (av < c1) as Limb;
            c3 = (rv < c3) as Limb;
            r[i] = rv;
        }
        r[an] = c3;
        self.commit(rn, true);
        Ok(())
    }

    /// a | b, both positive, with a.len() >= b.len().
    fn or_pp(&mut self, a: &[Limb], b: &[Limb]) -> Result<(), Error> {
        let an = a.len();
        self.reserve(an)?;
        limbs::bit_or(a, b, self.buf(an));
        // a's top limb is non-zero, so the result is already normal
        self.size = an as isize;
        Ok(())
    }

    // a | -b = -((~a & (b - 1)) + 1); the result fits b's limb count
    fn or_pn(&mut self, a: &[Limb], b: &[Limb]) -> Result<(), Error> {
        let bn = b.len();
        self.reserve(bn)?;
        let r = self.buf(bn);
        let common = a.len().min(bn);
        let (mut c1, mut c2): (Limb, Limb) = (1, 1);
        for i in 0..common {
            let bv = b[i];
            let rv = (!a[i] & bv.wrapping_sub(c1)).wrapping_add(c2);
            c1 = (bv < c1) as Limb;
            c2 = (rv < c2) as Limb;
            r[i] = rv;
        }
        for i in common..bn {
            let bv = b[i];
            let rv = bv.wrapping_sub(c1).wrapping_add(c2);
            c1 = (bv < c1) as Limb;
            c2 = (rv < c2) as Limb;
            r[i] = rv;
        }
        self.commit(bn, true);
        Ok(())
    }

    // -a | -b = -(((a - 1) & (b - 1)) + 1), with a.len() >= b.len();
    // the AND truncates to the shorter operand
    fn or_nn(&mut self, a: &[Limb], b: &[Limb]) -> Result<(), Error> {
        let bn = b.len();
        self.reserve(bn)?;
        let r = self.buf(bn);
        let (mut c1, mut c2, mut c3): (Limb, Limb, Limb) = (1, 1, 1);
        for i in 0..bn {
            let av = a[i];
            let bv = b[i];
            let rv = (av.wrapping_sub(c1) & bv.wrapping_sub(c2)).wrapping_add(c3);
            c1 = (av < c1) as Limb;
            c2 = (bv < c2) as Limb;
            c3 = (rv < c3) as Limb;
            r[i] = rv;
        }
        self.commit(bn, true);
        Ok(())
    }

    /// a ^ b, both positive, with a.len() >= b.len().
    fn xor_pp(&mut self, a: &[Limb], b: &[Limb]) -> Result<(), Error> {
        let an = a.len();
        self.reserve(an)?;
        limbs::bit_xor(a, b, self.buf(an));
        self.commit(an, false);
        Ok(())
    }

    // a ^ -b = -((a ^ (b - 1)) + 1); the trailing +1 can spill one limb
    fn xor_pn(&mut self, a: &[Limb], b: &[Limb]) -> Result<(), Error> {
        let an = a.len();
        let bn = b.len();
        let n = an.max(bn);
        let rn = n + 1;
        self.reserve(rn)?;
        let r = self.buf(rn);
        let common = an.min(bn);
        let (mut c1, mut c2): (Limb, Limb) = (1, 1);
        for i in 0..common {
            let bv = b[i];
            let rv = (a[i] ^ bv.wrapping_sub(c1)).wrapping_add(c2);
            c1 = (bv < c1) as Limb;
            c2 = (rv < c2) as Limb;
            r[i] = rv;
        }
        for i in common..an {
            // bits of b - 1 above its top are zero
            let rv = a[i].wrapping_add(c2);
            c2 = (rv < c2) as Limb;
            r[i] = rv;
        }
        for i in common..bn {
            let bv = b[i];
            let rv = bv.wrapping_sub(c1).wrapping_add(c2);
            c1 = (bv < c1) as Limb;
            c2 = (rv < c2) as Limb;
            r[i] = rv;
        }
        r[n] = c2;
        self.commit(rn, true);
        Ok(())
    }

    // -a ^ -b = (a - 1) ^ (b - 1), with a.len() >= b.len()
    fn xor_nn(&mut self, a: &[Limb], b: &[Limb]) -> Result<(), Error> {
        let an = a.len();
        let bn = b.len();
        self.reserve(an)?;
        let r = self.buf(an);
        let (mut c1, mut c2): (Limb, Limb) = (1, 1);
        for i in 0..bn {
            let av = a[i];
            let bv = b[i];
            r[i] = av.wrapping_sub(c1) ^ bv.wrapping_sub(c2);
            c1 = (av < c1) as Limb;
            c2 = (bv < c2) as Limb;
        }
        for i in bn..an {
            let av = a[i];
            r[i] = av.wrapping_sub(c1);
            c1 = (av < c1) as Limb;
        }
        self.commit(an, false);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Strings
    // ------------------------------------------------------------------

    /// Renders the value in `base` (2..=36), lowercase digits, `-` prefix
    /// for negatives.
    pub fn to_string_radix(&self, base: u32) -> Result<String, Error> {
        assert!(
            (radix::MIN_BASE..=radix::MAX_BASE).contains(&base),
            "base must be in 2..=36"
        );

        let cap = self.bit_width() / base.ilog2() as usize + 2;
        let mut out = vec![0u8; cap];
        let mut start = 0;
        if self.size < 0 {
            out[0] = b'-';
            start = 1;
        }
        let n = radix::to_str_radix(self.magnitude(), base, &mut out[start..])?;
        out.truncate(start + n);
        // the buffer holds only ASCII sign and digit characters
        Ok(unsafe { String::from_utf8_unchecked(out) })
    }

    /// Parses `s` in `base` (2..=36) with an optional leading `+`/`-`.
    /// The entire string must be consumed.
    pub fn from_str_radix(s: &str, base: u32) -> Result<BigInt, Error> {
        BigInt::from_str_radix_in(s, base, default_allocator())
    }

    pub fn from_str_radix_in(
        s: &str,
        base: u32,
        alloc: &'static dyn LimbAllocator,
    ) -> Result<BigInt, Error> {
        assert!(
            (radix::MIN_BASE..=radix::MAX_BASE).contains(&base),
            "base must be in 2..=36"
        );

        let bytes = s.as_bytes();
        let (negative, digits) = match bytes.first() {
            Some(b'-') => (true, &bytes[1..]),
            Some(b'+') => (false, &bytes[1..]),
            _ => (false, bytes),
        };
        if digits.is_empty() {
            return Err(Error::InvalidArgument);
        }

        let mut r = BigInt::new_in(alloc);
        // every digit carries at most ilog2(base) + 1 bits
        let bits = base.ilog2() as usize + 1;
        let cap = (digits.len() * bits).div_ceil(LIMB_BITS as usize) + 1;
        r.reserve(cap)?;
        let (consumed, len) = radix::from_str_radix(digits, base, r.buf(cap))?;
        if consumed != digits.len() {
            return Err(Error::InvalidArgument);
        }
        r.size = if negative { -(len as isize) } else { len as isize };
        Ok(r)
    }

    // ------------------------------------------------------------------
    // Bytes
    // ------------------------------------------------------------------

    /// The absolute value as exactly `⌈bit_width/8⌉` octets.
    pub fn to_bytes(&self, endian: Endian) -> Vec<u8> {
        let mut out = vec![0u8; limbs::byte_len(self.magnitude())];
        let n = limbs::to_bytes(self.magnitude(), endian, &mut out);
        debug_assert_eq!(n, out.len());
        out
    }

    /// Non-negative value from an octet sequence; consumes all of `bytes`.
    pub fn from_bytes(bytes: &[u8], endian: Endian) -> BigInt {
        match BigInt::from_bytes_in(bytes, endian, default_allocator()) {
            Ok(r) => r,
            Err(_) => alloc_failure(bytes.len() / size_of::<Limb>() + 1),
        }
    }

    pub fn from_bytes_in(
        bytes: &[u8],
        endian: Endian,
        alloc: &'static dyn LimbAllocator,
    ) -> Result<BigInt, Error> {
        let mut r = BigInt::new_in(alloc);
        if bytes.is_empty() {
            return Ok(r);
        }
        let cap = bytes.len().div_ceil(size_of::<Limb>());
        r.reserve(cap)?;
        let len = limbs::from_bytes(bytes, endian, r.buf(cap));
        r.size = len as isize;
        Ok(r)
    }

    fn magnitude_u64(&self) -> Result<u64, Error> {
        let mut v: u64 = 0;
        for (i, &limb) in self.magnitude().iter().enumerate() {
            let shift = i as u32 * LIMB_BITS;
            if shift >= 64 {
                return Err(Error::ValueTooLarge);
            }
            v |= (limb as u64) << shift;
        }
        Ok(v)
    }
}

impl Drop for BigInt {
    fn drop(&mut self) {
        unsafe { self.release() }
    }
}

impl Default for BigInt {
    fn default() -> Self {
        BigInt::new()
    }
}

impl Clone for BigInt {
    fn clone(&self) -> Self {
        match self.try_clone() {
            Ok(r) => r,
            Err(_) => alloc_failure(self.len()),
        }
    }

    fn clone_from(&mut self, source: &Self) {
        if self.assign_bigint(source).is_err() {
            alloc_failure(source.len());
        }
    }
}

impl fmt::Debug for BigInt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BigInt")
            .field("size", &self.size)
            .field("limbs", &self.magnitude())
            .finish()
    }
}

// ============================================================================
// Conversions
// ============================================================================

impl From<u64> for BigInt {
    fn from(value: u64) -> Self {
        let mut r = BigInt::new();
        if r.set_u64(value).is_err() {
            alloc_failure(1);
        }
        r
    }
}

impl From<i64> for BigInt {
    fn from(value: i64) -> Self {
        let mut r = BigInt::new();
        if r.set_i64(value).is_err() {
            alloc_failure(1);
        }
        r
    }
}

impl From<u32> for BigInt {
    fn from(value: u32) -> Self {
        BigInt::from(value as u64)
    }
}

impl From<i32> for BigInt {
    fn from(value: i32) -> Self {
        BigInt::from(value as i64)
    }
}

impl TryFrom<&BigInt> for u64 {
    type Error = Error;

    fn try_from(value: &BigInt) -> Result<u64, Error> {
        if value.size < 0 {
            return Err(Error::ValueTooLarge);
        }
        value.magnitude_u64()
    }
}

impl TryFrom<&BigInt> for i64 {
    type Error = Error;

    fn try_from(value: &BigInt) -> Result<i64, Error> {
        let mag = value.magnitude_u64()?;
        if value.size < 0 {
            if mag > i64::MIN.unsigned_abs() {
                Err(Error::ValueTooLarge)
            } else {
                Ok((mag as i64).wrapping_neg())
            }
        } else if mag > i64::MAX as u64 {
            Err(Error::ValueTooLarge)
        } else {
            Ok(mag as i64)
        }
    }
}

// ============================================================================
// Comparison
// ============================================================================

impl PartialEq for BigInt {
    fn eq(&self, other: &Self) -> bool {
        self.size == other.size && limbs::equal_n(self.magnitude(), other.magnitude())
    }
}

impl Eq for BigInt {}

impl PartialOrd for BigInt {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for BigInt {
    /// The signed length orders by sign and magnitude width at once; equal
    /// lengths compare limbs, reversed for negatives.
    fn cmp(&self, other: &Self) -> Ordering {
        match self.size.cmp(&other.size) {
            Ordering::Equal => {
                if self.size >= 0 {
                    limbs::cmp_n(self.magnitude(), other.magnitude())
                } else {
                    limbs::cmp_n(other.magnitude(), self.magnitude())
                }
            }
            ord => ord,
        }
    }
}

impl PartialEq<Limb> for BigInt {
    fn eq(&self, &other: &Limb) -> bool {
        if other == 0 {
            self.size == 0
        } else {
            self.size == 1 && self.magnitude()[0] == other
        }
    }
}

impl PartialEq<SignedLimb> for BigInt {
    fn eq(&self, &other: &SignedLimb) -> bool {
        match other.signum() {
            0 => self.size == 0,
            1 => self.size == 1 && self.magnitude()[0] == other as Limb,
            _ => self.size == -1 && self.magnitude()[0] == other.unsigned_abs(),
        }
    }
}

impl PartialOrd<Limb> for BigInt {
    fn partial_cmp(&self, &other: &Limb) -> Option<Ordering> {
        let ord = if self.size < 0 {
            Ordering::Less
        } else if self.size > 1 {
            Ordering::Greater
        } else if self.size == 1 {
            limbs::cmp_uint(self.magnitude(), other)
        } else if other == 0 {
            Ordering::Equal
        } else {
            Ordering::Less
        };
        Some(ord)
    }
}

impl PartialOrd<SignedLimb> for BigInt {
    fn partial_cmp(&self, &other: &SignedLimb) -> Option<Ordering> {
        if other >= 0 {
            return self.partial_cmp(&(other as Limb));
        }
        let ord = if self.size >= 0 {
            Ordering::Greater
        } else if self.size < -1 {
            Ordering::Less
        } else {
            other.unsigned_abs().cmp(&self.magnitude()[0])
        };
        Some(ord)
    }
}

// ============================================================================
// Operators
// ============================================================================

fn or_die(result: Result<(), Error>, capacity_hint: usize) {
    if result.is_err() {
        alloc_failure(capacity_hint);
    }
}

impl Add<&BigInt> for &BigInt {
    type Output = BigInt;

    fn add(self, rhs: &BigInt) -> BigInt {
        let mut r = BigInt::new_in(self.alloc);
        or_die(r.assign_add(self, rhs), self.len().max(rhs.len()) + 1);
        r
    }
}

impl Sub<&BigInt> for &BigInt {
    type Output = BigInt;

    fn sub(self, rhs: &BigInt) -> BigInt {
        let mut r = BigInt::new_in(self.alloc);
        or_die(r.assign_sub(self, rhs), self.len().max(rhs.len()) + 1);
        r
    }
}

impl Mul<&BigInt> for &BigInt {
    type Output = BigInt;

    fn mul(self, rhs: &BigInt) -> BigInt {
        let mut r = BigInt::new_in(self.alloc);
        or_die(r.assign_mul(self, rhs), self.len() + rhs.len());
        r
    }
}

impl Div<&BigInt> for &BigInt {
    type Output = BigInt;

    fn div(self, rhs: &BigInt) -> BigInt {
        let mut q = BigInt::new_in(self.alloc);
        let mut r = BigInt::new_in(self.alloc);
        match BigInt::div_rem(&mut q, &mut r, self, rhs) {
            Ok(()) => q,
            Err(Error::DivideByZero) => panic!("attempt to divide by zero"),
            Err(_) => alloc_failure(self.len()),
        }
    }
}

impl Rem<&BigInt> for &BigInt {
    type Output = BigInt;

    fn rem(self, rhs: &BigInt) -> BigInt {
        let mut q = BigInt::new_in(self.alloc);
        let mut r = BigInt::new_in(self.alloc);
        match BigInt::div_rem(&mut q, &mut r, self, rhs) {
            Ok(()) => r,
            Err(Error::DivideByZero) => {
                panic!("attempt to calculate remainder with a divisor of zero")
            }
            Err(_) => alloc_failure(self.len()),
        }
    }
}

impl Neg for BigInt {
    type Output = BigInt;

    fn neg(mut self) -> BigInt {
        self.negate();
        self
    }
}

impl Neg for &BigInt {
    type Output = BigInt;

    fn neg(self) -> BigInt {
        let mut r = self.clone();
        r.negate();
        r
    }
}

impl Not for &BigInt {
    type Output = BigInt;

    fn not(self) -> BigInt {
        let mut r = BigInt::new_in(self.alloc);
        or_die(r.assign_not(self), self.len() + 1);
        r
    }
}

impl BitAnd<&BigInt> for &BigInt {
    type Output = BigInt;

    fn bitand(self, rhs: &BigInt) -> BigInt {
        let mut r = BigInt::new_in(self.alloc);
        or_die(r.assign_and(self, rhs), self.len().max(rhs.len()) + 1);
        r
    }
}

impl BitOr<&BigInt> for &BigInt {
    type Output = BigInt;

    fn bitor(self, rhs: &BigInt) -> BigInt {
        let mut r = BigInt::new_in(self.alloc);
        or_die(r.assign_or(self, rhs), self.len().max(rhs.len()) + 1);
        r
    }
}

impl BitXor<&BigInt> for &BigInt {
    type Output = BigInt;

    fn bitxor(self, rhs: &BigInt) -> BigInt {
        let mut r = BigInt::new_in(self.alloc);
        or_die(r.assign_xor(self, rhs), self.len().max(rhs.len()) + 1);
        r
    }
}

// ---- machine-word right-hand sides -----------------------------------------

impl Add<Limb> for &BigInt {
    type Output = BigInt;

    fn add(self, rhs: Limb) -> BigInt {
        let mut r = BigInt::new_in(self.alloc);
        or_die(r.add_limb(self, rhs, false), self.len() + 1);
        r
    }
}

impl Add<SignedLimb> for &BigInt {
    type Output = BigInt;

    fn add(self, rhs: SignedLimb) -> BigInt {
        let mut r = BigInt::new_in(self.alloc);
        or_die(r.add_limb(self, rhs.unsigned_abs(), rhs < 0), self.len() + 1);
        r
    }
}

impl Sub<Limb> for &BigInt {
    type Output = BigInt;

    fn sub(self, rhs: Limb) -> BigInt {
        let mut r = BigInt::new_in(self.alloc);
        or_die(r.add_limb(self, rhs, true), self.len() + 1);
        r
    }
}

impl Sub<SignedLimb> for &BigInt {
    type Output = BigInt;

    fn sub(self, rhs: SignedLimb) -> BigInt {
        let mut r = BigInt::new_in(self.alloc);
        or_die(r.add_limb(self, rhs.unsigned_abs(), rhs >= 0), self.len() + 1);
        r
    }
}

impl Mul<Limb> for &BigInt {
    type Output = BigInt;

    fn mul(self, rhs: Limb) -> BigInt {
        let mut r = BigInt::new_in(self.alloc);
        if self.size != 0 && rhs != 0 {
            or_die(
                r.mul_magnitudes(self.magnitude(), &[rhs], self.size < 0),
                self.len() + 1,
            );
        }
        r
    }
}

impl Mul<SignedLimb> for &BigInt {
    type Output = BigInt;

    fn mul(self, rhs: SignedLimb) -> BigInt {
        let mut r = BigInt::new_in(self.alloc);
        if self.size != 0 && rhs != 0 {
            let negative = (self.size < 0) != (rhs < 0);
            or_die(
                r.mul_magnitudes(self.magnitude(), &[rhs.unsigned_abs()], negative),
                self.len() + 1,
            );
        }
        r
    }
}

impl Div<Limb> for &BigInt {
    type Output = BigInt;

    fn div(self, rhs: Limb) -> BigInt {
        let mut q = BigInt::new_in(self.alloc);
        match q.assign_div_limb(self, rhs) {
            Ok(_) => q,
            Err(Error::DivideByZero) => panic!("attempt to divide by zero"),
            Err(_) => alloc_failure(self.len()),
        }
    }
}

impl Div<SignedLimb> for &BigInt {
    type Output = BigInt;

    fn div(self, rhs: SignedLimb) -> BigInt {
        let mut q = BigInt::new_in(self.alloc);
        match q.assign_div_limb(self, rhs.unsigned_abs()) {
            Ok(_) => {
                if rhs < 0 {
                    q.negate();
                }
                q
            }
            Err(Error::DivideByZero) => panic!("attempt to divide by zero"),
            Err(_) => alloc_failure(self.len()),
        }
    }
}

impl Rem<Limb> for &BigInt {
    type Output = BigInt;

    fn rem(self, rhs: Limb) -> BigInt {
        let mut q = BigInt::new_in(self.alloc);
        match q.assign_div_limb(self, rhs) {
            Ok(rem) => {
                let mut r = BigInt::new_in(self.alloc);
                or_die(r.assign_limb(rem, self.size < 0), 1);
                r
            }
            Err(Error::DivideByZero) => {
                panic!("attempt to calculate remainder with a divisor of zero")
            }
            Err(_) => alloc_failure(self.len()),
        }
    }
}

impl Rem<SignedLimb> for &BigInt {
    type Output = BigInt;

    fn rem(self, rhs: SignedLimb) -> BigInt {
        let mut q = BigInt::new_in(self.alloc);
        match q.assign_div_limb(self, rhs.unsigned_abs()) {
            Ok(rem) => {
                let mut r = BigInt::new_in(self.alloc);
                or_die(r.assign_limb(rem, self.size < 0), 1);
                r
            }
            Err(Error::DivideByZero) => {
                panic!("attempt to calculate remainder with a divisor of zero")
            }
            Err(_) => alloc_failure(self.len()),
        }
    }
}

impl BitAnd<Limb> for &BigInt {
    type Output = BigInt;

    fn bitand(self, rhs: Limb) -> BigInt {
        let mut r = BigInt::new_in(self.alloc);
        if self.size != 0 && rhs != 0 {
            or_die(r.and_views(self.magnitude(), self.size < 0, &[rhs], false), 2);
        }
        r
    }
}

impl BitAnd<SignedLimb> for &BigInt {
    type Output = BigInt;

    fn bitand(self, rhs: SignedLimb) -> BigInt {
        let mut r = BigInt::new_in(self.alloc);
        if self.size != 0 && rhs != 0 {
            let mag = [rhs.unsigned_abs()];
            or_die(
                r.and_views(self.magnitude(), self.size < 0, &mag, rhs < 0),
                self.len() + 1,
            );
        }
        r
    }
}

impl BitOr<Limb> for &BigInt {
    type Output = BigInt;

    fn bitor(self, rhs: Limb) -> BigInt {
        let mut r = BigInt::new_in(self.alloc);
        let result = if self.size == 0 {
            r.assign_limb(rhs, false)
        } else if rhs == 0 {
            r.assign_bigint(self)
        } else {
            r.or_views(self.magnitude(), self.size < 0, &[rhs], false)
        };
        or_die(result, self.len() + 1);
        r
    }
}

impl BitOr<SignedLimb> for &BigInt {
    type Output = BigInt;

    fn bitor(self, rhs: SignedLimb) -> BigInt {
        let mut r = BigInt::new_in(self.alloc);
        let result = if self.size == 0 {
            r.assign_limb(rhs.unsigned_abs(), rhs < 0)
        } else if rhs == 0 {
            r.assign_bigint(self)
        } else {
            r.or_views(self.magnitude(), self.size < 0, &[rhs.unsigned_abs()], rhs < 0)
        };
        or_die(result, self.len() + 1);
        r
    }
}

impl BitXor<Limb> for &BigInt {
    type Output = BigInt;

    fn bitxor(self, rhs: Limb) -> BigInt {
        let mut r = BigInt::new_in(self.alloc);
        let result = if self.size == 0 {
            r.assign_limb(rhs, false)
        } else if rhs == 0 {
            r.assign_bigint(self)
        } else {
            r.xor_views(self.magnitude(), self.size < 0, &[rhs], false)
        };
        or_die(result, self.len() + 2);
        r
    }
}

impl BitXor<SignedLimb> for &BigInt {
    type Output = BigInt;

    fn bitxor(self, rhs: SignedLimb) -> BigInt {
        let mut r = BigInt::new_in(self.alloc);
        let result = if self.size == 0 {
            r.assign_limb(rhs.unsigned_abs(), rhs < 0)
        } else if rhs == 0 {
            r.assign_bigint(self)
        } else {
            r.xor_views(self.magnitude(), self.size < 0, &[rhs.unsigned_abs()], rhs < 0)
        };
        or_die(result, self.len() + 2);
        r
    }
}

// ============================================================================
// Formatting and parsing
// ============================================================================

fn fmt_radix(value: &BigInt, base: u32, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match value.to_string_radix(base) {
        Ok(s) => f.write_str(&s),
        Err(_) => Err(fmt::Error),
    }
}

impl fmt::Display for BigInt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_radix(self, 10, f)
    }
}

impl fmt::Binary for BigInt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_radix(self, 2, f)
    }
}

impl fmt::Octal for BigInt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_radix(self, 8, f)
    }
}

impl fmt::LowerHex for BigInt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_radix(self, 16, f)
    }
}

impl FromStr for BigInt {
    type Err = Error;

    fn from_str(s: &str) -> Result<BigInt, Error> {
        BigInt::from_str_radix(s, 10)
    }
}
