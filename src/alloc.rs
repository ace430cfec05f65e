//! The allocator capability that every limb buffer is drawn from, and the
//! process-wide default slot.

use std::alloc::Layout;
use std::any::Any;
use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};

/// A memory source for bigint limb buffers.
///
/// `allocate` returns null on failure; it never panics. `is_equal` decides
/// whether two handles may free each other's blocks. The default equates
/// handles of the same concrete type, which is right for stateless
/// allocators; allocators carrying instance state should override it.
pub trait LimbAllocator: Any + Send + Sync {
    fn allocate(&self, layout: Layout) -> *mut u8;

    /// # Safety
    ///
    /// `ptr` must have been returned by `allocate` with the same `layout`
    /// on this allocator or one `is_equal` to it, and must not be used
    /// afterwards.
    unsafe fn deallocate(&self, ptr: *mut u8, layout: Layout);

    fn is_equal(&self, other: &dyn LimbAllocator) -> bool {
        self.type_id() == other.type_id()
    }
}

/// Global-heap allocator; the initial process-wide default.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemAllocator;

impl LimbAllocator for SystemAllocator {
    fn allocate(&self, layout: Layout) -> *mut u8 {
        debug_assert!(layout.size() > 0);
        unsafe { std::alloc::alloc(layout) }
    }

    unsafe fn deallocate(&self, ptr: *mut u8, layout: Layout) {
        unsafe { std::alloc::dealloc(ptr, layout) }
    }
}

/// An allocator that refuses every request. Useful for exercising
/// out-of-memory handling.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullAllocator;

impl LimbAllocator for NullAllocator {
    fn allocate(&self, _layout: Layout) -> *mut u8 {
        ptr::null_mut()
    }

    unsafe fn deallocate(&self, _ptr: *mut u8, _layout: Layout) {}
}

static SYSTEM: SystemAllocator = SystemAllocator;

// Fat trait references do not fit an atomic, so the slot holds a thin
// pointer to a leaked cell containing one. Null means "never replaced".
static DEFAULT: AtomicPtr<&'static dyn LimbAllocator> = AtomicPtr::new(ptr::null_mut());

/// The current process-wide default allocator. Adopted by bigints whose
/// constructor was not handed an explicit allocator.
pub fn default_allocator() -> &'static dyn LimbAllocator {
    let slot = DEFAULT.load(Ordering::Acquire);
    if slot.is_null() { &SYSTEM } else { unsafe { *slot } }
}

/// Replaces the process-wide default, returning the previous one. Bigints
/// already constructed keep the allocator they were born with.
///
/// Each replacement leaks one pointer-sized cell so that concurrent
/// readers of the slot always see a live reference.
pub fn set_default_allocator(alloc: &'static dyn LimbAllocator) -> &'static dyn LimbAllocator {
    let cell: &'static mut &'static dyn LimbAllocator = Box::leak(Box::new(alloc));
    let prev = DEFAULT.swap(cell, Ordering::AcqRel);
    if prev.is_null() { &SYSTEM } else { unsafe { *prev } }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stateless_allocators_compare_by_type() {
        let a = SystemAllocator;
        let b = SystemAllocator;
        assert!(a.is_equal(&b));
        assert!(!a.is_equal(&NullAllocator));
    }

    #[test]
    fn null_allocator_always_fails() {
        let layout = Layout::array::<crate::Limb>(4).unwrap();
        assert!(NullAllocator.allocate(layout).is_null());
    }
}
