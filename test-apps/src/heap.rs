use crate::errors::{AppError, AppResult};
use std::alloc::{GlobalAlloc, Layout, System};
use std::sync::atomic::{AtomicIsize, Ordering};
use tracing::info;

/// Bytes a run may leave allocated before it counts as a leak
pub const TEST_MEMORY_LEAK_THRESHOLD: isize = 400;

static LIVE_BYTES: AtomicIsize = AtomicIsize::new(0);

/// System allocator that keeps a count of live heap bytes
///
/// Install it with `#[global_allocator]` in the binary; without it
/// [`live_bytes`] stays at zero.
pub struct CountingAlloc;

unsafe impl GlobalAlloc for CountingAlloc {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let p = System.alloc(layout);
        if !p.is_null() {
            LIVE_BYTES.fetch_add(layout.size() as isize, Ordering::Relaxed);
        }
        p
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        System.dealloc(ptr, layout);
        LIVE_BYTES.fetch_sub(layout.size() as isize, Ordering::Relaxed);
    }
}

pub fn live_bytes() -> isize {
    LIVE_BYTES.load(Ordering::Relaxed)
}

/// Compare live heap bytes before and after a run
pub fn check_leak(before: isize, after: isize, kind: &'static str) -> AppResult<()> {
    // Free memory delta: negative when the run kept memory
    let delta = before - after;
    info!(
        "[test_app] {}: before {} bytes live, after {} bytes live (delta {})",
        kind, before, after, delta
    );
    if delta < -TEST_MEMORY_LEAK_THRESHOLD {
        return Err(AppError::Leak { kind, delta });
    }
    Ok(())
}
