//! First-fit heap allocator.
//!
//! A single fixed-size byte region is carved into a linked sequence of
//! chunks, each preceded by a 4-byte header. `alloc` walks the sequence for
//! the first chunk that fits, splitting it when the leftover is worth
//! keeping; `free` marks a chunk free and, every [`DEFRAG_CUTOFF`] frees,
//! coalesces adjacent free chunks.
//!
//! The heap region would normally come from linker-provided `__heap_start`/
//! `__heap_end` symbols; since the vector table and linker script are
//! hardware bring-up and out of scope here, it is instead a plain static
//! array sized by [`HEAP_SIZE`] — the allocator algorithm and its invariants
//! are identical either way.

use core::ptr;

use crate::config::{ALIGN, DEFRAG_CUTOFF, HEAP_HEADER_SIZE, HEAP_SIZE, SPLIT_CUTOFF};
use crate::error::{KernelError, KernelResult};
use crate::sync::critical::critical_section;

/// Per-chunk header, `repr(C, packed)` so it occupies exactly
/// [`HEAP_HEADER_SIZE`] bytes with the field order the firmware this
/// allocator was grown from used: `allocated` (1), `size` (2), `padding`
/// (1, pure filler so the struct divides the payload's 4-byte alignment).
///
/// `packed` means `size` sits at an odd byte offset; every access below is
/// a plain field read/write (the compiler lowers these to unaligned
/// load/store for packed fields), never a reference, which is the one
/// operation packed structs forbid.
#[repr(C, packed)]
#[derive(Clone, Copy)]
struct ChunkHeader {
    allocated: u8,
    size: u16,
    padding: u8,
}

const _: () = assert!(core::mem::size_of::<ChunkHeader>() == HEAP_HEADER_SIZE);

static mut HEAP: [u8; HEAP_SIZE] = [0; HEAP_SIZE];
static mut FREE_COUNT: u32 = 0;

fn align_up(n: usize, align: usize) -> usize {
    (n + align - 1) & !(align - 1)
}

/// # Safety
/// `offset + HEAP_HEADER_SIZE` must lie within [`HEAP`], and `offset` must
/// not alias a header another live reference is using.
unsafe fn header_at(offset: usize) -> *mut ChunkHeader {
    // SAFETY: forwarded from caller.
    unsafe { HEAP.as_mut_ptr().add(offset).cast::<ChunkHeader>() }
}

/// Initialize the heap as a single free chunk spanning the whole region.
///
/// Must be called once before the first `alloc`.
pub fn heap_init() {
    critical_section(|| {
        // SAFETY: sole writer, inside the critical section.
        unsafe {
            header_at(0).write(ChunkHeader {
                allocated: 0,
                padding: 0,
                size: (HEAP_SIZE - HEAP_HEADER_SIZE) as u16,
            });
            FREE_COUNT = 0;
        }
    });
}

/// Allocate at least `n` bytes, aligned to [`ALIGN`]. Returns null if `n`
/// is zero or no free chunk is large enough.
pub fn alloc(n: usize) -> *mut u8 {
    try_alloc(n).unwrap_or(ptr::null_mut())
}

/// [`alloc`]'s body, with the specific failure reason preserved.
fn try_alloc(n: usize) -> KernelResult<*mut u8> {
    if n == 0 {
        return Err(KernelError::InvalidArgument { name: "n" });
    }
    let m = {
        let a = align_up(n, ALIGN);
        if a == 0 { ALIGN } else { a }
    };

    critical_section(|| {
        // SAFETY: sole accessor, inside the critical section; `heap_init`
        // has run before the first call, establishing a well-formed chunk
        // sequence that this walk never steps outside of.
        unsafe {
            let mut offset = 0usize;
            while offset < HEAP_SIZE {
                let header = header_at(offset);
                let size = (*header).size as usize;

                if (*header).allocated == 0 && size >= m {
                    if size >= m + HEAP_HEADER_SIZE + SPLIT_CUTOFF {
                        (*header).size = m as u16;
                        (*header).allocated = 1;

                        let remainder_offset = offset + HEAP_HEADER_SIZE + m;
                        header_at(remainder_offset).write(ChunkHeader {
                            allocated: 0,
                            padding: 0,
                            size: (size - m - HEAP_HEADER_SIZE) as u16,
                        });
                    } else {
                        (*header).allocated = 1;
                    }
                    return Ok(HEAP.as_mut_ptr().add(offset + HEAP_HEADER_SIZE));
                }

                offset += HEAP_HEADER_SIZE + size;
            }
            Err(KernelError::HeapExhausted { requested: n })
        }
    })
}

/// Release a pointer previously returned by `alloc`.
///
/// # Safety
/// `ptr` must either be null or have been returned by a prior `alloc` call
/// on this heap and not already freed. Passing an arbitrary pointer that
/// merely happens to fall within the heap's address range but does not
/// point at a chunk boundary is undefined behavior; the out-of-range and
/// already-free cases are the only ones this function defends against.
pub unsafe fn free(ptr: *mut u8) {
    if ptr.is_null() {
        return;
    }

    critical_section(|| {
        // SAFETY: bounds are checked below before the header is touched;
        // the remaining validity requirements are documented on this
        // function and are the caller's responsibility.
        unsafe {
            let heap_start = HEAP.as_mut_ptr() as usize;
            let heap_end = heap_start + HEAP_SIZE;
            let addr = ptr as usize;

            if addr < heap_start + HEAP_HEADER_SIZE || addr >= heap_end {
                return;
            }

            let header = ptr.sub(HEAP_HEADER_SIZE).cast::<ChunkHeader>();
            if (*header).allocated == 0 {
                return;
            }
            (*header).allocated = 0;

            FREE_COUNT += 1;
            if FREE_COUNT >= DEFRAG_CUTOFF {
                defragment();
                FREE_COUNT = 0;
            }
        }
    });
}

/// Merge every run of adjacent free chunks into one.
///
/// # Safety
/// Must only be called from within `free`'s critical section, with the
/// heap in a well-formed state.
unsafe fn defragment() {
    // SAFETY: forwarded from caller.
    unsafe {
        let mut offset = 0usize;
        while offset < HEAP_SIZE {
            let header = header_at(offset);
            if (*header).allocated == 0 {
                loop {
                    let next_offset = offset + HEAP_HEADER_SIZE + (*header).size as usize;
                    if next_offset >= HEAP_SIZE {
                        break;
                    }
                    let next_header = header_at(next_offset);
                    if (*next_header).allocated != 0 {
                        break;
                    }
                    let merged_size =
                        (*header).size as usize + HEAP_HEADER_SIZE + (*next_header).size as usize;
                    (*header).size = merged_size as u16;
                }
            }
            offset += HEAP_HEADER_SIZE + (*header).size as usize;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // The heap is a single global region shared by every test in this binary;
    // serialize access so tests don't observe each other's chunks.
    static TEST_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn split_leaves_correct_gap() {
        let _guard = TEST_LOCK.lock().unwrap();
        heap_init();
        let p1 = alloc(100);
        let p2 = alloc(100);
        assert!(!p1.is_null() && !p2.is_null());
        assert_eq!((p2 as usize) - (p1 as usize), 100 + HEAP_HEADER_SIZE);
        unsafe {
            free(p1);
            free(p2);
        }
    }

    #[test]
    fn defrag_reunites_whole_heap() {
        let _guard = TEST_LOCK.lock().unwrap();
        heap_init();
        let p1 = alloc(100);
        let p2 = alloc(100);
        assert!(!p1.is_null() && !p2.is_null());
        unsafe {
            free(p1);
            free(p2);
        }
        // Two frees already landed; drive the remaining frees up to
        // DEFRAG_CUTOFF with no-op alloc/free pairs so coalescing runs.
        for _ in 0..(DEFRAG_CUTOFF - 2) {
            let dummy = alloc(8);
            assert!(!dummy.is_null());
            unsafe { free(dummy) };
        }
        let whole = alloc(HEAP_SIZE - HEAP_HEADER_SIZE);
        assert!(!whole.is_null());
        unsafe { free(whole) };
    }

    #[test]
    fn exhaustion_then_recovery() {
        let _guard = TEST_LOCK.lock().unwrap();
        heap_init();
        let mut ptrs = std::vec::Vec::new();
        loop {
            let p = alloc(64);
            if p.is_null() {
                break;
            }
            ptrs.push(p);
        }
        assert!(!ptrs.is_empty());
        for p in ptrs.drain(..) {
            unsafe { free(p) };
        }
        for _ in 0..DEFRAG_CUTOFF {
            let dummy = alloc(1);
            unsafe { free(dummy) };
        }
        let p = alloc(64);
        assert!(!p.is_null());
        unsafe { free(p) };
    }

    #[test]
    fn free_ignores_null_and_double_free() {
        let _guard = TEST_LOCK.lock().unwrap();
        heap_init();
        unsafe { free(ptr::null_mut()) };
        let p = alloc(32);
        unsafe {
            free(p);
            free(p); // already free: must not corrupt state
        }
        let p2 = alloc(32);
        assert!(!p2.is_null());
        unsafe { free(p2) };
    }
}
