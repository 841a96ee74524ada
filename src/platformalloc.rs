// Abstract over where word pages come from.

use crate::error::BenchError;
use std::ptr::NonNull;

pub const WORD_BYTES: usize = size_of::<usize>();

/// Returns a page of `words` machine words, aligned to a word.
pub fn sys_alloc_words(words: usize) -> Result<NonNull<usize>, BenchError> {
    debug_assert!(words > 0);
    let bytes = words.checked_mul(WORD_BYTES).ok_or(BenchError::AllocFailed { words })?;
    let p = vendor::sys_alloc(bytes).ok_or(BenchError::AllocFailed { words })?;
    debug_assert!(p.as_ptr().is_aligned());
    Ok(p)
}

/// `p` must have come from `sys_alloc_words(words)` with the same `words`.
pub unsafe fn sys_dealloc_words(p: NonNull<usize>, words: usize) {
    unsafe { vendor::sys_dealloc(p, words * WORD_BYTES) }
}

#[cfg(target_os = "linux")]
pub mod vendor {
    use rustix::mm::{MapFlags, ProtFlags, mmap_anonymous, munmap};
    use std::ptr::{self, NonNull};

    pub fn sys_alloc(reqsize: usize) -> Option<NonNull<usize>> {
        match unsafe {
            mmap_anonymous(
                ptr::null_mut(),
                reqsize,
                ProtFlags::READ | ProtFlags::WRITE,
                MapFlags::PRIVATE,
            )
        } {
            Ok(p) => NonNull::new(p.cast::<usize>()),
            Err(_) => None,
        }
    }

    pub unsafe fn sys_dealloc(p: NonNull<usize>, size: usize) {
        let res = unsafe { munmap(p.as_ptr().cast(), size) };
        debug_assert!(res.is_ok(), "munmap of {size} bytes failed: {res:?}");
    }
}

#[cfg(not(target_os = "linux"))]
pub mod vendor {
    use std::alloc::{GlobalAlloc, Layout, System};
    use std::ptr::NonNull;

    fn layout(size: usize) -> Option<Layout> {
        Layout::from_size_align(size, align_of::<usize>()).ok()
    }

    pub fn sys_alloc(reqsize: usize) -> Option<NonNull<usize>> {
        let l = layout(reqsize)?;
        NonNull::new(unsafe { System.alloc(l) }.cast::<usize>())
    }

    pub unsafe fn sys_dealloc(p: NonNull<usize>, size: usize) {
        if let Some(l) = layout(size) {
            unsafe { System.dealloc(p.as_ptr().cast(), l) }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_is_writable_end_to_end() {
        let words = 4096;
        let p = sys_alloc_words(words).unwrap();
        unsafe {
            p.as_ptr().write(7);
            p.as_ptr().add(words - 1).write(9);
            assert_eq!(p.as_ptr().read(), 7);
            assert_eq!(p.as_ptr().add(words - 1).read(), 9);
            sys_dealloc_words(p, words);
        }
    }

    #[test]
    fn absurd_request_fails_cleanly() {
        assert_eq!(sys_alloc_words(usize::MAX), Err(BenchError::AllocFailed { words: usize::MAX }));
    }
}
