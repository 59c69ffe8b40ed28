//! SIGBUS interception for file mappings.
//!
//! Touching a page of a shared file mapping that lies past the end of the
//! file (because the file was truncated under us) or whose backing I/O
//! failed raises SIGBUS. While the handler is installed, every live mapping
//! owns a slot in a fixed, lock-free table; a fault inside a registered range
//! marks the slot as faulted and maps a zero page over the faulting page so
//! the access completes. Faults outside every slot are forwarded to whatever
//! handler was installed before ours.

use std::io;
use std::mem;
use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Once, OnceLock};

/// Maximum number of mappings watched at the same time. Mappings created
/// while the table is full are simply not watched.
pub(crate) const MAX_SLOTS: usize = 4096;

struct Slot {
    in_use: AtomicBool,
    start: AtomicUsize,
    end: AtomicUsize,
    faulted: AtomicBool,
}

impl Slot {
    const fn new() -> Self {
        Self {
            in_use: AtomicBool::new(false),
            start: AtomicUsize::new(0),
            end: AtomicUsize::new(0),
            faulted: AtomicBool::new(false),
        }
    }
}

static SLOTS: [Slot; MAX_SLOTS] = [const { Slot::new() }; MAX_SLOTS];

static INSTALL: Once = Once::new();
static PREV_SIGBUS: OnceLock<libc::sigaction> = OnceLock::new();

/// Install the SIGBUS handler. Only the first call does anything.
pub(crate) fn install() {
    INSTALL.call_once(|| unsafe {
        let mut handler: libc::sigaction = mem::zeroed();
        // SA_SIGINFO gives us the faulting address, SA_ONSTACK lets the
        // handler run on the alternate stack Rust installs, and SA_NODEFER
        // lets a fault inside the handler reach the previous disposition.
        handler.sa_flags = libc::SA_SIGINFO | libc::SA_NODEFER | libc::SA_ONSTACK;
        handler.sa_sigaction = sigbus_handler as usize;
        libc::sigemptyset(&mut handler.sa_mask);

        let mut previous: libc::sigaction = mem::zeroed();
        if libc::sigaction(libc::SIGBUS, &handler, &mut previous) != 0 {
            tracing::warn!(
                error = %io::Error::last_os_error(),
                "unable to install the SIGBUS handler, mapping faults will not be detected"
            );
            return;
        }
        let _ = PREV_SIGBUS.set(previous);
        tracing::debug!("SIGBUS handler installed");
    });
}

/// Ownership of one watched range. Dropping it stops watching.
#[derive(Debug)]
pub(crate) struct FaultSlot {
    index: usize,
}

impl FaultSlot {
    /// Start watching `[start, start + len)`. Returns `None` when the table
    /// is full or the range is empty.
    pub(crate) fn register(start: usize, len: usize) -> Option<Self> {
        if len == 0 {
            return None;
        }
        let index = SLOTS.iter().position(|slot| {
            slot.in_use
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
        });
        let Some(index) = index else {
            tracing::debug!(start, len, "fault table is full, mapping is not watched");
            return None;
        };
        let slot = &SLOTS[index];
        slot.faulted.store(false, Ordering::Relaxed);
        slot.end.store(start + len, Ordering::Relaxed);
        // `start` is published last: the handler ignores slots whose start is 0.
        slot.start.store(start, Ordering::Release);
        Some(Self { index })
    }

    pub(crate) fn is_faulted(&self) -> bool {
        SLOTS[self.index].faulted.load(Ordering::Acquire)
    }
}

impl Drop for FaultSlot {
    fn drop(&mut self) {
        let slot = &SLOTS[self.index];
        slot.start.store(0, Ordering::Release);
        slot.end.store(0, Ordering::Relaxed);
        slot.in_use.store(false, Ordering::Release);
    }
}

/// Whether `addr` lies inside a live slot.
pub(crate) fn is_watched(addr: usize) -> bool {
    find_slot(addr).is_some()
}

fn find_slot(addr: usize) -> Option<&'static Slot> {
    SLOTS.iter().find(|slot| {
        let start = slot.start.load(Ordering::Acquire);
        start != 0 && addr >= start && addr < slot.end.load(Ordering::Relaxed)
    })
}

unsafe extern "C" fn sigbus_handler(
    signum: libc::c_int,
    siginfo: *mut libc::siginfo_t,
    context: *mut libc::c_void,
) {
    unsafe {
        let addr = (*siginfo).si_addr() as usize;
        if let Some(slot) = find_slot(addr) {
            let page_size = super::page_size();
            let page = addr & !(page_size - 1);
            let zero = libc::mmap(
                page as *mut libc::c_void,
                page_size,
                libc::PROT_READ,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS | libc::MAP_FIXED,
                -1,
                0,
            );
            if zero != libc::MAP_FAILED {
                slot.faulted.store(true, Ordering::Release);
                return;
            }
        }

        // This fault is not ours. If there is no next handler (SIG_IGN or
        // SIG_DFL), restore the original disposition and return so the
        // faulting access runs again and crashes the normal way.
        let Some(previous) = PREV_SIGBUS.get() else {
            libc::signal(signum, libc::SIG_DFL);
            return;
        };
        if previous.sa_flags & libc::SA_SIGINFO != 0 {
            mem::transmute::<
                usize,
                extern "C" fn(libc::c_int, *mut libc::siginfo_t, *mut libc::c_void),
            >(previous.sa_sigaction)(signum, siginfo, context)
        } else if previous.sa_sigaction == libc::SIG_DFL || previous.sa_sigaction == libc::SIG_IGN
        {
            libc::sigaction(signum, previous, ptr::null_mut());
        } else {
            mem::transmute::<usize, extern "C" fn(libc::c_int)>(previous.sa_sigaction)(signum)
        }
    }
}
