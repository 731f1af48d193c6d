use portable_atomic::{AtomicBool, Ordering};

/// Process-wide single-flight flag over the generation pathway.
///
/// There is exactly one flag for all guilds: the engine resources are heavy
/// and the host is not assumed to run two inferences at once.
#[derive(Debug, Default)]
pub(crate) struct BusyFlag {
    busy: AtomicBool,
}

impl BusyFlag {
    /// Claims the flag, or returns `None` if it is already held. There is no
    /// queueing: losers are expected to report `Busy` and let the user retry.
    pub(crate) fn try_acquire(&self) -> Option<BusyGuard<'_>> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| BusyGuard { flag: self })
    }

    pub(crate) fn is_set(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

/// Holds the [`BusyFlag`]; dropping it clears the flag on every exit path,
/// including early returns, panics and cancelled futures.
#[must_use = "the busy flag is released as soon as the guard is dropped"]
pub(crate) struct BusyGuard<'a> {
    flag: &'a BusyFlag,
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.flag.busy.store(false, Ordering::Release);
    }
}
