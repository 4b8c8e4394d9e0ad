use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic, prefixed identifier source (`app-000001`, `vtx-000042`, ...).
pub(crate) struct Sequence {
    prefix: &'static str,
    next: AtomicU64,
}

impl Sequence {
    pub(crate) const fn new(prefix: &'static str) -> Self {
        Self {
            prefix,
            next: AtomicU64::new(1),
        }
    }

    pub(crate) fn next_value(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn next_id(&self) -> String {
        format!("{}-{:06}", self.prefix, self.next_value())
    }
}
