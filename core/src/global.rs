//! The one index a process serves from.

use crate::error::Result;
use crate::index::Index;
use once_cell::sync::OnceCell;
use std::sync::Arc;

static INDEX: OnceCell<Arc<Index>> = OnceCell::new();

/// Returns the process-wide index, running `init` only if no index has been
/// installed yet. Concurrent callers block until the first `init` finishes.
/// A failed `init` leaves the handle empty, so a later call may try again.
pub fn shared_index<F>(init: F) -> Result<Arc<Index>>
where
    F: FnOnce() -> Result<Index>,
{
    INDEX
        .get_or_try_init(|| {
            tracing::info!("initializing process-wide index");
            init().map(Arc::new)
        })
        .cloned()
}

/// The process-wide index, if it has been initialized.
pub fn installed() -> Option<Arc<Index>> {
    INDEX.get().cloned()
}
