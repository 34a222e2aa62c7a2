use std::sync::Arc;
use std::time::Instant;

use once_cell::sync::OnceCell;

pub mod generation;
pub mod model;
pub mod utils;

pub use generation::TextGenerator;
pub use model::{Model, PretrainedSource};

/// Something that can produce a model handle. Producing one is expected to be
/// slow and to have side effects (network, disk).
pub trait ModelSource {
    type Handle;

    fn fetch(&self) -> eyre::Result<Self::Handle>;
}

/// Loads a model at most once and hands out shared handles to it.
///
/// Construct one per process and pass it down. Concurrent first callers block
/// until the winning load finishes. A failed load is not remembered.
pub struct ModelLoader<S: ModelSource> {
    source: S,
    handle: OnceCell<Arc<S::Handle>>,
}

impl<S: ModelSource> ModelLoader<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            handle: OnceCell::new(),
        }
    }

    /// Takes a while the first time.
    pub fn load(&self) -> eyre::Result<Arc<S::Handle>> {
        self.handle
            .get_or_try_init(|| -> eyre::Result<_> {
                let start = Instant::now();

                let handle = self.source.fetch()?;

                tracing::info!(elapsed = ?start.elapsed(), "model ready");

                Ok(Arc::new(handle))
            })
            .cloned()
    }

    pub fn is_loaded(&self) -> bool {
        self.handle.get().is_some()
    }

    pub fn source(&self) -> &S {
        &self.source
    }
}
