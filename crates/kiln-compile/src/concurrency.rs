use std::num::NonZeroUsize;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Concurrency {
    pub workers: NonZeroUsize,
}

impl Default for Concurrency {
    fn default() -> Self {
        Self {
            workers: Self::default_workers(),
        }
    }
}

impl Concurrency {
    pub fn new(workers: Option<NonZeroUsize>) -> Self {
        workers.map_or_else(Self::default, |workers| Self { workers })
    }

    /// The default number of compile workers, one per CPU.
    pub fn default_workers() -> NonZeroUsize {
        std::thread::available_parallelism().unwrap_or(NonZeroUsize::MIN)
    }
}
