/// Failures reported by a [`PagingBackend`](crate::PagingBackend).
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum PagingError {
    #[error("out of physical memory while allocating a {level} table")]
    OutOfMemory { level: &'static str },
    #[error("paging is not implemented on {arch}")]
    Unsupported { arch: &'static str },
}
