//! `AArch64` (4 KiB granule) placeholder backend.

use super::{StubArch, StubPaging};

#[derive(Copy, Clone, Debug)]
pub struct Aarch64;

impl StubArch for Aarch64 {
    const NAME: &'static str = "aarch64";
}

pub type Aarch64Paging<M> = StubPaging<M, Aarch64>;
