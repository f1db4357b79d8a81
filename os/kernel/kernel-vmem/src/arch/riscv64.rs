//! RISC-V (Sv48) placeholder backend.

use super::{StubArch, StubPaging};

#[derive(Copy, Clone, Debug)]
pub struct Riscv64;

impl StubArch for Riscv64 {
    const NAME: &'static str = "riscv64";
}

pub type Riscv64Paging<M> = StubPaging<M, Riscv64>;
