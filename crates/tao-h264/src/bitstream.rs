//! 码流读取适配.
//!
//! 把 `tao_core::BitReader` 的通用错误映射为宏块解码错误.

use tao_core::{BitReader, TaoError};

use crate::error::{H264Error, H264Result};

fn map_err(e: TaoError, needed: usize, available: usize) -> H264Error {
    match e {
        TaoError::InvalidData(_) => H264Error::corrupted("exp_golomb", -1),
        _ => H264Error::InsufficientBits { needed, available },
    }
}

/// 宏块语法读取接口
pub(crate) trait SyntaxReader {
    fn bits(&mut self, n: u32) -> H264Result<u32>;
    fn bit(&mut self) -> H264Result<u32>;
    fn skip(&mut self, n: u32) -> H264Result<()>;
    fn ue(&mut self) -> H264Result<u32>;
    fn se(&mut self) -> H264Result<i32>;
}

impl SyntaxReader for BitReader<'_> {
    fn bits(&mut self, n: u32) -> H264Result<u32> {
        let left = self.bits_left();
        self.read_bits(n).map_err(|e| map_err(e, n as usize, left))
    }

    fn bit(&mut self) -> H264Result<u32> {
        self.bits(1)
    }

    fn skip(&mut self, n: u32) -> H264Result<()> {
        let left = self.bits_left();
        self.skip_bits(n).map_err(|e| map_err(e, n as usize, left))
    }

    fn ue(&mut self) -> H264Result<u32> {
        let left = self.bits_left();
        self.read_ue().map_err(|e| map_err(e, 1, left))
    }

    fn se(&mut self) -> H264Result<i32> {
        let left = self.bits_left();
        self.read_se().map_err(|e| map_err(e, 1, left))
    }
}
