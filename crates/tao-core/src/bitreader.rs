//! 比特流读取器.
//!
//! 按大端位序 (MSB first) 从字节缓冲区中读取数据, 提供 H.264 熵解码所需的
//! 前瞻 (`show_bits`)、跳过与 Exp-Golomb 读取.

use crate::{TaoError, TaoResult};

/// Exp-Golomb 允许的最大前导零数
const MAX_GOLOMB_ZEROS: u32 = 31;

/// 比特流读取器
///
/// 读取位置以比特为单位记录, 前瞻超出数据末尾时按 0 补齐,
/// 真正消耗比特时才检查剩余长度.
///
/// # 示例
/// ```
/// use tao_core::bitreader::BitReader;
///
/// let data = [0b10110001, 0b01010101];
/// let mut br = BitReader::new(&data);
/// assert_eq!(br.read_bits(4).unwrap(), 0b1011);
/// assert_eq!(br.show_bits(4), 0b0001);
/// assert_eq!(br.read_bits(12).unwrap(), 0b0001_0101_0101);
/// ```
#[derive(Debug, Clone)]
pub struct BitReader<'a> {
    /// 源数据
    data: &'a [u8],
    /// 当前比特位置
    pos: usize,
    /// 有效比特总数
    end: usize,
}

impl<'a> BitReader<'a> {
    /// 创建新的比特流读取器
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            end: data.len() * 8,
        }
    }

    /// 创建只读取前 `bit_len` 位的读取器
    ///
    /// 用于截掉 RBSP 末尾的停止位与填充零, `bit_len` 超过数据长度时按数据长度截断.
    pub fn with_bit_len(data: &'a [u8], bit_len: usize) -> Self {
        Self {
            data,
            pos: 0,
            end: bit_len.min(data.len() * 8),
        }
    }

    /// 获取已读取的总位数
    pub fn bits_read(&self) -> usize {
        self.pos
    }

    /// 获取剩余可读位数
    pub fn bits_left(&self) -> usize {
        self.end.saturating_sub(self.pos)
    }

    /// 是否已到达末尾
    pub fn is_eof(&self) -> bool {
        self.bits_left() == 0
    }

    /// 以当前位置为起点的 64 位窗口, 高位对齐, 越界部分补 0
    fn window(&self) -> u64 {
        let byte = self.pos >> 3;
        let mut v = 0u64;
        for i in 0..8 {
            v = (v << 8) | u64::from(self.data.get(byte + i).copied().unwrap_or(0));
        }
        v << (self.pos & 7)
    }

    /// 前瞻 N 位 (最多 32 位), 不移动读取位置
    ///
    /// 超出数据末尾的部分按 0 处理, 用于 VLC 查表.
    pub fn show_bits(&self, n: u32) -> u32 {
        debug_assert!(n <= 32, "show_bits: n={} 超过 32 位", n);
        if n == 0 {
            return 0;
        }
        (self.window() >> (64 - n)) as u32
    }

    /// 前瞻 N 位, 剩余不足时返回错误
    pub fn peek_bits(&self, n: u32) -> TaoResult<u32> {
        if (n as usize) > self.bits_left() {
            return Err(TaoError::Eof);
        }
        Ok(self.show_bits(n))
    }

    /// 读取 1 个位
    pub fn read_bit(&mut self) -> TaoResult<u32> {
        self.read_bits(1)
    }

    /// 读取 1 个位并转换为布尔值
    pub fn read_flag(&mut self) -> TaoResult<bool> {
        Ok(self.read_bits(1)? != 0)
    }

    /// 读取 N 个位 (最多 32 位)
    pub fn read_bits(&mut self, n: u32) -> TaoResult<u32> {
        let v = self.peek_bits(n)?;
        self.pos += n as usize;
        Ok(v)
    }

    /// 读取 N 位有符号整数 (二进制补码)
    pub fn read_bits_signed(&mut self, n: u32) -> TaoResult<i32> {
        if n == 0 {
            return Ok(0);
        }
        let v = self.read_bits(n)?;
        let shift = 32 - n;
        Ok(((v << shift) as i32) >> shift)
    }

    /// 跳过 N 个位
    pub fn skip_bits(&mut self, n: u32) -> TaoResult<()> {
        if (n as usize) > self.bits_left() {
            return Err(TaoError::Eof);
        }
        self.pos += n as usize;
        Ok(())
    }

    /// 当前是否位于字节边界
    pub fn is_aligned(&self) -> bool {
        self.pos & 7 == 0
    }

    /// 对齐到下一个字节边界
    pub fn align_to_byte(&mut self) {
        self.pos = (self.pos + 7) & !7;
    }

    /// 当前字节位置 (向下取整)
    pub fn byte_position(&self) -> usize {
        self.pos >> 3
    }

    /// 统计从当前位置开始的前导零个数并消耗它们以及随后的 1
    ///
    /// 前导零超过 `limit` 时返回无效数据错误.
    pub fn read_leading_zeros(&mut self, limit: u32) -> TaoResult<u32> {
        let mut zeros = 0u32;
        while self.read_bit()? == 0 {
            zeros += 1;
            if zeros > limit {
                return Err(TaoError::InvalidData(format!(
                    "前导零过多: {}",
                    zeros
                )));
            }
        }
        Ok(zeros)
    }

    /// 读取无符号 Exp-Golomb (ue(v))
    pub fn read_ue(&mut self) -> TaoResult<u32> {
        let zeros = self
            .read_leading_zeros(MAX_GOLOMB_ZEROS)
            .map_err(|e| match e {
                TaoError::InvalidData(_) => {
                    TaoError::InvalidData("Exp-Golomb 前导零过多".into())
                }
                other => other,
            })?;
        if zeros == 0 {
            return Ok(0);
        }
        let suffix = self.read_bits(zeros)?;
        Ok(((1u64 << zeros) - 1 + u64::from(suffix)) as u32)
    }

    /// 读取有符号 Exp-Golomb (se(v))
    pub fn read_se(&mut self) -> TaoResult<i32> {
        let k = i64::from(self.read_ue()?);
        let v = if k & 1 == 1 { (k + 1) / 2 } else { -(k / 2) };
        Ok(v as i32)
    }

    /// 从当前 (已对齐) 位置读取 N 个字节
    pub fn read_bytes(&mut self, n: usize) -> TaoResult<&'a [u8]> {
        if !self.is_aligned() {
            return Err(TaoError::InvalidData("read_bytes: 未对齐到字节边界".into()));
        }
        let start = self.pos >> 3;
        let end = start.checked_add(n).ok_or(TaoError::Eof)?;
        if end * 8 > self.end {
            return Err(TaoError::Eof);
        }
        self.pos = end * 8;
        Ok(&self.data[start..end])
    }

    /// 获取源数据
    pub fn data(&self) -> &'a [u8] {
        self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_bits_basic() {
        let data = [0b10110001, 0b01010101];
        let mut br = BitReader::new(&data);
        assert_eq!(br.read_bits(4).unwrap(), 0b1011);
        assert_eq!(br.read_bits(4).unwrap(), 0b0001);
        assert_eq!(br.read_bits(8).unwrap(), 0b01010101);
        assert!(br.is_eof());
    }

    #[test]
    fn test_read_bits_32_bit() {
        let data = [0xDE, 0xAD, 0xBE, 0xEF, 0x12];
        let mut br = BitReader::new(&data);
        br.skip_bits(4).unwrap();
        assert_eq!(br.read_bits(32).unwrap(), 0xEADB_EEF1);
        assert_eq!(br.bits_left(), 4);
    }

    #[test]
    fn test_show_bits_zero_pad() {
        let data = [0b1100_0000];
        let mut br = BitReader::new(&data);
        br.skip_bits(1).unwrap();
        assert_eq!(br.show_bits(16), 0b1000_0000_0000_0000, "越界部分应补 0");
        assert_eq!(br.bits_read(), 1, "show_bits 不应移动位置");
        assert!(br.peek_bits(8).is_err(), "剩余不足时 peek_bits 应报错");
    }

    #[test]
    fn test_read_past_end() {
        let data = [0xFF];
        let mut br = BitReader::new(&data);
        assert!(br.read_bits(9).is_err());
        assert_eq!(br.bits_read(), 0, "失败的读取不应消耗比特");
        assert_eq!(br.read_bits(8).unwrap(), 0xFF);
        assert!(matches!(br.read_bit(), Err(TaoError::Eof)));
    }

    #[test]
    fn test_bit_len_limit() {
        let data = [0xFF, 0x80];
        let mut br = BitReader::with_bit_len(&data, 9);
        assert_eq!(br.bits_left(), 9);
        assert_eq!(br.read_bits(9).unwrap(), 0x1FF);
        assert!(br.is_eof(), "截断后应到达末尾");
        assert!(br.read_bit().is_err());
        let br = BitReader::with_bit_len(&data, 100);
        assert_eq!(br.bits_left(), 16, "超长时按数据长度截断");
    }

    #[test]
    fn test_read_ue_se() {
        // 1 | 010 | 011 | 00100 | 00101 -> ue 0,1,2,3,4
        let data = [0b1010_0110, 0b0100_0010, 0b1000_0000];
        let mut br = BitReader::new(&data);
        for expect in 0..5u32 {
            assert_eq!(br.read_ue().unwrap(), expect);
        }
        let mut br = BitReader::new(&data);
        let se: Vec<i32> = (0..5).map(|_| br.read_se().unwrap()).collect();
        assert_eq!(se, vec![0, 1, -1, 2, -2]);
    }

    #[test]
    fn test_read_ue_too_many_zeros() {
        let data = [0u8; 8];
        let mut br = BitReader::new(&data);
        assert!(matches!(br.read_ue(), Err(TaoError::InvalidData(_))));
    }

    #[test]
    fn test_read_bits_signed() {
        let data = [0b1110_0000];
        let mut br = BitReader::new(&data);
        assert_eq!(br.read_bits_signed(3).unwrap(), -1);
    }

    #[test]
    fn test_align_and_read_bytes() {
        let data = [0xA0, 0x12, 0x34];
        let mut br = BitReader::new(&data);
        br.read_bits(3).unwrap();
        assert!(br.read_bytes(1).is_err());
        br.align_to_byte();
        assert_eq!(br.byte_position(), 1);
        assert_eq!(br.read_bytes(2).unwrap(), &[0x12, 0x34]);
        assert!(br.is_eof());
    }
}
