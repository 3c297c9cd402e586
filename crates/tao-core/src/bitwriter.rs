//! 比特流写入器.
//!
//! 按大端位序 (MSB first) 写入, 与 `BitReader` 对应.
//! 解码核心本身不写码流, 这里主要用来构造测试和基准用的宏块语法.

/// 比特流写入器
///
/// # 示例
/// ```
/// use tao_core::bitwriter::BitWriter;
///
/// let mut bw = BitWriter::new();
/// bw.write_bits(0b1011, 4);
/// bw.write_ue(3);
/// let data = bw.finish();
/// assert_eq!(data, vec![0b1011_0010, 0b0000_0000]);
/// ```
#[derive(Debug, Default)]
pub struct BitWriter {
    /// 输出缓冲区
    data: Vec<u8>,
    /// 当前字节 (正在填充)
    current_byte: u8,
    /// 当前字节中已填充的位数 (0-7)
    bit_count: u8,
}

impl BitWriter {
    /// 创建新的比特流写入器
    pub fn new() -> Self {
        Self::default()
    }

    /// 以指定容量创建比特流写入器
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
            ..Self::default()
        }
    }

    /// 获取已写入的总位数
    pub fn bits_written(&self) -> usize {
        self.data.len() * 8 + self.bit_count as usize
    }

    /// 写入 1 个位
    pub fn write_bit(&mut self, bit: u32) {
        self.current_byte = (self.current_byte << 1) | (bit & 1) as u8;
        self.bit_count += 1;
        if self.bit_count == 8 {
            self.data.push(self.current_byte);
            self.current_byte = 0;
            self.bit_count = 0;
        }
    }

    /// 写入布尔标志
    pub fn write_flag(&mut self, flag: bool) {
        self.write_bit(u32::from(flag));
    }

    /// 写入 N 个位 (最多 32 位), 值的低 N 位高位在前
    pub fn write_bits(&mut self, value: u32, n: u32) {
        debug_assert!(n <= 32, "write_bits: n={} 超过 32 位", n);
        for i in (0..n).rev() {
            self.write_bit((value >> i) & 1);
        }
    }

    /// 写入有符号整数 (二进制补码)
    pub fn write_bits_signed(&mut self, value: i32, n: u32) {
        self.write_bits(value as u32, n);
    }

    /// 写入无符号 Exp-Golomb (ue(v))
    pub fn write_ue(&mut self, value: u32) {
        let code = u64::from(value) + 1;
        let len = 64 - code.leading_zeros();
        for _ in 1..len {
            self.write_bit(0);
        }
        for i in (0..len).rev() {
            self.write_bit(((code >> i) & 1) as u32);
        }
    }

    /// 写入有符号 Exp-Golomb (se(v))
    pub fn write_se(&mut self, value: i32) {
        let v = i64::from(value);
        let k = if v > 0 { 2 * v - 1 } else { -2 * v };
        self.write_ue(k as u32);
    }

    /// 对齐到字节边界 (用 0 填充)
    pub fn align_to_byte(&mut self) {
        while self.bit_count != 0 {
            self.write_bit(0);
        }
    }

    /// 写入完整字节
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        if self.bit_count == 0 {
            self.data.extend_from_slice(bytes);
        } else {
            for &b in bytes {
                self.write_bits(u32::from(b), 8);
            }
        }
    }

    /// 完成写入, 不在字节边界时用 0 填充
    pub fn finish(mut self) -> Vec<u8> {
        self.align_to_byte();
        self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitreader::BitReader;

    #[test]
    fn test_write_bits_basic() {
        let mut bw = BitWriter::new();
        bw.write_bits(0b1011, 4);
        bw.write_bits(0b0001, 4);
        assert_eq!(bw.finish(), vec![0b10110001]);
    }

    #[test]
    fn test_write_bits_32_bit() {
        let mut bw = BitWriter::new();
        bw.write_bits(0xFF00FF00, 32);
        assert_eq!(bw.finish(), vec![0xFF, 0x00, 0xFF, 0x00]);
    }

    #[test]
    fn test_finish_pads_partial_byte() {
        let mut bw = BitWriter::with_capacity(4);
        bw.write_bits(0b101, 3);
        assert_eq!(bw.bits_written(), 3);
        assert_eq!(bw.finish(), vec![0b1010_0000]);
    }

    #[test]
    fn test_golomb_against_reader() {
        let mut bw = BitWriter::new();
        let ue = [0u32, 1, 2, 7, 255, 65535];
        let se = [0i32, 1, -1, 17, -300];
        for &v in &ue {
            bw.write_ue(v);
        }
        for &v in &se {
            bw.write_se(v);
        }
        let data = bw.finish();
        let mut br = BitReader::new(&data);
        for &v in &ue {
            assert_eq!(br.read_ue().unwrap(), v, "ue 读写不一致");
        }
        for &v in &se {
            assert_eq!(br.read_se().unwrap(), v, "se 读写不一致");
        }
    }

    #[test]
    fn test_write_bytes_unaligned() {
        let mut bw = BitWriter::new();
        bw.write_bit(1);
        bw.write_bytes(&[0xFF]);
        assert_eq!(bw.finish(), vec![0xFF, 0x80]);
    }
}
