//! CAVLC 变长码表.
//!
//! 码表以 (码长, 码字) 形式给出, 首次使用时展开为按前瞻比特直接索引的快速查找表,
//! 之后在所有线程间只读共享.

use std::sync::OnceLock;

use tao_core::BitReader;

use crate::bitstream::SyntaxReader;
use crate::error::{H264Error, H264Result};

// ============================================================================
// 码表定义
// ============================================================================

/// coeff_token 码长, 下标为 `4 * total_coeff + trailing_ones`
#[rustfmt::skip]
const COEFF_TOKEN_LEN: [[u8; 4 * 17]; 4] = [
    [
         1, 0, 0, 0,
         6, 2, 0, 0,     8, 6, 3, 0,     9, 8, 7, 5,    10, 9, 8, 6,
        11,10, 9, 7,    13,11,10, 8,    13,13,11, 9,    13,13,13,10,
        14,14,13,11,    14,14,14,13,    15,15,14,14,    15,15,15,14,
        16,15,15,15,    16,16,16,15,    16,16,16,16,    16,16,16,16,
    ],
    [
         2, 0, 0, 0,
         6, 2, 0, 0,     6, 5, 3, 0,     7, 6, 6, 4,     8, 6, 6, 4,
         8, 7, 7, 5,     9, 8, 8, 6,    11, 9, 9, 6,    11,11,11, 7,
        12,11,11, 9,    12,12,12,11,    12,12,12,11,    13,13,13,12,
        13,13,13,13,    13,14,13,13,    14,14,14,13,    14,14,14,14,
    ],
    [
         4, 0, 0, 0,
         6, 4, 0, 0,     6, 5, 4, 0,     6, 5, 5, 4,     7, 5, 5, 4,
         7, 5, 5, 4,     7, 6, 6, 4,     7, 6, 6, 4,     8, 7, 7, 5,
         8, 8, 7, 6,     9, 8, 8, 7,     9, 9, 8, 8,     9, 9, 9, 8,
        10, 9, 9, 9,    10,10,10,10,    10,10,10,10,    10,10,10,10,
    ],
    [
         6, 0, 0, 0,
         6, 6, 0, 0,     6, 6, 6, 0,     6, 6, 6, 6,     6, 6, 6, 6,
         6, 6, 6, 6,     6, 6, 6, 6,     6, 6, 6, 6,     6, 6, 6, 6,
         6, 6, 6, 6,     6, 6, 6, 6,     6, 6, 6, 6,     6, 6, 6, 6,
         6, 6, 6, 6,     6, 6, 6, 6,     6, 6, 6, 6,     6, 6, 6, 6,
    ],
];

/// coeff_token 码字
#[rustfmt::skip]
const COEFF_TOKEN_BITS: [[u8; 4 * 17]; 4] = [
    [
         1, 0, 0, 0,
         5, 1, 0, 0,     7, 4, 1, 0,     7, 6, 5, 3,     7, 6, 5, 3,
         7, 6, 5, 4,    15, 6, 5, 4,    11,14, 5, 4,     8,10,13, 4,
        15,14, 9, 4,    11,10,13,12,    15,14, 9,12,    11,10,13, 8,
        15, 1, 9,12,    11,14,13, 8,     7,10, 9,12,     4, 6, 5, 8,
    ],
    [
         3, 0, 0, 0,
        11, 2, 0, 0,     7, 7, 3, 0,     7,10, 9, 5,     7, 6, 5, 4,
         4, 6, 5, 6,     7, 6, 5, 8,    15, 6, 5, 4,    11,14,13, 4,
        15,10, 9, 4,    11,14,13,12,     8,10, 9, 8,    15,14,13,12,
        11,10, 9,12,     7,11, 6, 8,     9, 8,10, 1,     7, 6, 5, 4,
    ],
    [
        15, 0, 0, 0,
        15,14, 0, 0,    11,15,13, 0,     8,12,14,12,    15,10,11,11,
        11, 8, 9,10,     9,14,13, 9,     8,10, 9, 8,    15,14,13,13,
        11,14,10,12,    15,10,13,12,    11,14, 9,12,     8,10,13, 8,
        13, 7, 9,12,     9,12,11,10,     5, 8, 7, 6,     1, 4, 3, 2,
    ],
    [
         3, 0, 0, 0,
         0, 1, 0, 0,     4, 5, 6, 0,     8, 9,10,11,    12,13,14,15,
        16,17,18,19,    20,21,22,23,    24,25,26,27,    28,29,30,31,
        32,33,34,35,    36,37,38,39,    40,41,42,43,    44,45,46,47,
        48,49,50,51,    52,53,54,55,    56,57,58,59,    60,61,62,63,
    ],
];

/// 4:2:0 色度 DC coeff_token
#[rustfmt::skip]
const CHROMA_DC_COEFF_TOKEN_LEN: [u8; 4 * 5] = [
    2, 0, 0, 0,
    6, 1, 0, 0,
    6, 6, 3, 0,
    6, 7, 7, 6,
    6, 8, 8, 7,
];

#[rustfmt::skip]
const CHROMA_DC_COEFF_TOKEN_BITS: [u8; 4 * 5] = [
    1, 0, 0, 0,
    7, 1, 0, 0,
    4, 6, 1, 0,
    3, 3, 2, 5,
    2, 3, 2, 0,
];

/// 4:2:2 色度 DC coeff_token
#[rustfmt::skip]
const CHROMA422_DC_COEFF_TOKEN_LEN: [u8; 4 * 9] = [
     1,  0,  0,  0,
     7,  2,  0,  0,
     7,  7,  3,  0,
     9,  7,  7,  5,
     9,  9,  7,  6,
    10, 10,  9,  7,
    11, 11, 10,  7,
    12, 12, 11, 10,
    13, 12, 12, 11,
];

#[rustfmt::skip]
const CHROMA422_DC_COEFF_TOKEN_BITS: [u8; 4 * 9] = [
     1,  0,  0, 0,
    15,  1,  0, 0,
    14, 13,  1, 0,
     7, 12, 11, 1,
     6,  5, 10, 1,
     7,  6,  4, 9,
     7,  6,  5, 8,
     7,  6,  5, 4,
     7,  5,  4, 4,
];

/// 亮度 total_zeros, 第 i 行对应 total_coeff = i + 1
#[rustfmt::skip]
const TOTAL_ZEROS_LEN: [&[u8]; 15] = [
    &[1, 3, 3, 4, 4, 5, 5, 6, 6, 7, 7, 8, 8, 9, 9, 9],
    &[3, 3, 3, 3, 3, 4, 4, 4, 4, 5, 5, 6, 6, 6, 6],
    &[4, 3, 3, 3, 4, 4, 3, 3, 4, 5, 5, 6, 5, 6],
    &[5, 3, 4, 4, 3, 3, 3, 4, 3, 4, 5, 5, 5],
    &[4, 4, 4, 3, 3, 3, 3, 3, 4, 5, 4, 5],
    &[6, 5, 3, 3, 3, 3, 3, 3, 4, 3, 6],
    &[6, 5, 3, 3, 3, 2, 3, 4, 3, 6],
    &[6, 4, 5, 3, 2, 2, 3, 3, 6],
    &[6, 6, 4, 2, 2, 3, 2, 5],
    &[5, 5, 3, 2, 2, 2, 4],
    &[4, 4, 3, 3, 1, 3],
    &[4, 4, 2, 1, 3],
    &[3, 3, 1, 2],
    &[2, 2, 1],
    &[1, 1],
];

#[rustfmt::skip]
const TOTAL_ZEROS_BITS: [&[u8]; 15] = [
    &[1, 3, 2, 3, 2, 3, 2, 3, 2, 3, 2, 3, 2, 3, 2, 1],
    &[7, 6, 5, 4, 3, 5, 4, 3, 2, 3, 2, 3, 2, 1, 0],
    &[5, 7, 6, 5, 4, 3, 4, 3, 2, 3, 2, 1, 1, 0],
    &[3, 7, 5, 4, 6, 5, 4, 3, 3, 2, 2, 1, 0],
    &[5, 4, 3, 7, 6, 5, 4, 3, 2, 1, 1, 0],
    &[1, 1, 7, 6, 5, 4, 3, 2, 1, 1, 0],
    &[1, 1, 5, 4, 3, 3, 2, 1, 1, 0],
    &[1, 1, 1, 3, 3, 2, 2, 1, 0],
    &[1, 0, 1, 3, 2, 1, 1, 1],
    &[1, 0, 1, 3, 2, 1, 1],
    &[0, 1, 1, 2, 1, 3],
    &[0, 1, 1, 1, 1],
    &[0, 1, 1, 1],
    &[0, 1, 1],
    &[0, 1],
];

/// 4:2:0 色度 DC total_zeros
#[rustfmt::skip]
const CHROMA_DC_TOTAL_ZEROS_LEN: [&[u8]; 3] = [
    &[1, 2, 3, 3],
    &[1, 2, 2],
    &[1, 1],
];

#[rustfmt::skip]
const CHROMA_DC_TOTAL_ZEROS_BITS: [&[u8]; 3] = [
    &[1, 1, 1, 0],
    &[1, 1, 0],
    &[1, 0],
];

/// 4:2:2 色度 DC total_zeros
#[rustfmt::skip]
const CHROMA422_DC_TOTAL_ZEROS_LEN: [&[u8]; 7] = [
    &[1, 3, 3, 4, 4, 4, 5, 5],
    &[3, 2, 3, 3, 3, 3, 3],
    &[3, 3, 2, 2, 3, 3],
    &[3, 2, 2, 2, 3],
    &[2, 2, 2, 2],
    &[2, 2, 1],
    &[1, 1],
];

#[rustfmt::skip]
const CHROMA422_DC_TOTAL_ZEROS_BITS: [&[u8]; 7] = [
    &[1, 2, 3, 2, 3, 1, 1, 0],
    &[0, 1, 1, 4, 5, 6, 7],
    &[0, 1, 1, 2, 6, 7],
    &[6, 0, 1, 2, 7],
    &[0, 1, 2, 3],
    &[0, 1, 1],
    &[0, 1],
];

/// run_before, 第 i 行对应 zeros_left = i + 1, 最后一行用于 zeros_left >= 7
#[rustfmt::skip]
const RUN_LEN: [&[u8]; 7] = [
    &[1, 1],
    &[1, 2, 2],
    &[2, 2, 2, 2],
    &[2, 2, 2, 3, 3],
    &[2, 2, 3, 3, 3, 3],
    &[2, 3, 3, 3, 3, 3, 3],
    &[3, 3, 3, 3, 3, 3, 3, 4, 5, 6, 7, 8, 9, 10, 11],
];

#[rustfmt::skip]
const RUN_BITS: [&[u8]; 7] = [
    &[1, 0],
    &[1, 1, 0],
    &[3, 2, 1, 0],
    &[3, 2, 1, 1, 0],
    &[3, 2, 3, 2, 1, 0],
    &[3, 0, 1, 3, 2, 5, 4],
    &[7, 6, 5, 4, 3, 2, 1, 1, 1, 1, 1, 1, 1, 1, 1],
];

// ============================================================================
// 快速查找表
// ============================================================================

/// 查找表条目, `len == 0` 表示非法码字
#[derive(Debug, Clone, Copy, Default)]
struct VlcEntry {
    sym: u8,
    len: u8,
}

/// 单级直接索引 VLC 表, 前瞻位宽等于最长码长
#[derive(Debug)]
pub(crate) struct Vlc {
    bits: u32,
    table: Vec<VlcEntry>,
}

impl Vlc {
    /// 由 (码长, 码字) 数组构建, 符号为数组下标, 码长 0 的条目跳过
    fn build(lens: &[u8], codes: &[u8]) -> Self {
        let bits = u32::from(lens.iter().copied().max().unwrap_or(0));
        let mut table = vec![VlcEntry::default(); 1usize << bits];
        for (sym, (&len, &code)) in lens.iter().zip(codes).enumerate() {
            if len == 0 {
                continue;
            }
            let padding = bits - u32::from(len);
            let base = (code as usize) << padding;
            for extra in 0..(1usize << padding) {
                table[base | extra] = VlcEntry {
                    sym: sym as u8,
                    len,
                };
            }
        }
        Self { bits, table }
    }

    /// 解码一个符号
    pub(crate) fn decode(&self, br: &mut BitReader) -> H264Result<u8> {
        let idx = br.show_bits(self.bits) as usize;
        let entry = self.table[idx];
        if entry.len == 0 {
            return Err(H264Error::corrupted("vlc_code", idx as i64));
        }
        br.skip(u32::from(entry.len))?;
        Ok(entry.sym)
    }
}

/// level 前瞻位宽
pub(crate) const LEVEL_TAB_BITS: u32 = 8;

/// level 查找表条目
///
/// `code < 100` 时为已折叠符号的 level 值, 否则为转义前缀 `code - 100`.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct LevelEntry {
    pub code: i16,
    pub len: u8,
}

/// 全部 CAVLC 码表
#[derive(Debug)]
pub(crate) struct CavlcTables {
    /// 按预测 nC 选择的 4 张 coeff_token 表, 符号为 `4 * total_coeff + trailing_ones`
    pub coeff_token: [Vlc; 4],
    pub chroma_dc_coeff_token: Vlc,
    pub chroma422_dc_coeff_token: Vlc,
    /// 下标为 total_coeff - 1
    pub total_zeros: Vec<Vlc>,
    pub chroma_dc_total_zeros: Vec<Vlc>,
    pub chroma422_dc_total_zeros: Vec<Vlc>,
    /// 下标为 zeros_left - 1, zeros_left >= 7 使用 `run7`
    pub run: Vec<Vlc>,
    pub run7: Vlc,
    /// [suffix_length][8 位前瞻]
    pub level: Vec<[LevelEntry; 1 << LEVEL_TAB_BITS]>,
}

fn floor_log2(v: u32) -> u32 {
    if v == 0 { 0 } else { 31 - v.leading_zeros() }
}

/// 构建 (suffix_length, 8 位前瞻) 到 level 的查找表
fn build_level_table() -> Vec<[LevelEntry; 1 << LEVEL_TAB_BITS]> {
    let mut out = vec![[LevelEntry::default(); 1 << LEVEL_TAB_BITS]; 7];
    for (suffix_length, row) in out.iter_mut().enumerate() {
        let sl = suffix_length as u32;
        for (i, entry) in row.iter_mut().enumerate() {
            let i = i as u32;
            let prefix = LEVEL_TAB_BITS - floor_log2(2 * i);
            *entry = if prefix + 1 + sl <= LEVEL_TAB_BITS {
                let suffix = (i >> (floor_log2(i) - sl)) - (1 << sl);
                let level_code = ((prefix << sl) + suffix) as i32;
                LevelEntry {
                    code: fold_level_sign(level_code) as i16,
                    len: (prefix + 1 + sl) as u8,
                }
            } else if prefix < LEVEL_TAB_BITS {
                LevelEntry {
                    code: (100 + prefix) as i16,
                    len: (prefix + 1) as u8,
                }
            } else {
                LevelEntry {
                    code: (100 + LEVEL_TAB_BITS) as i16,
                    len: LEVEL_TAB_BITS as u8,
                }
            };
        }
    }
    out
}

/// levelCode 到有符号 level: 偶数为正, 奇数为负
#[inline]
pub(crate) fn fold_level_sign(level_code: i32) -> i32 {
    let mask = -(level_code & 1);
    (((2 + level_code) >> 1) ^ mask) - mask
}

fn build_tables() -> CavlcTables {
    CavlcTables {
        coeff_token: std::array::from_fn(|i| Vlc::build(&COEFF_TOKEN_LEN[i], &COEFF_TOKEN_BITS[i])),
        chroma_dc_coeff_token: Vlc::build(&CHROMA_DC_COEFF_TOKEN_LEN, &CHROMA_DC_COEFF_TOKEN_BITS),
        chroma422_dc_coeff_token: Vlc::build(
            &CHROMA422_DC_COEFF_TOKEN_LEN,
            &CHROMA422_DC_COEFF_TOKEN_BITS,
        ),
        total_zeros: TOTAL_ZEROS_LEN
            .iter()
            .zip(TOTAL_ZEROS_BITS.iter())
            .map(|(l, b)| Vlc::build(l, b))
            .collect(),
        chroma_dc_total_zeros: CHROMA_DC_TOTAL_ZEROS_LEN
            .iter()
            .zip(CHROMA_DC_TOTAL_ZEROS_BITS.iter())
            .map(|(l, b)| Vlc::build(l, b))
            .collect(),
        chroma422_dc_total_zeros: CHROMA422_DC_TOTAL_ZEROS_LEN
            .iter()
            .zip(CHROMA422_DC_TOTAL_ZEROS_BITS.iter())
            .map(|(l, b)| Vlc::build(l, b))
            .collect(),
        run: RUN_LEN[..6]
            .iter()
            .zip(RUN_BITS[..6].iter())
            .map(|(l, b)| Vlc::build(l, b))
            .collect(),
        run7: Vlc::build(RUN_LEN[6], RUN_BITS[6]),
        level: build_level_table(),
    }
}

/// 全局 CAVLC 码表 (延迟初始化)
static CAVLC_TABLES: OnceLock<CavlcTables> = OnceLock::new();

/// 获取 CAVLC 码表, 首次调用时构建
pub(crate) fn cavlc_tables() -> &'static CavlcTables {
    CAVLC_TABLES.get_or_init(build_tables)
}
