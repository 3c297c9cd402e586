//! H.264 宏块层常量表: 缓存索引, 扫描顺序, CBP 映射, 反量化初始值.

// ============================================================================
// 邻域缓存索引
// ============================================================================

/// 亮度 DC 块在 `SCAN8` 中的索引
pub const LUMA_DC_BLOCK_INDEX: usize = 48;
/// 色度 DC 块在 `SCAN8` 中的起始索引 (Cb, Cr 依次)
pub const CHROMA_DC_BLOCK_INDEX: usize = 49;

/// 4x4 块编号到邻域缓存槽位的映射 (行宽 8)
///
/// 0..16 为亮度块 (按 8x8 象限排列), 16..32 为 Cb, 32..48 为 Cr,
/// 48 为亮度 DC, 49/50 为色度 DC. 同一行左邻为 -1, 上邻为 -8.
#[rustfmt::skip]
pub const SCAN8: [usize; 51] = [
    4 + 1 * 8, 5 + 1 * 8, 4 + 2 * 8, 5 + 2 * 8,
    6 + 1 * 8, 7 + 1 * 8, 6 + 2 * 8, 7 + 2 * 8,
    4 + 3 * 8, 5 + 3 * 8, 4 + 4 * 8, 5 + 4 * 8,
    6 + 3 * 8, 7 + 3 * 8, 6 + 4 * 8, 7 + 4 * 8,
    4 + 6 * 8, 5 + 6 * 8, 4 + 7 * 8, 5 + 7 * 8,
    6 + 6 * 8, 7 + 6 * 8, 6 + 7 * 8, 7 + 7 * 8,
    4 + 8 * 8, 5 + 8 * 8, 4 + 9 * 8, 5 + 9 * 8,
    6 + 8 * 8, 7 + 8 * 8, 6 + 9 * 8, 7 + 9 * 8,
    4 + 11 * 8, 5 + 11 * 8, 4 + 12 * 8, 5 + 12 * 8,
    6 + 11 * 8, 7 + 11 * 8, 6 + 12 * 8, 7 + 12 * 8,
    4 + 13 * 8, 5 + 13 * 8, 4 + 14 * 8, 5 + 14 * 8,
    6 + 13 * 8, 7 + 13 * 8, 6 + 14 * 8, 7 + 14 * 8,
    0, 5 * 8, 10 * 8,
];

/// 亮度 4x4 块在宏块内的像素坐标 (x, y)
pub const fn luma_block_pos(n: usize) -> (usize, usize) {
    (
        (n & 1) * 4 + ((n >> 2) & 1) * 8,
        ((n >> 1) & 1) * 4 + (n >> 3) * 8,
    )
}

/// 色度 4x4 块 (分量内序号 0..8) 在色度宏块内的像素坐标 (x, y)
pub const fn chroma_block_pos(k: usize) -> (usize, usize) {
    ((k & 1) * 4, (k >> 1) * 4)
}

/// 光栅顺序 (4x4 网格) 到亮度块编号
#[rustfmt::skip]
pub const RASTER_TO_LUMA_BLOCK: [usize; 16] = [
    0, 1, 4, 5,
    2, 3, 6, 7,
    8, 9, 12, 13,
    10, 11, 14, 15,
];

// ============================================================================
// 扫描顺序
// ============================================================================

/// 4x4 帧扫描 (Zigzag), 值为光栅位置 x + 4y
#[rustfmt::skip]
pub const ZIGZAG_SCAN: [u8; 16] = [
    0, 1, 4, 8, 5, 2, 3, 6, 9, 12, 13, 10, 7, 11, 14, 15,
];

/// 8x8 帧扫描 (Zigzag), 值为光栅位置 x + 8y
#[rustfmt::skip]
pub const ZIGZAG_SCAN_8X8: [u8; 64] = [
     0,  1,  8, 16,  9,  2,  3, 10,
    17, 24, 32, 25, 18, 11,  4,  5,
    12, 19, 26, 33, 40, 48, 41, 34,
    27, 20, 13,  6,  7, 14, 21, 28,
    35, 42, 49, 56, 57, 50, 43, 36,
    29, 22, 15, 23, 30, 37, 44, 51,
    58, 59, 52, 45, 38, 31, 39, 46,
    53, 60, 61, 54, 47, 55, 62, 63,
];

/// CAVLC 8x8 变换的交织扫描: 第 i 个 4x4 片段取 8x8 扫描的 4k+i 位置
pub const ZIGZAG_SCAN_8X8_CAVLC: [u8; 64] = {
    let mut out = [0u8; 64];
    let mut i = 0;
    while i < 4 {
        let mut k = 0;
        while k < 16 {
            out[i * 16 + k] = ZIGZAG_SCAN_8X8[4 * k + i];
            k += 1;
        }
        i += 1;
    }
    out
};

/// 4:2:0 色度 DC 扫描, 值为系数缓冲区内的偏移 (块号 * 16)
pub const CHROMA_DC_SCAN: [u8; 4] = [0, 16, 32, 48];

/// 4:2:2 色度 DC 扫描 (2 列 x 4 行)
pub const CHROMA422_DC_SCAN: [u8; 8] = [0, 32, 16, 64, 96, 48, 80, 112];

// ============================================================================
// CBP 映射
// ============================================================================

/// Intra4x4 宏块的 Golomb 码到 CBP
#[rustfmt::skip]
pub const GOLOMB_TO_INTRA4X4_CBP: [u8; 48] = [
    47, 31, 15, 0, 23, 27, 29, 30, 7, 11, 13, 14, 39, 43, 45, 46,
    16, 3, 5, 10, 12, 19, 21, 26, 28, 35, 37, 42, 44, 1, 2, 4,
    8, 17, 18, 20, 24, 6, 9, 22, 25, 32, 33, 34, 36, 40, 38, 41,
];

/// 帧间宏块的 Golomb 码到 CBP
#[rustfmt::skip]
pub const GOLOMB_TO_INTER_CBP: [u8; 48] = [
    0, 16, 1, 2, 4, 8, 32, 3, 5, 10, 12, 15, 47, 7, 11, 13,
    14, 6, 9, 31, 35, 37, 42, 44, 33, 34, 36, 40, 39, 43, 45, 46,
    17, 18, 20, 24, 19, 21, 26, 28, 23, 27, 29, 30, 22, 25, 38, 41,
];

/// 单色 (4:0:0) Intra4x4 CBP 映射
#[rustfmt::skip]
pub const GOLOMB_TO_INTRA4X4_CBP_GRAY: [u8; 16] = [
    15, 0, 7, 11, 13, 14, 3, 5, 10, 12, 1, 2, 4, 8, 6, 9,
];

/// 单色 (4:0:0) 帧间 CBP 映射
#[rustfmt::skip]
pub const GOLOMB_TO_INTER_CBP_GRAY: [u8; 16] = [
    0, 1, 2, 4, 8, 3, 5, 10, 12, 15, 7, 11, 13, 14, 6, 9,
];

// ============================================================================
// 反量化与量化参数
// ============================================================================

/// 4x4 反量化初始值 [qp % 6][位置类别]
#[rustfmt::skip]
pub const DEQUANT4_COEFF_INIT: [[u32; 3]; 6] = [
    [10, 13, 16],
    [11, 14, 18],
    [13, 16, 20],
    [14, 18, 23],
    [16, 20, 25],
    [18, 23, 29],
];

/// 8x8 位置类别 (按 4x4 周期)
#[rustfmt::skip]
pub const DEQUANT8_COEFF_INIT_SCAN: [usize; 16] = [
    0, 3, 4, 3, 3, 1, 5, 1, 4, 5, 2, 5, 3, 1, 5, 1,
];

/// 8x8 反量化初始值 [qp % 6][位置类别]
#[rustfmt::skip]
pub const DEQUANT8_COEFF_INIT: [[u32; 6]; 6] = [
    [20, 18, 32, 19, 25, 24],
    [22, 19, 35, 21, 28, 26],
    [26, 23, 42, 24, 33, 31],
    [28, 25, 45, 26, 35, 33],
    [32, 28, 51, 30, 40, 38],
    [36, 32, 58, 34, 46, 43],
];

/// 8 bit 下亮度 QP 到色度 QP 映射
#[rustfmt::skip]
const CHROMA_QP_TABLE: [u8; 52] = [
    0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19,
    20, 21, 22, 23, 24, 25, 26, 27, 28, 29, 29, 30, 31, 32, 32, 33, 34, 34,
    35, 35, 36, 36, 37, 37, 37, 38, 38, 38, 39, 39, 39, 39,
];

/// 由亮度 QP 和色度偏移计算色度 QP
///
/// `qp_bd_offset = 6 * (bit_depth - 8)`, 结果范围 `[0, 51 + qp_bd_offset]`.
pub fn chroma_qp(qscale: i32, offset: i32, qp_bd_offset: i32) -> i32 {
    let max_qp = 51 + qp_bd_offset;
    let q = (qscale + offset).clamp(0, max_qp);
    if q < qp_bd_offset {
        q
    } else {
        i32::from(CHROMA_QP_TABLE[(q - qp_bd_offset) as usize]) + qp_bd_offset
    }
}
