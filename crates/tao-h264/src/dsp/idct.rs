//! 整数反变换与残差叠加.
//!
//! 系数块均为光栅序 (`x + 4y` / `x + 8y`), 先行变换后列变换.
//! 结果叠加到平面上并裁剪到 `[0, max]`, 叠加完成后系数块清零.
//! 中间量按补码环绕运算, 异常码流只会产生错误像素而不会溢出崩溃.

use crate::picture::Plane;
use crate::sample::{Sample, clip_pixel};

#[inline]
fn add_sample<T: Sample>(dst: &mut Plane<T>, x: usize, y: usize, v: i32, max: i32) {
    let cur = dst.at(x, y).to_i32();
    dst.set(x, y, T::from_i32(clip_pixel(cur.wrapping_add(v), max)));
}

// ============================================================
// 4x4
// ============================================================

/// 4x4 反变换并叠加到 `(x0, y0)`
pub fn idct4_add<T: Sample>(dst: &mut Plane<T>, x0: usize, y0: usize, block: &mut [i32], max: i32) {
    block[0] = block[0].wrapping_add(1 << 5);

    // 行变换
    for row in block[..16].chunks_exact_mut(4) {
        let z0 = row[0].wrapping_add(row[2]);
        let z1 = row[0].wrapping_sub(row[2]);
        let z2 = (row[1] >> 1).wrapping_sub(row[3]);
        let z3 = row[1].wrapping_add(row[3] >> 1);
        row[0] = z0.wrapping_add(z3);
        row[1] = z1.wrapping_add(z2);
        row[2] = z1.wrapping_sub(z2);
        row[3] = z0.wrapping_sub(z3);
    }

    // 列变换
    for x in 0..4 {
        let z0 = block[x].wrapping_add(block[x + 8]);
        let z1 = block[x].wrapping_sub(block[x + 8]);
        let z2 = (block[x + 4] >> 1).wrapping_sub(block[x + 12]);
        let z3 = block[x + 4].wrapping_add(block[x + 12] >> 1);
        add_sample(dst, x0 + x, y0, z0.wrapping_add(z3) >> 6, max);
        add_sample(dst, x0 + x, y0 + 1, z1.wrapping_add(z2) >> 6, max);
        add_sample(dst, x0 + x, y0 + 2, z1.wrapping_sub(z2) >> 6, max);
        add_sample(dst, x0 + x, y0 + 3, z0.wrapping_sub(z3) >> 6, max);
    }

    block[..16].fill(0);
}

/// 只有 DC 系数时的快速路径
pub fn idct4_dc_add<T: Sample>(
    dst: &mut Plane<T>,
    x0: usize,
    y0: usize,
    block: &mut [i32],
    max: i32,
) {
    let dc = block[0].wrapping_add(32) >> 6;
    block[0] = 0;
    for y in 0..4 {
        for x in 0..4 {
            add_sample(dst, x0 + x, y0 + y, dc, max);
        }
    }
}

// ============================================================
// 8x8
// ============================================================

/// 8 点一维反变换
#[inline]
fn idct8_1d(s: [i32; 8]) -> [i32; 8] {
    let a0 = s[0].wrapping_add(s[4]);
    let a2 = s[0].wrapping_sub(s[4]);
    let a4 = (s[2] >> 1).wrapping_sub(s[6]);
    let a6 = (s[6] >> 1).wrapping_add(s[2]);

    let b0 = a0.wrapping_add(a6);
    let b2 = a2.wrapping_add(a4);
    let b4 = a2.wrapping_sub(a4);
    let b6 = a0.wrapping_sub(a6);

    let a1 = s[5]
        .wrapping_sub(s[3])
        .wrapping_sub(s[7])
        .wrapping_sub(s[7] >> 1);
    let a3 = s[1]
        .wrapping_add(s[7])
        .wrapping_sub(s[3])
        .wrapping_sub(s[3] >> 1);
    let a5 = s[7]
        .wrapping_sub(s[1])
        .wrapping_add(s[5])
        .wrapping_add(s[5] >> 1);
    let a7 = s[3]
        .wrapping_add(s[5])
        .wrapping_add(s[1])
        .wrapping_add(s[1] >> 1);

    let b1 = (a7 >> 2).wrapping_add(a1);
    let b3 = a3.wrapping_add(a5 >> 2);
    let b5 = (a3 >> 2).wrapping_sub(a5);
    let b7 = a7.wrapping_sub(a1 >> 2);

    [
        b0.wrapping_add(b7),
        b2.wrapping_add(b5),
        b4.wrapping_add(b3),
        b6.wrapping_add(b1),
        b6.wrapping_sub(b1),
        b4.wrapping_sub(b3),
        b2.wrapping_sub(b5),
        b0.wrapping_sub(b7),
    ]
}

/// 8x8 反变换并叠加到 `(x0, y0)`
pub fn idct8_add<T: Sample>(dst: &mut Plane<T>, x0: usize, y0: usize, block: &mut [i32], max: i32) {
    block[0] = block[0].wrapping_add(32);

    // 行变换
    for row in block[..64].chunks_exact_mut(8) {
        let mut s = [0i32; 8];
        s.copy_from_slice(row);
        row.copy_from_slice(&idct8_1d(s));
    }

    // 列变换
    for x in 0..8 {
        let s: [i32; 8] = std::array::from_fn(|k| block[x + 8 * k]);
        let out = idct8_1d(s);
        for (y, v) in out.into_iter().enumerate() {
            add_sample(dst, x0 + x, y0 + y, v >> 6, max);
        }
    }

    block[..64].fill(0);
}

pub fn idct8_dc_add<T: Sample>(
    dst: &mut Plane<T>,
    x0: usize,
    y0: usize,
    block: &mut [i32],
    max: i32,
) {
    let dc = block[0].wrapping_add(32) >> 6;
    block[0] = 0;
    for y in 0..8 {
        for x in 0..8 {
            add_sample(dst, x0 + x, y0 + y, dc, max);
        }
    }
}

// ============================================================
// 无损旁路
// ============================================================

/// 变换旁路: 残差直接叠加, `size` 为 4 或 8
pub fn add_pixels<T: Sample>(
    dst: &mut Plane<T>,
    x0: usize,
    y0: usize,
    block: &mut [i32],
    size: usize,
    max: i32,
) {
    for y in 0..size {
        for x in 0..size {
            add_sample(dst, x0 + x, y0 + y, block[x + y * size], max);
        }
    }
    block[..size * size].fill(0);
}

// ============================================================
// DC 变换
// ============================================================

/// 亮度 DC 的 4x4 Hadamard 反变换与反量化
///
/// `input` 为 4x4 网格光栅序的 16 个 DC, 输出写入 `coeffs` 中对应亮度块
/// (块号 n 位于 `16 * n`) 的 0 号系数.
pub fn luma_dc_dequant_idct(coeffs: &mut [i32], input: &[i32; 16], qmul: i32) {
    let mut temp = [0i32; 16];

    // 行变换
    for y in 0..4 {
        let r = &input[4 * y..4 * y + 4];
        let z0 = r[0].wrapping_add(r[1]);
        let z1 = r[0].wrapping_sub(r[1]);
        let z2 = r[2].wrapping_sub(r[3]);
        let z3 = r[2].wrapping_add(r[3]);
        temp[4 * y] = z0.wrapping_add(z3);
        temp[4 * y + 1] = z0.wrapping_sub(z3);
        temp[4 * y + 2] = z1.wrapping_sub(z2);
        temp[4 * y + 3] = z1.wrapping_add(z2);
    }

    // 列变换
    for x in 0..4 {
        let z0 = temp[x].wrapping_add(temp[8 + x]);
        let z1 = temp[x].wrapping_sub(temp[8 + x]);
        let z2 = temp[4 + x].wrapping_sub(temp[12 + x]);
        let z3 = temp[4 + x].wrapping_add(temp[12 + x]);
        let col = [
            z0.wrapping_add(z3),
            z1.wrapping_add(z2),
            z1.wrapping_sub(z2),
            z0.wrapping_sub(z3),
        ];
        for (y, v) in col.into_iter().enumerate() {
            let n = crate::tables::RASTER_TO_LUMA_BLOCK[x + 4 * y];
            coeffs[16 * n] = v.wrapping_mul(qmul).wrapping_add(128) >> 8;
        }
    }
}

/// 4:2:0 色度 DC 的 2x2 反变换与反量化, `block` 为单个分量的 4 个 4x4 块
pub fn chroma_dc_dequant_idct(block: &mut [i32], qmul: i32) {
    let a = block[0];
    let b = block[16];
    let c = block[32];
    let d = block[48];

    let e = a.wrapping_sub(b);
    let a = a.wrapping_add(b);
    let b = c.wrapping_sub(d);
    let c = c.wrapping_add(d);

    block[0] = a.wrapping_add(c).wrapping_mul(qmul) >> 7;
    block[16] = e.wrapping_add(b).wrapping_mul(qmul) >> 7;
    block[32] = a.wrapping_sub(c).wrapping_mul(qmul) >> 7;
    block[48] = e.wrapping_sub(b).wrapping_mul(qmul) >> 7;
}

/// 4:2:2 色度 DC 的 2x4 反变换与反量化, `block` 为单个分量的 8 个 4x4 块
///
/// 块 k 位于第 `k >> 1` 行第 `k & 1` 列.
pub fn chroma422_dc_dequant_idct(block: &mut [i32], qmul: i32) {
    let mut temp = [0i32; 8];

    for i in 0..4 {
        let l = block[32 * i];
        let r = block[32 * i + 16];
        temp[2 * i] = l.wrapping_add(r);
        temp[2 * i + 1] = l.wrapping_sub(r);
    }

    for i in 0..2 {
        let z0 = temp[i].wrapping_add(temp[4 + i]);
        let z1 = temp[i].wrapping_sub(temp[4 + i]);
        let z2 = temp[2 + i].wrapping_sub(temp[6 + i]);
        let z3 = temp[2 + i].wrapping_add(temp[6 + i]);
        let off = 16 * i;
        block[off] = z0.wrapping_add(z3).wrapping_mul(qmul).wrapping_add(128) >> 8;
        block[32 + off] = z1.wrapping_add(z2).wrapping_mul(qmul).wrapping_add(128) >> 8;
        block[64 + off] = z1.wrapping_sub(z2).wrapping_mul(qmul).wrapping_add(128) >> 8;
        block[96 + off] = z0.wrapping_sub(z3).wrapping_mul(qmul).wrapping_add(128) >> 8;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::SeqParams;
    use crate::picture::Picture;

    fn plane(fill: u8) -> Plane<u8> {
        let mut pic: Picture<u8> = Picture::new(&SeqParams::new(1, 1));
        pic.planes[0].data.fill(fill);
        pic.planes[0].clone()
    }

    #[test]
    fn test_idct4_dc_only_matches_fast_path() {
        let mut a = plane(100);
        let mut b = plane(100);
        let mut blk = [0i32; 16];
        blk[0] = 64 * 5;
        let mut blk2 = blk;
        idct4_add(&mut a, 4, 4, &mut blk, 255);
        idct4_dc_add(&mut b, 4, 4, &mut blk2, 255);
        assert_eq!(a.data, b.data, "纯 DC 块两条路径结果应一致");
        assert_eq!(a.at(4, 4), 105);
        assert_eq!(a.at(8, 4), 100, "块外像素不应改变");
        assert!(blk.iter().all(|&v| v == 0), "叠加后系数应清零");
    }

    #[test]
    fn test_idct4_horizontal_ac() {
        // 仅 (1, 0) 系数: 各列输出随 x 变化, 各行相同
        let mut p = plane(128);
        let mut blk = [0i32; 16];
        blk[1] = 64;
        idct4_add(&mut p, 0, 0, &mut blk, 255);
        let row: Vec<u8> = (0..4).map(|x| p.at(x, 0)).collect();
        assert_eq!(row, vec![129, 129, 128, 127]);
        for y in 1..4 {
            assert_eq!(p.at(0, y), 129);
        }
    }

    #[test]
    fn test_idct8_dc_and_clip() {
        let mut p = plane(250);
        let mut blk = [0i32; 64];
        blk[0] = 64 * 20;
        idct8_add(&mut p, 8, 8, &mut blk, 255);
        assert_eq!(p.at(8, 8), 255, "应裁剪到最大值");
        assert_eq!(p.at(15, 15), 255);
        assert_eq!(p.at(7, 8), 250);
    }

    #[test]
    fn test_add_pixels_bypass() {
        let mut p = plane(10);
        let mut blk = [0i32; 16];
        blk[5] = -20;
        blk[0] = 3;
        add_pixels(&mut p, 0, 0, &mut blk, 4, 255);
        assert_eq!(p.at(0, 0), 13);
        assert_eq!(p.at(1, 1), 0, "负值应裁剪到 0");
    }

    #[test]
    fn test_luma_dc_hadamard_flat() {
        let mut coeffs = [0i32; 256];
        let mut input = [0i32; 16];
        input[0] = 4;
        luma_dc_dequant_idct(&mut coeffs, &input, 64);
        // 仅 DC 输入时所有块得到相同值 (4 * 64 + 128) >> 8 = 1
        for n in 0..16 {
            assert_eq!(coeffs[16 * n], 1, "块 {n}");
        }
    }

    #[test]
    fn test_luma_dc_hadamard_horizontal() {
        // 第 0 行第 1 列的 DC: 左半两列为正, 右半两列为负
        let mut coeffs = [0i32; 256];
        let mut input = [0i32; 16];
        input[1] = 1;
        luma_dc_dequant_idct(&mut coeffs, &input, 256);
        for y in 0..4 {
            for x in 0..4 {
                let n = crate::tables::RASTER_TO_LUMA_BLOCK[x + 4 * y];
                let expect = if x < 2 { 1 } else { -1 };
                assert_eq!(coeffs[16 * n], expect, "光栅位置 ({x}, {y})");
            }
        }
    }

    #[test]
    fn test_chroma_dc_2x2() {
        let mut block = [0i32; 64];
        block[0] = 2;
        block[16] = 1;
        chroma_dc_dequant_idct(&mut block, 128);
        assert_eq!(block[0], 3);
        assert_eq!(block[16], 1);
        assert_eq!(block[32], 3);
        assert_eq!(block[48], 1);
    }

    #[test]
    fn test_chroma422_dc_flat() {
        let mut block = [0i32; 128];
        block[0] = 1;
        chroma422_dc_dequant_idct(&mut block, 256);
        for k in 0..8 {
            assert_eq!(block[16 * k], 1, "块 {k}");
        }
    }
}
