//! 加权预测与双向平均.
//!
//! 输入输出均为 `i32` 预测缓冲, 偏移以 8 bit 为单位, 高位深时左移对齐.

use crate::sample::clip_pixel;

/// 单向加权: `(v * w + o') >> d`
#[allow(clippy::too_many_arguments)]
pub fn weight_block(
    buf: &mut [i32],
    stride: usize,
    w: usize,
    h: usize,
    log2_denom: u32,
    weight: i32,
    offset: i32,
    bit_depth: u32,
) {
    let max = (1 << bit_depth) - 1;
    let mut off = offset << (log2_denom + bit_depth - 8);
    if log2_denom > 0 {
        off += 1 << (log2_denom - 1);
    }
    for row in buf.chunks_mut(stride).take(h) {
        for v in &mut row[..w] {
            *v = clip_pixel((*v * weight + off) >> log2_denom, max);
        }
    }
}

/// 双向加权, `dst` 为列表 0 预测, `src` 为列表 1 预测, `offset` 为两者偏移之和
#[allow(clippy::too_many_arguments)]
pub fn biweight_block(
    dst: &mut [i32],
    src: &[i32],
    stride: usize,
    w: usize,
    h: usize,
    log2_denom: u32,
    weight_dst: i32,
    weight_src: i32,
    offset: i32,
    bit_depth: u32,
) {
    let max = (1 << bit_depth) - 1;
    let off = (((offset << (bit_depth - 8)) + 1) | 1) << log2_denom;
    for y in 0..h {
        let row = y * stride;
        for x in row..row + w {
            dst[x] = clip_pixel(
                (src[x] * weight_src + dst[x] * weight_dst + off) >> (log2_denom + 1),
                max,
            );
        }
    }
}

/// 无权重的双向平均
pub fn avg_block(dst: &mut [i32], src: &[i32], stride: usize, w: usize, h: usize) {
    for y in 0..h {
        let row = y * stride;
        for x in row..row + w {
            dst[x] = (dst[x] + src[x] + 1) >> 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_weight_is_identity() {
        let mut buf = [10, 20, 30, 40];
        weight_block(&mut buf, 2, 2, 2, 5, 32, 0, 8);
        assert_eq!(buf, [10, 20, 30, 40]);
    }

    #[test]
    fn test_weight_with_offset_and_clip() {
        let mut buf = [100, 250];
        // 权重 2 (分母 1), 偏移 -10
        weight_block(&mut buf, 2, 2, 1, 0, 2, -10, 8);
        assert_eq!(buf, [190, 255]);
        // 10 bit: 偏移左移 2 位
        let mut buf = [400];
        weight_block(&mut buf, 1, 1, 1, 0, 1, 5, 10);
        assert_eq!(buf, [420]);
    }

    #[test]
    fn test_biweight_equal_weights_matches_average() {
        let mut a = [10, 11, 200, 0];
        let b = [13, 12, 201, 1];
        let mut c = a;
        biweight_block(&mut a, &b, 4, 4, 1, 5, 32, 32, 0, 8);
        avg_block(&mut c, &b, 4, 4, 1);
        assert_eq!(a, c, "等权双向加权应与平均一致");
    }

    #[test]
    fn test_implicit_style_weights() {
        // 隐式加权: 分母 5, w0 = 48, w1 = 16
        let mut dst = [100];
        biweight_block(&mut dst, &[20], 1, 1, 1, 5, 48, 16, 0, 8);
        assert_eq!(dst, [(100 * 48 + 20 * 16 + 32) >> 6]);
    }
}
