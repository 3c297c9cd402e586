//! 帧内预测.
//!
//! 直接在重建平面上生成预测样本, 参考样本取自当前块的上方一行与左侧一列.
//! 模式合法性 (参考样本是否可用) 由 [`check_intra4x4_pred_mode`] 与
//! [`check_intra_pred_mode`] 在解析阶段处理, 这里只负责计算.

use crate::error::{H264Error, H264Result};
use crate::picture::Plane;
use crate::sample::{Sample, clip_pixel};
use crate::tables::SCAN8;

// ============================================================
// 模式编号
// ============================================================

/// Intra4x4 / Intra8x8 预测模式
pub const VERT_PRED: u8 = 0;
pub const HOR_PRED: u8 = 1;
pub const DC_PRED: u8 = 2;
pub const DIAG_DOWN_LEFT_PRED: u8 = 3;
pub const DIAG_DOWN_RIGHT_PRED: u8 = 4;
pub const VERT_RIGHT_PRED: u8 = 5;
pub const HOR_DOWN_PRED: u8 = 6;
pub const VERT_LEFT_PRED: u8 = 7;
pub const HOR_UP_PRED: u8 = 8;
pub const LEFT_DC_PRED: u8 = 9;
pub const TOP_DC_PRED: u8 = 10;
pub const DC_128_PRED: u8 = 11;

/// Intra16x16 与色度预测模式
pub const DC_PRED8X8: u8 = 0;
pub const HOR_PRED8X8: u8 = 1;
pub const VERT_PRED8X8: u8 = 2;
pub const PLANE_PRED8X8: u8 = 3;
pub const LEFT_DC_PRED8X8: u8 = 4;
pub const TOP_DC_PRED8X8: u8 = 5;
pub const DC_128_PRED8X8: u8 = 6;

// ============================================================
// 模式检查
// ============================================================

/// 按上/左样本可用性修正 Intra4x4 模式
///
/// `modes` 为邻域缓存中的模式数组. DC 类模式退化为单边或常数 DC,
/// 需要不可用样本的方向模式返回错误.
pub fn check_intra4x4_pred_mode(modes: &mut [i8], top_avail: u16, left_avail: u16) -> H264Result<()> {
    const TOP: [i8; 12] = [-1, 0, LEFT_DC_PRED as i8, -1, -1, -1, -1, -1, 0, 0, 0, 0];
    const LEFT: [i8; 12] = [
        0,
        -1,
        TOP_DC_PRED as i8,
        0,
        -1,
        -1,
        -1,
        0,
        -1,
        DC_128_PRED as i8,
        0,
        0,
    ];

    let remap = |table: &[i8; 12], slot: &mut i8| -> H264Result<()> {
        let mode = *slot;
        let status = usize::try_from(mode)
            .ok()
            .and_then(|m| table.get(m).copied())
            .ok_or_else(|| H264Error::corrupted("intra4x4_pred_mode", mode))?;
        if status < 0 {
            return Err(H264Error::corrupted("intra4x4_pred_mode", mode));
        }
        if status > 0 {
            *slot = status;
        }
        Ok(())
    };

    if top_avail & 0x8000 == 0 {
        for i in 0..4 {
            remap(&TOP, &mut modes[SCAN8[0] + i])?;
        }
    }
    if left_avail & 0x8888 != 0x8888 {
        const MASK: [u16; 4] = [0x8000, 0x2000, 0x80, 0x20];
        for (i, mask) in MASK.into_iter().enumerate() {
            if left_avail & mask == 0 {
                remap(&LEFT, &mut modes[SCAN8[0] + 8 * i])?;
            }
        }
    }
    Ok(())
}

/// 按样本可用性修正 Intra16x16 / 色度预测模式
pub fn check_intra_pred_mode(top_avail: u16, left_avail: u16, mode: u8) -> H264Result<u8> {
    const TOP: [i8; 4] = [LEFT_DC_PRED8X8 as i8, 1, -1, -1];
    const LEFT: [i8; 5] = [TOP_DC_PRED8X8 as i8, -1, 2, -1, DC_128_PRED8X8 as i8];

    if mode > 3 {
        return Err(H264Error::corrupted("intra_pred_mode", mode));
    }
    let mut mode = mode as i8;
    if top_avail & 0x8000 == 0 {
        mode = TOP[mode as usize];
        if mode < 0 {
            return Err(H264Error::corrupted("intra_pred_mode", mode));
        }
    }
    if left_avail & 0x8080 != 0x8080 {
        mode = LEFT[mode as usize];
        if mode < 0 {
            return Err(H264Error::corrupted("intra_pred_mode", mode));
        }
    }
    Ok(mode as u8)
}

// ============================================================
// 公共
// ============================================================

#[inline]
fn dc_128(bit_depth: u32) -> i32 {
    1 << (bit_depth - 1)
}

/// 用 `f(x, y)` 填充 `(x0, y0)` 起的 `w x h` 区域
fn fill_with<T: Sample>(
    plane: &mut Plane<T>,
    x0: usize,
    y0: usize,
    w: usize,
    h: usize,
    f: impl Fn(usize, usize) -> i32,
) {
    for y in 0..h {
        for x in 0..w {
            plane.set(x0 + x, y0 + y, T::from_i32(f(x, y)));
        }
    }
}

fn read_top<T: Sample>(plane: &Plane<T>, x0: usize, y0: usize, out: &mut [i32]) {
    for (i, v) in out.iter_mut().enumerate() {
        *v = plane.at_clamped(x0 as i32 + i as i32, y0 as i32 - 1);
    }
}

fn read_left<T: Sample>(plane: &Plane<T>, x0: usize, y0: usize, out: &mut [i32]) {
    for (j, v) in out.iter_mut().enumerate() {
        *v = plane.at_clamped(x0 as i32 - 1, y0 as i32 + j as i32);
    }
}

#[inline]
fn avg2(a: i32, b: i32) -> i32 {
    (a + b + 1) >> 1
}

#[inline]
fn avg3(a: i32, b: i32, c: i32) -> i32 {
    (a + 2 * b + c + 2) >> 2
}

/// N x N 方向预测使用的参考样本
///
/// `top` 含右上共 2N 个, `left` 含 N 个. 坐标 (-1, -1) 为左上角.
struct Edges<'a> {
    top: &'a [i32],
    left: &'a [i32],
    topleft: i32,
}

impl Edges<'_> {
    #[inline]
    fn p(&self, x: i32, y: i32) -> i32 {
        match (x, y) {
            (-1, -1) => self.topleft,
            (x, -1) => self.top[x as usize],
            (_, y) => self.left[y as usize],
        }
    }

    /// 方向模式在 (x, y) 处的预测值
    fn directional(&self, mode: u8, n: i32, x: i32, y: i32) -> i32 {
        let p = |x, y| self.p(x, y);
        match mode {
            DIAG_DOWN_LEFT_PRED => {
                if x == n - 1 && y == n - 1 {
                    (p(2 * n - 2, -1) + 3 * p(2 * n - 1, -1) + 2) >> 2
                } else {
                    avg3(p(x + y, -1), p(x + y + 1, -1), p(x + y + 2, -1))
                }
            }
            DIAG_DOWN_RIGHT_PRED => {
                if x > y {
                    avg3(p(x - y - 2, -1), p(x - y - 1, -1), p(x - y, -1))
                } else if x < y {
                    avg3(p(-1, y - x - 2), p(-1, y - x - 1), p(-1, y - x))
                } else {
                    avg3(p(0, -1), p(-1, -1), p(-1, 0))
                }
            }
            VERT_RIGHT_PRED => {
                let z = 2 * x - y;
                let t = x - (y >> 1);
                if z >= 0 && z & 1 == 0 {
                    avg2(p(t - 1, -1), p(t, -1))
                } else if z >= 0 {
                    avg3(p(t - 2, -1), p(t - 1, -1), p(t, -1))
                } else if z == -1 {
                    avg3(p(-1, 0), p(-1, -1), p(0, -1))
                } else {
                    avg3(p(-1, y - 2 * x - 1), p(-1, y - 2 * x - 2), p(-1, y - 2 * x - 3))
                }
            }
            HOR_DOWN_PRED => {
                let z = 2 * y - x;
                let t = y - (x >> 1);
                if z >= 0 && z & 1 == 0 {
                    avg2(p(-1, t - 1), p(-1, t))
                } else if z >= 0 {
                    avg3(p(-1, t - 2), p(-1, t - 1), p(-1, t))
                } else if z == -1 {
                    avg3(p(-1, 0), p(-1, -1), p(0, -1))
                } else {
                    avg3(p(x - 2 * y - 1, -1), p(x - 2 * y - 2, -1), p(x - 2 * y - 3, -1))
                }
            }
            VERT_LEFT_PRED => {
                let t = x + (y >> 1);
                if y & 1 == 0 {
                    avg2(p(t, -1), p(t + 1, -1))
                } else {
                    avg3(p(t, -1), p(t + 1, -1), p(t + 2, -1))
                }
            }
            HOR_UP_PRED => {
                let z = x + 2 * y;
                let t = y + (x >> 1);
                if z > 2 * n - 3 {
                    p(-1, n - 1)
                } else if z == 2 * n - 3 {
                    (p(-1, n - 2) + 3 * p(-1, n - 1) + 2) >> 2
                } else if z & 1 == 0 {
                    avg2(p(-1, t), p(-1, t + 1))
                } else {
                    avg3(p(-1, t), p(-1, t + 1), p(-1, t + 2))
                }
            }
            _ => 0,
        }
    }

    /// 平坦类与方向类模式的统一入口
    fn predict(&self, mode: u8, n: usize, bit_depth: u32) -> impl Fn(usize, usize) -> i32 + '_ {
        let sum_top: i32 = self.top[..n].iter().sum();
        let sum_left: i32 = self.left[..n].iter().sum();
        let shift = n.trailing_zeros();
        let dc = match mode {
            DC_PRED => (sum_top + sum_left + n as i32) >> (shift + 1),
            LEFT_DC_PRED => (sum_left + (n as i32 >> 1)) >> shift,
            TOP_DC_PRED => (sum_top + (n as i32 >> 1)) >> shift,
            _ => dc_128(bit_depth),
        };
        move |x, y| match mode {
            VERT_PRED => self.top[x],
            HOR_PRED => self.left[y],
            DC_PRED | LEFT_DC_PRED | TOP_DC_PRED | DC_128_PRED => dc,
            _ => self.directional(mode, n as i32, x as i32, y as i32),
        }
    }
}

// ============================================================
// 4x4
// ============================================================

/// Intra4x4 预测, 右上不可用时以上方最后一个样本代替
pub fn pred4x4<T: Sample>(
    plane: &mut Plane<T>,
    x0: usize,
    y0: usize,
    mode: u8,
    has_topright: bool,
    bit_depth: u32,
) {
    let mut top = [0i32; 8];
    let mut left = [0i32; 4];
    read_top(plane, x0, y0, &mut top);
    read_left(plane, x0, y0, &mut left);
    if !has_topright {
        let t3 = top[3];
        top[4..].fill(t3);
    }
    let edges = Edges {
        top: &top,
        left: &left,
        topleft: plane.at_clamped(x0 as i32 - 1, y0 as i32 - 1),
    };
    fill_with(plane, x0, y0, 4, 4, edges.predict(mode, 4, bit_depth));
}

// ============================================================
// 8x8 (参考样本先做 [1, 2, 1] 滤波)
// ============================================================

pub fn pred8x8l<T: Sample>(
    plane: &mut Plane<T>,
    x0: usize,
    y0: usize,
    mode: u8,
    has_topleft: bool,
    has_topright: bool,
    bit_depth: u32,
) {
    let mut raw_top = [0i32; 16];
    let mut raw_left = [0i32; 8];
    read_top(plane, x0, y0, &mut raw_top);
    read_left(plane, x0, y0, &mut raw_left);
    if !has_topright {
        let t7 = raw_top[7];
        raw_top[8..].fill(t7);
    }
    let raw_tl = plane.at_clamped(x0 as i32 - 1, y0 as i32 - 1);

    let mut top = [0i32; 16];
    let first = if has_topleft { raw_tl } else { raw_top[0] };
    top[0] = avg3(first, raw_top[0], raw_top[1]);
    for i in 1..15 {
        top[i] = avg3(raw_top[i - 1], raw_top[i], raw_top[i + 1]);
    }
    top[15] = (raw_top[14] + 3 * raw_top[15] + 2) >> 2;

    let mut left = [0i32; 8];
    let first = if has_topleft { raw_tl } else { raw_left[0] };
    left[0] = avg3(first, raw_left[0], raw_left[1]);
    for j in 1..7 {
        left[j] = avg3(raw_left[j - 1], raw_left[j], raw_left[j + 1]);
    }
    left[7] = (raw_left[6] + 3 * raw_left[7] + 2) >> 2;

    let edges = Edges {
        top: &top,
        left: &left,
        topleft: avg3(raw_left[0], raw_tl, raw_top[0]),
    };
    fill_with(plane, x0, y0, 8, 8, edges.predict(mode, 8, bit_depth));
}

// ============================================================
// 16x16 与色度
// ============================================================

/// 平面预测, `w x h` 为 16x16, 8x8 或 8x16
fn pred_plane<T: Sample>(plane: &mut Plane<T>, x0: usize, y0: usize, w: usize, h: usize, max: i32) {
    let (xi, yi) = (x0 as i32, y0 as i32);
    let top = |i: i32| plane.at_clamped(xi + i, yi - 1);
    let left = |j: i32| plane.at_clamped(xi - 1, yi + j);
    let (hw, hh) = (w as i32 / 2, h as i32 / 2);

    let mut gh = 0;
    for k in 1..=hw {
        gh += k * (top(hw - 1 + k) - top(hw - 1 - k));
    }
    let mut gv = 0;
    for k in 1..=hh {
        gv += k * (left(hh - 1 + k) - left(hh - 1 - k));
    }
    let b = if w == 16 { (5 * gh + 32) >> 6 } else { (34 * gh + 32) >> 6 };
    let c = if h == 16 { (5 * gv + 32) >> 6 } else { (34 * gv + 32) >> 6 };
    let a = 16 * (left(h as i32 - 1) + top(w as i32 - 1));

    for y in 0..h {
        for x in 0..w {
            let v = (a + b * (x as i32 - (hw - 1)) + c * (y as i32 - (hh - 1)) + 16) >> 5;
            plane.set(x0 + x, y0 + y, T::from_i32(clip_pixel(v, max)));
        }
    }
}

pub fn pred16x16<T: Sample>(plane: &mut Plane<T>, x0: usize, y0: usize, mode: u8, bit_depth: u32) {
    if mode == PLANE_PRED8X8 {
        pred_plane(plane, x0, y0, 16, 16, (1 << bit_depth) - 1);
        return;
    }
    let mut top = [0i32; 16];
    let mut left = [0i32; 16];
    read_top(plane, x0, y0, &mut top);
    read_left(plane, x0, y0, &mut left);
    let st: i32 = top.iter().sum();
    let sl: i32 = left.iter().sum();
    let dc = match mode {
        DC_PRED8X8 => (st + sl + 16) >> 5,
        LEFT_DC_PRED8X8 => (sl + 8) >> 4,
        TOP_DC_PRED8X8 => (st + 8) >> 4,
        _ => dc_128(bit_depth),
    };
    fill_with(plane, x0, y0, 16, 16, |x, y| match mode {
        VERT_PRED8X8 => top[x],
        HOR_PRED8X8 => left[y],
        _ => dc,
    });
}

/// 色度预测, `height` 为 8 (4:2:0) 或 16 (4:2:2)
///
/// DC 按 4x4 子块分别计算: 左列子块优先用左侧样本, 首行其余子块优先用上方样本,
/// 左上子块及内部子块同时使用两侧.
pub fn pred_chroma<T: Sample>(
    plane: &mut Plane<T>,
    x0: usize,
    y0: usize,
    mode: u8,
    height: usize,
    bit_depth: u32,
) {
    if mode == PLANE_PRED8X8 {
        pred_plane(plane, x0, y0, 8, height, (1 << bit_depth) - 1);
        return;
    }
    let mut top = [0i32; 8];
    let mut left = [0i32; 16];
    read_top(plane, x0, y0, &mut top);
    read_left(plane, x0, y0, &mut left[..height]);

    match mode {
        VERT_PRED8X8 => fill_with(plane, x0, y0, 8, height, |x, _| top[x]),
        HOR_PRED8X8 => fill_with(plane, x0, y0, 8, height, |_, y| left[y]),
        _ => {
            let (use_top, use_left) = match mode {
                DC_PRED8X8 => (true, true),
                LEFT_DC_PRED8X8 => (false, true),
                TOP_DC_PRED8X8 => (true, false),
                _ => (false, false),
            };
            let mut dc = [0i32; 8];
            for (blk, v) in dc.iter_mut().enumerate().take(height / 2) {
                let (bx, by) = (blk & 1, blk >> 1);
                let st: i32 = top[4 * bx..4 * bx + 4].iter().sum();
                let sl: i32 = left[4 * by..4 * by + 4].iter().sum();
                // 首行右侧子块偏向上方, 左列下方子块偏向左侧
                let prefer_top = bx == 1 && by == 0;
                let prefer_left = bx == 0 && by > 0;
                *v = if use_top && use_left && !prefer_top && !prefer_left {
                    (st + sl + 4) >> 3
                } else if use_top && (prefer_top || !use_left) {
                    (st + 2) >> 2
                } else if use_left {
                    (sl + 2) >> 2
                } else if use_top {
                    (st + 2) >> 2
                } else {
                    dc_128(bit_depth)
                };
            }
            fill_with(plane, x0, y0, 8, height, |x, y| dc[(x >> 2) + 2 * (y >> 2)]);
        }
    }
}
