//! 运动补偿插值.
//!
//! 亮度为 1/4 像素精度: 半像素位置由 6 抽头滤波 [1, -5, 20, 20, -5, 1] 得到,
//! 四分之一位置取相邻整/半像素的平均. 色度为 1/8 像素双线性插值.
//! 参考窗口越出图像时按最近边缘取样.

use crate::picture::Plane;
use crate::sample::{Sample, clip_pixel};

/// 最大分区边长
const MAX_BLOCK: usize = 16;
/// 6 抽头滤波需要的额外边距 (左上 2, 右下 3)
const WINDOW: usize = MAX_BLOCK + 5;

#[inline]
fn tap6(a: i32, b: i32, c: i32, d: i32, e: i32, f: i32) -> i32 {
    a - 5 * b + 20 * c + 20 * d - 5 * e + f
}

#[inline]
fn avg(a: i32, b: i32) -> i32 {
    (a + b + 1) >> 1
}

/// 以 `(x - 2, y - 2)` 为原点的参考窗口
struct LumaWindow {
    data: [i32; WINDOW * WINDOW],
}

impl LumaWindow {
    fn fetch<T: Sample>(src: &Plane<T>, x: i32, y: i32, w: usize, h: usize) -> Self {
        let mut data = [0i32; WINDOW * WINDOW];
        for j in 0..h + 5 {
            for i in 0..w + 5 {
                data[j * WINDOW + i] = src.at_clamped(x - 2 + i as i32, y - 2 + j as i32);
            }
        }
        Self { data }
    }

    /// 窗口坐标取样
    #[inline]
    fn at(&self, i: usize, j: usize) -> i32 {
        self.data[j * WINDOW + i]
    }

    /// 块内整像素 G
    #[inline]
    fn full(&self, i: usize, j: usize) -> i32 {
        self.at(i + 2, j + 2)
    }

    /// 窗口第 `row` 行上, 块内第 i 列右侧的水平半像素 (未归一化)
    #[inline]
    fn half_h_raw(&self, i: usize, row: usize) -> i32 {
        tap6(
            self.at(i, row),
            self.at(i + 1, row),
            self.at(i + 2, row),
            self.at(i + 3, row),
            self.at(i + 4, row),
            self.at(i + 5, row),
        )
    }

    /// 水平半像素 b
    #[inline]
    fn half_h(&self, i: usize, j: usize, max: i32) -> i32 {
        clip_pixel((self.half_h_raw(i, j + 2) + 16) >> 5, max)
    }

    /// 垂直半像素 h
    #[inline]
    fn half_v(&self, i: usize, j: usize, max: i32) -> i32 {
        let c = i + 2;
        let v = tap6(
            self.at(c, j),
            self.at(c, j + 1),
            self.at(c, j + 2),
            self.at(c, j + 3),
            self.at(c, j + 4),
            self.at(c, j + 5),
        );
        clip_pixel((v + 16) >> 5, max)
    }

    /// 中心半像素 j: 对未归一化的水平半像素再做垂直滤波
    #[inline]
    fn center(&self, i: usize, j: usize, max: i32) -> i32 {
        let v = tap6(
            self.half_h_raw(i, j),
            self.half_h_raw(i, j + 1),
            self.half_h_raw(i, j + 2),
            self.half_h_raw(i, j + 3),
            self.half_h_raw(i, j + 4),
            self.half_h_raw(i, j + 5),
        );
        clip_pixel((v + 512) >> 10, max)
    }

    /// 块内 (i, j) 在分数相位 (dx, dy) 的预测值
    fn sample(&self, i: usize, j: usize, dx: usize, dy: usize, max: i32) -> i32 {
        match (dx, dy) {
            (0, 0) => self.full(i, j),
            (1, 0) => avg(self.full(i, j), self.half_h(i, j, max)),
            (2, 0) => self.half_h(i, j, max),
            (3, 0) => avg(self.half_h(i, j, max), self.full(i + 1, j)),
            (0, 1) => avg(self.full(i, j), self.half_v(i, j, max)),
            (0, 2) => self.half_v(i, j, max),
            (0, 3) => avg(self.half_v(i, j, max), self.full(i, j + 1)),
            (1, 1) => avg(self.half_h(i, j, max), self.half_v(i, j, max)),
            (3, 1) => avg(self.half_h(i, j, max), self.half_v(i + 1, j, max)),
            (1, 3) => avg(self.half_h(i, j + 1, max), self.half_v(i, j, max)),
            (3, 3) => avg(self.half_h(i, j + 1, max), self.half_v(i + 1, j, max)),
            (2, 1) => avg(self.half_h(i, j, max), self.center(i, j, max)),
            (2, 3) => avg(self.half_h(i, j + 1, max), self.center(i, j, max)),
            (1, 2) => avg(self.half_v(i, j, max), self.center(i, j, max)),
            (3, 2) => avg(self.half_v(i + 1, j, max), self.center(i, j, max)),
            _ => self.center(i, j, max),
        }
    }
}

/// 亮度运动补偿
///
/// `(x, y)` 为整像素位置, `(dx, dy)` 为 1/4 像素相位 (0..4),
/// 结果写入 `out` 的 `w x h` 区域.
#[allow(clippy::too_many_arguments)]
pub fn luma_mc<T: Sample>(
    src: &Plane<T>,
    x: i32,
    y: i32,
    dx: usize,
    dy: usize,
    w: usize,
    h: usize,
    max: i32,
    out: &mut [i32],
    out_stride: usize,
) {
    let win = LumaWindow::fetch(src, x, y, w, h);
    for j in 0..h {
        for i in 0..w {
            out[j * out_stride + i] = win.sample(i, j, dx, dy, max);
        }
    }
}

/// 色度运动补偿, `(fx, fy)` 为 1/8 像素相位 (0..8)
#[allow(clippy::too_many_arguments)]
pub fn chroma_mc<T: Sample>(
    src: &Plane<T>,
    x: i32,
    y: i32,
    fx: i32,
    fy: i32,
    w: usize,
    h: usize,
    out: &mut [i32],
    out_stride: usize,
) {
    let a = (8 - fx) * (8 - fy);
    let b = fx * (8 - fy);
    let c = (8 - fx) * fy;
    let d = fx * fy;
    for j in 0..h as i32 {
        for i in 0..w as i32 {
            let (sx, sy) = (x + i, y + j);
            let v = a * src.at_clamped(sx, sy)
                + b * src.at_clamped(sx + 1, sy)
                + c * src.at_clamped(sx, sy + 1)
                + d * src.at_clamped(sx + 1, sy + 1);
            out[j as usize * out_stride + i as usize] = (v + 32) >> 6;
        }
    }
}
