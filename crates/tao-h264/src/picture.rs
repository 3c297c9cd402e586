//! 解码图像与跨线程进度同步.
//!
//! [`Picture`] 持有三个样本平面以及去块滤波和后续宏块预测需要的逐宏块数组.
//! 同一图像内, 宏块按解码顺序先写后读: 宏块 N 的类型, 非零计数, 运动矢量在
//! 宏块 N+1 填充邻居缓存之前已经写回. 跨 slice 的邻居通过 `slice_table` 判定为
//! 不可用, 因此并发 slice 之间不会读取对方刚写入的数据.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::mb_type::MbFlags;
use crate::params::{ChromaFormat, SeqParams};
use crate::sample::Sample;

/// `slice_table` 中尚未解码的宏块
pub const SLICE_NONE: u16 = u16::MAX;

// ============================================================
// 样本平面
// ============================================================

/// 单个样本平面
#[derive(Debug, Clone)]
pub struct Plane<T> {
    pub data: Vec<T>,
    pub stride: usize,
    pub width: usize,
    pub height: usize,
}

impl<T: Sample> Plane<T> {
    fn new(width: usize, height: usize, fill: T) -> Self {
        Self {
            data: vec![fill; width * height],
            stride: width,
            width,
            height,
        }
    }

    #[inline]
    pub fn at(&self, x: usize, y: usize) -> T {
        self.data[y * self.stride + x]
    }

    /// 坐标越界时按最近边缘取样 (等价于边缘扩展)
    #[inline]
    pub fn at_clamped(&self, x: i32, y: i32) -> i32 {
        let x = x.clamp(0, self.width as i32 - 1) as usize;
        let y = y.clamp(0, self.height as i32 - 1) as usize;
        self.data[y * self.stride + x].to_i32()
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, v: T) {
        self.data[y * self.stride + x] = v;
    }
}

// ============================================================
// 图像
// ============================================================

/// 一帧解码图像
#[derive(Debug, Clone)]
pub struct Picture<T> {
    /// Y, Cb, Cr
    pub planes: [Plane<T>; 3],
    pub mb_width: usize,
    pub mb_height: usize,
    pub chroma_format: ChromaFormat,
    pub bit_depth: u32,
    /// 逐宏块类型
    pub mb_type: Vec<MbFlags>,
    /// 逐宏块量化参数 (PCM 为 0)
    pub qscale: Vec<u8>,
    /// 逐宏块 CBP, 低 6 位为语法 CBP, 12..16 位为含非零系数的 8x8 亮度块
    pub cbp: Vec<u16>,
    /// 逐宏块非零系数计数: 亮度 16 项, Cb 16 项, Cr 16 项, 每组 4x4 光栅序
    pub non_zero_count: Vec<[u8; 48]>,
    /// 逐 4x4 块运动矢量, 行宽 `4 * mb_width`
    pub motion_val: [Vec<[i16; 2]>; 2],
    /// 逐 8x8 块参考索引, 每宏块 4 项, 未使用为 -1
    pub ref_index: [Vec<i8>; 2],
    /// 逐宏块 Intra4x4/8x8 预测模式 (按 4x4 块序号)
    pub intra4x4_pred_mode: Vec<[i8; 16]>,
    /// 逐宏块所属 slice 序号
    pub slice_table: Vec<u16>,
    /// 每个 slice 的参考图像标识, 供时域直接预测映射同位参考
    pub slice_refs: HashMap<u16, [Vec<u64>; 2]>,
}

impl<T: Sample> Picture<T> {
    /// 按序列参数分配图像
    ///
    /// 单色图像也分配 4:2:0 尺寸的色度平面并填充中间灰度.
    pub fn new(sps: &SeqParams) -> Self {
        let mb_count = sps.mb_count();
        let width = sps.mb_width * 16;
        let height = sps.mb_height * 16;
        let c_height = sps.mb_height * sps.chroma_format.mb_chroma_height();
        let grey = T::from_i32(1 << (sps.bit_depth - 1));
        Self {
            planes: [
                Plane::new(width, height, T::default()),
                Plane::new(width / 2, c_height, grey),
                Plane::new(width / 2, c_height, grey),
            ],
            mb_width: sps.mb_width,
            mb_height: sps.mb_height,
            chroma_format: sps.chroma_format,
            bit_depth: sps.bit_depth,
            mb_type: vec![MbFlags::empty(); mb_count],
            qscale: vec![0; mb_count],
            cbp: vec![0; mb_count],
            non_zero_count: vec![[0; 48]; mb_count],
            motion_val: [vec![[0; 2]; mb_count * 16], vec![[0; 2]; mb_count * 16]],
            ref_index: [vec![-1; mb_count * 4], vec![-1; mb_count * 4]],
            intra4x4_pred_mode: vec![[2; 16]; mb_count],
            slice_table: vec![SLICE_NONE; mb_count],
            slice_refs: HashMap::new(),
        }
    }

    pub fn mb_count(&self) -> usize {
        self.mb_width * self.mb_height
    }

    /// 运动矢量数组的行宽 (4x4 块)
    pub fn b_stride(&self) -> usize {
        self.mb_width * 4
    }

    /// 宏块左上角 4x4 块在运动矢量数组中的序号
    pub fn mb2b_xy(&self, mb_xy: usize) -> usize {
        let mb_x = mb_xy % self.mb_width;
        let mb_y = mb_xy / self.mb_width;
        4 * mb_x + 4 * mb_y * self.b_stride()
    }

    pub fn max_sample(&self) -> i32 {
        (1 << self.bit_depth) - 1
    }
}

// ============================================================
// 进度同步
// ============================================================

/// 已完成重建的宏块行计数
///
/// 值单调递增, 等待方阻塞在条件变量上直到目标行完成.
#[derive(Debug)]
pub struct FrameProgress {
    row: Mutex<i32>,
    cond: Condvar,
}

impl Default for FrameProgress {
    fn default() -> Self {
        Self {
            row: Mutex::new(-1),
            cond: Condvar::new(),
        }
    }
}

impl FrameProgress {
    /// 报告 `mb_row` 及之前的行已完成
    pub fn report(&self, mb_row: i32) {
        let mut row = self.row.lock().unwrap_or_else(PoisonError::into_inner);
        if mb_row > *row {
            *row = mb_row;
            self.cond.notify_all();
        }
    }

    /// 阻塞直到 `mb_row` 完成
    pub fn wait(&self, mb_row: i32) {
        let mut row = self.row.lock().unwrap_or_else(PoisonError::into_inner);
        while *row < mb_row {
            row = self
                .cond
                .wait(row)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// 整帧完成 (含出错中止), 释放所有等待方
    pub fn finish(&self) {
        self.report(i32::MAX);
    }

    pub fn current(&self) -> i32 {
        *self.row.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

static NEXT_PICTURE_ID: AtomicU64 = AtomicU64::new(1);

/// 可在线程间共享的图像
///
/// 样本与逐宏块数组位于读写锁内, 另附解码进度与损坏标记.
#[derive(Debug)]
pub struct SharedPicture<T> {
    id: u64,
    poc: i32,
    picture: RwLock<Picture<T>>,
    progress: FrameProgress,
    corrupted: AtomicBool,
}

impl<T: Sample> SharedPicture<T> {
    pub fn new(picture: Picture<T>, poc: i32) -> Arc<Self> {
        Arc::new(Self {
            id: NEXT_PICTURE_ID.fetch_add(1, Ordering::Relaxed),
            poc,
            picture: RwLock::new(picture),
            progress: FrameProgress::default(),
            corrupted: AtomicBool::new(false),
        })
    }

    /// 进程内唯一标识
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn poc(&self) -> i32 {
        self.poc
    }

    pub fn progress(&self) -> &FrameProgress {
        &self.progress
    }

    pub fn read(&self) -> RwLockReadGuard<'_, Picture<T>> {
        self.picture.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, Picture<T>> {
        self.picture.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// 是否有 slice 解码失败
    pub fn is_corrupted(&self) -> bool {
        self.corrupted.load(Ordering::Acquire)
    }

    pub fn mark_corrupted(&self) {
        self.corrupted.store(true, Ordering::Release);
    }
}

/// 参考列表中的一项
#[derive(Debug, Clone)]
pub struct RefPicture<T> {
    pub picture: Arc<SharedPicture<T>>,
    pub long_term: bool,
}

impl<T: Sample> RefPicture<T> {
    pub fn short_term(picture: Arc<SharedPicture<T>>) -> Self {
        Self {
            picture,
            long_term: false,
        }
    }

    pub fn poc(&self) -> i32 {
        self.picture.poc()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_picture_layout() {
        let mut sps = SeqParams::new(3, 2);
        sps.chroma_format = ChromaFormat::Yuv422;
        let pic: Picture<u8> = Picture::new(&sps);
        assert_eq!(pic.planes[0].width, 48);
        assert_eq!(pic.planes[1].height, 32, "4:2:2 色度高度与亮度相同");
        assert_eq!(pic.b_stride(), 12);
        assert_eq!(pic.mb2b_xy(4), 4 + 4 * 12);
        assert_eq!(pic.planes[2].at(0, 0), 128);
        assert_eq!(pic.planes[0].at_clamped(-5, 100), 0);
    }

    #[test]
    fn test_progress_wait_blocks_until_report() {
        let pic = SharedPicture::new(Picture::<u8>::new(&SeqParams::new(1, 4)), 0);
        let waiter = {
            let pic = Arc::clone(&pic);
            thread::spawn(move || {
                pic.progress().wait(2);
                pic.progress().current()
            })
        };
        thread::sleep(Duration::from_millis(20));
        pic.progress().report(0);
        pic.progress().report(3);
        let seen = waiter.join().unwrap();
        assert!(seen >= 2, "等待方应在第 2 行完成后返回, 实际 {seen}");
        // 进度不回退
        pic.progress().report(1);
        assert_eq!(pic.progress().current(), 3);
    }

    #[test]
    fn test_finish_releases_waiters() {
        let pic = SharedPicture::new(Picture::<u16>::new(&SeqParams::new(1, 1)), 4);
        let waiter = {
            let pic = Arc::clone(&pic);
            thread::spawn(move || pic.progress().wait(1000))
        };
        pic.mark_corrupted();
        pic.progress().finish();
        waiter.join().unwrap();
        assert!(pic.is_corrupted());
        assert_eq!(pic.poc(), 4);
    }
}
