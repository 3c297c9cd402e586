//! 当前宏块的邻域缓存.
//!
//! 缓存以 8 为行宽, 通过 [`SCAN8`] 把块编号映射到槽位, 任何块的左邻都在 `-1`,
//! 上邻都在 `-8`. 解码一个宏块之前, 从图像的逐宏块数组把左, 上, 右上, 左上
//! 邻居的数据填入边框槽位; 不可用的邻居写入哨兵值.

use crate::mb_type::MbFlags;
use crate::picture::Picture;
use crate::sample::Sample;
use crate::tables::SCAN8;

/// 邻居分区不存在 (图像边界, 其他 slice, 或尚未解码的块)
pub(crate) const PART_NOT_AVAILABLE: i8 = -2;
/// 邻居存在但未使用该参考列表
pub(crate) const LIST_NOT_USED: i8 = -1;
/// CAVLC 中不可用邻居的非零计数
pub(crate) const NNZ_UNAVAILABLE: u8 = 64;

/// 非零计数缓存大小 (15 行)
const NNZ_CACHE_SIZE: usize = 15 * 8;
/// 运动与预测模式缓存大小 (5 行)
const MV_CACHE_SIZE: usize = 5 * 8;

// ============================================================
// 邻居定位
// ============================================================

/// 当前宏块四个方向邻居的位置与类型
///
/// 邻居不在图像内或不属于当前 slice 时, 位置为 `None`, 类型为空.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Neighbors {
    pub mb_xy: usize,
    pub left: Option<usize>,
    pub top: Option<usize>,
    pub topleft: Option<usize>,
    pub topright: Option<usize>,
    pub left_type: MbFlags,
    pub top_type: MbFlags,
    pub topleft_type: MbFlags,
    pub topright_type: MbFlags,
}

impl Neighbors {
    pub fn locate<T: Sample>(pic: &Picture<T>, mb_x: usize, mb_y: usize, slice_num: u16) -> Self {
        let w = pic.mb_width;
        let mb_xy = mb_x + mb_y * w;
        let avail = |xy: usize| (pic.slice_table[xy] == slice_num).then_some(xy);
        let left = (mb_x > 0).then(|| mb_xy - 1).and_then(avail);
        let top = (mb_y > 0).then(|| mb_xy - w).and_then(avail);
        let topleft = (mb_x > 0 && mb_y > 0).then(|| mb_xy - w - 1).and_then(avail);
        let topright = (mb_y > 0 && mb_x + 1 < w).then(|| mb_xy - w + 1).and_then(avail);
        let ty = |xy: Option<usize>| xy.map_or(MbFlags::empty(), |xy| pic.mb_type[xy]);
        Self {
            mb_xy,
            left,
            top,
            topleft,
            topright,
            left_type: ty(left),
            top_type: ty(top),
            topleft_type: ty(topleft),
            topright_type: ty(topright),
        }
    }
}

// ============================================================
// 缓存
// ============================================================

/// 在行宽 8 的缓存中填充 `w x h` 的矩形
#[inline]
pub(crate) fn fill_rect<V: Copy>(cache: &mut [V], start: usize, w: usize, h: usize, val: V) {
    for y in 0..h {
        let row = start + y * 8;
        cache[row..row + w].fill(val);
    }
}

/// 邻域缓存与帧内样本可用性掩码
#[derive(Debug, Clone)]
pub(crate) struct NeighborCache {
    pub non_zero_count: [u8; NNZ_CACHE_SIZE],
    pub mv: [[[i16; 2]; MV_CACHE_SIZE]; 2],
    pub ref_idx: [[i8; MV_CACHE_SIZE]; 2],
    pub intra4x4_pred_mode: [i8; MV_CACHE_SIZE],
    /// 位 15 起按 4x4 块编号排列, 置位表示该方向的参考样本可用
    pub top_samples_available: u16,
    pub left_samples_available: u16,
    pub topleft_samples_available: u16,
    pub topright_samples_available: u16,
}

impl Default for NeighborCache {
    fn default() -> Self {
        let mut cache = Self {
            non_zero_count: [0; NNZ_CACHE_SIZE],
            mv: [[[0; 2]; MV_CACHE_SIZE]; 2],
            ref_idx: [[LIST_NOT_USED; MV_CACHE_SIZE]; 2],
            intra4x4_pred_mode: [-1; MV_CACHE_SIZE],
            top_samples_available: 0xFFFF,
            left_samples_available: 0xFFFF,
            topleft_samples_available: 0xFFFF,
            topright_samples_available: 0xEEEA,
        };
        // 宏块内部右侧永远不可用的右上槽位
        for list in 0..2 {
            for n in [5, 7, 13] {
                cache.ref_idx[list][SCAN8[n] + 1] = PART_NOT_AVAILABLE;
            }
        }
        cache
    }
}

impl NeighborCache {
    /// 帧内宏块: 样本可用性掩码与 Intra4x4 邻居模式
    pub fn fill_intra<T: Sample>(
        &mut self,
        pic: &Picture<T>,
        nb: &Neighbors,
        mb_type: MbFlags,
        constrained_intra_pred: bool,
    ) {
        let type_mask = if constrained_intra_pred {
            MbFlags::INTRA4X4 | MbFlags::INTRA16X16 | MbFlags::INTRA_PCM
        } else {
            MbFlags::all()
        };
        let usable = |t: MbFlags| t.intersects(type_mask);

        self.top_samples_available = 0xFFFF;
        self.left_samples_available = 0xFFFF;
        self.topleft_samples_available = 0xFFFF;
        self.topright_samples_available = 0xEEEA;
        if !usable(nb.top_type) {
            self.topleft_samples_available = 0xB3FF;
            self.top_samples_available = 0x33FF;
            self.topright_samples_available = 0x26EA;
        }
        if !usable(nb.left_type) {
            self.topleft_samples_available &= 0xDF5F;
            self.left_samples_available &= 0x5F5F;
        }
        if !usable(nb.topleft_type) {
            self.topleft_samples_available &= 0x7FFF;
        }
        if !usable(nb.topright_type) {
            self.topright_samples_available &= 0xFBFF;
        }

        if !mb_type.contains(MbFlags::INTRA4X4) {
            return;
        }
        // 不可用为 -1, 可用但非 Intra4x4 视为 DC (2)
        let fallback = |t: MbFlags| if usable(t) { 2 } else { -1 };
        let top_row = SCAN8[0] - 8;
        match nb.top {
            Some(top) if nb.top_type.contains(MbFlags::INTRA4X4) => {
                let modes = &pic.intra4x4_pred_mode[top];
                for (i, blk) in [10, 11, 14, 15].into_iter().enumerate() {
                    self.intra4x4_pred_mode[top_row + i] = modes[blk];
                }
            }
            _ => self.intra4x4_pred_mode[top_row..top_row + 4].fill(fallback(nb.top_type)),
        }
        match nb.left {
            Some(left) if nb.left_type.contains(MbFlags::INTRA4X4) => {
                let modes = &pic.intra4x4_pred_mode[left];
                for (i, blk) in [5, 7, 13, 15].into_iter().enumerate() {
                    self.intra4x4_pred_mode[SCAN8[0] - 1 + 8 * i] = modes[blk];
                }
            }
            _ => {
                let v = fallback(nb.left_type);
                for i in 0..4 {
                    self.intra4x4_pred_mode[SCAN8[0] - 1 + 8 * i] = v;
                }
            }
        }
    }

    /// 非零计数的上/左边框
    pub fn fill_non_zero_count<T: Sample>(&mut self, pic: &Picture<T>, nb: &Neighbors) {
        let chroma422 = pic.chroma_format == crate::params::ChromaFormat::Yuv422;
        let nnz = &mut self.non_zero_count;
        match nb.top {
            Some(top) => {
                let src = &pic.non_zero_count[top];
                nnz[4..8].copy_from_slice(&src[12..16]);
                let (cb, cr) = if chroma422 { (28, 44) } else { (20, 36) };
                nnz[4 + 8 * 5..8 + 8 * 5].copy_from_slice(&src[cb..cb + 4]);
                nnz[4 + 8 * 10..8 + 8 * 10].copy_from_slice(&src[cr..cr + 4]);
            }
            None => {
                for row in [0, 5, 10] {
                    nnz[4 + 8 * row..8 + 8 * row].fill(NNZ_UNAVAILABLE);
                }
            }
        }
        match nb.left {
            Some(left) => {
                let src = &pic.non_zero_count[left];
                for i in 0..4 {
                    nnz[3 + 8 * (1 + i)] = src[4 * i + 3];
                }
                let rows = if chroma422 { 4 } else { 2 };
                for i in 0..rows {
                    nnz[3 + 8 * (6 + i)] = src[16 + 4 * i + 1];
                    nnz[3 + 8 * (11 + i)] = src[32 + 4 * i + 1];
                }
            }
            None => {
                for row in [1, 2, 3, 4, 6, 7, 8, 9, 11, 12, 13, 14] {
                    nnz[3 + 8 * row] = NNZ_UNAVAILABLE;
                }
            }
        }
    }

    /// 运动矢量与参考索引的邻居边框
    ///
    /// `mb_type` 决定需要哪些列表以及左侧是否需要整列.
    pub fn fill_motion<T: Sample>(
        &mut self,
        pic: &Picture<T>,
        nb: &Neighbors,
        mb_type: MbFlags,
        list_count: usize,
    ) {
        let b_stride = pic.b_stride();
        let s0 = SCAN8[0];
        for list in 0..list_count {
            if !mb_type.uses_list(list) {
                continue;
            }
            let mv = &pic.motion_val[list];
            let refs = &pic.ref_index[list];
            let sentinel = |t: MbFlags| {
                if t.is_empty() {
                    PART_NOT_AVAILABLE
                } else {
                    LIST_NOT_USED
                }
            };

            // 上方: 上邻宏块的最后一行
            match nb.top {
                Some(top) if nb.top_type.uses_list(list) => {
                    let b_xy = pic.mb2b_xy(top) + 3 * b_stride;
                    self.mv[list][s0 - 8..s0 - 4].copy_from_slice(&mv[b_xy..b_xy + 4]);
                    self.ref_idx[list][s0 - 8] = refs[4 * top + 2];
                    self.ref_idx[list][s0 - 7] = refs[4 * top + 2];
                    self.ref_idx[list][s0 - 6] = refs[4 * top + 3];
                    self.ref_idx[list][s0 - 5] = refs[4 * top + 3];
                }
                _ => {
                    self.mv[list][s0 - 8..s0 - 4].fill([0; 2]);
                    self.ref_idx[list][s0 - 8..s0 - 4].fill(sentinel(nb.top_type));
                }
            }

            // 左侧: 只有 16x8 与 8x8 需要整列
            let rows = if mb_type.intersects(MbFlags::PART_16X8 | MbFlags::PART_8X8) {
                4
            } else {
                1
            };
            for row in 0..rows {
                let slot = s0 - 1 + 8 * row;
                match nb.left {
                    Some(left) if nb.left_type.uses_list(list) => {
                        let b_xy = pic.mb2b_xy(left) + 3 + row * b_stride;
                        self.mv[list][slot] = mv[b_xy];
                        self.ref_idx[list][slot] = refs[4 * left + 1 + (row & !1)];
                    }
                    _ => {
                        self.mv[list][slot] = [0; 2];
                        self.ref_idx[list][slot] = sentinel(nb.left_type);
                    }
                }
            }

            // 右上: 右上宏块的左下 4x4 块
            match nb.topright {
                Some(tr) if nb.topright_type.uses_list(list) => {
                    let b_xy = pic.mb2b_xy(tr) + 3 * b_stride;
                    self.mv[list][s0 - 4] = mv[b_xy];
                    self.ref_idx[list][s0 - 4] = refs[4 * tr + 2];
                }
                _ => {
                    self.mv[list][s0 - 4] = [0; 2];
                    self.ref_idx[list][s0 - 4] = sentinel(nb.topright_type);
                }
            }

            // 左上只在右上或上方右半不可用时才会被预测用到
            if self.ref_idx[list][s0 - 6] < 0 || self.ref_idx[list][s0 - 4] < 0 {
                match nb.topleft {
                    Some(tl) if nb.topleft_type.uses_list(list) => {
                        let b_xy = pic.mb2b_xy(tl) + 3 + 3 * b_stride;
                        self.mv[list][s0 - 9] = mv[b_xy];
                        self.ref_idx[list][s0 - 9] = refs[4 * tl + 3];
                    }
                    _ => {
                        self.mv[list][s0 - 9] = [0; 2];
                        self.ref_idx[list][s0 - 9] = sentinel(nb.topleft_type);
                    }
                }
            }

            if mb_type.intersects(MbFlags::SKIP | MbFlags::DIRECT2) {
                continue;
            }
            // 8x8 分区内右上块 (块 4, 12 的右上在宏块内部尚未解码)
            for n in [4, 12] {
                self.ref_idx[list][SCAN8[n]] = PART_NOT_AVAILABLE;
                self.mv[list][SCAN8[n]] = [0; 2];
            }
        }
    }

    /// 由左邻与上邻推测块 `n` 的非零计数, 用于选择 coeff_token 表
    pub fn pred_non_zero_count(&self, n: usize) -> u8 {
        let idx = SCAN8[n];
        let left = u32::from(self.non_zero_count[idx - 1]);
        let top = u32::from(self.non_zero_count[idx - 8]);
        let mut i = left + top;
        if i < 64 {
            i = (i + 1) >> 1;
        }
        (i & 31) as u8
    }

    /// Intra4x4 预测模式的预测值: 左上取小, 任一不可用则为 DC
    pub fn pred_intra_mode(&self, n: usize) -> i8 {
        let idx = SCAN8[n];
        let m = self.intra4x4_pred_mode[idx - 1].min(self.intra4x4_pred_mode[idx - 8]);
        if m < 0 { 2 } else { m }
    }

    /// 整个宏块的亮度, 色度非零计数清零
    pub fn clear_non_zero_count(&mut self, luma: bool, chroma: bool) {
        if luma {
            fill_rect(&mut self.non_zero_count, SCAN8[0], 4, 4, 0);
        }
        if chroma {
            fill_rect(&mut self.non_zero_count, SCAN8[16], 4, 4, 0);
            fill_rect(&mut self.non_zero_count, SCAN8[32], 4, 4, 0);
        }
    }

    /// 把缓存内部的非零计数按行拷贝到图像存储格式
    pub fn write_back_non_zero_count(&self, out: &mut [u8; 48]) {
        for group in 0..3 {
            for row in 0..4 {
                let src = 4 + 8 * (1 + 5 * group + row);
                let dst = 16 * group + 4 * row;
                out[dst..dst + 4].copy_from_slice(&self.non_zero_count[src..src + 4]);
            }
        }
    }

    pub fn write_back_intra_pred_mode(&self, out: &mut [i8; 16]) {
        for (n, mode) in out.iter_mut().enumerate() {
            *mode = self.intra4x4_pred_mode[SCAN8[n]];
        }
    }

    /// 帧间宏块的运动矢量与参考索引写回图像
    ///
    /// 未使用的列表写入 -1 与零矢量, 供后续宏块与同位预测读取.
    pub fn write_back_motion<T: Sample>(&self, pic: &mut Picture<T>, mb_xy: usize, mb_type: MbFlags) {
        let b_stride = pic.b_stride();
        let b_xy = pic.mb2b_xy(mb_xy);
        for list in 0..2 {
            let used = mb_type.uses_list(list);
            for y in 0..4 {
                let dst = b_xy + y * b_stride;
                let src = SCAN8[0] + 8 * y;
                if used {
                    pic.motion_val[list][dst..dst + 4].copy_from_slice(&self.mv[list][src..src + 4]);
                } else {
                    pic.motion_val[list][dst..dst + 4].fill([0; 2]);
                }
            }
            let refs = &mut pic.ref_index[list][4 * mb_xy..4 * mb_xy + 4];
            if used {
                for (k, n) in [0, 4, 8, 12].into_iter().enumerate() {
                    refs[k] = self.ref_idx[list][SCAN8[n]];
                }
            } else {
                refs.fill(LIST_NOT_USED);
            }
        }
    }
}
