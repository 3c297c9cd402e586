//! B slice 直接预测.
//!
//! 空间直接预测由邻居的最小参考索引与中值矢量推导, 再用同位宏块 (列表 1
//! 第一个参考图像中相同位置的宏块) 判断静止块; 时域直接预测按 POC 距离缩放
//! 同位宏块的运动矢量. 两种方式都只写邻域缓存与 (子) 宏块类型, 不消耗码流.

use std::collections::HashMap;

use log::debug;

use crate::cache::{NeighborCache, PART_NOT_AVAILABLE, fill_rect};
use crate::error::{H264Error, H264Result};
use crate::mb_type::MbFlags;
use crate::mvpred::median3;
use crate::picture::{Picture, RefPicture};
use crate::sample::Sample;
use crate::tables::SCAN8;

// ============================================================
// POC 距离
// ============================================================

fn clip_i8(v: i64) -> i32 {
    v.clamp(-128, 127) as i32
}

/// 返回 (tb, tx); td 为 0 时没有意义, 返回 `None`
fn poc_distance(cur_poc: i32, poc0: i32, poc1: i32) -> Option<(i32, i32)> {
    let td = clip_i8(i64::from(poc1) - i64::from(poc0));
    if td == 0 {
        return None;
    }
    let tb = clip_i8(i64::from(cur_poc) - i64::from(poc0));
    let tx = (16384 + (td.abs() >> 1)) / td;
    Some((tb, tx))
}

/// 时域直接预测的缩放因子 (8 位小数)
pub(crate) fn dist_scale_factor(cur_poc: i32, poc0: i32, poc1: i32, long_term: bool) -> i32 {
    if long_term {
        return 256;
    }
    match poc_distance(cur_poc, poc0, poc1) {
        Some((tb, tx)) => ((tb * tx + 32) >> 6).clamp(-1024, 1023),
        None => 256,
    }
}

/// 隐式加权的列表 0 权重表 `[ref0][ref1]`, 列表 1 权重为 `64 - w`
///
/// 两个列表都只有一个参考且当前图像恰在正中间时返回 `None`, 此时使用普通平均.
pub(crate) fn implicit_weights<T: Sample>(
    cur_poc: i32,
    refs: &[Vec<RefPicture<T>>; 2],
) -> Option<Vec<Vec<i32>>> {
    if refs[0].len() == 1
        && refs[1].len() == 1
        && i64::from(refs[0][0].poc()) + i64::from(refs[1][0].poc()) == 2 * i64::from(cur_poc)
    {
        return None;
    }
    let table = refs[0]
        .iter()
        .map(|r0| {
            refs[1]
                .iter()
                .map(|r1| {
                    if r0.long_term || r1.long_term {
                        return 32;
                    }
                    match poc_distance(cur_poc, r0.poc(), r1.poc()) {
                        Some((tb, tx)) => {
                            let dsf = (tb * tx + 32) >> 8;
                            if (-64..=128).contains(&dsf) { 64 - dsf } else { 32 }
                        }
                        None => 32,
                    }
                })
                .collect()
        })
        .collect();
    Some(table)
}

// ============================================================
// 同位宏块
// ============================================================

/// 同位宏块的运动数据快照
#[derive(Debug, Clone)]
pub(crate) struct Collocated {
    pub mb_type: MbFlags,
    /// `[list][x + 4y]`
    pub mv: [[[i16; 2]; 16]; 2],
    /// `[list][8x8 块]`
    pub ref_idx: [[i8; 4]; 2],
    pub slice_num: u16,
}

impl Collocated {
    fn read<T: Sample>(pic: &Picture<T>, mb_xy: usize) -> Self {
        let b_xy = pic.mb2b_xy(mb_xy);
        let b_stride = pic.b_stride();
        let mut mv = [[[0i16; 2]; 16]; 2];
        let mut ref_idx = [[-1i8; 4]; 2];
        for list in 0..2 {
            for y in 0..4 {
                let src = b_xy + y * b_stride;
                mv[list][4 * y..4 * y + 4].copy_from_slice(&pic.motion_val[list][src..src + 4]);
            }
            ref_idx[list].copy_from_slice(&pic.ref_index[list][4 * mb_xy..4 * mb_xy + 4]);
        }
        Self {
            mb_type: pic.mb_type[mb_xy],
            mv,
            ref_idx,
            slice_num: pic.slice_table[mb_xy],
        }
    }

    /// 8x8 块 (x8, y8) 的角点 4x4 矢量
    fn corner_mv(&self, list: usize, i8x8: usize) -> [i16; 2] {
        let (x8, y8) = (i8x8 & 1, i8x8 >> 1);
        self.mv[list][x8 * 3 + y8 * 12]
    }

    fn sub_mv(&self, list: usize, i8x8: usize, i4: usize) -> [i16; 2] {
        let (x8, y8) = (i8x8 & 1, i8x8 >> 1);
        self.mv[list][x8 * 2 + (i4 & 1) + (y8 * 2 + (i4 >> 1)) * 4]
    }
}

fn near_zero(mv: [i16; 2]) -> bool {
    mv[0].abs() <= 1 && mv[1].abs() <= 1
}

const PARTITIONS: MbFlags = MbFlags::PART_16X16
    .union(MbFlags::PART_16X8)
    .union(MbFlags::PART_8X16)
    .union(MbFlags::PART_8X8);

/// 子块类型从 8x8 改为 4x4
fn sub_to_4x4(sub: MbFlags) -> MbFlags {
    (sub - MbFlags::PART_16X16) | MbFlags::PART_8X8
}

fn sub_to_8x8(sub: MbFlags) -> MbFlags {
    (sub - MbFlags::PART_8X8) | MbFlags::PART_16X16
}

// ============================================================
// 直接预测上下文
// ============================================================

/// 一个 B slice 的直接预测状态
pub(crate) struct DirectContext<T> {
    spatial: bool,
    direct_8x8_inference: bool,
    col: Option<RefPicture<T>>,
    l0_ids: Vec<u64>,
    dist_scale_factor: Vec<i32>,
    /// 同位宏块所在 slice 的参考索引到当前列表 0 序号的映射
    colmap: HashMap<u16, [Vec<i8>; 2]>,
}

impl<T: Sample> DirectContext<T> {
    pub fn new(
        cur_poc: i32,
        refs: &[Vec<RefPicture<T>>; 2],
        spatial: bool,
        direct_8x8_inference: bool,
    ) -> Self {
        let col = refs[1].first().cloned();
        let poc1 = col.as_ref().map_or(cur_poc, RefPicture::poc);
        let dist_scale_factor = refs[0]
            .iter()
            .map(|r| dist_scale_factor(cur_poc, r.poc(), poc1, r.long_term))
            .collect();
        Self {
            spatial,
            direct_8x8_inference,
            col,
            l0_ids: refs[0].iter().map(|r| r.picture.id()).collect(),
            dist_scale_factor,
            colmap: HashMap::new(),
        }
    }

    /// 等待同位宏块所在行完成后读取其运动数据
    fn collocated(&mut self, mb_xy: usize, mb_y: usize) -> H264Result<Collocated> {
        let col = self
            .col
            .as_ref()
            .ok_or(H264Error::corrupted("ref_count_l1", 0))?;
        col.picture.progress().wait(mb_y as i32);
        let pic = col.picture.read();
        let data = Collocated::read(&pic, mb_xy);
        if !self.spatial && !self.colmap.contains_key(&data.slice_num) {
            let map = match pic.slice_refs.get(&data.slice_num) {
                Some(ids) => std::array::from_fn(|list| {
                    ids[list]
                        .iter()
                        .map(|id| {
                            self.l0_ids
                                .iter()
                                .position(|cur| cur == id)
                                .map_or(0, |i| i as i8)
                        })
                        .collect()
                }),
                None => {
                    debug!("H264: 同位 slice {} 没有参考列表记录", data.slice_num);
                    [Vec::new(), Vec::new()]
                }
            };
            self.colmap.insert(data.slice_num, map);
        }
        Ok(data)
    }

    fn col_long_term(&self) -> bool {
        self.col.as_ref().is_some_and(|c| c.long_term)
    }

    /// 推导直接预测宏块 (或 B_8x8 中的直接子块) 的参考索引与运动矢量
    pub fn predict(
        &mut self,
        cache: &mut NeighborCache,
        mb_xy: usize,
        mb_y: usize,
        mb_type: &mut MbFlags,
        sub_mb_type: &mut [MbFlags; 4],
    ) -> H264Result<()> {
        if self.spatial {
            self.predict_spatial(cache, mb_xy, mb_y, mb_type, sub_mb_type)
        } else {
            self.predict_temporal(cache, mb_xy, mb_y, mb_type, sub_mb_type)
        }
    }

    /// 同位宏块形态决定的分区方式, 返回子块类型
    ///
    /// 时域预测的两个列表总是都使用.
    fn partition_from_col(
        &self,
        col_type: MbFlags,
        is_b8x8: bool,
        mb_type: &mut MbFlags,
        sub_mb_type: MbFlags,
        temporal: bool,
    ) -> MbFlags {
        let mut sub = sub_mb_type | MbFlags::PART_16X16 | MbFlags::DIRECT2;
        let lists = if temporal { MbFlags::L0L1 } else { MbFlags::empty() };
        if !is_b8x8 && (col_type.contains(MbFlags::PART_16X16) || col_type.is_intra()) {
            *mb_type |= MbFlags::PART_16X16 | MbFlags::DIRECT2;
            if temporal {
                *mb_type |= MbFlags::P0L0 | MbFlags::P0L1;
            }
        } else if !is_b8x8 && col_type.intersects(MbFlags::PART_16X8 | MbFlags::PART_8X16) {
            *mb_type |=
                MbFlags::DIRECT2 | (col_type & (MbFlags::PART_16X8 | MbFlags::PART_8X16)) | lists;
        } else {
            if !self.direct_8x8_inference {
                sub = sub_to_4x4(sub);
            }
            *mb_type |= MbFlags::PART_8X8 | lists;
        }
        sub
    }

    fn predict_spatial(
        &mut self,
        cache: &mut NeighborCache,
        mb_xy: usize,
        mb_y: usize,
        mb_type: &mut MbFlags,
        sub_mb_type: &mut [MbFlags; 4],
    ) -> H264Result<()> {
        let is_b8x8 = mb_type.contains(MbFlags::PART_8X8);
        let mut sub_type = MbFlags::L0L1;
        let s0 = SCAN8[0];
        let mut refs = [0i8; 2];
        let mut mvs = [[0i16; 2]; 2];

        for list in 0..2 {
            let left_ref = cache.ref_idx[list][s0 - 1];
            let top_ref = cache.ref_idx[list][s0 - 8];
            let (mut diag_ref, mut c) = (cache.ref_idx[list][s0 - 4], cache.mv[list][s0 - 4]);
            if diag_ref == PART_NOT_AVAILABLE {
                diag_ref = cache.ref_idx[list][s0 - 9];
                c = cache.mv[list][s0 - 9];
            }
            // 负值按无符号比较, 任一非负邻居优先
            let r = [left_ref, top_ref, diag_ref]
                .into_iter()
                .map(|r| r as u8)
                .min()
                .unwrap_or(u8::MAX) as i8;
            if r >= 0 {
                let a = cache.mv[list][s0 - 1];
                let b = cache.mv[list][s0 - 8];
                let matches =
                    usize::from(left_ref == r) + usize::from(top_ref == r) + usize::from(diag_ref == r);
                mvs[list] = if matches > 1 {
                    [
                        median3(a[0].into(), b[0].into(), c[0].into()) as i16,
                        median3(a[1].into(), b[1].into(), c[1].into()) as i16,
                    ]
                } else if left_ref == r {
                    a
                } else if top_ref == r {
                    b
                } else {
                    c
                };
                refs[list] = r;
            } else {
                let mask = MbFlags::from_bits_retain(MbFlags::L0.bits() << (2 * list));
                refs[list] = -1;
                if !is_b8x8 {
                    *mb_type -= mask;
                }
                sub_type -= mask;
            }
        }
        if refs[0] < 0 && refs[1] < 0 {
            refs = [0, 0];
            if !is_b8x8 {
                *mb_type |= MbFlags::L0L1;
            }
            sub_type |= MbFlags::L0L1;
        }

        if !is_b8x8 && mvs[0] == [0; 2] && mvs[1] == [0; 2] {
            for list in 0..2 {
                fill_rect(&mut cache.ref_idx[list], s0, 4, 4, refs[list]);
                fill_rect(&mut cache.mv[list], s0, 4, 4, [0; 2]);
            }
            *mb_type = (*mb_type
                - (MbFlags::PART_8X8
                    | MbFlags::PART_16X8
                    | MbFlags::PART_8X16
                    | MbFlags::P1L0
                    | MbFlags::P1L1))
                | MbFlags::PART_16X16
                | MbFlags::DIRECT2;
            return Ok(());
        }

        let col = self.collocated(mb_xy, mb_y)?;
        let sub_type = self.partition_from_col(col.mb_type, is_b8x8, mb_type, sub_type, false);
        let col_static = !col.mb_type.is_intra() && !self.col_long_term();

        if mb_type.contains(MbFlags::PART_16X16) {
            let zero = col_static
                && ((col.ref_idx[0][0] == 0 && near_zero(col.mv[0][0]))
                    || (col.ref_idx[0][0] < 0 && col.ref_idx[1][0] == 0 && near_zero(col.mv[1][0])));
            for list in 0..2 {
                let mv = if zero && refs[list] == 0 { [0; 2] } else { mvs[list] };
                fill_rect(&mut cache.ref_idx[list], s0, 4, 4, refs[list]);
                fill_rect(&mut cache.mv[list], s0, 4, 4, mv);
            }
            return Ok(());
        }

        let mut n = 0;
        for (i8x8, sub) in sub_mb_type.iter_mut().enumerate() {
            if is_b8x8 && !sub.is_direct() {
                continue;
            }
            *sub = sub_type;
            let s = SCAN8[4 * i8x8];
            for list in 0..2 {
                fill_rect(&mut cache.mv[list], s, 2, 2, mvs[list]);
                fill_rect(&mut cache.ref_idx[list], s, 2, 2, refs[list]);
            }
            if !col_static
                || !(col.ref_idx[0][i8x8] == 0
                    || (col.ref_idx[0][i8x8] < 0 && col.ref_idx[1][i8x8] == 0))
            {
                continue;
            }
            let l1 = if col.ref_idx[0][i8x8] == 0 { 0 } else { 1 };
            if sub_type.contains(MbFlags::PART_16X16) {
                if near_zero(col.corner_mv(l1, i8x8)) {
                    for list in 0..2 {
                        if refs[list] == 0 {
                            fill_rect(&mut cache.mv[list], s, 2, 2, [0; 2]);
                        }
                    }
                    n += 4;
                }
            } else {
                let mut m = 0;
                for i4 in 0..4 {
                    if near_zero(col.sub_mv(l1, i8x8, i4)) {
                        for list in 0..2 {
                            if refs[list] == 0 {
                                cache.mv[list][SCAN8[4 * i8x8 + i4]] = [0; 2];
                            }
                        }
                        m += 1;
                    }
                }
                if m & 3 == 0 {
                    *sub = sub_to_8x8(*sub);
                }
                n += m;
            }
        }
        if !is_b8x8 && n & 15 == 0 {
            *mb_type = (*mb_type
                - (PARTITIONS - MbFlags::PART_16X16)
                - MbFlags::P1L0
                - MbFlags::P1L1)
                | MbFlags::PART_16X16
                | MbFlags::DIRECT2;
        }
        Ok(())
    }

    /// 同位参考索引映射到当前列表 0
    fn map_col_ref(&self, col: &Collocated, i8x8: usize) -> (i8, usize) {
        let (list, idx) = if col.ref_idx[0][i8x8] >= 0 {
            (0, col.ref_idx[0][i8x8])
        } else {
            (1, col.ref_idx[1][i8x8])
        };
        let ref0 = self
            .colmap
            .get(&col.slice_num)
            .and_then(|m| m[list].get(idx.max(0) as usize))
            .copied()
            .unwrap_or(0);
        (ref0, list)
    }

    fn scale(&self, ref0: i8) -> i32 {
        self.dist_scale_factor
            .get(ref0 as usize)
            .copied()
            .unwrap_or(256)
    }

    fn predict_temporal(
        &mut self,
        cache: &mut NeighborCache,
        mb_xy: usize,
        mb_y: usize,
        mb_type: &mut MbFlags,
        sub_mb_type: &mut [MbFlags; 4],
    ) -> H264Result<()> {
        let is_b8x8 = mb_type.contains(MbFlags::PART_8X8);
        let col = self.collocated(mb_xy, mb_y)?;
        let sub_type = self.partition_from_col(
            col.mb_type,
            is_b8x8,
            mb_type,
            MbFlags::P0L0 | MbFlags::P0L1,
            true,
        );
        let s0 = SCAN8[0];
        let scaled = |scale: i32, mv: [i16; 2]| -> ([i16; 2], [i16; 2]) {
            let l0 = [
                ((scale * i32::from(mv[0]) + 128) >> 8) as i16,
                ((scale * i32::from(mv[1]) + 128) >> 8) as i16,
            ];
            (l0, [l0[0].wrapping_sub(mv[0]), l0[1].wrapping_sub(mv[1])])
        };

        if mb_type.contains(MbFlags::PART_16X16) {
            fill_rect(&mut cache.ref_idx[1], s0, 4, 4, 0);
            let (ref0, mv0, mv1) = if col.mb_type.is_intra() {
                (0, [0; 2], [0; 2])
            } else {
                let (ref0, list) = self.map_col_ref(&col, 0);
                let (mv0, mv1) = scaled(self.scale(ref0), col.mv[list][0]);
                (ref0, mv0, mv1)
            };
            fill_rect(&mut cache.ref_idx[0], s0, 4, 4, ref0);
            fill_rect(&mut cache.mv[0], s0, 4, 4, mv0);
            fill_rect(&mut cache.mv[1], s0, 4, 4, mv1);
            return Ok(());
        }

        for (i8x8, sub) in sub_mb_type.iter_mut().enumerate() {
            if is_b8x8 && !sub.is_direct() {
                continue;
            }
            *sub = sub_type;
            let s = SCAN8[4 * i8x8];
            fill_rect(&mut cache.ref_idx[1], s, 2, 2, 0);
            if col.mb_type.is_intra() {
                fill_rect(&mut cache.ref_idx[0], s, 2, 2, 0);
                fill_rect(&mut cache.mv[0], s, 2, 2, [0; 2]);
                fill_rect(&mut cache.mv[1], s, 2, 2, [0; 2]);
                continue;
            }
            let (ref0, list) = self.map_col_ref(&col, i8x8);
            let scale = self.scale(ref0);
            fill_rect(&mut cache.ref_idx[0], s, 2, 2, ref0);
            if sub_type.contains(MbFlags::PART_16X16) {
                let (mv0, mv1) = scaled(scale, col.corner_mv(list, i8x8));
                fill_rect(&mut cache.mv[0], s, 2, 2, mv0);
                fill_rect(&mut cache.mv[1], s, 2, 2, mv1);
            } else {
                for i4 in 0..4 {
                    let (mv0, mv1) = scaled(scale, col.sub_mv(list, i8x8, i4));
                    cache.mv[0][SCAN8[4 * i8x8 + i4]] = mv0;
                    cache.mv[1][SCAN8[4 * i8x8 + i4]] = mv1;
                }
            }
        }
        Ok(())
    }
}
