//! 帧间宏块的运动补偿.
//!
//! 按分区从参考图像取样插值, 结果写入宏块本地的预测缓冲, 重建阶段再拷贝到
//! 当前图像. 读取参考图像之前先等待其解码进度覆盖所需的最低一行.

use crate::cache::NeighborCache;
use crate::direct::implicit_weights;
use crate::dsp::qpel::{chroma_mc, luma_mc};
use crate::dsp::weight::{avg_block, biweight_block, weight_block};
use crate::error::{H264Error, H264Result};
use crate::mb_type::MbFlags;
use crate::params::{ChromaFormat, WeightMode};
use crate::picture::RefPicture;
use crate::sample::Sample;
use crate::tables::SCAN8;

/// 亮度预测缓冲行宽
pub(crate) const LUMA_STRIDE: usize = 16;
/// 色度预测缓冲行宽
pub(crate) const CHROMA_STRIDE: usize = 8;

/// 一个宏块的帧间预测样本
#[derive(Debug, Clone)]
pub(crate) struct MbPrediction {
    pub luma: [i32; 256],
    /// Cb, Cr, 8 列 x 8/16 行
    pub chroma: [[i32; 128]; 2],
}

impl Default for MbPrediction {
    fn default() -> Self {
        Self {
            luma: [0; 256],
            chroma: [[0; 128]; 2],
        }
    }
}

/// 运动补偿分区 (亮度像素坐标, 相对宏块左上角)
#[derive(Debug, Clone, Copy)]
struct Partition {
    /// 左上 4x4 块编号
    n: usize,
    x: usize,
    y: usize,
    w: usize,
    h: usize,
}

impl Partition {
    const fn new(n: usize, x: usize, y: usize, w: usize, h: usize) -> Self {
        Self { n, x, y, w, h }
    }
}

/// 按宏块类型展开分区, 同时给出每个分区使用的列表
fn partitions(mb_type: MbFlags, sub_mb_type: &[MbFlags; 4]) -> Vec<(Partition, [bool; 2])> {
    let dir = |t: MbFlags, part: usize| [t.is_dir(part, 0), t.is_dir(part, 1)];
    let mut out = Vec::with_capacity(16);
    if mb_type.contains(MbFlags::PART_16X16) {
        out.push((Partition::new(0, 0, 0, 16, 16), dir(mb_type, 0)));
    } else if mb_type.contains(MbFlags::PART_16X8) {
        out.push((Partition::new(0, 0, 0, 16, 8), dir(mb_type, 0)));
        out.push((Partition::new(8, 0, 8, 16, 8), dir(mb_type, 1)));
    } else if mb_type.contains(MbFlags::PART_8X16) {
        out.push((Partition::new(0, 0, 0, 8, 16), dir(mb_type, 0)));
        out.push((Partition::new(4, 8, 0, 8, 16), dir(mb_type, 1)));
    } else {
        for (i, &sub) in sub_mb_type.iter().enumerate() {
            let n = 4 * i;
            let (x, y) = ((i & 1) * 8, (i >> 1) * 8);
            let lists = dir(sub, 0);
            if sub.contains(MbFlags::PART_16X16) {
                out.push((Partition::new(n, x, y, 8, 8), lists));
            } else if sub.contains(MbFlags::PART_16X8) {
                out.push((Partition::new(n, x, y, 8, 4), lists));
                out.push((Partition::new(n + 2, x, y + 4, 8, 4), lists));
            } else if sub.contains(MbFlags::PART_8X16) {
                out.push((Partition::new(n, x, y, 4, 8), lists));
                out.push((Partition::new(n + 1, x + 4, y, 4, 8), lists));
            } else {
                for j in 0..4 {
                    let p = Partition::new(n + j, x + 4 * (j & 1), y + 4 * (j >> 1), 4, 4);
                    out.push((p, lists));
                }
            }
        }
    }
    out
}

/// 一个 slice 的运动补偿状态
#[derive(Debug)]
pub(crate) struct MotionCompensator<T> {
    refs: [Vec<RefPicture<T>>; 2],
    weights: WeightMode,
    /// 隐式加权的列表 0 权重, 按 [ref0][ref1] 索引
    implicit: Option<Vec<Vec<i32>>>,
    chroma_format: ChromaFormat,
    bit_depth: u32,
    mb_height: usize,
}

impl<T: Sample> MotionCompensator<T> {
    pub fn new(
        refs: [Vec<RefPicture<T>>; 2],
        weights: WeightMode,
        cur_poc: i32,
        chroma_format: ChromaFormat,
        bit_depth: u32,
        mb_height: usize,
    ) -> Self {
        let implicit = match weights {
            WeightMode::Implicit => implicit_weights(cur_poc, &refs),
            _ => None,
        };
        Self {
            refs,
            weights,
            implicit,
            chroma_format,
            bit_depth,
            mb_height,
        }
    }

    pub fn refs(&self) -> &[Vec<RefPicture<T>>; 2] {
        &self.refs
    }

    pub fn ref_count(&self, list: usize) -> usize {
        self.refs[list].len()
    }

    /// 对整个帧间宏块做运动补偿
    pub fn compensate(
        &self,
        cache: &NeighborCache,
        mb_type: MbFlags,
        sub_mb_type: &[MbFlags; 4],
        mb_x: usize,
        mb_y: usize,
        pred: &mut MbPrediction,
    ) -> H264Result<()> {
        for (part, lists) in partitions(mb_type, sub_mb_type) {
            self.mc_part(cache, part, lists, mb_x, mb_y, pred)?;
        }
        Ok(())
    }

    fn implicit_weight(&self, ref0: i8, ref1: i8) -> i32 {
        self.implicit
            .as_ref()
            .and_then(|t| t.get(ref0 as usize)?.get(ref1 as usize).copied())
            .unwrap_or(32)
    }

    fn mc_part(
        &self,
        cache: &NeighborCache,
        part: Partition,
        [list0, list1]: [bool; 2],
        mb_x: usize,
        mb_y: usize,
        pred: &mut MbPrediction,
    ) -> H264Result<()> {
        let slot = SCAN8[part.n];
        let ref0 = cache.ref_idx[0][slot];
        let ref1 = cache.ref_idx[1][slot];

        let weighted = match &self.weights {
            WeightMode::Explicit(w) => w.use_luma || w.use_chroma,
            WeightMode::Implicit => list0 && list1 && self.implicit_weight(ref0, ref1) != 32,
            WeightMode::Default => false,
        };

        if list0 && list1 {
            let mut tmp = MbPrediction::default();
            self.mc_dir_part(cache, part, 0, mb_x, mb_y, pred)?;
            self.mc_dir_part(cache, part, 1, mb_x, mb_y, &mut tmp)?;
            if weighted {
                self.biweight(part, ref0, ref1, pred, &tmp);
            } else {
                self.average(part, pred, &tmp);
            }
        } else if list0 || list1 {
            let list = usize::from(list1);
            self.mc_dir_part(cache, part, list, mb_x, mb_y, pred)?;
            if weighted {
                let r = cache.ref_idx[list][slot];
                self.weight_uni(part, list, r, pred);
            }
        }
        Ok(())
    }

    /// 单个列表的插值
    fn mc_dir_part(
        &self,
        cache: &NeighborCache,
        part: Partition,
        list: usize,
        mb_x: usize,
        mb_y: usize,
        pred: &mut MbPrediction,
    ) -> H264Result<()> {
        let slot = SCAN8[part.n];
        let ref_idx = cache.ref_idx[list][slot];
        let reference = usize::try_from(ref_idx)
            .ok()
            .and_then(|r| self.refs[list].get(r))
            .ok_or(H264Error::corrupted("ref_idx", ref_idx))?;
        let mv = cache.mv[list][slot];

        // 亮度 1/4 像素绝对位置
        let mx = ((mb_x * 16 + part.x) as i32) * 4 + i32::from(mv[0]);
        let my = ((mb_y * 16 + part.y) as i32) * 4 + i32::from(mv[1]);

        // 6 抽头滤波向下多读 3 行
        let bottom = (my >> 2) + part.h as i32 + 3;
        let row = (bottom >> 4).clamp(0, self.mb_height as i32 - 1);
        reference.picture.progress().wait(row);

        let pic = reference.picture.read();
        let max = (1 << self.bit_depth) - 1;
        let off = part.y * LUMA_STRIDE + part.x;
        luma_mc(
            &pic.planes[0],
            mx >> 2,
            my >> 2,
            (mx & 3) as usize,
            (my & 3) as usize,
            part.w,
            part.h,
            max,
            &mut pred.luma[off..],
            LUMA_STRIDE,
        );

        if !self.chroma_format.has_chroma() {
            return Ok(());
        }
        let (cy, fy, ch) = match self.chroma_format {
            ChromaFormat::Yuv422 => (my >> 2, (my << 1) & 7, part.h),
            _ => (my >> 3, my & 7, part.h / 2),
        };
        let cw = part.w / 2;
        let coff = self.chroma_row(part.y) * CHROMA_STRIDE + part.x / 2;
        for (c, buf) in pred.chroma.iter_mut().enumerate() {
            chroma_mc(
                &pic.planes[1 + c],
                mx >> 3,
                cy,
                mx & 7,
                fy,
                cw,
                ch,
                &mut buf[coff..],
                CHROMA_STRIDE,
            );
        }
        Ok(())
    }

    /// 亮度行号对应的色度行号
    fn chroma_row(&self, luma_y: usize) -> usize {
        match self.chroma_format {
            ChromaFormat::Yuv422 => luma_y,
            _ => luma_y / 2,
        }
    }

    /// 双向预测的普通平均
    fn average(&self, part: Partition, dst: &mut MbPrediction, src: &MbPrediction) {
        let off = part.y * LUMA_STRIDE + part.x;
        avg_block(&mut dst.luma[off..], &src.luma[off..], LUMA_STRIDE, part.w, part.h);
        if self.chroma_format.has_chroma() {
            let coff = self.chroma_row(part.y) * CHROMA_STRIDE + part.x / 2;
            let ch = self.chroma_row(part.h);
            for c in 0..2 {
                avg_block(
                    &mut dst.chroma[c][coff..],
                    &src.chroma[c][coff..],
                    CHROMA_STRIDE,
                    part.w / 2,
                    ch,
                );
            }
        }
    }

    fn biweight(
        &self,
        part: Partition,
        ref0: i8,
        ref1: i8,
        dst: &mut MbPrediction,
        src: &MbPrediction,
    ) {
        let bd = self.bit_depth;
        let off = part.y * LUMA_STRIDE + part.x;
        let coff = self.chroma_row(part.y) * CHROMA_STRIDE + part.x / 2;
        let (cw, ch) = (part.w / 2, self.chroma_row(part.h));
        let chroma = self.chroma_format.has_chroma();

        match &self.weights {
            WeightMode::Explicit(w) => {
                let e0 = w.entry(0, ref0 as usize);
                let e1 = w.entry(1, ref1 as usize);
                biweight_block(
                    &mut dst.luma[off..],
                    &src.luma[off..],
                    LUMA_STRIDE,
                    part.w,
                    part.h,
                    w.luma_log2_denom,
                    e0.luma.0,
                    e1.luma.0,
                    e0.luma.1 + e1.luma.1,
                    bd,
                );
                if chroma {
                    for c in 0..2 {
                        biweight_block(
                            &mut dst.chroma[c][coff..],
                            &src.chroma[c][coff..],
                            CHROMA_STRIDE,
                            cw,
                            ch,
                            w.chroma_log2_denom,
                            e0.chroma[c].0,
                            e1.chroma[c].0,
                            e0.chroma[c].1 + e1.chroma[c].1,
                            bd,
                        );
                    }
                }
            }
            _ => {
                let w0 = self.implicit_weight(ref0, ref1);
                let w1 = 64 - w0;
                biweight_block(
                    &mut dst.luma[off..],
                    &src.luma[off..],
                    LUMA_STRIDE,
                    part.w,
                    part.h,
                    5,
                    w0,
                    w1,
                    0,
                    bd,
                );
                if chroma {
                    for c in 0..2 {
                        biweight_block(
                            &mut dst.chroma[c][coff..],
                            &src.chroma[c][coff..],
                            CHROMA_STRIDE,
                            cw,
                            ch,
                            5,
                            w0,
                            w1,
                            0,
                            bd,
                        );
                    }
                }
            }
        }
    }

    fn weight_uni(&self, part: Partition, list: usize, ref_idx: i8, pred: &mut MbPrediction) {
        let WeightMode::Explicit(w) = &self.weights else {
            return;
        };
        let bd = self.bit_depth;
        let e = w.entry(list, ref_idx as usize);
        let off = part.y * LUMA_STRIDE + part.x;
        weight_block(
            &mut pred.luma[off..],
            LUMA_STRIDE,
            part.w,
            part.h,
            w.luma_log2_denom,
            e.luma.0,
            e.luma.1,
            bd,
        );
        if w.use_chroma && self.chroma_format.has_chroma() {
            let coff = self.chroma_row(part.y) * CHROMA_STRIDE + part.x / 2;
            for c in 0..2 {
                weight_block(
                    &mut pred.chroma[c][coff..],
                    CHROMA_STRIDE,
                    part.w / 2,
                    self.chroma_row(part.h),
                    w.chroma_log2_denom,
                    e.chroma[c].0,
                    e.chroma[c].1,
                    bd,
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::fill_rect;
    use crate::params::{ExplicitWeights, SeqParams, WeightEntry};
    use crate::picture::{Picture, SharedPicture};

    fn reference(fill: u8, poc: i32) -> RefPicture<u8> {
        let mut pic: Picture<u8> = Picture::new(&SeqParams::new(2, 2));
        pic.planes[0].data.fill(fill);
        pic.planes[1].data.fill(fill / 2);
        let shared = SharedPicture::new(pic, poc);
        shared.progress().finish();
        RefPicture::short_term(shared)
    }

    fn cache_16x16(refs: [i8; 2], mv: [i16; 2]) -> NeighborCache {
        let mut cache = NeighborCache::default();
        for list in 0..2 {
            fill_rect(&mut cache.ref_idx[list], SCAN8[0], 4, 4, refs[list]);
            fill_rect(&mut cache.mv[list], SCAN8[0], 4, 4, mv);
        }
        cache
    }

    #[test]
    fn test_partitions_layout() {
        let mb_type = MbFlags::PART_16X8 | MbFlags::P0L0 | MbFlags::P1L1;
        let parts = partitions(mb_type, &[MbFlags::empty(); 4]);
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[1].0.n, 8);
        assert_eq!(parts[0].1, [true, false]);
        assert_eq!(parts[1].1, [false, true]);

        let sub = [
            MbFlags::PART_16X16 | MbFlags::P0L0,
            MbFlags::PART_16X8 | MbFlags::P0L0,
            MbFlags::PART_8X16 | MbFlags::P0L0,
            MbFlags::PART_8X8 | MbFlags::P0L0,
        ];
        let parts = partitions(MbFlags::PART_8X8, &sub);
        assert_eq!(parts.len(), 1 + 2 + 2 + 4);
        let last = parts[8].0;
        assert_eq!((last.n, last.x, last.y, last.w), (15, 12, 12, 4));
    }

    #[test]
    fn test_bi_prediction_averages_lists() {
        let mc = MotionCompensator::new(
            [vec![reference(100, 0)], vec![reference(51, 8)]],
            WeightMode::Default,
            4,
            ChromaFormat::Yuv420,
            8,
            2,
        );
        let cache = cache_16x16([0, 0], [0, 0]);
        let mut pred = MbPrediction::default();
        let bi = MbFlags::PART_16X16 | MbFlags::P0L0 | MbFlags::P0L1;
        mc.compensate(&cache, bi, &[MbFlags::empty(); 4], 1, 1, &mut pred)
            .unwrap();
        assert_eq!(pred.luma[0], 76, "(100 + 51 + 1) >> 1");
        assert_eq!(pred.chroma[0][7 * CHROMA_STRIDE + 7], 38, "(50 + 25 + 1) >> 1");
    }

    #[test]
    fn test_explicit_uni_weight() {
        let mut w = ExplicitWeights::flat(1, 0, [1, 0]);
        w.set(
            0,
            0,
            WeightEntry {
                luma: (3, 10),
                chroma: [(1, 0); 2],
            },
        );
        let mc = MotionCompensator::new(
            [vec![reference(40, 0)], Vec::new()],
            WeightMode::Explicit(w),
            4,
            ChromaFormat::Yuv420,
            8,
            2,
        );
        let cache = cache_16x16([0, -1], [4, 0]);
        let mut pred = MbPrediction::default();
        let uni = MbFlags::PART_16X16 | MbFlags::P0L0;
        mc.compensate(&cache, uni, &[MbFlags::empty(); 4], 0, 0, &mut pred)
            .unwrap();
        // (40 * 3 + (10 << 1) + 1) >> 1
        assert_eq!(pred.luma[17], 70);
        assert_eq!(pred.chroma[1][0], 20, "色度权重为默认值时不加权");
    }

    #[test]
    fn test_implicit_weights_apply_to_bi_only() {
        let mc = MotionCompensator::new(
            [vec![reference(100, 0)], vec![reference(20, 8)]],
            WeightMode::Implicit,
            2,
            ChromaFormat::Gray,
            8,
            2,
        );
        let cache = cache_16x16([0, 0], [0, 0]);
        let mut pred = MbPrediction::default();
        let bi = MbFlags::PART_16X16 | MbFlags::P0L0 | MbFlags::P0L1;
        mc.compensate(&cache, bi, &[MbFlags::empty(); 4], 0, 0, &mut pred)
            .unwrap();
        // 当前 POC 更靠近列表 0, 列表 0 权重更大
        let w0 = implicit_weights(2, mc.refs()).unwrap()[0][0];
        assert_eq!(w0, 48);
        assert_eq!(pred.luma[0], (100 * w0 + 20 * (64 - w0) + 32) >> 6);
    }

    #[test]
    fn test_missing_reference_is_corrupted() {
        let mc = MotionCompensator::<u8>::new(
            [Vec::new(), Vec::new()],
            WeightMode::Default,
            0,
            ChromaFormat::Yuv420,
            8,
            1,
        );
        let cache = cache_16x16([0, -1], [0, 0]);
        let mut pred = MbPrediction::default();
        let uni = MbFlags::PART_16X16 | MbFlags::P0L0;
        let err = mc
            .compensate(&cache, uni, &[MbFlags::empty(); 4], 0, 0, &mut pred)
            .unwrap_err();
        assert!(matches!(err, H264Error::CorruptedSyntax { what: "ref_idx", .. }));
    }
}
