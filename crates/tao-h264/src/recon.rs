//! 宏块重建: 帧内预测或运动补偿预测, 再叠加反变换后的残差.
//!
//! 反变换按非零计数选择路径: 只有一个系数且为 DC 时走 DC 快速路径,
//! 否则做完整变换. 变换旁路 (无损, qscale 为 0) 时残差直接叠加.

use crate::cache::NeighborCache;
use crate::dequant::{CQM_INTRA_Y, DequantTables};
use crate::dsp::idct::{
    add_pixels, chroma_dc_dequant_idct, chroma422_dc_dequant_idct, idct4_add, idct4_dc_add,
    idct8_add, idct8_dc_add, luma_dc_dequant_idct,
};
use crate::dsp::intra_pred::{pred4x4, pred8x8l, pred16x16, pred_chroma};
use crate::macroblock::MbInfo;
use crate::mb_type::MbFlags;
use crate::mc::{CHROMA_STRIDE, LUMA_STRIDE, MbPrediction};
use crate::picture::{Picture, Plane};
use crate::residual::MbCoeffs;
use crate::sample::Sample;
use crate::tables::{
    CHROMA_DC_BLOCK_INDEX, LUMA_DC_BLOCK_INDEX, RASTER_TO_LUMA_BLOCK, SCAN8, chroma_block_pos,
    luma_block_pos,
};

/// 重建一个宏块并写入图像平面
pub(crate) fn reconstruct<T: Sample>(
    pic: &mut Picture<T>,
    mb: &MbInfo,
    cache: &NeighborCache,
    coeffs: &mut MbCoeffs,
    pred: &MbPrediction,
    dequant: &DequantTables,
    transform_bypass: bool,
) {
    let bypass = transform_bypass && mb.qscale == 0;
    if mb.mb_type.contains(MbFlags::INTRA_PCM) {
        copy_pcm(pic, mb, coeffs);
        coeffs.clear();
        return;
    }

    let x0 = 16 * mb.mb_x;
    let y0 = 16 * mb.mb_y;
    let max = pic.max_sample();
    let bit_depth = pic.bit_depth;

    if mb.mb_type.is_intra() {
        let luma = &mut pic.planes[0];
        if mb.mb_type.contains(MbFlags::INTRA4X4) {
            intra4x4_luma(luma, x0, y0, mb, cache, coeffs, bypass, bit_depth);
        } else {
            pred16x16(luma, x0, y0, mb.intra16x16_pred_mode, bit_depth);
            intra16x16_residual(luma, x0, y0, mb, cache, coeffs, dequant, bypass, max);
        }
    } else {
        copy_prediction(&mut pic.planes[0], x0, y0, 16, 16, &pred.luma, LUMA_STRIDE);
        if mb.cbp & 15 != 0 {
            inter_luma_residual(&mut pic.planes[0], x0, y0, mb, cache, coeffs, bypass, max);
        }
    }

    if !pic.chroma_format.has_chroma() {
        return;
    }
    let c_height = pic.chroma_format.mb_chroma_height();
    let cx = 8 * mb.mb_x;
    let cy = c_height * mb.mb_y;
    for c in 0..2 {
        let plane = &mut pic.planes[1 + c];
        if mb.mb_type.is_intra() {
            pred_chroma(plane, cx, cy, mb.chroma_pred_mode, c_height, bit_depth);
        } else {
            copy_prediction(plane, cx, cy, 8, c_height, &pred.chroma[c], CHROMA_STRIDE);
        }
    }
    if mb.cbp & 0x30 != 0 {
        chroma_residual(pic, mb, cache, coeffs, dequant, bypass);
    }
}

fn copy_prediction<T: Sample>(
    plane: &mut Plane<T>,
    x0: usize,
    y0: usize,
    w: usize,
    h: usize,
    src: &[i32],
    src_stride: usize,
) {
    for y in 0..h {
        let row = &src[y * src_stride..y * src_stride + w];
        for (x, &v) in row.iter().enumerate() {
            plane.set(x0 + x, y0 + y, T::from_i32(v));
        }
    }
}

/// PCM 样本已按光栅序放在系数缓冲中: 亮度 256 个, 随后每个色度分量各一块
fn copy_pcm<T: Sample>(pic: &mut Picture<T>, mb: &MbInfo, coeffs: &MbCoeffs) {
    copy_prediction(&mut pic.planes[0], 16 * mb.mb_x, 16 * mb.mb_y, 16, 16, &coeffs.mb, 16);
    let c_height = pic.chroma_format.mb_chroma_height();
    let (cx, cy) = (8 * mb.mb_x, c_height * mb.mb_y);
    if !pic.chroma_format.has_chroma() {
        let grey = T::from_i32(1 << (pic.bit_depth - 1));
        for plane in &mut pic.planes[1..] {
            for y in cy..cy + c_height {
                for x in cx..cx + 8 {
                    plane.set(x, y, grey);
                }
            }
        }
        return;
    }
    for c in 0..2 {
        let base = 256 + 256 * c;
        copy_prediction(&mut pic.planes[1 + c], cx, cy, 8, c_height, &coeffs.mb[base..], 8);
    }
}

// ============================================================
// 亮度
// ============================================================

#[allow(clippy::too_many_arguments)]
fn intra4x4_luma<T: Sample>(
    plane: &mut Plane<T>,
    x0: usize,
    y0: usize,
    mb: &MbInfo,
    cache: &NeighborCache,
    coeffs: &mut MbCoeffs,
    bypass: bool,
    bit_depth: u32,
) {
    let max = (1 << bit_depth) - 1;
    if mb.mb_type.is_8x8dct() {
        for i in [0, 4, 8, 12] {
            let (bx, by) = luma_block_pos(i);
            let (x, y) = (x0 + bx, y0 + by);
            let mode = cache.intra4x4_pred_mode[SCAN8[i]] as u8;
            let has_topleft = (cache.topleft_samples_available << i) & 0x8000 != 0;
            let has_topright = (cache.topright_samples_available << i) & 0x4000 != 0;
            pred8x8l(plane, x, y, mode, has_topleft, has_topright, bit_depth);
            let nnz = cache.non_zero_count[SCAN8[i]];
            let block = &mut coeffs.mb[16 * i..16 * i + 64];
            add_residual8(plane, x, y, block, nnz, bypass, max);
        }
        return;
    }
    for i in 0..16 {
        let (bx, by) = luma_block_pos(i);
        let (x, y) = (x0 + bx, y0 + by);
        let mode = cache.intra4x4_pred_mode[SCAN8[i]] as u8;
        let has_topright = (cache.topright_samples_available << i) & 0x8000 != 0;
        pred4x4(plane, x, y, mode, has_topright, bit_depth);
        let nnz = cache.non_zero_count[SCAN8[i]];
        let block = &mut coeffs.mb[16 * i..16 * i + 16];
        add_residual4(plane, x, y, block, nnz, bypass, max);
    }
}

/// 4x4 块残差: 非零计数为 0 的块跳过
fn add_residual4<T: Sample>(
    plane: &mut Plane<T>,
    x: usize,
    y: usize,
    block: &mut [i32],
    nnz: u8,
    bypass: bool,
    max: i32,
) {
    if nnz == 0 {
        return;
    }
    if bypass {
        add_pixels(plane, x, y, block, 4, max);
    } else if nnz == 1 && block[0] != 0 {
        idct4_dc_add(plane, x, y, block, max);
    } else {
        idct4_add(plane, x, y, block, max);
    }
}

fn add_residual8<T: Sample>(
    plane: &mut Plane<T>,
    x: usize,
    y: usize,
    block: &mut [i32],
    nnz: u8,
    bypass: bool,
    max: i32,
) {
    if nnz == 0 {
        return;
    }
    if bypass {
        add_pixels(plane, x, y, block, 8, max);
    } else if nnz == 1 && block[0] != 0 {
        idct8_dc_add(plane, x, y, block, max);
    } else {
        idct8_add(plane, x, y, block, max);
    }
}

/// Intra16x16: 亮度 DC 经 Hadamard 变换并入各块, 再逐块反变换
#[allow(clippy::too_many_arguments)]
fn intra16x16_residual<T: Sample>(
    plane: &mut Plane<T>,
    x0: usize,
    y0: usize,
    mb: &MbInfo,
    cache: &NeighborCache,
    coeffs: &mut MbCoeffs,
    dequant: &DequantTables,
    bypass: bool,
    max: i32,
) {
    if cache.non_zero_count[SCAN8[LUMA_DC_BLOCK_INDEX]] != 0 {
        if bypass {
            for (raster, &dc) in coeffs.luma_dc.iter().enumerate() {
                coeffs.mb[16 * RASTER_TO_LUMA_BLOCK[raster]] = dc;
            }
        } else {
            let qmul = dequant.q4(CQM_INTRA_Y, mb.qscale)[0] as i32;
            luma_dc_dequant_idct(&mut coeffs.mb, &coeffs.luma_dc, qmul);
        }
    }
    for i in 0..16 {
        let (bx, by) = luma_block_pos(i);
        let (x, y) = (x0 + bx, y0 + by);
        let nnz = cache.non_zero_count[SCAN8[i]];
        let block = &mut coeffs.mb[16 * i..16 * i + 16];
        if nnz == 0 && block[0] == 0 {
            continue;
        }
        if bypass {
            add_pixels(plane, x, y, block, 4, max);
        } else if nnz != 0 {
            idct4_add(plane, x, y, block, max);
        } else {
            idct4_dc_add(plane, x, y, block, max);
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn inter_luma_residual<T: Sample>(
    plane: &mut Plane<T>,
    x0: usize,
    y0: usize,
    mb: &MbInfo,
    cache: &NeighborCache,
    coeffs: &mut MbCoeffs,
    bypass: bool,
    max: i32,
) {
    if mb.mb_type.is_8x8dct() {
        for i in [0, 4, 8, 12] {
            let (bx, by) = luma_block_pos(i);
            let nnz = cache.non_zero_count[SCAN8[i]];
            let block = &mut coeffs.mb[16 * i..16 * i + 64];
            add_residual8(plane, x0 + bx, y0 + by, block, nnz, bypass, max);
        }
        return;
    }
    for i in 0..16 {
        let (bx, by) = luma_block_pos(i);
        let nnz = cache.non_zero_count[SCAN8[i]];
        let block = &mut coeffs.mb[16 * i..16 * i + 16];
        add_residual4(plane, x0 + bx, y0 + by, block, nnz, bypass, max);
    }
}

// ============================================================
// 色度
// ============================================================

fn chroma_residual<T: Sample>(
    pic: &mut Picture<T>,
    mb: &MbInfo,
    cache: &NeighborCache,
    coeffs: &mut MbCoeffs,
    dequant: &DequantTables,
    bypass: bool,
) {
    let max = pic.max_sample();
    let num_c8x8 = pic.chroma_format.num_c8x8();
    let c_height = pic.chroma_format.mb_chroma_height();
    let (cx, cy) = (8 * mb.mb_x, c_height * mb.mb_y);
    let inter = if mb.mb_type.is_intra() { 0 } else { 3 };

    for c in 0..2 {
        let base = 256 + 256 * c;
        if !bypass && cache.non_zero_count[SCAN8[CHROMA_DC_BLOCK_INDEX + c]] != 0 {
            let block = &mut coeffs.mb[base..base + 256];
            if num_c8x8 == 2 {
                let qmul = dequant.q4(1 + c + inter, mb.chroma_qp[c] + 3)[0] as i32;
                chroma422_dc_dequant_idct(block, qmul);
            } else {
                let qmul = dequant.q4(1 + c + inter, mb.chroma_qp[c])[0] as i32;
                chroma_dc_dequant_idct(block, qmul);
            }
        }
        let plane = &mut pic.planes[1 + c];
        for k in 0..4 * num_c8x8 {
            let (bx, by) = chroma_block_pos(k);
            let nnz = cache.non_zero_count[SCAN8[16 + 16 * c + 8 * (k >> 2) + (k & 3)]];
            let block = &mut coeffs.mb[base + 16 * k..base + 16 * k + 16];
            if nnz == 0 && block[0] == 0 {
                continue;
            }
            let (x, y) = (cx + bx, cy + by);
            if bypass {
                add_pixels(plane, x, y, block, 4, max);
            } else if nnz != 0 {
                idct4_add(plane, x, y, block, max);
            } else {
                idct4_dc_add(plane, x, y, block, max);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::intra_pred::{DC_128_PRED, DC_128_PRED8X8, DC_PRED, VERT_PRED, VERT_PRED8X8};
    use crate::params::{PicParams, SeqParams};

    fn setup() -> (Picture<u8>, DequantTables, NeighborCache, MbCoeffs) {
        let sps = SeqParams::new(2, 2);
        let mut cache = NeighborCache::default();
        cache.non_zero_count.fill(0);
        (
            Picture::new(&sps),
            DequantTables::new(&sps, &PicParams::default()),
            cache,
            MbCoeffs::default(),
        )
    }

    fn info(mb_type: MbFlags, mb_x: usize, mb_y: usize) -> MbInfo {
        let mut mb = MbInfo::new(mb_x, mb_y, 2);
        mb.mb_type = mb_type;
        mb.qscale = 28;
        mb.chroma_qp = [28, 28];
        mb
    }

    #[test]
    fn test_inter_prediction_copied_without_residual() {
        let (mut pic, dq, cache, mut coeffs) = setup();
        let mut pred = MbPrediction::default();
        pred.luma.fill(90);
        pred.chroma[0].fill(30);
        pred.chroma[1].fill(40);
        let mb = info(MbFlags::PART_16X16 | MbFlags::P0L0, 1, 1);
        reconstruct(&mut pic, &mb, &cache, &mut coeffs, &pred, &dq, false);
        assert_eq!(pic.planes[0].at(16, 16), 90);
        assert_eq!(pic.planes[0].at(31, 31), 90);
        assert_eq!(pic.planes[0].at(15, 15), 0, "相邻宏块不应被写入");
        assert_eq!(pic.planes[1].at(8, 8), 30);
        assert_eq!(pic.planes[2].at(15, 15), 40);
    }

    #[test]
    fn test_intra16x16_dc_only_path() {
        let (mut pic, dq, mut cache, mut coeffs) = setup();
        // 所有 DC 相同: Hadamard 后只剩左上, 反变换后均匀分布到 16 个块
        coeffs.luma_dc[0] = 16;
        cache.non_zero_count[SCAN8[LUMA_DC_BLOCK_INDEX]] = 1;
        let mut mb = info(MbFlags::INTRA16X16, 0, 0);
        mb.intra16x16_pred_mode = DC_128_PRED8X8;
        mb.chroma_pred_mode = DC_128_PRED8X8;
        reconstruct(&mut pic, &mb, &cache, &mut coeffs, &MbPrediction::default(), &dq, false);
        let v = pic.planes[0].at(0, 0);
        assert!(v > 128, "正 DC 应抬高预测值: {v}");
        for y in 0..16 {
            for x in 0..16 {
                assert_eq!(pic.planes[0].at(x, y), v, "DC 残差应均匀分布");
            }
        }
        assert!(coeffs.mb.iter().all(|&c| c == 0), "反变换后系数应清零");
    }

    #[test]
    fn test_intra4x4_residual_gated_by_nnz() {
        let (mut pic, dq, mut cache, mut coeffs) = setup();
        for n in 0..16 {
            cache.intra4x4_pred_mode[SCAN8[n]] = DC_128_PRED as i8;
        }
        // 块 0 的非零计数为 0, 即使缓冲中有残留系数也不叠加
        coeffs.mb[0] = 64 * 5;
        // 块 1 为 DC 快速路径
        coeffs.mb[16] = 64 * 3;
        cache.non_zero_count[SCAN8[1]] = 1;
        let mut mb = info(MbFlags::INTRA4X4, 0, 0);
        mb.chroma_pred_mode = DC_128_PRED8X8;
        reconstruct(&mut pic, &mb, &cache, &mut coeffs, &MbPrediction::default(), &dq, false);
        assert_eq!(pic.planes[0].at(0, 0), 128);
        assert_eq!(pic.planes[0].at(4, 0), 131);
        assert_eq!(pic.planes[0].at(7, 3), 131);
        assert_eq!(pic.planes[1].at(0, 0), 128);
    }

    #[test]
    fn test_intra4x4_uses_cached_modes() {
        let (mut pic, dq, mut cache, mut coeffs) = setup();
        for x in 0..32 {
            pic.planes[0].set(x, 15, 200);
        }
        for n in 0..16 {
            cache.intra4x4_pred_mode[SCAN8[n]] = DC_PRED as i8;
        }
        cache.intra4x4_pred_mode[SCAN8[0]] = VERT_PRED as i8;
        let mut mb = info(MbFlags::INTRA4X4, 0, 1);
        mb.chroma_pred_mode = VERT_PRED8X8;
        reconstruct(&mut pic, &mb, &cache, &mut coeffs, &MbPrediction::default(), &dq, false);
        assert_eq!(pic.planes[0].at(0, 19), 200, "垂直预测复制上方样本");
        assert_eq!(pic.planes[1].at(0, 8), 128, "色度垂直预测复制上方灰度");
    }

    #[test]
    fn test_pcm_copies_samples() {
        let (mut pic, dq, cache, mut coeffs) = setup();
        for (i, v) in coeffs.mb[..256].iter_mut().enumerate() {
            *v = i as i32;
        }
        coeffs.mb[256..320].fill(17);
        coeffs.mb[512..576].fill(34);
        let mb = info(MbFlags::INTRA_PCM, 1, 0);
        reconstruct(&mut pic, &mb, &cache, &mut coeffs, &MbPrediction::default(), &dq, false);
        assert_eq!(pic.planes[0].at(16, 0), 0);
        assert_eq!(pic.planes[0].at(31, 15), 255);
        assert_eq!(pic.planes[1].at(8, 0), 17);
        assert_eq!(pic.planes[2].at(15, 7), 34);
    }

    #[test]
    fn test_bypass_adds_raw_residual() {
        let mut sps = SeqParams::new(1, 1);
        sps.transform_bypass = true;
        let dq = DequantTables::new(&sps, &PicParams::default());
        let mut pic: Picture<u8> = Picture::new(&sps);
        let mut cache = NeighborCache::default();
        cache.non_zero_count.fill(0);
        let mut coeffs = MbCoeffs::default();
        coeffs.mb[5] = 7;
        cache.non_zero_count[SCAN8[0]] = 1;
        let mut pred = MbPrediction::default();
        pred.luma.fill(50);
        let mut mb = MbInfo::new(0, 0, 1);
        mb.mb_type = MbFlags::PART_16X16 | MbFlags::P0L0;
        mb.cbp = 1;
        mb.qscale = 0;
        reconstruct(&mut pic, &mb, &cache, &mut coeffs, &pred, &dq, true);
        assert_eq!(pic.planes[0].at(1, 1), 57, "旁路模式残差按光栅位置直接相加");
        assert_eq!(pic.planes[0].at(0, 0), 50);
    }
}
