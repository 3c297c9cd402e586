//! CAVLC 宏块语法解析.
//!
//! 解析顺序: 跳过游程, mb_type, (PCM 样本 | 帧内预测模式 | 分区与运动),
//! coded_block_pattern, transform_size_8x8_flag, mb_qp_delta, 残差.
//! 解析期间只持有当前图像的读锁来填充邻域缓存, 写回与重建在
//! [`crate::slice`] 中统一进行.

use tao_core::BitReader;

use crate::bitstream::SyntaxReader;
use crate::cache::{LIST_NOT_USED, Neighbors, PART_NOT_AVAILABLE, fill_rect};
use crate::dsp::intra_pred::{DC_128_PRED8X8, check_intra_pred_mode, check_intra4x4_pred_mode};
use crate::error::{H264Error, H264Result};
use crate::mb_type::{MbFlags, decode_mb_type, decode_sub_mb_type};
use crate::mvpred::{pred_16x8_motion, pred_8x16_motion, pred_motion, pred_pskip_motion};
use crate::params::SliceType;
use crate::residual::{decode_chroma_residual, decode_luma_residual};
use crate::sample::Sample;
use crate::slice::SliceDecoder;
use crate::tables::{
    GOLOMB_TO_INTER_CBP, GOLOMB_TO_INTER_CBP_GRAY, GOLOMB_TO_INTRA4X4_CBP,
    GOLOMB_TO_INTRA4X4_CBP_GRAY, SCAN8, chroma_qp,
};

/// 一个宏块的解析结果, 供运动补偿, 写回与重建使用
#[derive(Debug, Clone)]
pub(crate) struct MbInfo {
    pub mb_x: usize,
    pub mb_y: usize,
    pub mb_xy: usize,
    pub mb_type: MbFlags,
    pub sub_mb_type: [MbFlags; 4],
    /// 语法 CBP: 低 4 位亮度 8x8, 位 4/5 色度 DC/AC
    pub cbp: u32,
    /// 实际含非零系数的亮度 8x8 块
    pub luma_coded: u32,
    pub intra16x16_pred_mode: u8,
    pub chroma_pred_mode: u8,
    /// 可用性修正之前的 Intra4x4 模式, 写回图像供后续宏块预测
    pub intra4x4_modes: [i8; 16],
    pub qscale: i32,
    pub chroma_qp: [i32; 2],
}

impl MbInfo {
    pub fn new(mb_x: usize, mb_y: usize, mb_width: usize) -> Self {
        Self {
            mb_x,
            mb_y,
            mb_xy: mb_x + mb_y * mb_width,
            mb_type: MbFlags::empty(),
            sub_mb_type: [MbFlags::empty(); 4],
            cbp: 0,
            luma_coded: 0,
            intra16x16_pred_mode: 0,
            chroma_pred_mode: DC_128_PRED8X8,
            intra4x4_modes: [2; 16],
            qscale: 0,
            chroma_qp: [0; 2],
        }
    }
}

/// 按候选参考个数读取 ref_idx: 1 个不占比特, 2 个读 1 比特取反, 否则 ue(v)
fn read_ref_idx(br: &mut BitReader, ref_count: usize) -> H264Result<i8> {
    match ref_count {
        0 => Err(H264Error::corrupted("ref_count", 0)),
        1 => Ok(0),
        2 => Ok((br.bit()? ^ 1) as i8),
        _ => {
            let v = br.ue()?;
            if v as usize >= ref_count {
                return Err(H264Error::corrupted("ref_idx", v));
            }
            Ok(v as i8)
        }
    }
}

/// 预测矢量加上码流中的差值
fn read_mvd(br: &mut BitReader, pred: [i16; 2]) -> H264Result<[i16; 2]> {
    let mx = i32::from(pred[0]).wrapping_add(br.se()?);
    let my = i32::from(pred[1]).wrapping_add(br.se()?);
    Ok([mx as i16, my as i16])
}

/// 量化参数越界时回绕一次
fn wrap_qscale(qscale: i32, max_qp: i32) -> H264Result<i32> {
    if (0..=max_qp).contains(&qscale) {
        return Ok(qscale);
    }
    let wrapped = if qscale < 0 {
        qscale + max_qp + 1
    } else {
        qscale - max_qp - 1
    };
    if (0..=max_qp).contains(&wrapped) {
        Ok(wrapped)
    } else {
        Err(H264Error::QuantizerOutOfRange(qscale))
    }
}

impl<T: Sample> SliceDecoder<T> {
    // ============================================================
    // 入口
    // ============================================================

    /// 解析当前位置的宏块 (含跳过游程中的跳过宏块)
    pub(crate) fn parse_macroblock(&mut self, br: &mut BitReader, mb: &mut MbInfo) -> H264Result<()> {
        mb.qscale = self.qscale;
        mb.chroma_qp = self.chroma_qps(self.qscale);

        if self.slice.slice_type != SliceType::I {
            let run = match self.skip_run {
                Some(run) => run,
                None => {
                    let run = br.ue()?;
                    if run as usize > self.sps.mb_count() {
                        return Err(H264Error::corrupted("mb_skip_run", run));
                    }
                    run
                }
            };
            if run > 0 {
                self.skip_run = Some(run - 1);
                return self.parse_skip(mb);
            }
            self.skip_run = None;
        }
        self.parse_coded(br, mb)
    }

    fn chroma_qps(&self, qscale: i32) -> [i32; 2] {
        let offsets = self.pps.chroma_qp_index_offset;
        let bd = self.sps.qp_bd_offset();
        [
            chroma_qp(qscale, offsets[0], bd),
            chroma_qp(qscale, offsets[1], bd),
        ]
    }

    // ============================================================
    // 跳过宏块
    // ============================================================

    /// P_Skip 取中值预测的单一矢量, B_Skip 走直接预测; 均无残差
    fn parse_skip(&mut self, mb: &mut MbInfo) -> H264Result<()> {
        let list_count = self.slice.slice_type.list_count();
        mb.mb_type = if self.slice.slice_type == SliceType::B {
            MbFlags::DIRECT2 | MbFlags::L0L1 | MbFlags::SKIP
        } else {
            MbFlags::PART_16X16 | MbFlags::P0L0 | MbFlags::P1L0 | MbFlags::SKIP
        };
        {
            let pic = self.picture.read();
            let nb = Neighbors::locate(&pic, mb.mb_x, mb.mb_y, self.slice.slice_num);
            self.cache.fill_motion(&pic, &nb, mb.mb_type, list_count);
        }
        self.cache.clear_non_zero_count(true, true);

        if self.slice.slice_type == SliceType::B {
            let direct = self
                .direct
                .as_mut()
                .ok_or(H264Error::corrupted("direct_context", 0))?;
            direct.predict(
                &mut self.cache,
                mb.mb_xy,
                mb.mb_y,
                &mut mb.mb_type,
                &mut mb.sub_mb_type,
            )?;
        } else {
            pred_pskip_motion(&mut self.cache);
        }
        mb.cbp = 0;
        self.stats.skipped_mbs += 1;
        Ok(())
    }

    // ============================================================
    // 编码宏块
    // ============================================================

    fn parse_coded(&mut self, br: &mut BitReader, mb: &mut MbInfo) -> H264Result<()> {
        let slice_type = self.slice.slice_type;
        let info = decode_mb_type(slice_type, br.ue()?)?;
        mb.mb_type = info.flags;
        mb.cbp = u32::from(info.cbp);
        mb.intra16x16_pred_mode = info.pred_mode;

        if mb.mb_type.contains(MbFlags::INTRA_PCM) {
            return self.parse_pcm(br, mb);
        }

        let has_chroma = self.sps.chroma_format.has_chroma();
        {
            let pic = self.picture.read();
            let nb = Neighbors::locate(&pic, mb.mb_x, mb.mb_y, self.slice.slice_num);
            self.cache.fill_non_zero_count(&pic, &nb);
            if mb.mb_type.is_intra() {
                self.cache
                    .fill_intra(&pic, &nb, mb.mb_type, self.pps.constrained_intra_pred);
            } else {
                self.cache
                    .fill_motion(&pic, &nb, mb.mb_type, slice_type.list_count());
            }
        }

        let mut dct8x8_allowed = self.pps.transform_8x8_mode;
        if mb.mb_type.is_intra() {
            self.parse_intra_modes(br, mb, dct8x8_allowed)?;
        } else if info.partition_count == 4 {
            dct8x8_allowed &= self.parse_8x8_partitions(br, mb)?;
        } else if mb.mb_type.is_direct() {
            self.predict_direct(mb)?;
            dct8x8_allowed &= self.sps.direct_8x8_inference;
        } else {
            self.parse_partitions(br, mb)?;
        }

        // coded_block_pattern
        if !mb.mb_type.contains(MbFlags::INTRA16X16) {
            let code = br.ue()?;
            let table: &[u8] = match (has_chroma, mb.mb_type.contains(MbFlags::INTRA4X4)) {
                (true, true) => &GOLOMB_TO_INTRA4X4_CBP,
                (true, false) => &GOLOMB_TO_INTER_CBP,
                (false, true) => &GOLOMB_TO_INTRA4X4_CBP_GRAY,
                (false, false) => &GOLOMB_TO_INTER_CBP_GRAY,
            };
            mb.cbp = table
                .get(code as usize)
                .map(|&c| u32::from(c))
                .ok_or(H264Error::corrupted("cbp", code))?;
        } else if !has_chroma && mb.cbp > 15 {
            return Err(H264Error::corrupted("cbp", mb.cbp));
        }

        if dct8x8_allowed && mb.cbp & 15 != 0 && !mb.mb_type.is_intra() && br.bit()? == 1 {
            mb.mb_type |= MbFlags::TRANSFORM_8X8;
        }

        if mb.cbp == 0 && !mb.mb_type.contains(MbFlags::INTRA16X16) {
            self.cache.clear_non_zero_count(true, true);
            return Ok(());
        }

        let dquant = br.se()?;
        self.qscale = wrap_qscale(self.qscale.wrapping_add(dquant), self.sps.max_qp())?;
        mb.qscale = self.qscale;
        mb.chroma_qp = self.chroma_qps(self.qscale);

        self.coeffs.luma_dc.fill(0);
        mb.luma_coded = decode_luma_residual(
            br,
            &mut self.cache,
            &mut self.coeffs,
            &self.dequant,
            mb.mb_type,
            mb.cbp,
            mb.qscale,
        )?;
        if has_chroma {
            decode_chroma_residual(
                br,
                &mut self.cache,
                &mut self.coeffs,
                &self.dequant,
                self.sps.chroma_format,
                mb.mb_type,
                mb.cbp,
                mb.chroma_qp,
            )?;
        } else {
            self.cache.clear_non_zero_count(false, true);
        }
        Ok(())
    }

    /// I_PCM: 字节对齐后按位深读取原始样本
    fn parse_pcm(&mut self, br: &mut BitReader, mb: &mut MbInfo) -> H264Result<()> {
        br.align_to_byte();
        let bit_depth = self.sps.bit_depth;
        let format = self.sps.chroma_format;
        let chroma_count = if format.has_chroma() {
            8 * format.mb_chroma_height()
        } else {
            0
        };
        let needed = (256 + 2 * chroma_count) * bit_depth as usize;
        if br.bits_left() < needed {
            return Err(H264Error::InsufficientBits {
                needed,
                available: br.bits_left(),
            });
        }
        for v in &mut self.coeffs.mb[..256] {
            *v = br.bits(bit_depth)? as i32;
        }
        for c in 0..2 {
            let base = 256 + 256 * c;
            for v in &mut self.coeffs.mb[base..base + chroma_count] {
                *v = br.bits(bit_depth)? as i32;
            }
        }
        mb.qscale = 0;
        mb.cbp = 0x2f;
        mb.luma_coded = 0xf;
        Ok(())
    }

    // ============================================================
    // 帧内预测模式
    // ============================================================

    fn parse_intra_modes(
        &mut self,
        br: &mut BitReader,
        mb: &mut MbInfo,
        dct8x8_allowed: bool,
    ) -> H264Result<()> {
        let top = self.cache.top_samples_available;
        let left = self.cache.left_samples_available;
        if mb.mb_type.contains(MbFlags::INTRA4X4) {
            if dct8x8_allowed && br.bit()? == 1 {
                mb.mb_type |= MbFlags::TRANSFORM_8X8;
            }
            let step = if mb.mb_type.is_8x8dct() { 4 } else { 1 };
            for i in (0..16).step_by(step) {
                let pred = self.cache.pred_intra_mode(i);
                let mode = if br.bit()? == 1 {
                    pred
                } else {
                    let rem = br.bits(3)? as i8;
                    if rem >= pred { rem + 1 } else { rem }
                };
                if step == 4 {
                    fill_rect(&mut self.cache.intra4x4_pred_mode, SCAN8[i], 2, 2, mode);
                } else {
                    self.cache.intra4x4_pred_mode[SCAN8[i]] = mode;
                }
            }
            self.cache.write_back_intra_pred_mode(&mut mb.intra4x4_modes);
            check_intra4x4_pred_mode(&mut self.cache.intra4x4_pred_mode, top, left)?;
        } else {
            mb.intra16x16_pred_mode = check_intra_pred_mode(top, left, mb.intra16x16_pred_mode)?;
        }

        if self.sps.chroma_format.has_chroma() {
            let mode = u8::try_from(br.ue()?).unwrap_or(u8::MAX);
            mb.chroma_pred_mode = check_intra_pred_mode(top, left, mode)?;
        } else {
            mb.chroma_pred_mode = DC_128_PRED8X8;
        }
        Ok(())
    }

    // ============================================================
    // 运动信息
    // ============================================================

    fn predict_direct(&mut self, mb: &mut MbInfo) -> H264Result<()> {
        let direct = self
            .direct
            .as_mut()
            .ok_or(H264Error::corrupted("direct_context", 0))?;
        direct.predict(
            &mut self.cache,
            mb.mb_xy,
            mb.mb_y,
            &mut mb.mb_type,
            &mut mb.sub_mb_type,
        )
    }

    /// 8x8 分区: 子宏块类型, 参考索引, 各子分区矢量
    ///
    /// 返回子分区是否允许 8x8 变换.
    fn parse_8x8_partitions(&mut self, br: &mut BitReader, mb: &mut MbInfo) -> H264Result<bool> {
        let slice_type = self.slice.slice_type;
        let list_count = slice_type.list_count();
        let mut sub_counts = [0usize; 4];
        for i in 0..4 {
            let (sub, count) = decode_sub_mb_type(slice_type, br.ue()?)?;
            mb.sub_mb_type[i] = sub;
            sub_counts[i] = usize::from(count);
        }

        if slice_type == SliceType::B && mb.sub_mb_type.iter().any(|s| s.is_direct()) {
            self.predict_direct(mb)?;
            for list in 0..2 {
                self.cache.ref_idx[list][SCAN8[4]] = PART_NOT_AVAILABLE;
                self.cache.ref_idx[list][SCAN8[12]] = PART_NOT_AVAILABLE;
            }
        }

        let mut refs = [[LIST_NOT_USED; 4]; 2];
        for (list, list_refs) in refs.iter_mut().enumerate().take(list_count) {
            // P_8x8ref0 不传输参考索引
            let ref_count = if mb.mb_type.contains(MbFlags::REF0) {
                1
            } else {
                self.mc.ref_count(list)
            };
            for (i, sub) in mb.sub_mb_type.iter().enumerate() {
                if !sub.is_direct() && sub.is_dir(0, list) {
                    list_refs[i] = read_ref_idx(br, ref_count)?;
                }
            }
        }

        let mut small = MbFlags::PART_16X8 | MbFlags::PART_8X16 | MbFlags::PART_8X8;
        if !self.sps.direct_8x8_inference {
            small |= MbFlags::DIRECT2;
        }
        let dct8x8_allowed = !mb.sub_mb_type.iter().any(|s| s.intersects(small));

        for list in 0..list_count {
            for i in 0..4 {
                let sub = mb.sub_mb_type[i];
                let s = SCAN8[4 * i];
                if sub.is_direct() {
                    self.cache.ref_idx[list][s] = self.cache.ref_idx[list][s + 1];
                    continue;
                }
                fill_rect(&mut self.cache.ref_idx[list], s, 2, 2, refs[list][i]);
                if !sub.is_dir(0, list) {
                    fill_rect(&mut self.cache.mv[list], s, 2, 2, [0; 2]);
                    continue;
                }
                let block_width = if sub.intersects(MbFlags::PART_16X16 | MbFlags::PART_16X8) {
                    2
                } else {
                    1
                };
                for j in 0..sub_counts[i] {
                    let index = 4 * i + block_width * j;
                    let slot = SCAN8[index];
                    let ref_idx = self.cache.ref_idx[list][slot];
                    let pred = pred_motion(&self.cache, index, block_width, list, ref_idx);
                    let mv = read_mvd(br, pred)?;
                    let slots = &mut self.cache.mv[list];
                    if sub.contains(MbFlags::PART_16X16) {
                        fill_rect(slots, slot, 2, 2, mv);
                    } else if sub.contains(MbFlags::PART_16X8) {
                        slots[slot] = mv;
                        slots[slot + 1] = mv;
                    } else if sub.contains(MbFlags::PART_8X16) {
                        slots[slot] = mv;
                        slots[slot + 8] = mv;
                    } else {
                        slots[slot] = mv;
                    }
                }
            }
        }
        Ok(dct8x8_allowed)
    }

    /// 16x16, 16x8, 8x16 分区: 先读全部参考索引, 再读全部矢量差
    fn parse_partitions(&mut self, br: &mut BitReader, mb: &mut MbInfo) -> H264Result<()> {
        let list_count = self.slice.slice_type.list_count();
        let mb_type = mb.mb_type;
        let s0 = SCAN8[0];

        if mb_type.contains(MbFlags::PART_16X16) {
            for list in 0..list_count {
                if mb_type.is_dir(0, list) {
                    let r = read_ref_idx(br, self.mc.ref_count(list))?;
                    fill_rect(&mut self.cache.ref_idx[list], s0, 4, 4, r);
                }
            }
            for list in 0..list_count {
                if mb_type.is_dir(0, list) {
                    let ref_idx = self.cache.ref_idx[list][s0];
                    let pred = pred_motion(&self.cache, 0, 4, list, ref_idx);
                    let mv = read_mvd(br, pred)?;
                    fill_rect(&mut self.cache.mv[list], s0, 4, 4, mv);
                }
            }
            return Ok(());
        }

        // 16x8 的两个分区上下排列, 8x16 左右排列
        let horizontal = mb_type.contains(MbFlags::PART_16X8);
        let (w, h) = if horizontal { (4, 2) } else { (2, 4) };
        let start = |i: usize| if horizontal { s0 + 16 * i } else { s0 + 2 * i };
        for list in 0..list_count {
            for i in 0..2 {
                let r = if mb_type.is_dir(i, list) {
                    read_ref_idx(br, self.mc.ref_count(list))?
                } else {
                    LIST_NOT_USED
                };
                fill_rect(&mut self.cache.ref_idx[list], start(i), w, h, r);
            }
        }
        for list in 0..list_count {
            for i in 0..2 {
                let mv = if mb_type.is_dir(i, list) {
                    let ref_idx = self.cache.ref_idx[list][start(i)];
                    let pred = if horizontal {
                        pred_16x8_motion(&self.cache, 8 * i, list, ref_idx)
                    } else {
                        pred_8x16_motion(&self.cache, 4 * i, list, ref_idx)
                    };
                    read_mvd(br, pred)?
                } else {
                    [0; 2]
                };
                fill_rect(&mut self.cache.mv[list], start(i), w, h, mv);
            }
        }
        Ok(())
    }
}
