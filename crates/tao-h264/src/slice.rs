//! slice 解码循环与图像级调度.
//!
//! 同一 slice 内宏块严格按光栅顺序解码. 一个图像的多个 slice 可在 rayon
//! 线程池上并行执行, 它们之间唯一的同步点是参考图像的行进度.

use std::sync::Arc;

use log::{debug, warn};
use rayon::prelude::*;
use tao_core::BitReader;

use crate::bitstream::SyntaxReader;
use crate::cache::NeighborCache;
use crate::config::DecoderOptions;
use crate::dequant::DequantTables;
use crate::direct::DirectContext;
use crate::error::{H264Error, H264Result, MbDecodeError};
use crate::macroblock::MbInfo;
use crate::mb_type::MbFlags;
use crate::mc::{MbPrediction, MotionCompensator};
use crate::params::{PicParams, SeqParams, SliceParams, SliceType};
use crate::picture::{Picture, RefPicture, SharedPicture};
use crate::recon::reconstruct;
use crate::residual::MbCoeffs;
use crate::sample::Sample;

/// 每个列表允许的最大参考个数
const MAX_REF_COUNT: usize = 32;

/// slice 解码统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SliceStats {
    /// 已解码宏块数 (含跳过宏块)
    pub decoded_mbs: usize,
    pub skipped_mbs: usize,
}

// ============================================================
// 单个 slice
// ============================================================

/// 单个 slice 的解码状态
///
/// 在 slice 开始时创建, 逐宏块推进, slice 结束后丢弃.
pub struct SliceDecoder<T: Sample> {
    pub(crate) sps: SeqParams,
    pub(crate) pps: PicParams,
    pub(crate) slice: SliceParams,
    pub(crate) picture: Arc<SharedPicture<T>>,
    pub(crate) dequant: Arc<DequantTables>,
    pub(crate) mc: MotionCompensator<T>,
    pub(crate) direct: Option<DirectContext<T>>,
    pub(crate) cache: NeighborCache,
    pub(crate) coeffs: MbCoeffs,
    pub(crate) pred: MbPrediction,
    /// 当前量化参数
    pub(crate) qscale: i32,
    /// 剩余的跳过宏块数, `None` 表示下一个宏块前需要读取 mb_skip_run
    pub(crate) skip_run: Option<u32>,
    pub(crate) stats: SliceStats,
    mb_xy: usize,
    report_rows: bool,
}

impl<T: Sample> SliceDecoder<T> {
    /// 创建 slice 解码器
    ///
    /// `refs` 为已排好序的列表 0 与列表 1 参考图像. 创建时把参考列表记入
    /// 当前图像, 供以后以本图像为同位图像的时域直接预测使用.
    pub fn new(
        sps: &SeqParams,
        pps: &PicParams,
        slice: SliceParams,
        picture: Arc<SharedPicture<T>>,
        refs: [Vec<RefPicture<T>>; 2],
    ) -> H264Result<Self> {
        let dequant = Arc::new(DequantTables::new(sps, pps));
        Self::with_dequant(sps, pps, slice, picture, refs, dequant)
    }

    pub(crate) fn with_dequant(
        sps: &SeqParams,
        pps: &PicParams,
        slice: SliceParams,
        picture: Arc<SharedPicture<T>>,
        refs: [Vec<RefPicture<T>>; 2],
        dequant: Arc<DequantTables>,
    ) -> H264Result<Self> {
        sps.validate()?;
        if sps.bit_depth > T::MAX_BIT_DEPTH {
            return Err(H264Error::Unsupported("样本类型容纳不下码流位深"));
        }
        {
            let pic = picture.read();
            if pic.mb_width != sps.mb_width
                || pic.mb_height != sps.mb_height
                || pic.chroma_format != sps.chroma_format
                || pic.bit_depth != sps.bit_depth
            {
                return Err(H264Error::corrupted("picture_layout", pic.mb_count() as i64));
            }
        }
        if slice.first_mb >= sps.mb_count() {
            return Err(H264Error::corrupted("first_mb", slice.first_mb as i64));
        }
        if !(0..=sps.max_qp()).contains(&slice.qp) {
            return Err(H264Error::QuantizerOutOfRange(slice.qp));
        }
        for list in refs.iter().take(slice.slice_type.list_count()) {
            if list.is_empty() || list.len() > MAX_REF_COUNT {
                return Err(H264Error::corrupted("ref_count", list.len() as i64));
            }
        }

        picture.write().slice_refs.insert(
            slice.slice_num,
            std::array::from_fn(|l| refs[l].iter().map(|r| r.picture.id()).collect()),
        );

        let cur_poc = picture.poc();
        let direct = (slice.slice_type == SliceType::B).then(|| {
            DirectContext::new(
                cur_poc,
                &refs,
                slice.direct_spatial_mv_pred,
                sps.direct_8x8_inference,
            )
        });
        let mc = MotionCompensator::new(
            refs,
            slice.weights.clone(),
            cur_poc,
            sps.chroma_format,
            sps.bit_depth,
            sps.mb_height,
        );

        Ok(Self {
            sps: sps.clone(),
            pps: pps.clone(),
            qscale: slice.qp,
            mb_xy: slice.first_mb,
            slice,
            picture,
            dequant,
            mc,
            direct,
            cache: NeighborCache::default(),
            coeffs: MbCoeffs::default(),
            pred: MbPrediction::default(),
            skip_run: None,
            stats: SliceStats::default(),
            report_rows: true,
        })
    }

    /// 是否在每行结束时报告解码进度 (并行 slice 只在整帧结束时报告)
    pub(crate) fn set_report_rows(&mut self, on: bool) {
        self.report_rows = on;
    }

    /// 下一个待解码宏块的坐标
    pub fn mb_position(&self) -> (usize, usize) {
        (self.mb_xy % self.sps.mb_width, self.mb_xy / self.sps.mb_width)
    }

    pub fn stats(&self) -> SliceStats {
        self.stats
    }

    /// 当前量化参数
    pub fn qscale(&self) -> i32 {
        self.qscale
    }

    /// 解码一个宏块并写入图像
    pub fn decode_macroblock(&mut self, br: &mut BitReader) -> Result<(), MbDecodeError> {
        let (mb_x, mb_y) = self.mb_position();
        let at = |source| MbDecodeError { mb_x, mb_y, source };
        if self.mb_xy >= self.sps.mb_count() {
            return Err(at(H264Error::corrupted("mb_xy", self.mb_xy as i64)));
        }
        self.decode_mb_at(br, mb_x, mb_y).map_err(at)?;

        if self.report_rows && mb_x + 1 == self.sps.mb_width {
            self.picture.progress().report(mb_y as i32);
        }
        self.mb_xy += 1;
        self.stats.decoded_mbs += 1;
        Ok(())
    }

    fn decode_mb_at(&mut self, br: &mut BitReader, mb_x: usize, mb_y: usize) -> H264Result<()> {
        let mut mb = MbInfo::new(mb_x, mb_y, self.sps.mb_width);
        self.parse_macroblock(br, &mut mb)?;
        if mb.mb_type.is_inter() {
            self.mc.compensate(
                &self.cache,
                mb.mb_type,
                &mb.sub_mb_type,
                mb_x,
                mb_y,
                &mut self.pred,
            )?;
        }

        let mut pic = self.picture.write();
        self.write_back(&mut pic, &mb);
        reconstruct(
            &mut pic,
            &mb,
            &self.cache,
            &mut self.coeffs,
            &self.pred,
            &self.dequant,
            self.sps.transform_bypass,
        );
        Ok(())
    }

    /// 把宏块的类型, 量化参数, CBP, 非零计数, 运动与预测模式写回图像
    fn write_back(&self, pic: &mut Picture<T>, mb: &MbInfo) {
        let xy = mb.mb_xy;
        pic.mb_type[xy] = mb.mb_type;
        pic.qscale[xy] = mb.qscale as u8;
        pic.cbp[xy] = (mb.cbp | (mb.luma_coded << 12)) as u16;
        pic.slice_table[xy] = self.slice.slice_num;
        if mb.mb_type.contains(MbFlags::INTRA_PCM) {
            // PCM 视为全部系数存在
            pic.non_zero_count[xy] = [16; 48];
        } else {
            self.cache.write_back_non_zero_count(&mut pic.non_zero_count[xy]);
        }
        self.cache.write_back_motion(pic, xy, mb.mb_type);
        if mb.mb_type.contains(MbFlags::INTRA4X4) {
            pic.intra4x4_pred_mode[xy] = mb.intra4x4_modes;
        }
    }

    /// 解码到 slice 数据结束或图像最后一个宏块
    ///
    /// 出错时把图像标记为损坏并返回带坐标的错误, 已写入的宏块保持原样.
    pub fn decode(&mut self, br: &mut BitReader) -> Result<SliceStats, MbDecodeError> {
        let end = rbsp_payload_end(br);
        let mb_count = self.sps.mb_count();
        debug!(
            "H264: slice {} 开始, 类型 {:?}, first_mb={}, qp={}",
            self.slice.slice_num, self.slice.slice_type, self.slice.first_mb, self.slice.qp
        );
        loop {
            if let Err(err) = self.decode_macroblock(br) {
                warn!("H264: {}, slice {} 中止", err, self.slice.slice_num);
                self.picture.mark_corrupted();
                return Err(err);
            }
            if self.mb_xy >= mb_count {
                if br.bits_read() < end {
                    debug!(
                        "H264: slice {} 在图像末尾仍剩余 {} 比特",
                        self.slice.slice_num,
                        end - br.bits_read()
                    );
                }
                break;
            }
            if br.bits_read() >= end && self.skip_run.is_none_or(|run| run == 0) {
                break;
            }
        }
        debug!(
            "H264: slice {} 结束, 宏块 {} (跳过 {})",
            self.slice.slice_num, self.stats.decoded_mbs, self.stats.skipped_mbs
        );
        Ok(self.stats)
    }
}

/// rbsp_stop_one_bit 的位置, 即 slice 数据的有效长度
///
/// 找不到停止位时视全部剩余比特为有效数据.
fn rbsp_payload_end(br: &BitReader) -> usize {
    let start = br.bits_read();
    let total = start + br.bits_left();
    let data = br.data();
    (start..total)
        .rev()
        .find(|&pos| data[pos / 8] >> (7 - pos % 8) & 1 == 1)
        .unwrap_or(total)
}

// ============================================================
// 整个图像
// ============================================================

/// 一个待解码的 slice
#[derive(Debug, Clone)]
pub struct SliceData<'a, T> {
    pub params: SliceParams,
    pub refs: [Vec<RefPicture<T>>; 2],
    /// slice 的 RBSP (已去除防竞争字节)
    pub rbsp: &'a [u8],
    /// slice_data() 在 RBSP 中的起始比特
    pub data_bit_offset: usize,
}

/// 图像解码汇总
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PictureStats {
    pub slices: usize,
    pub failed_slices: usize,
    pub decoded_mbs: usize,
    pub skipped_mbs: usize,
}

impl PictureStats {
    fn add(&mut self, result: &Result<SliceStats, MbDecodeError>) {
        self.slices += 1;
        match result {
            Ok(stats) => {
                self.decoded_mbs += stats.decoded_mbs;
                self.skipped_mbs += stats.skipped_mbs;
            }
            Err(_) => self.failed_slices += 1,
        }
    }
}

fn decode_one<T: Sample>(
    sps: &SeqParams,
    pps: &PicParams,
    picture: &Arc<SharedPicture<T>>,
    dequant: &Arc<DequantTables>,
    slice: SliceData<'_, T>,
    report_rows: bool,
) -> Result<SliceStats, MbDecodeError> {
    let first = slice.params.first_mb;
    let fail = |source| {
        picture.mark_corrupted();
        MbDecodeError {
            mb_x: first % sps.mb_width.max(1),
            mb_y: first / sps.mb_width.max(1),
            source,
        }
    };
    let mut decoder = SliceDecoder::with_dequant(
        sps,
        pps,
        slice.params,
        Arc::clone(picture),
        slice.refs,
        Arc::clone(dequant),
    )
    .map_err(fail)?;
    decoder.set_report_rows(report_rows);
    let mut br = BitReader::new(slice.rbsp);
    br.skip(slice.data_bit_offset as u32).map_err(fail)?;
    decoder.decode(&mut br)
}

/// 解码一个图像的全部 slice
///
/// `options.threads` 为 1 时按顺序解码并逐行报告进度, 否则在 rayon 线程池上
/// 并行解码. 无论成败, 返回前都会把图像进度置为完成, 释放等待本图像的线程.
/// 非严格模式下失败的 slice 只标记图像损坏, 严格模式下返回第一个错误.
pub fn decode_picture<T: Sample>(
    sps: &SeqParams,
    pps: &PicParams,
    picture: &Arc<SharedPicture<T>>,
    slices: Vec<SliceData<'_, T>>,
    options: &DecoderOptions,
) -> Result<PictureStats, MbDecodeError> {
    let dequant = Arc::new(DequantTables::new(sps, pps));
    let results: Vec<Result<SliceStats, MbDecodeError>> = if options.is_parallel() {
        decode_parallel(sps, pps, picture, &dequant, slices, options.threads)
    } else {
        let mut results = Vec::with_capacity(slices.len());
        for slice in slices {
            let result = decode_one(sps, pps, picture, &dequant, slice, true);
            let failed = result.is_err();
            results.push(result);
            if failed && options.strict {
                break;
            }
        }
        results
    };
    picture.progress().finish();

    let mut stats = PictureStats::default();
    for result in &results {
        stats.add(result);
    }
    if stats.failed_slices > 0 {
        warn!(
            "H264: 图像 POC {} 有 {}/{} 个 slice 解码失败",
            picture.poc(),
            stats.failed_slices,
            stats.slices
        );
    }
    if options.strict {
        if let Some(Err(err)) = results.into_iter().find(Result::is_err) {
            return Err(err);
        }
    }
    Ok(stats)
}

fn decode_parallel<T: Sample>(
    sps: &SeqParams,
    pps: &PicParams,
    picture: &Arc<SharedPicture<T>>,
    dequant: &Arc<DequantTables>,
    slices: Vec<SliceData<'_, T>>,
    threads: usize,
) -> Vec<Result<SliceStats, MbDecodeError>> {
    let run = |slices: Vec<SliceData<'_, T>>| -> Vec<Result<SliceStats, MbDecodeError>> {
        slices
            .into_par_iter()
            .map(|slice| decode_one(sps, pps, picture, dequant, slice, false))
            .collect()
    };
    match rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .thread_name(|idx| format!("h264-slice-{idx}"))
        .build()
    {
        Ok(pool) => pool.install(|| run(slices)),
        Err(err) => {
            warn!("H264: 创建 slice 线程池失败, 使用全局线程池: {err}");
            run(slices)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::picture::Picture;
    use tao_core::BitWriter;

    /// Intra16x16 DC 预测, 无残差的宏块
    fn write_i16_dc_mb(bw: &mut BitWriter) {
        bw.write_ue(1); // I_16x16_2_0_0
        bw.write_ue(0); // intra_chroma_pred_mode = DC
        bw.write_se(0); // mb_qp_delta
        bw.write_bit(1); // 亮度 DC coeff_token: 0 个系数
    }

    fn finish_rbsp(mut bw: BitWriter) -> Vec<u8> {
        bw.write_bit(1);
        bw.align_to_byte();
        bw.finish()
    }

    fn new_picture(sps: &SeqParams) -> Arc<SharedPicture<u8>> {
        SharedPicture::new(Picture::new(sps), 0)
    }

    fn no_refs() -> [Vec<RefPicture<u8>>; 2] {
        [Vec::new(), Vec::new()]
    }

    #[test]
    fn test_intra_slice_without_neighbors() {
        let sps = SeqParams::new(1, 1);
        let pps = PicParams::default();
        let picture = new_picture(&sps);
        let mut bw = BitWriter::new();
        write_i16_dc_mb(&mut bw);
        let data = finish_rbsp(bw);

        let slice = SliceParams::new(SliceType::I, 0, 0, 26);
        let mut decoder = SliceDecoder::new(&sps, &pps, slice, Arc::clone(&picture), no_refs())
            .expect("创建 slice 解码器失败");
        let stats = decoder.decode(&mut BitReader::new(&data)).expect("解码失败");

        assert_eq!(stats.decoded_mbs, 1);
        assert_eq!(stats.skipped_mbs, 0);
        assert_eq!(picture.progress().current(), 0, "第一行应已报告完成");
        let pic = picture.read();
        assert!(pic.planes[0].data.iter().all(|&v| v == 128), "无邻居的 DC 预测应为 128");
        assert!(pic.planes[1].data.iter().all(|&v| v == 128));
        assert_eq!(pic.qscale[0], 26);
        assert_eq!(pic.cbp[0], 0);
        assert_eq!(pic.slice_table[0], 0);
        assert!(pic.mb_type[0].contains(MbFlags::INTRA16X16));
        assert_eq!(pic.ref_index[0][0], -1, "帧内宏块不使用列表 0");
    }

    #[test]
    fn test_p_skip_run_covers_slice() {
        let sps = SeqParams::new(2, 1);
        let pps = PicParams::default();
        let mut ref_pic = Picture::<u8>::new(&sps);
        ref_pic.planes[0].data.fill(77);
        let reference = SharedPicture::new(ref_pic, 0);
        reference.progress().finish();

        let picture = SharedPicture::new(Picture::new(&sps), 2);
        let mut bw = BitWriter::new();
        bw.write_ue(2);
        let data = finish_rbsp(bw);

        let slice = SliceParams::new(SliceType::P, 0, 0, 26);
        let refs = [vec![RefPicture::short_term(reference)], Vec::new()];
        let mut decoder = SliceDecoder::new(&sps, &pps, slice, Arc::clone(&picture), refs)
            .expect("创建 slice 解码器失败");
        let stats = decoder.decode(&mut BitReader::new(&data)).expect("解码失败");

        assert_eq!(stats, SliceStats { decoded_mbs: 2, skipped_mbs: 2 });
        let pic = picture.read();
        assert!(pic.planes[0].data.iter().all(|&v| v == 77), "零运动应直接复制参考图像");
        assert!(pic.mb_type[1].is_skip());
        assert_eq!(pic.ref_index[0][..8], [0; 8]);
        assert!(pic.motion_val[0].iter().all(|mv| *mv == [0, 0]));
    }

    #[test]
    fn test_corrupted_mb_type_marks_picture() {
        let sps = SeqParams::new(2, 1);
        let pps = PicParams::default();
        let picture = new_picture(&sps);
        let mut bw = BitWriter::new();
        write_i16_dc_mb(&mut bw);
        bw.write_ue(40);
        let data = finish_rbsp(bw);

        let slice = SliceParams::new(SliceType::I, 0, 0, 26);
        let mut decoder = SliceDecoder::new(&sps, &pps, slice, Arc::clone(&picture), no_refs())
            .expect("创建 slice 解码器失败");
        let err = decoder.decode(&mut BitReader::new(&data)).unwrap_err();

        assert_eq!((err.mb_x, err.mb_y), (1, 0), "错误应带出错宏块坐标");
        assert!(matches!(err.source, H264Error::CorruptedSyntax { what: "mb_type", .. }));
        assert!(picture.is_corrupted());
        assert_eq!(decoder.stats().decoded_mbs, 1, "出错前的宏块保持已解码");
    }

    #[test]
    fn test_new_rejects_bad_parameters() {
        let sps = SeqParams::new(1, 1);
        let pps = PicParams::default();
        let picture = new_picture(&sps);

        let slice = SliceParams::new(SliceType::I, 0, 0, 52);
        let err = SliceDecoder::new(&sps, &pps, slice, Arc::clone(&picture), no_refs())
            .err()
            .expect("qp 越界应失败");
        assert_eq!(err, H264Error::QuantizerOutOfRange(52));

        let slice = SliceParams::new(SliceType::P, 0, 0, 26);
        let err = SliceDecoder::new(&sps, &pps, slice, Arc::clone(&picture), no_refs())
            .err()
            .expect("P slice 缺少参考应失败");
        assert!(matches!(err, H264Error::CorruptedSyntax { what: "ref_count", .. }));

        let slice = SliceParams::new(SliceType::I, 0, 1, 26);
        assert!(SliceDecoder::new(&sps, &pps, slice, picture, no_refs()).is_err());
    }

    #[test]
    fn test_slice_refs_recorded() {
        let sps = SeqParams::new(1, 1);
        let pps = PicParams::default();
        let reference = new_picture(&sps);
        let picture = new_picture(&sps);
        let slice = SliceParams::new(SliceType::P, 3, 0, 26);
        let refs = [vec![RefPicture::short_term(Arc::clone(&reference))], Vec::new()];
        let _decoder = SliceDecoder::new(&sps, &pps, slice, Arc::clone(&picture), refs)
            .expect("创建 slice 解码器失败");
        let pic = picture.read();
        assert_eq!(pic.slice_refs[&3][0], vec![reference.id()]);
        assert!(pic.slice_refs[&3][1].is_empty());
    }

    fn two_slice_picture(
        sps: &SeqParams,
        bad_second: bool,
    ) -> (Vec<u8>, Vec<u8>) {
        let mut bw = BitWriter::new();
        write_i16_dc_mb(&mut bw);
        let first = finish_rbsp(bw);
        let mut bw = BitWriter::new();
        if bad_second {
            bw.write_ue(30);
        } else {
            write_i16_dc_mb(&mut bw);
        }
        let second = finish_rbsp(bw);
        assert_eq!(sps.mb_count(), 2);
        (first, second)
    }

    fn slices<'a>(first: &'a [u8], second: &'a [u8]) -> Vec<SliceData<'a, u8>> {
        vec![
            SliceData {
                params: SliceParams::new(SliceType::I, 0, 0, 26),
                refs: no_refs(),
                rbsp: first,
                data_bit_offset: 0,
            },
            SliceData {
                params: SliceParams::new(SliceType::I, 1, 1, 26),
                refs: no_refs(),
                rbsp: second,
                data_bit_offset: 0,
            },
        ]
    }

    #[test]
    fn test_decode_picture_parallel_slices() {
        let sps = SeqParams::new(1, 2);
        let pps = PicParams::default();
        let picture = new_picture(&sps);
        let (first, second) = two_slice_picture(&sps, false);
        let options = DecoderOptions {
            threads: 2,
            strict: true,
        };

        let stats = decode_picture(&sps, &pps, &picture, slices(&first, &second), &options)
            .expect("并行解码失败");
        assert_eq!(stats.slices, 2);
        assert_eq!(stats.decoded_mbs, 2);
        assert_eq!(stats.failed_slices, 0);
        assert_eq!(picture.progress().current(), i32::MAX, "结束后进度应置为完成");
        let pic = picture.read();
        assert_eq!(pic.slice_table, vec![0, 1]);
        assert!(pic.planes[0].data.iter().all(|&v| v == 128), "跨 slice 的邻居不可用");
    }

    #[test]
    fn test_decode_picture_error_modes() {
        let sps = SeqParams::new(1, 2);
        let pps = PicParams::default();
        let (first, second) = two_slice_picture(&sps, true);

        let picture = new_picture(&sps);
        let stats = decode_picture(
            &sps,
            &pps,
            &picture,
            slices(&first, &second),
            &DecoderOptions::default(),
        )
        .expect("非严格模式不应返回错误");
        assert_eq!(stats.failed_slices, 1);
        assert_eq!(stats.decoded_mbs, 1);
        assert!(picture.is_corrupted());
        assert_eq!(picture.progress().current(), i32::MAX);

        let picture = new_picture(&sps);
        let options = DecoderOptions {
            threads: 1,
            strict: true,
        };
        let err = decode_picture(&sps, &pps, &picture, slices(&first, &second), &options)
            .unwrap_err();
        assert_eq!((err.mb_x, err.mb_y), (0, 1));
        assert_eq!(picture.progress().current(), i32::MAX, "出错时同样释放等待方");
    }

    #[test]
    fn test_rbsp_payload_end() {
        let data = [0b1010_0000, 0b0100_0000];
        let br = BitReader::new(&data);
        assert_eq!(rbsp_payload_end(&br), 9);
        let zeros = [0u8; 2];
        assert_eq!(rbsp_payload_end(&BitReader::new(&zeros)), 16);
    }
}
