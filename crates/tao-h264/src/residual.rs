//! CAVLC 残差解码.
//!
//! 每个 4x4 (或 8x8 的交织子块) 依次解析 coeff_token, 拖尾 ±1 符号,
//! level, total_zeros 与 run_before, 按扫描表反量化写入系数缓冲.

use tao_core::BitReader;

use crate::bitstream::SyntaxReader;
use crate::cache::{NeighborCache, fill_rect};
use crate::dequant::{CQM_INTER_Y, CQM_INTRA_Y, DequantTables};
use crate::error::{H264Error, H264Result};
use crate::mb_type::MbFlags;
use crate::params::ChromaFormat;
use crate::tables::{
    CHROMA_DC_BLOCK_INDEX, CHROMA_DC_SCAN, CHROMA422_DC_SCAN, LUMA_DC_BLOCK_INDEX, SCAN8,
    ZIGZAG_SCAN, ZIGZAG_SCAN_8X8_CAVLC,
};
use crate::vlc::{LEVEL_TAB_BITS, cavlc_tables, fold_level_sign};

/// 预测 nC 到 coeff_token 表序号
const COEFF_TOKEN_TABLE_INDEX: [usize; 17] = [0, 0, 1, 1, 2, 2, 2, 2, 3, 3, 3, 3, 3, 3, 3, 3, 3];

/// suffix_length 递增阈值
const SUFFIX_LIMIT: [u32; 7] = [0, 3, 6, 12, 24, 48, u32::MAX];

/// level_prefix 的最大合法值
const MAX_LEVEL_PREFIX: u32 = 28;

/// 单个宏块的系数缓冲
///
/// 亮度块 `n` 位于 `mb[16n..]`, 8x8 变换时块 `i8x8` 占 `mb[64 * i8x8..]`.
/// 色度分量 `c` 的第 `k` 个 4x4 块位于 `mb[256 + 256c + 16k..]`,
/// 色度 DC 存放在各块的首个系数. Intra16x16 的亮度 DC 单独存放.
#[derive(Debug, Clone)]
pub(crate) struct MbCoeffs {
    pub mb: [i32; 768],
    pub luma_dc: [i32; 16],
}

impl Default for MbCoeffs {
    fn default() -> Self {
        Self {
            mb: [0; 768],
            luma_dc: [0; 16],
        }
    }
}

impl MbCoeffs {
    pub fn clear(&mut self) {
        self.mb.fill(0);
        self.luma_dc.fill(0);
    }
}

/// 读取超出查找表范围的 level_prefix (额外的前导零个数)
fn read_level_prefix(br: &mut BitReader) -> H264Result<u32> {
    let buf = br.show_bits(32);
    if buf == 0 {
        return Err(H264Error::InvalidLevelPrefix(32 + LEVEL_TAB_BITS));
    }
    let zeros = buf.leading_zeros();
    br.skip(zeros + 1)?;
    Ok(zeros)
}

/// prefix >= 15 的长转义: 返回需要叠加到 levelCode 上的值
fn read_long_escape(br: &mut BitReader, prefix: u32) -> H264Result<i32> {
    let mut code = 0i32;
    if prefix >= 16 {
        if prefix > MAX_LEVEL_PREFIX {
            return Err(H264Error::InvalidLevelPrefix(prefix));
        }
        code += (1 << (prefix - 3)) - 4096;
    }
    code += br.bits(prefix - 3)? as i32;
    Ok(code)
}

/// 解码一个残差块, 返回 total_coeff
///
/// `n` 为块编号 (见 [`SCAN8`]), 非零计数写入邻域缓存. `qmul` 为 `None` 时
/// 系数原样写入 (DC 块), 否则按扫描位置反量化. `max_coeff` 为 4/8 时使用
/// 4:2:0/4:2:2 色度 DC 码表.
#[allow(clippy::too_many_arguments)]
pub(crate) fn decode_residual(
    br: &mut BitReader,
    cache: &mut NeighborCache,
    block: &mut [i32],
    n: usize,
    scan: &[u8],
    qmul: Option<&[u32]>,
    max_coeff: usize,
) -> H264Result<u8> {
    let tabs = cavlc_tables();
    let coeff_token = match max_coeff {
        4 => tabs.chroma_dc_coeff_token.decode(br)?,
        8 => tabs.chroma422_dc_coeff_token.decode(br)?,
        _ => {
            let pred_n = if n >= LUMA_DC_BLOCK_INDEX { 0 } else { n };
            let pred = usize::from(cache.pred_non_zero_count(pred_n)).min(16);
            tabs.coeff_token[COEFF_TOKEN_TABLE_INDEX[pred]].decode(br)?
        }
    };
    let total = usize::from(coeff_token >> 2);
    let trailing_ones = usize::from(coeff_token & 3);
    cache.non_zero_count[SCAN8[n]] = total as u8;
    if total == 0 {
        return Ok(0);
    }
    if total > max_coeff {
        return Err(H264Error::corrupted("total_coeff", total as i64));
    }

    // 拖尾 ±1: 1 位符号, 0 为正
    let mut level = [0i32; 16];
    let signs = br.show_bits(3) as i32;
    br.skip(trailing_ones as u32)?;
    level[0] = 1 - ((signs & 4) >> 1);
    level[1] = 1 - (signs & 2);
    level[2] = 1 - ((signs & 1) << 1);

    if trailing_ones < total {
        let mut suffix_length = u32::from(total > 10 && trailing_ones < 3);
        let entry = tabs.level[suffix_length as usize][br.show_bits(LEVEL_TAB_BITS) as usize];
        br.skip(u32::from(entry.len))?;
        if entry.code >= 100 {
            let mut prefix = (entry.code - 100) as u32;
            if prefix == LEVEL_TAB_BITS {
                prefix += read_level_prefix(br)?;
            }
            let mut level_code = if prefix < 14 {
                if suffix_length > 0 {
                    ((prefix << 1) + br.bit()?) as i32
                } else {
                    prefix as i32
                }
            } else if prefix == 14 {
                if suffix_length > 0 {
                    ((prefix << 1) + br.bit()?) as i32
                } else {
                    (prefix + br.bits(4)?) as i32
                }
            } else {
                30 + read_long_escape(br, prefix)?
            };
            if trailing_ones < 3 {
                level_code += 2;
            }
            suffix_length = 2;
            level[trailing_ones] = fold_level_sign(level_code);
        } else {
            let mut v = i32::from(entry.code);
            // 拖尾不足 3 个时首个 level 的幅值至少为 2
            if trailing_ones < 3 {
                v += (v >> 31) | 1;
            }
            level[trailing_ones] = v;
            suffix_length = 1 + u32::from(v.unsigned_abs() > 3);
        }

        for slot in level.iter_mut().take(total).skip(trailing_ones + 1) {
            let entry = tabs.level[suffix_length as usize][br.show_bits(LEVEL_TAB_BITS) as usize];
            br.skip(u32::from(entry.len))?;
            let v = if entry.code < 100 {
                i32::from(entry.code)
            } else {
                let mut prefix = (entry.code - 100) as u32;
                if prefix == LEVEL_TAB_BITS {
                    prefix += read_level_prefix(br)?;
                }
                let level_code = if prefix < 15 {
                    ((prefix << suffix_length) + br.bits(suffix_length)?) as i32
                } else {
                    (15 << suffix_length) + read_long_escape(br, prefix)?
                };
                fold_level_sign(level_code)
            };
            *slot = v;
            suffix_length += u32::from(v.unsigned_abs() > SUFFIX_LIMIT[suffix_length as usize]);
        }
    }

    let mut zeros_left = if total == max_coeff {
        0
    } else {
        let table = match max_coeff {
            4 => &tabs.chroma_dc_total_zeros[total - 1],
            8 => &tabs.chroma422_dc_total_zeros[total - 1],
            _ => &tabs.total_zeros[total - 1],
        };
        i32::from(table.decode(br)?)
    };

    let mut pos = zeros_left as usize + total - 1;
    if pos >= scan.len() {
        return Err(H264Error::corrupted("total_zeros", zeros_left));
    }
    let store = |block: &mut [i32], pos: usize, v: i32| {
        let p = usize::from(scan[pos]);
        block[p] = match qmul {
            Some(q) => v.wrapping_mul(q[p] as i32).wrapping_add(32) >> 6,
            None => v,
        };
    };

    store(block, pos, level[0]);
    for &v in &level[1..total] {
        let run = if zeros_left <= 0 {
            0
        } else if zeros_left < 7 {
            i32::from(tabs.run[zeros_left as usize - 1].decode(br)?)
        } else {
            i32::from(tabs.run7.decode(br)?)
        };
        zeros_left -= run;
        if zeros_left < 0 {
            return Err(H264Error::NegativeZerosLeft(zeros_left));
        }
        pos -= 1 + run as usize;
        store(block, pos, v);
    }
    Ok(total as u8)
}

/// 亮度残差, 返回按 8x8 象限的非零标志 (Intra16x16 AC 存在时为 0xf)
#[allow(clippy::too_many_arguments)]
pub(crate) fn decode_luma_residual(
    br: &mut BitReader,
    cache: &mut NeighborCache,
    coeffs: &mut MbCoeffs,
    dequant: &DequantTables,
    mb_type: MbFlags,
    cbp: u32,
    qscale: i32,
) -> H264Result<u32> {
    if mb_type.contains(MbFlags::INTRA16X16) {
        decode_residual(
            br,
            cache,
            &mut coeffs.luma_dc,
            LUMA_DC_BLOCK_INDEX,
            &ZIGZAG_SCAN,
            None,
            16,
        )?;
        if cbp & 15 == 0 {
            cache.clear_non_zero_count(true, false);
            return Ok(0);
        }
        let qmul = dequant.q4(CQM_INTRA_Y, qscale);
        for index in 0..16 {
            decode_residual(
                br,
                cache,
                &mut coeffs.mb[16 * index..16 * index + 16],
                index,
                &ZIGZAG_SCAN[1..],
                Some(qmul),
                15,
            )?;
        }
        return Ok(0xf);
    }

    let cqm = if mb_type.is_intra() { CQM_INTRA_Y } else { CQM_INTER_Y };
    let mut new_cbp = 0;
    for i8x8 in 0..4 {
        let s = SCAN8[4 * i8x8];
        if cbp & (1 << i8x8) == 0 {
            fill_rect(&mut cache.non_zero_count, s, 2, 2, 0);
            continue;
        }
        if mb_type.is_8x8dct() {
            // 8x8 块的 64 个系数以 4 路交织编码
            let qmul = dequant.q8(cqm, qscale);
            let buf = &mut coeffs.mb[64 * i8x8..64 * i8x8 + 64];
            for i4x4 in 0..4 {
                decode_residual(
                    br,
                    cache,
                    buf,
                    i4x4 + 4 * i8x8,
                    &ZIGZAG_SCAN_8X8_CAVLC[16 * i4x4..16 * i4x4 + 16],
                    Some(qmul),
                    16,
                )?;
            }
            let nnz = &mut cache.non_zero_count;
            nnz[s] += nnz[s + 1] + nnz[s + 8] + nnz[s + 9];
            if nnz[s] != 0 {
                new_cbp |= 1 << i8x8;
            }
        } else {
            let qmul = dequant.q4(cqm, qscale);
            for i4x4 in 0..4 {
                let index = i4x4 + 4 * i8x8;
                let total = decode_residual(
                    br,
                    cache,
                    &mut coeffs.mb[16 * index..16 * index + 16],
                    index,
                    &ZIGZAG_SCAN,
                    Some(qmul),
                    16,
                )?;
                if total != 0 {
                    new_cbp |= 1 << i8x8;
                }
            }
        }
    }
    Ok(new_cbp)
}

/// 色度残差: DC (cbp 位 4/5) 与 AC (cbp 位 5)
#[allow(clippy::too_many_arguments)]
pub(crate) fn decode_chroma_residual(
    br: &mut BitReader,
    cache: &mut NeighborCache,
    coeffs: &mut MbCoeffs,
    dequant: &DequantTables,
    chroma_format: ChromaFormat,
    mb_type: MbFlags,
    cbp: u32,
    chroma_qp: [i32; 2],
) -> H264Result<()> {
    if !chroma_format.has_chroma() {
        return Ok(());
    }
    let num_c8x8 = chroma_format.num_c8x8();
    if cbp & 0x30 != 0 {
        let dc_scan: &[u8] = if num_c8x8 == 2 {
            &CHROMA422_DC_SCAN
        } else {
            &CHROMA_DC_SCAN
        };
        for c in 0..2 {
            let base = 256 + 256 * c;
            decode_residual(
                br,
                cache,
                &mut coeffs.mb[base..base + 256],
                CHROMA_DC_BLOCK_INDEX + c,
                dc_scan,
                None,
                4 * num_c8x8,
            )?;
        }
    }
    if cbp & 0x20 == 0 {
        cache.clear_non_zero_count(false, true);
        return Ok(());
    }
    let inter = if mb_type.is_intra() { 0 } else { 3 };
    for (c, &qp) in chroma_qp.iter().enumerate() {
        let qmul = dequant.q4(c + 1 + inter, qp);
        for k in 0..4 * num_c8x8 {
            let index = 16 + 16 * c + 8 * (k >> 2) + (k & 3);
            let base = 256 + 256 * c + 16 * k;
            decode_residual(
                br,
                cache,
                &mut coeffs.mb[base..base + 16],
                index,
                &ZIGZAG_SCAN[1..],
                Some(qmul),
                15,
            )?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::{PicParams, SeqParams};
    use crate::vlc::test_codes;
    use tao_core::BitWriter;

    fn flat_dequant() -> DequantTables {
        DequantTables::new(&SeqParams::new(1, 1), &PicParams::default())
    }

    /// 邻居均为 0 的缓存 (nC = 0)
    fn zero_cache() -> NeighborCache {
        let mut cache = NeighborCache::default();
        cache.non_zero_count.fill(0);
        cache
    }

    #[test]
    fn test_three_trailing_ones() {
        // total 3, 拖尾 3: +1 -1 +1, 无零系数插入
        let mut bw = BitWriter::new();
        test_codes::coeff_token(&mut bw, 0, 3, 3);
        bw.write_bits(0b010, 3);
        test_codes::total_zeros(&mut bw, 3, 0);
        let data = bw.finish();
        let mut br = BitReader::new(&data);
        let mut cache = zero_cache();
        let mut block = [0i32; 16];
        let total =
            decode_residual(&mut br, &mut cache, &mut block, 0, &ZIGZAG_SCAN, None, 16).unwrap();
        assert_eq!(total, 3);
        assert_eq!(cache.non_zero_count[SCAN8[0]], 3, "非零计数应写入缓存");
        // 逆序写入: level[0] 在扫描位置 2, level[2] 在扫描位置 0
        assert_eq!(block[usize::from(ZIGZAG_SCAN[2])], 1);
        assert_eq!(block[usize::from(ZIGZAG_SCAN[1])], -1);
        assert_eq!(block[usize::from(ZIGZAG_SCAN[0])], 1);
        assert_eq!(block.iter().filter(|&&v| v != 0).count(), 3);
    }

    #[test]
    fn test_zero_block_returns_zero() {
        let mut bw = BitWriter::new();
        test_codes::coeff_token(&mut bw, 0, 0, 0);
        let data = bw.finish();
        let mut br = BitReader::new(&data);
        let mut cache = zero_cache();
        cache.non_zero_count[SCAN8[5]] = 9;
        let mut block = [0i32; 16];
        let total =
            decode_residual(&mut br, &mut cache, &mut block, 5, &ZIGZAG_SCAN, None, 16).unwrap();
        assert_eq!(total, 0);
        assert_eq!(cache.non_zero_count[SCAN8[5]], 0);
        assert_eq!(br.bits_read(), 1, "0 系数块只消耗 coeff_token");
    }

    #[test]
    fn test_total_exceeds_max_coeff() {
        // AC 块最多 15 个系数, 16 个必须报错, 但非零计数先写入
        let mut bw = BitWriter::new();
        test_codes::coeff_token(&mut bw, 0, 16, 3);
        bw.write_bits(0, 32);
        let data = bw.finish();
        let mut br = BitReader::new(&data);
        let mut cache = zero_cache();
        let mut block = [0i32; 16];
        let err = decode_residual(&mut br, &mut cache, &mut block, 0, &ZIGZAG_SCAN[1..], None, 15)
            .unwrap_err();
        assert!(matches!(
            err,
            H264Error::CorruptedSyntax {
                what: "total_coeff",
                ..
            }
        ));
        assert_eq!(cache.non_zero_count[SCAN8[0]], 16);
    }

    #[test]
    fn test_run_before_and_dequant() {
        // 2 个系数: 拖尾 1 (-1), 另一个 level = 2; total_zeros 2, 首个 run 1
        let mut bw = BitWriter::new();
        test_codes::coeff_token(&mut bw, 0, 2, 1);
        bw.write_bit(1); // 拖尾符号: 负
        // suffix_length 0, t1 < 3 时编码值减 2 后 levelCode 0 -> level_prefix 0
        bw.write_bit(1);
        test_codes::total_zeros(&mut bw, 2, 2);
        test_codes::run_before(&mut bw, 2, 1);
        let data = bw.finish();
        let mut br = BitReader::new(&data);
        let mut cache = zero_cache();
        let mut block = [0i32; 16];
        let dq = flat_dequant();
        let qmul = dq.q4(CQM_INTRA_Y, 28);
        let total = decode_residual(
            &mut br,
            &mut cache,
            &mut block,
            0,
            &ZIGZAG_SCAN,
            Some(qmul),
            16,
        )
        .unwrap();
        assert_eq!(total, 2);
        // level[0] = -1 位于扫描位置 3, run 1 后 level[1] = 2 位于扫描位置 1
        let p3 = usize::from(ZIGZAG_SCAN[3]);
        let p1 = usize::from(ZIGZAG_SCAN[1]);
        assert_eq!(block[p3], (-(qmul[p3] as i32) + 32) >> 6);
        assert_eq!(block[p1], (2 * qmul[p1] as i32 + 32) >> 6);
        assert_eq!(block.iter().filter(|&&v| v != 0).count(), 2);
    }

    #[test]
    fn test_level_escape_prefix_15() {
        // 1 个系数, 拖尾 0, level_prefix 15: 15 个 0, 1, 12 位后缀
        let mut bw = BitWriter::new();
        test_codes::coeff_token(&mut bw, 0, 1, 0);
        bw.write_bits(0, 15);
        bw.write_bit(1);
        bw.write_bits(100, 12);
        test_codes::total_zeros(&mut bw, 1, 0);
        let data = bw.finish();
        let mut br = BitReader::new(&data);
        let mut cache = zero_cache();
        let mut block = [0i32; 16];
        decode_residual(&mut br, &mut cache, &mut block, 0, &ZIGZAG_SCAN, None, 16).unwrap();
        // levelCode = 30 + 100 + 2 = 132, 偶数为正: (132 + 2) / 2 = 67
        assert_eq!(block[0], 67);
    }

    #[test]
    fn test_level_prefix_14_four_bit_suffix() {
        // suffix_length 0 时 level_prefix 14 带 4 位后缀
        let mut bw = BitWriter::new();
        test_codes::coeff_token(&mut bw, 0, 1, 0);
        bw.write_bits(0, 14);
        bw.write_bit(1);
        bw.write_bits(5, 4);
        test_codes::total_zeros(&mut bw, 1, 0);
        bw.write_bits(0xA5, 8);
        let data = bw.finish();
        let mut br = BitReader::new(&data);
        let mut cache = zero_cache();
        let mut block = [0i32; 16];
        decode_residual(&mut br, &mut cache, &mut block, 0, &ZIGZAG_SCAN, None, 16).unwrap();
        // levelCode = 14 + 5 + 2 = 21, 奇数为负: -(21 + 1) / 2
        assert_eq!(block[0], -11);
        assert_eq!(br.bits(8).unwrap(), 0xA5, "后缀之后的比特不应被消耗");
    }

    #[test]
    fn test_level_escape_prefix_16() {
        let mut bw = BitWriter::new();
        test_codes::coeff_token(&mut bw, 0, 1, 0);
        bw.write_bits(0, 16);
        bw.write_bit(1);
        bw.write_bits(5, 13);
        test_codes::total_zeros(&mut bw, 1, 0);
        bw.write_bits(0xA5, 8);
        let data = bw.finish();
        let mut br = BitReader::new(&data);
        let mut cache = zero_cache();
        let mut block = [0i32; 16];
        decode_residual(&mut br, &mut cache, &mut block, 0, &ZIGZAG_SCAN, None, 16).unwrap();
        // levelCode = 30 + (1 << 13) - 4096 + 5 + 2 = 4133
        assert_eq!(block[0], -2067);
        assert_eq!(br.bits(8).unwrap(), 0xA5);
    }

    #[test]
    fn test_level_prefix_too_large() {
        let mut bw = BitWriter::new();
        test_codes::coeff_token(&mut bw, 0, 1, 0);
        bw.write_bits(0, 29);
        bw.write_bit(1);
        bw.write_bits(0, 32);
        let data = bw.finish();
        let mut br = BitReader::new(&data);
        let mut cache = zero_cache();
        let mut block = [0i32; 16];
        let err =
            decode_residual(&mut br, &mut cache, &mut block, 0, &ZIGZAG_SCAN, None, 16).unwrap_err();
        assert_eq!(err, H264Error::InvalidLevelPrefix(29));
    }

    #[test]
    fn test_total_zeros_out_of_scan() {
        // AC 块只有 15 个位置, 1 个系数加 15 个零越界
        let mut bw = BitWriter::new();
        test_codes::coeff_token(&mut bw, 0, 1, 1);
        bw.write_bit(0);
        test_codes::total_zeros(&mut bw, 1, 15);
        let data = bw.finish();
        let mut br = BitReader::new(&data);
        let mut cache = zero_cache();
        let mut block = [0i32; 16];
        let err = decode_residual(&mut br, &mut cache, &mut block, 0, &ZIGZAG_SCAN[1..], None, 15)
            .unwrap_err();
        assert!(matches!(err, H264Error::CorruptedSyntax { what: "total_zeros", .. }));
    }

    #[test]
    fn test_chroma_dc_uses_dc_scan() {
        // 色度 DC: 1 个拖尾 +1, total_zeros 3, 落在第 4 个块
        let mut bw = BitWriter::new();
        test_codes::chroma_dc_coeff_token(&mut bw, 1, 1);
        bw.write_bit(0);
        test_codes::chroma_dc_total_zeros(&mut bw, 1, 3);
        let data = bw.finish();
        let mut br = BitReader::new(&data);
        let mut cache = zero_cache();
        let mut block = [0i32; 256];
        decode_residual(
            &mut br,
            &mut cache,
            &mut block,
            CHROMA_DC_BLOCK_INDEX,
            &CHROMA_DC_SCAN,
            None,
            4,
        )
        .unwrap();
        assert_eq!(block[48], 1, "DC 应写入第 4 个 4x4 块的首个系数");
    }

    #[test]
    fn test_luma_residual_cbp_skips_blocks() {
        // cbp = 0b0010: 只有第二个 8x8 象限有码流, 4 个块都为 0 系数
        let mut bw = BitWriter::new();
        for _ in 0..4 {
            test_codes::coeff_token(&mut bw, 0, 0, 0);
        }
        let data = bw.finish();
        let mut br = BitReader::new(&data);
        let mut cache = zero_cache();
        fill_rect(&mut cache.non_zero_count, SCAN8[0], 4, 4, 7);
        let mut coeffs = MbCoeffs::default();
        let dq = flat_dequant();
        let new_cbp = decode_luma_residual(
            &mut br,
            &mut cache,
            &mut coeffs,
            &dq,
            MbFlags::INTRA4X4,
            0b0010,
            26,
        )
        .unwrap();
        assert_eq!(new_cbp, 0);
        assert_eq!(br.bits_read(), 4);
        for n in 0..16 {
            assert_eq!(cache.non_zero_count[SCAN8[n]], 0, "块 {n} 的非零计数应清零");
        }
    }

    #[test]
    fn test_intra16x16_without_ac_clears_luma() {
        let mut bw = BitWriter::new();
        test_codes::coeff_token(&mut bw, 0, 1, 1);
        bw.write_bit(1);
        test_codes::total_zeros(&mut bw, 1, 0);
        let data = bw.finish();
        let mut br = BitReader::new(&data);
        let mut cache = zero_cache();
        fill_rect(&mut cache.non_zero_count, SCAN8[0], 4, 4, 3);
        let mut coeffs = MbCoeffs::default();
        let dq = flat_dequant();
        let new_cbp = decode_luma_residual(
            &mut br,
            &mut cache,
            &mut coeffs,
            &dq,
            MbFlags::INTRA16X16,
            0,
            26,
        )
        .unwrap();
        assert_eq!(new_cbp, 0);
        assert_eq!(coeffs.luma_dc[0], -1, "DC 系数不反量化");
        assert_eq!(cache.non_zero_count[SCAN8[15]], 0);
    }

    #[test]
    fn test_chroma_dc_only_clears_ac_counts() {
        let mut bw = BitWriter::new();
        test_codes::chroma_dc_coeff_token(&mut bw, 0, 0);
        test_codes::chroma_dc_coeff_token(&mut bw, 0, 0);
        let data = bw.finish();
        let mut br = BitReader::new(&data);
        let mut cache = zero_cache();
        fill_rect(&mut cache.non_zero_count, SCAN8[16], 4, 4, 5);
        let mut coeffs = MbCoeffs::default();
        let dq = flat_dequant();
        decode_chroma_residual(
            &mut br,
            &mut cache,
            &mut coeffs,
            &dq,
            ChromaFormat::Yuv420,
            MbFlags::INTRA16X16,
            0x10,
            [26, 26],
        )
        .unwrap();
        assert_eq!(cache.non_zero_count[SCAN8[16]], 0);
        assert_eq!(br.bits_read(), 2);
    }
}
