//! 反量化系数表.
//!
//! 按 (缩放矩阵, qp) 预先展开每个系数位置的乘数, 残差解码时直接以
//! `(level * qmul[pos] + 32) >> 6` 反量化. 表项均为光栅序.

use crate::params::{PicParams, SeqParams};
use crate::tables::{DEQUANT4_COEFF_INIT, DEQUANT8_COEFF_INIT, DEQUANT8_COEFF_INIT_SCAN};

/// 4x4 表的列表序号: 0..3 为帧内 Y/Cb/Cr, 3..6 为帧间 Y/Cb/Cr
pub const CQM_INTRA_Y: usize = 0;
pub const CQM_INTER_Y: usize = 3;

/// 一个 PPS 对应的完整反量化表
#[derive(Debug, Clone)]
pub struct DequantTables {
    coeff4: Vec<Vec<[u32; 16]>>,
    coeff8: Vec<Vec<[u32; 64]>>,
}

impl DequantTables {
    pub fn new(sps: &SeqParams, pps: &PicParams) -> Self {
        let max_qp = sps.max_qp() as usize;
        let mut coeff4 = Vec::with_capacity(6);
        let mut coeff8 = Vec::with_capacity(6);
        for list in 0..6 {
            let m4 = &pps.scaling_matrix4[list];
            let m8 = &pps.scaling_matrix8[list];
            let mut t4 = vec![[0u32; 16]; max_qp + 1];
            let mut t8 = vec![[0u32; 64]; max_qp + 1];
            for q in 0..=max_qp {
                let shift = q / 6;
                let idx = q % 6;
                for x in 0..16 {
                    let class = (x & 1) + ((x >> 2) & 1);
                    t4[q][x] = (DEQUANT4_COEFF_INIT[idx][class] * u32::from(m4[x])) << (shift + 2);
                }
                for x in 0..64 {
                    let class = DEQUANT8_COEFF_INIT_SCAN[((x >> 1) & 12) | (x & 3)];
                    t8[q][x] = (DEQUANT8_COEFF_INIT[idx][class] * u32::from(m8[x])) << shift;
                }
            }
            // 无损模式下 qp 0 的系数原样通过
            if sps.transform_bypass {
                t4[0] = [1 << 6; 16];
                t8[0] = [1 << 6; 64];
            }
            coeff4.push(t4);
            coeff8.push(t8);
        }
        Self { coeff4, coeff8 }
    }

    /// 4x4 乘数表, `qp` 必须位于 `[0, max_qp]`
    pub fn q4(&self, list: usize, qp: i32) -> &[u32; 16] {
        &self.coeff4[list][qp as usize]
    }

    /// 8x8 乘数表
    pub fn q8(&self, list: usize, qp: i32) -> &[u32; 64] {
        &self.coeff8[list][qp as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flat_dequant_values() {
        let sps = SeqParams::new(1, 1);
        let t = DequantTables::new(&sps, &PicParams::default());
        // flat 16, qp 0: 10 * 16 << 2
        assert_eq!(t.q4(CQM_INTRA_Y, 0)[0], 640);
        assert_eq!(t.q4(CQM_INTRA_Y, 0)[1], 13 * 16 * 4);
        assert_eq!(t.q4(CQM_INTRA_Y, 0)[5], 16 * 16 * 4);
        // qp 6 翻倍
        assert_eq!(t.q4(CQM_INTER_Y, 6)[0], 1280);
        assert_eq!(t.q8(CQM_INTRA_Y, 0)[0], 20 * 16);
        assert_eq!(t.q8(CQM_INTRA_Y, 0)[9], 18 * 16);
    }

    #[test]
    fn test_bypass_qp0_is_identity() {
        let mut sps = SeqParams::new(1, 1);
        sps.transform_bypass = true;
        let t = DequantTables::new(&sps, &PicParams::default());
        assert!(t.q4(1, 0).iter().all(|&v| v == 64), "qp 0 应为单位乘数");
        assert_eq!(t.q4(1, 1)[0], 11 * 16 * 4, "qp 1 不受影响");
    }

    #[test]
    fn test_high_bit_depth_range() {
        let mut sps = SeqParams::new(1, 1);
        sps.bit_depth = 10;
        let t = DequantTables::new(&sps, &PicParams::default());
        // 63 = 6 * 10 + 3
        assert_eq!(t.q4(0, 63)[0], (14 * 16) << (10 + 2));
    }
}
