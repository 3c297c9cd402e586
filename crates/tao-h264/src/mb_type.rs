//! 宏块类型与子宏块类型.
//!
//! `mb_type`/`sub_mb_type` 的 ue(v) 值经查表映射为 [`MbFlags`] 与分区数.
//! 子宏块类型复用同一组标志: `PART_16X16` 表示 8x8 子块, `PART_16X8` 表示 8x4,
//! `PART_8X16` 表示 4x8, `PART_8X8` 表示 4x4.

use bitflags::bitflags;

use crate::error::{H264Error, H264Result};
use crate::params::SliceType;

bitflags! {
    /// 宏块类型标志, 同时写入图像的逐宏块类型数组供去块滤波使用
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MbFlags: u32 {
        const INTRA4X4 = 0x0001;
        const INTRA16X16 = 0x0002;
        const INTRA_PCM = 0x0004;
        const PART_16X16 = 0x0008;
        const PART_16X8 = 0x0010;
        const PART_8X16 = 0x0020;
        const PART_8X8 = 0x0040;
        /// B_Direct_16x16 / B_Skip / 直接预测子块
        const DIRECT2 = 0x0100;
        /// P_8x8ref0: 码流中不含 ref_idx, 四个子宏块的参考索引均取 0
        const REF0 = 0x0200;
        const SKIP = 0x0800;
        /// 分区 0 使用列表 0
        const P0L0 = 0x1000;
        const P1L0 = 0x2000;
        const P0L1 = 0x4000;
        const P1L1 = 0x8000;
        const L0 = Self::P0L0.bits() | Self::P1L0.bits();
        const L1 = Self::P0L1.bits() | Self::P1L1.bits();
        const L0L1 = Self::L0.bits() | Self::L1.bits();
        /// transform_size_8x8_flag
        const TRANSFORM_8X8 = 0x0100_0000;
    }
}

impl Default for MbFlags {
    fn default() -> Self {
        Self::empty()
    }
}

impl MbFlags {
    pub fn is_intra(self) -> bool {
        self.intersects(Self::INTRA4X4 | Self::INTRA16X16 | Self::INTRA_PCM)
    }

    /// 帧间宏块 (含直接预测与跳过)
    pub fn is_inter(self) -> bool {
        self.intersects(Self::PART_16X16 | Self::PART_16X8 | Self::PART_8X16 | Self::PART_8X8)
    }

    pub fn is_direct(self) -> bool {
        self.contains(Self::DIRECT2)
    }

    pub fn is_skip(self) -> bool {
        self.contains(Self::SKIP)
    }

    pub fn is_8x8dct(self) -> bool {
        self.contains(Self::TRANSFORM_8X8)
    }

    /// 任一分区使用列表 `list`
    pub fn uses_list(self, list: usize) -> bool {
        self.bits() & (Self::L0.bits() << (2 * list)) != 0
    }

    /// 分区 `part` 使用列表 `list`
    pub fn is_dir(self, part: usize, list: usize) -> bool {
        self.bits() & (Self::P0L0.bits() << (part + 2 * list)) != 0
    }

    /// 按分区形态归类
    pub fn kind(self) -> MbKind {
        if self.contains(Self::INTRA4X4) {
            MbKind::Intra4x4
        } else if self.contains(Self::INTRA16X16) {
            MbKind::Intra16x16
        } else if self.contains(Self::INTRA_PCM) {
            MbKind::IntraPcm
        } else if self.is_direct() {
            MbKind::Direct
        } else if self.contains(Self::PART_16X16) {
            MbKind::Inter16x16
        } else if self.contains(Self::PART_16X8) {
            MbKind::Inter16x8
        } else if self.contains(Self::PART_8X16) {
            MbKind::Inter8x16
        } else if self.contains(Self::PART_8X8) {
            MbKind::Inter8x8
        } else {
            MbKind::Unknown
        }
    }
}

/// 宏块形态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MbKind {
    Intra4x4,
    Intra16x16,
    IntraPcm,
    Inter16x16,
    Inter16x8,
    Inter8x16,
    Inter8x8,
    /// 整宏块直接预测 (B_Skip, B_Direct_16x16)
    Direct,
    /// 尚未解码的宏块
    Unknown,
}

// ============================================================
// 类型表
// ============================================================

/// `mb_type` 解码结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MbTypeInfo {
    pub flags: MbFlags,
    pub partition_count: u8,
    /// Intra16x16 预测模式 (8x8 色度模式编号)
    pub pred_mode: u8,
    /// Intra16x16 隐含的 CBP
    pub cbp: u8,
}

const fn f(bits: u32) -> MbFlags {
    MbFlags::from_bits_retain(bits)
}

const I4: u32 = MbFlags::INTRA4X4.bits();
const I16: u32 = MbFlags::INTRA16X16.bits();
const PCM: u32 = MbFlags::INTRA_PCM.bits();
const S16X16: u32 = MbFlags::PART_16X16.bits();
const S16X8: u32 = MbFlags::PART_16X8.bits();
const S8X16: u32 = MbFlags::PART_8X16.bits();
const S8X8: u32 = MbFlags::PART_8X8.bits();
const D2: u32 = MbFlags::DIRECT2.bits();
const R0: u32 = MbFlags::REF0.bits();
const A0: u32 = MbFlags::P0L0.bits();
const B0: u32 = MbFlags::P1L0.bits();
const A1: u32 = MbFlags::P0L1.bits();
const B1: u32 = MbFlags::P1L1.bits();
const BOTH: u32 = MbFlags::L0L1.bits();

/// I 宏块 (pred_mode, cbp), 序号 1..=24 为 Intra16x16
#[rustfmt::skip]
const I_MB_TYPE_INFO: [(u32, u8, u8); 26] = [
    (I4, 0, 0),
    (I16, 2, 0), (I16, 1, 0), (I16, 0, 0), (I16, 3, 0),
    (I16, 2, 16), (I16, 1, 16), (I16, 0, 16), (I16, 3, 16),
    (I16, 2, 32), (I16, 1, 32), (I16, 0, 32), (I16, 3, 32),
    (I16, 2, 15), (I16, 1, 15), (I16, 0, 15), (I16, 3, 15),
    (I16, 2, 31), (I16, 1, 31), (I16, 0, 31), (I16, 3, 31),
    (I16, 2, 47), (I16, 1, 47), (I16, 0, 47), (I16, 3, 47),
    (PCM, 0, 0),
];

#[rustfmt::skip]
const P_MB_TYPE_INFO: [(u32, u8); 5] = [
    (S16X16 | A0, 1),
    (S16X8 | A0 | B0, 2),
    (S8X16 | A0 | B0, 2),
    (S8X8 | A0 | B0, 4),
    (S8X8 | A0 | B0 | R0, 4),
];

#[rustfmt::skip]
const P_SUB_MB_TYPE_INFO: [(u32, u8); 4] = [
    (S16X16 | A0, 1),
    (S16X8 | A0, 2),
    (S8X16 | A0, 2),
    (S8X8 | A0, 4),
];

#[rustfmt::skip]
const B_MB_TYPE_INFO: [(u32, u8); 23] = [
    (D2 | BOTH, 1),
    (S16X16 | A0, 1),
    (S16X16 | A1, 1),
    (S16X16 | A0 | A1, 1),
    (S16X8 | A0 | B0, 2),
    (S8X16 | A0 | B0, 2),
    (S16X8 | A1 | B1, 2),
    (S8X16 | A1 | B1, 2),
    (S16X8 | A0 | B1, 2),
    (S8X16 | A0 | B1, 2),
    (S16X8 | A1 | B0, 2),
    (S8X16 | A1 | B0, 2),
    (S16X8 | A0 | B0 | B1, 2),
    (S8X16 | A0 | B0 | B1, 2),
    (S16X8 | A1 | B0 | B1, 2),
    (S8X16 | A1 | B0 | B1, 2),
    (S16X8 | A0 | A1 | B0, 2),
    (S8X16 | A0 | A1 | B0, 2),
    (S16X8 | A0 | A1 | B1, 2),
    (S8X16 | A0 | A1 | B1, 2),
    (S16X8 | A0 | A1 | B0 | B1, 2),
    (S8X16 | A0 | A1 | B0 | B1, 2),
    (S8X8 | A0 | A1 | B0 | B1, 4),
];

#[rustfmt::skip]
const B_SUB_MB_TYPE_INFO: [(u32, u8); 13] = [
    (D2, 1),
    (S16X16 | A0, 1),
    (S16X16 | A1, 1),
    (S16X16 | A0 | A1, 1),
    (S16X8 | A0 | B0, 2),
    (S8X16 | A0 | B0, 2),
    (S16X8 | A1 | B1, 2),
    (S8X16 | A1 | B1, 2),
    (S16X8 | A0 | A1 | B0 | B1, 2),
    (S8X16 | A0 | A1 | B0 | B1, 2),
    (S8X8 | A0 | B0, 4),
    (S8X8 | A1 | B1, 4),
    (S8X8 | A0 | A1 | B0 | B1, 4),
];

fn intra_info(value: u32) -> H264Result<MbTypeInfo> {
    let &(bits, pred_mode, cbp) = I_MB_TYPE_INFO
        .get(value as usize)
        .ok_or(H264Error::corrupted("mb_type", value))?;
    Ok(MbTypeInfo {
        flags: f(bits),
        partition_count: 0,
        pred_mode,
        cbp,
    })
}

/// 把 `mb_type` 的 ue(v) 值映射为宏块类型
///
/// P slice 中 ≥ 5、B slice 中 ≥ 23 的值按 I 宏块重新解释.
pub fn decode_mb_type(slice_type: SliceType, value: u32) -> H264Result<MbTypeInfo> {
    let table: &[(u32, u8)] = match slice_type {
        SliceType::I => return intra_info(value),
        SliceType::P => &P_MB_TYPE_INFO,
        SliceType::B => &B_MB_TYPE_INFO,
    };
    match table.get(value as usize) {
        Some(&(bits, count)) => Ok(MbTypeInfo {
            flags: f(bits),
            partition_count: count,
            pred_mode: 0,
            cbp: 0,
        }),
        None => intra_info(value - table.len() as u32),
    }
}

/// 把 `sub_mb_type` 映射为 (子宏块标志, 子分区数)
pub fn decode_sub_mb_type(slice_type: SliceType, value: u32) -> H264Result<(MbFlags, u8)> {
    let table: &[(u32, u8)] = match slice_type {
        SliceType::B => &B_SUB_MB_TYPE_INFO,
        _ => &P_SUB_MB_TYPE_INFO,
    };
    table
        .get(value as usize)
        .map(|&(bits, count)| (f(bits), count))
        .ok_or(H264Error::corrupted("sub_mb_type", value))
}
