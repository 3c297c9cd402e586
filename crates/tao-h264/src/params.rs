//! 解码宏块所需的参数集与 slice 参数.
//!
//! 这些结构由上层的 SPS/PPS/slice header 解析器填写, 宏块层只读取其中的字段.

use crate::error::{H264Error, H264Result};

// ============================================================
// 序列级参数
// ============================================================

/// 色度采样格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChromaFormat {
    /// 单色 (chroma_format_idc = 0)
    Gray,
    /// 4:2:0
    Yuv420,
    /// 4:2:2
    Yuv422,
}

impl ChromaFormat {
    /// 由 chroma_format_idc 构造, 4:4:4 不支持
    pub fn from_idc(idc: u32) -> H264Result<Self> {
        match idc {
            0 => Ok(Self::Gray),
            1 => Ok(Self::Yuv420),
            2 => Ok(Self::Yuv422),
            3 => Err(H264Error::Unsupported("4:4:4 色度格式")),
            _ => Err(H264Error::corrupted("chroma_format_idc", idc)),
        }
    }

    pub fn idc(self) -> u32 {
        match self {
            Self::Gray => 0,
            Self::Yuv420 => 1,
            Self::Yuv422 => 2,
        }
    }

    /// 码流中是否携带色度残差与色度预测模式
    pub fn has_chroma(self) -> bool {
        self != Self::Gray
    }

    /// 每个色度分量的 8x8 块数
    pub fn num_c8x8(self) -> usize {
        match self {
            Self::Yuv422 => 2,
            _ => 1,
        }
    }

    /// 宏块色度高度 (像素). 单色按 4:2:0 尺寸分配色度平面
    pub fn mb_chroma_height(self) -> usize {
        match self {
            Self::Yuv422 => 16,
            _ => 8,
        }
    }

    /// 色度平面垂直方向的下采样位移
    pub fn chroma_y_shift(self) -> u32 {
        match self {
            Self::Yuv422 => 0,
            _ => 1,
        }
    }
}

/// 序列参数 (来自 SPS)
#[derive(Debug, Clone)]
pub struct SeqParams {
    /// 图像宽度 (宏块)
    pub mb_width: usize,
    /// 图像高度 (宏块)
    pub mb_height: usize,
    pub chroma_format: ChromaFormat,
    /// 亮度与色度位深 (8..=14)
    pub bit_depth: u32,
    /// qpprime_y_zero_transform_bypass_flag
    pub transform_bypass: bool,
    /// direct_8x8_inference_flag
    pub direct_8x8_inference: bool,
}

impl SeqParams {
    /// 常用 8 位 4:2:0 序列参数
    pub fn new(mb_width: usize, mb_height: usize) -> Self {
        Self {
            mb_width,
            mb_height,
            chroma_format: ChromaFormat::Yuv420,
            bit_depth: 8,
            transform_bypass: false,
            direct_8x8_inference: true,
        }
    }

    pub fn mb_count(&self) -> usize {
        self.mb_width * self.mb_height
    }

    /// 最大量化参数 51 + 6 * (bit_depth - 8)
    pub fn max_qp(&self) -> i32 {
        51 + self.qp_bd_offset()
    }

    pub fn qp_bd_offset(&self) -> i32 {
        6 * (self.bit_depth as i32 - 8)
    }

    /// 校验宏块层能够处理的参数范围
    pub fn validate(&self) -> H264Result<()> {
        if self.mb_width == 0 || self.mb_height == 0 {
            return Err(H264Error::corrupted("mb_dimensions", 0));
        }
        if !(8..=14).contains(&self.bit_depth) {
            return Err(H264Error::corrupted("bit_depth", self.bit_depth));
        }
        Ok(())
    }
}

// ============================================================
// 图像级参数
// ============================================================

/// 图像参数 (来自 PPS, 缩放矩阵已按 SPS/PPS 回退规则合并)
#[derive(Debug, Clone)]
pub struct PicParams {
    /// transform_8x8_mode_flag
    pub transform_8x8_mode: bool,
    /// constrained_intra_pred_flag
    pub constrained_intra_pred: bool,
    /// Cb / Cr 的 chroma_qp_index_offset
    pub chroma_qp_index_offset: [i32; 2],
    /// 4x4 缩放矩阵, 顺序 Y intra, Cb intra, Cr intra, Y inter, Cb inter, Cr inter, 光栅序
    pub scaling_matrix4: [[u8; 16]; 6],
    /// 8x8 缩放矩阵, 顺序同 4x4, 宏块层只使用 0 (Y intra) 与 3 (Y inter), 光栅序
    pub scaling_matrix8: [[u8; 64]; 6],
}

impl Default for PicParams {
    fn default() -> Self {
        Self {
            transform_8x8_mode: false,
            constrained_intra_pred: false,
            chroma_qp_index_offset: [0, 0],
            scaling_matrix4: [[16; 16]; 6],
            scaling_matrix8: [[16; 64]; 6],
        }
    }
}

// ============================================================
// slice 级参数
// ============================================================

/// slice 类型 (SP/SI 按 P/I 处理)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SliceType {
    I,
    P,
    B,
}

impl SliceType {
    /// 需要解码的参考列表个数
    pub fn list_count(self) -> usize {
        match self {
            Self::I => 0,
            Self::P => 1,
            Self::B => 2,
        }
    }
}

/// 单个参考的显式加权参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeightEntry {
    pub luma: (i32, i32),
    /// Cb, Cr 的 (weight, offset)
    pub chroma: [(i32, i32); 2],
}

/// 显式加权表 (pred_weight_table)
#[derive(Debug, Clone, Default)]
pub struct ExplicitWeights {
    pub luma_log2_denom: u32,
    pub chroma_log2_denom: u32,
    /// 每个列表每个参考一项
    pub entries: [Vec<WeightEntry>; 2],
    /// 是否存在非默认的亮度加权
    pub use_luma: bool,
    /// 是否存在非默认的色度加权
    pub use_chroma: bool,
}

impl ExplicitWeights {
    /// 全部为默认权重的表
    pub fn flat(luma_log2_denom: u32, chroma_log2_denom: u32, ref_count: [usize; 2]) -> Self {
        let entry = WeightEntry {
            luma: (1 << luma_log2_denom, 0),
            chroma: [(1 << chroma_log2_denom, 0); 2],
        };
        Self {
            luma_log2_denom,
            chroma_log2_denom,
            entries: [vec![entry; ref_count[0]], vec![entry; ref_count[1]]],
            use_luma: false,
            use_chroma: false,
        }
    }

    /// 设置某个参考的权重并刷新 use 标志
    pub fn set(&mut self, list: usize, ref_idx: usize, entry: WeightEntry) {
        let luma_def = 1 << self.luma_log2_denom;
        let chroma_def = 1 << self.chroma_log2_denom;
        if entry.luma != (luma_def, 0) {
            self.use_luma = true;
        }
        if entry.chroma.iter().any(|&c| c != (chroma_def, 0)) {
            self.use_chroma = true;
        }
        if let Some(slot) = self.entries[list].get_mut(ref_idx) {
            *slot = entry;
        }
    }

    pub(crate) fn entry(&self, list: usize, ref_idx: usize) -> WeightEntry {
        self.entries[list].get(ref_idx).copied().unwrap_or(WeightEntry {
            luma: (1 << self.luma_log2_denom, 0),
            chroma: [(1 << self.chroma_log2_denom, 0); 2],
        })
    }
}

/// 加权预测方式
#[derive(Debug, Clone, Default)]
pub enum WeightMode {
    /// 普通平均
    #[default]
    Default,
    /// 显式加权 (P: weighted_pred_flag, B: weighted_bipred_idc = 1)
    Explicit(ExplicitWeights),
    /// 隐式加权 (B: weighted_bipred_idc = 2), 权重由 POC 距离推导
    Implicit,
}

/// slice 参数 (来自 slice header)
#[derive(Debug, Clone)]
pub struct SliceParams {
    pub slice_type: SliceType,
    /// 图像内 slice 序号, 用于邻居可用性判断
    pub slice_num: u16,
    /// 第一个宏块的光栅序号
    pub first_mb: usize,
    /// 初始量化参数 (26 + pic_init_qp_minus26 + slice_qp_delta)
    pub qp: i32,
    /// direct_spatial_mv_pred_flag
    pub direct_spatial_mv_pred: bool,
    pub weights: WeightMode,
    /// disable_deblocking_filter_idc, 仅透传给后续去块滤波
    pub deblocking_filter_idc: u32,
}

impl SliceParams {
    pub fn new(slice_type: SliceType, slice_num: u16, first_mb: usize, qp: i32) -> Self {
        Self {
            slice_type,
            slice_num,
            first_mb,
            qp,
            direct_spatial_mv_pred: true,
            weights: WeightMode::Default,
            deblocking_filter_idc: 0,
        }
    }
}
