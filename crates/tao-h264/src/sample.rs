//! 像素样本类型.
//!
//! 8 位码流使用 `u8` 平面, 9~14 位码流使用 `u16` 平面,
//! 所有预测与重建代码对两者泛型实现.

use std::fmt::Debug;

/// 平面像素样本
pub trait Sample: Copy + Default + Debug + PartialEq + Send + Sync + 'static {
    /// 该样本类型能承载的最大位深
    const MAX_BIT_DEPTH: u32;

    /// 由已裁剪的整数构造样本
    fn from_i32(v: i32) -> Self;

    /// 转为整数参与运算
    fn to_i32(self) -> i32;
}

impl Sample for u8 {
    const MAX_BIT_DEPTH: u32 = 8;

    #[inline]
    fn from_i32(v: i32) -> Self {
        v as u8
    }

    #[inline]
    fn to_i32(self) -> i32 {
        i32::from(self)
    }
}

impl Sample for u16 {
    const MAX_BIT_DEPTH: u32 = 14;

    #[inline]
    fn from_i32(v: i32) -> Self {
        v as u16
    }

    #[inline]
    fn to_i32(self) -> i32 {
        i32::from(self)
    }
}

/// 裁剪到 `[0, max]`
#[inline]
pub fn clip_pixel(v: i32, max: i32) -> i32 {
    v.clamp(0, max)
}
