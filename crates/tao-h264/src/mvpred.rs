//! 运动矢量预测.
//!
//! 所有预测器只读取 [`NeighborCache`], 因此同一套算术适用于宏块边框与宏块内部
//! 已解码的分区: 左邻 `-1`, 上邻 `-8`, 右上 `-8 + 宽度`, 左上 `-9`.

use crate::cache::{NeighborCache, PART_NOT_AVAILABLE, fill_rect};
use crate::tables::SCAN8;

/// 三者取中
#[inline]
pub(crate) fn median3(a: i32, b: i32, c: i32) -> i32 {
    a.max(b).min(a.min(b).max(c))
}

/// 右上邻居 (C), 不可用时退回左上邻居
fn diagonal(cache: &NeighborCache, list: usize, idx: usize, part_width: usize) -> (i8, [i16; 2]) {
    let tr = idx - 8 + part_width;
    let r = cache.ref_idx[list][tr];
    if r != PART_NOT_AVAILABLE {
        (r, cache.mv[list][tr])
    } else {
        (cache.ref_idx[list][idx - 9], cache.mv[list][idx - 9])
    }
}

/// 分区的中值预测
///
/// `n` 为分区左上 4x4 块编号, `part_width` 以 4x4 块为单位.
pub(crate) fn pred_motion(
    cache: &NeighborCache,
    n: usize,
    part_width: usize,
    list: usize,
    ref_idx: i8,
) -> [i16; 2] {
    let idx = SCAN8[n];
    let left_ref = cache.ref_idx[list][idx - 1];
    let top_ref = cache.ref_idx[list][idx - 8];
    let a = cache.mv[list][idx - 1];
    let b = cache.mv[list][idx - 8];
    let (diag_ref, c) = diagonal(cache, list, idx, part_width);

    let matches =
        usize::from(left_ref == ref_idx) + usize::from(top_ref == ref_idx) + usize::from(diag_ref == ref_idx);
    let median = || {
        [
            median3(a[0].into(), b[0].into(), c[0].into()) as i16,
            median3(a[1].into(), b[1].into(), c[1].into()) as i16,
        ]
    };
    match matches {
        0 if top_ref == PART_NOT_AVAILABLE
            && diag_ref == PART_NOT_AVAILABLE
            && left_ref != PART_NOT_AVAILABLE =>
        {
            a
        }
        1 if left_ref == ref_idx => a,
        1 if top_ref == ref_idx => b,
        1 => c,
        _ => median(),
    }
}

/// 16x8 分区: 上分区优先取上邻, 下分区优先取左邻
pub(crate) fn pred_16x8_motion(cache: &NeighborCache, n: usize, list: usize, ref_idx: i8) -> [i16; 2] {
    let neighbor = if n == 0 { SCAN8[0] - 8 } else { SCAN8[8] - 1 };
    if cache.ref_idx[list][neighbor] == ref_idx {
        return cache.mv[list][neighbor];
    }
    pred_motion(cache, n, 4, list, ref_idx)
}

/// 8x16 分区: 左分区优先取左邻, 右分区优先取右上 (或左上) 邻居
pub(crate) fn pred_8x16_motion(cache: &NeighborCache, n: usize, list: usize, ref_idx: i8) -> [i16; 2] {
    if n == 0 {
        let neighbor = SCAN8[0] - 1;
        if cache.ref_idx[list][neighbor] == ref_idx {
            return cache.mv[list][neighbor];
        }
    } else {
        let (r, c) = diagonal(cache, list, SCAN8[4], 2);
        if r == ref_idx {
            return c;
        }
    }
    pred_motion(cache, n, 2, list, ref_idx)
}

/// P_Skip 的运动矢量, 写入整宏块的列表 0 缓存
///
/// 左邻或上邻不可用, 或任一者为参考 0 且零矢量时, 结果为零矢量.
pub(crate) fn pred_pskip_motion(cache: &mut NeighborCache) -> [i16; 2] {
    let s0 = SCAN8[0];
    let top_ref = cache.ref_idx[0][s0 - 8];
    let left_ref = cache.ref_idx[0][s0 - 1];
    let zero_at = |r: i8, mv: [i16; 2]| r == 0 && mv == [0, 0];
    let mv = if top_ref == PART_NOT_AVAILABLE
        || left_ref == PART_NOT_AVAILABLE
        || zero_at(top_ref, cache.mv[0][s0 - 8])
        || zero_at(left_ref, cache.mv[0][s0 - 1])
    {
        [0, 0]
    } else {
        pred_motion(cache, 0, 4, 0, 0)
    };
    fill_rect(&mut cache.ref_idx[0], s0, 4, 4, 0);
    fill_rect(&mut cache.mv[0], s0, 4, 4, mv);
    mv
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::LIST_NOT_USED;

    /// 构造左 (A), 上 (B), 右上 (C) 邻居
    fn cache_with(a: (i8, [i16; 2]), b: (i8, [i16; 2]), c: (i8, [i16; 2])) -> NeighborCache {
        let mut cache = NeighborCache::default();
        let s0 = SCAN8[0];
        cache.ref_idx[0][s0 - 1] = a.0;
        cache.mv[0][s0 - 1] = a.1;
        cache.ref_idx[0][s0 - 8..s0 - 4].fill(b.0);
        cache.mv[0][s0 - 8..s0 - 4].fill(b.1);
        cache.ref_idx[0][s0 - 4] = c.0;
        cache.mv[0][s0 - 4] = c.1;
        cache.ref_idx[0][s0 - 9] = PART_NOT_AVAILABLE;
        cache
    }

    #[test]
    fn test_median3() {
        assert_eq!(median3(1, 5, 3), 3);
        assert_eq!(median3(-4, -4, 9), -4);
        assert_eq!(median3(7, 2, 2), 2);
    }

    #[test]
    fn test_median_prediction() {
        let cache = cache_with((0, [4, 1]), (0, [-2, 8]), (0, [10, 3]));
        assert_eq!(pred_motion(&cache, 0, 4, 0, 0), [4, 3]);
    }

    #[test]
    fn test_single_match_copies_neighbor() {
        let cache = cache_with((1, [4, 1]), (0, [-2, 8]), (1, [10, 3]));
        assert_eq!(pred_motion(&cache, 0, 4, 0, 0), [-2, 8], "只有上邻参考相同");
    }

    #[test]
    fn test_only_left_available() {
        let cache = cache_with(
            (1, [6, -6]),
            (PART_NOT_AVAILABLE, [0, 0]),
            (PART_NOT_AVAILABLE, [0, 0]),
        );
        assert_eq!(pred_motion(&cache, 0, 4, 0, 0), [6, -6], "上方全部不可用时直接取左邻");
    }

    #[test]
    fn test_one_unavailable_is_order_independent() {
        // 只有一个邻居不可用时, 交换另外两个邻居不改变结果
        let x = (0, [3, -1]);
        let y = (0, [9, 4]);
        let none = (PART_NOT_AVAILABLE, [0, 0]);
        let p1 = pred_motion(&cache_with(x, y, none), 0, 4, 0, 0);
        let p2 = pred_motion(&cache_with(y, x, none), 0, 4, 0, 0);
        assert_eq!(p1, p2);
    }

    #[test]
    fn test_diagonal_falls_back_to_topleft() {
        let mut cache = cache_with((0, [1, 1]), (0, [5, 5]), (PART_NOT_AVAILABLE, [0, 0]));
        cache.ref_idx[0][SCAN8[0] - 9] = 0;
        cache.mv[0][SCAN8[0] - 9] = [9, 9];
        assert_eq!(pred_motion(&cache, 0, 4, 0, 0), [5, 5]);
    }

    #[test]
    fn test_partition_shortcuts() {
        let cache = cache_with((2, [7, 7]), (1, [3, 3]), (LIST_NOT_USED, [0, 0]));
        assert_eq!(pred_16x8_motion(&cache, 0, 0, 1), [3, 3], "上分区取上邻");
        assert_eq!(pred_8x16_motion(&cache, 0, 0, 2), [7, 7], "左分区取左邻");
    }

    #[test]
    fn test_pskip_zero_conditions() {
        let mut cache = cache_with((0, [0, 0]), (0, [8, 8]), (0, [8, 8]));
        assert_eq!(pred_pskip_motion(&mut cache), [0, 0], "左邻参考 0 且零矢量");
        let mut cache = cache_with((0, [2, 0]), (0, [8, 8]), (0, [4, 4]));
        assert_eq!(pred_pskip_motion(&mut cache), [4, 4]);
        assert_eq!(cache.mv[0][SCAN8[15]], [4, 4], "整宏块填充");
        assert_eq!(cache.ref_idx[0][SCAN8[15]], 0);
        let mut cache = cache_with((PART_NOT_AVAILABLE, [0, 0]), (0, [8, 8]), (0, [8, 8]));
        assert_eq!(pred_pskip_motion(&mut cache), [0, 0], "左邻不可用");
    }
}
