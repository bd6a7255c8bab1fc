//! 邻域索引.
//!
//! 所有函数都不检查越界: 负方向使用 `wrapping_sub`, 因此越界索引会变成一个极大值,
//! 由调用者通过 `check` / `get` 过滤掉.

use crate::{Idx2d, Idx3d};

/// 获得 `(h, w)` 的 4-邻居索引. 不检查越界.
#[inline]
pub(crate) fn neighbour4((h, w): Idx2d) -> [Idx2d; 4] {
    [
        (h.wrapping_sub(1), w),
        (h.saturating_add(1), w),
        (h, w.wrapping_sub(1)),
        (h, w.saturating_add(1)),
    ]
}

/// 获得 `(h, w)` 的 8-邻居索引. 不检查越界.
#[inline]
pub(crate) fn neighbour8((h, w): Idx2d) -> [Idx2d; 8] {
    [
        (h.wrapping_sub(1), w.wrapping_sub(1)),
        (h.wrapping_sub(1), w),
        (h.wrapping_sub(1), w.saturating_add(1)),
        (h, w.wrapping_sub(1)),
        (h, w.saturating_add(1)),
        (h.saturating_add(1), w.wrapping_sub(1)),
        (h.saturating_add(1), w),
        (h.saturating_add(1), w.saturating_add(1)),
    ]
}

/// 按 Zhang-Suen 细化算法的习惯顺序获得 8-邻居:
/// P2 (上), P3 (右上), P4 (右), P5 (右下), P6 (下), P7 (左下), P8 (左), P9 (左上).
/// 不检查越界.
#[inline]
pub(crate) fn neighbour8_clockwise((h, w): Idx2d) -> [Idx2d; 8] {
    [
        (h.wrapping_sub(1), w),
        (h.wrapping_sub(1), w.saturating_add(1)),
        (h, w.saturating_add(1)),
        (h.saturating_add(1), w.saturating_add(1)),
        (h.saturating_add(1), w),
        (h.saturating_add(1), w.wrapping_sub(1)),
        (h, w.wrapping_sub(1)),
        (h.wrapping_sub(1), w.wrapping_sub(1)),
    ]
}

/// 获得 `(z, h, w)` 的 26-邻居索引. 不检查越界.
pub(crate) fn neighbour26((z, h, w): Idx3d) -> impl Iterator<Item = Idx3d> {
    const STEPS: [isize; 3] = [-1, 0, 1];
    STEPS.into_iter().flat_map(move |dz| {
        STEPS.into_iter().flat_map(move |dh| {
            STEPS
                .into_iter()
                .filter(move |&dw| (dz, dh, dw) != (0, 0, 0))
                .map(move |dw| {
                    (
                        z.wrapping_add_signed(dz),
                        h.wrapping_add_signed(dh),
                        w.wrapping_add_signed(dw),
                    )
                })
        })
    })
}
