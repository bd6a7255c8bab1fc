use crate::Idx2d;

/// 行优先索引迭代器, 可限定在一个矩形窗口内.
///
/// 与 `(0..h).flat_map(|a| (0..w).map(move |b| (a, b)))` 等价, 但占用的空间更小,
/// 且能直接从任意左上角开始.
#[derive(Debug, Clone)]
pub struct PosIter {
    cur_h: usize,
    cur_w: usize,
    top: usize,
    left: usize,
    bottom: usize,
    right: usize,
}

impl PosIter {
    /// 迭代 `(0, 0)` 到 `(h, w)` (不含) 的所有索引.
    #[inline]
    pub fn new((h, w): Idx2d) -> Self {
        Self::window((0, 0), (h, w))
    }

    /// 迭代以 `(top, left)` 为左上角, 大小为 `(h, w)` 的窗口内的所有索引.
    #[inline]
    pub fn window((top, left): Idx2d, (h, w): Idx2d) -> Self {
        Self {
            cur_h: top,
            cur_w: left,
            top,
            left,
            bottom: top + h,
            right: left + w,
        }
    }
}

impl Iterator for PosIter {
    type Item = Idx2d;

    fn next(&mut self) -> Option<Self::Item> {
        if self.top == self.bottom || self.left == self.right || self.cur_h == self.bottom {
            return None;
        }
        let ret_pos = (self.cur_h, self.cur_w);
        if self.cur_w + 1 == self.right {
            self.cur_w = self.left;
            self.cur_h += 1;
        } else {
            self.cur_w += 1;
        }
        Some(ret_pos)
    }
}

#[cfg(test)]
mod completeness_tests {
    use super::PosIter;
    use crate::Idx2d;

    fn pos_iter_builtin((top, left): Idx2d, (h, w): Idx2d) -> impl Iterator<Item = Idx2d> {
        (top..top + h).flat_map(move |first| (left..left + w).map(move |second| (first, second)))
    }

    #[test]
    fn test_pos_iter() {
        for i in 0..=4 {
            for j in 0..=4 {
                let tup = (i, j);
                assert!(Iterator::eq(pos_iter_builtin((0, 0), tup), PosIter::new(tup)));
            }
        }
    }

    #[test]
    fn test_window_iter() {
        for (top, left) in [(0, 0), (2, 3), (7, 1)] {
            for h in 0..=3 {
                for w in 0..=3 {
                    assert!(Iterator::eq(
                        pos_iter_builtin((top, left), (h, w)),
                        PosIter::window((top, left), (h, w))
                    ));
                }
            }
        }
    }
}
