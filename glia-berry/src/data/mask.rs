use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::ops::{Index, IndexMut};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use ndarray::{s, Array2, ArrayView2};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use super::{Calibration, PosIter};
use crate::consts::gray::*;
use crate::consts::ElemType;
use crate::eight::{neighbour4, neighbour8};
use crate::{Area2d, Areas2d, Idx2d, Predicate};

/// 轴对齐的矩形包围盒. 所有边界都以像素索引表示, 下/右边界不包含在内.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct BoundingBox {
    top: usize,
    left: usize,
    height: usize,
    width: usize,
}

impl BoundingBox {
    /// 直接初始化.
    #[inline]
    pub const fn new((top, left): Idx2d, (height, width): Idx2d) -> Self {
        Self {
            top,
            left,
            height,
            width,
        }
    }

    /// 获得包含 `it` 中所有索引的最小包围盒. 若 `it` 为空则返回 `None`.
    pub fn from_points<I: IntoIterator<Item = Idx2d>>(it: I) -> Option<Self> {
        let mut it = it.into_iter();
        let (h0, w0) = it.next()?;
        let (mut top, mut left, mut bottom, mut right) = (h0, w0, h0, w0);
        for (h, w) in it {
            top = top.min(h);
            left = left.min(w);
            bottom = bottom.max(h);
            right = right.max(w);
        }
        Some(Self::new((top, left), (bottom - top + 1, right - left + 1)))
    }

    /// 左上角索引.
    #[inline]
    pub fn origin(&self) -> Idx2d {
        (self.top, self.left)
    }

    /// 包围盒形状 (高, 宽).
    #[inline]
    pub fn shape(&self) -> Idx2d {
        (self.height, self.width)
    }

    /// 上边界 (包含).
    #[inline]
    pub fn top(&self) -> usize {
        self.top
    }

    /// 左边界 (包含).
    #[inline]
    pub fn left(&self) -> usize {
        self.left
    }

    /// 下边界 (不包含).
    #[inline]
    pub fn bottom(&self) -> usize {
        self.top + self.height
    }

    /// 右边界 (不包含).
    #[inline]
    pub fn right(&self) -> usize {
        self.left + self.width
    }

    /// 包围盒是否包含 `(h, w)`.
    #[inline]
    pub fn contains(&self, (h, w): Idx2d) -> bool {
        (self.top..self.bottom()).contains(&h) && (self.left..self.right()).contains(&w)
    }

    /// 包围盒中心 (向下取整).
    #[inline]
    pub fn center(&self) -> Idx2d {
        (self.top + self.height / 2, self.left + self.width / 2)
    }

    /// 以行优先规则迭代包围盒内的所有索引.
    #[inline]
    pub fn pos_iter(&self) -> PosIter {
        PosIter::window(self.origin(), self.shape())
    }
}

/// 拥有所有权的 2D 二值掩膜, 包括掩膜数据和标定.
///
/// 像素值只有 [`BACKGROUND`] 和 [`FOREGROUND`] 两种. 由阈值化等操作生成,
/// 生成后不再修改; 所有变换都返回新的掩膜.
#[derive(Debug, Clone, PartialEq)]
pub struct Mask {
    data: Array2<u8>,
    calibration: Calibration,
}

impl Index<Idx2d> for Mask {
    type Output = u8;

    #[inline]
    fn index(&self, index: Idx2d) -> &Self::Output {
        &self.data[index]
    }
}

impl IndexMut<Idx2d> for Mask {
    #[inline]
    fn index_mut(&mut self, index: Idx2d) -> &mut Self::Output {
        &mut self.data[index]
    }
}

impl Mask {
    /// 从任意 `u8` 数据初始化. 所有非零像素都会被规范化为 [`FOREGROUND`].
    pub fn new(mut data: Array2<u8>, calibration: Calibration) -> Self {
        data.mapv_inplace(|p| if is_foreground(p) { FOREGROUND } else { BACKGROUND });
        Self { data, calibration }
    }

    /// 创建全背景掩膜.
    #[inline]
    pub fn background(shape: Idx2d, calibration: Calibration) -> Self {
        Self {
            data: Array2::from_elem(shape, BACKGROUND),
            calibration,
        }
    }

    /// 以谓词 `f` 逐像素决定前景.
    pub fn from_fn(shape: Idx2d, calibration: Calibration, mut f: impl FnMut(Idx2d) -> bool) -> Self {
        let data = Array2::from_shape_fn(shape, |pos| ElemType::from(f(pos)).gray());
        Self { data, calibration }
    }

    /// 以 `it` 给出的所有索引为前景创建掩膜. 越界索引会被忽略.
    pub fn from_positions<I: IntoIterator<Item = Idx2d>>(
        shape: Idx2d,
        calibration: Calibration,
        it: I,
    ) -> Self {
        let mut ans = Self::background(shape, calibration);
        ans.fill_batch(it, FOREGROUND);
        ans
    }

    /// 获得底层数据的一份不可变 shallow copy.
    #[inline]
    pub fn data(&self) -> ArrayView2<'_, u8> {
        self.data.view()
    }

    /// 直接获得底层数据.
    #[inline]
    pub fn into_raw(self) -> Array2<u8> {
        self.data
    }

    /// 标定.
    #[inline]
    pub fn calibration(&self) -> &Calibration {
        &self.calibration
    }

    /// 图像的分辨率 (高, 宽).
    #[inline]
    pub fn shape(&self) -> Idx2d {
        self.data.dim()
    }

    /// 获得图像的高.
    #[inline]
    pub fn height(&self) -> usize {
        self.shape().0
    }

    /// 获得图像的宽.
    #[inline]
    pub fn width(&self) -> usize {
        self.shape().1
    }

    /// 判断一个索引是否合法 (未越界).
    #[inline]
    pub fn check(&self, (h, w): Idx2d) -> bool {
        let (h_len, w_len) = self.shape();
        h < h_len && w < w_len
    }

    /// 获取给定位置 (高, 宽) 的像素值. 越界时返回 `None`.
    #[inline]
    pub fn get(&self, pos: Idx2d) -> Option<&u8> {
        self.data.get(pos)
    }

    /// 给定位置是否为前景. 越界时返回 `false`.
    #[inline]
    pub fn is_foreground_at(&self, pos: Idx2d) -> bool {
        matches!(self.get(pos), Some(&p) if is_foreground(p))
    }

    /// 该图是否为全背景图?
    #[inline]
    pub fn is_background(&self) -> bool {
        self.data.iter().copied().all(is_background)
    }

    /// 统计前景像素个数.
    #[inline]
    pub fn count_foreground(&self) -> usize {
        self.data.iter().filter(|&&p| is_foreground(p)).count()
    }

    /// 前景像素的实际总面积.
    #[inline]
    pub fn foreground_area(&self) -> f64 {
        self.count_foreground() as f64 * self.calibration.pixel_area()
    }

    /// 以行优先规则, 获取能迭代图像所有索引的迭代器.
    #[inline]
    pub fn pos_iter(&self) -> PosIter {
        PosIter::new(self.shape())
    }

    /// 以行优先规则, 获取能迭代图像所有 `(索引, 像素值)` 的迭代器.
    #[inline]
    pub fn indexed_iter(&self) -> impl Iterator<Item = (Idx2d, &u8)> {
        self.data.indexed_iter()
    }

    /// 以行优先规则收集所有前景像素的索引.
    pub fn foreground_pos<B: FromIterator<Idx2d>>(&self) -> B {
        self.indexed_iter()
            .filter_map(|(pos, &p)| is_foreground(p).then_some(pos))
            .collect()
    }

    /// 判断一个索引是否位于图像的边缘.
    #[inline]
    pub fn is_at_border(&self, (h, w): Idx2d) -> bool {
        h == 0
            || h.saturating_add(1) == self.height()
            || w == 0
            || w.saturating_add(1) == self.width()
    }

    /// 按照 4-相邻规则获取所有满足谓词 `pred` 的区域.
    #[inline]
    pub fn areas4(&self, pred: Predicate) -> Areas2d {
        self.areas_from_local(self.pos_iter(), pred, neighbour4)
    }

    /// 按照 8-相邻规则获取所有满足谓词 `pred` 的区域.
    #[inline]
    pub fn areas8(&self, pred: Predicate) -> Areas2d {
        self.areas_from_local(self.pos_iter(), pred, neighbour8)
    }

    /// 按照 8-相邻原则获得图像中所有前景区域, 区域按首个像素的行优先顺序排列.
    #[inline]
    pub fn foreground_areas(&self) -> Areas2d {
        self.areas8(is_foreground)
    }

    /// 按照 4-相邻原则获得图像中所有背景区域.
    #[inline]
    pub fn background_areas(&self) -> Areas2d {
        self.areas4(is_background)
    }

    /// 按照给定邻域规则获取所有区域, 但区域的起点由 `it` 指定.
    /// 两个像素 `p1` 和 `p2` 属于同一个区域, 当且仅当存在一条从 `p1` 到
    /// `p2` 的相邻路径, 且路径上的所有像素 (包括 `p1` 和 `p2`) 都满足谓词 `pred`.
    ///
    /// 区域内的像素按 BFS 访问顺序排列.
    pub fn areas_from_local<I, const N: usize>(
        &self,
        it: I,
        pred: Predicate,
        neighbours: fn(Idx2d) -> [Idx2d; N],
    ) -> Areas2d
    where
        I: IntoIterator<Item = Idx2d>,
    {
        let mut ans = Areas2d::with_capacity(1);
        let mut bfs_q = VecDeque::with_capacity(4);
        let mut visited = Array2::from_elem(self.shape(), false);

        for pos in it.into_iter() {
            if visited[pos] || !pred(self[pos]) {
                continue;
            }
            visited[pos] = true;
            bfs_q.push_back(pos);
            let mut this_area = Area2d::with_capacity(1);
            while let Some(cur_pos) = bfs_q.pop_front() {
                this_area.push(cur_pos);
                for neigh in neighbours(cur_pos) {
                    match visited.get_mut(neigh) {
                        Some(v) if !*v && pred(self[neigh]) => {
                            *v = true;
                            bfs_q.push_back(neigh);
                        }
                        _ => {}
                    }
                }
            }
            ans.push(this_area);
        }
        ans
    }

    /// 将图像中的背景空洞 (即不接触图像边缘的 4-连通背景区域)
    /// 填充为前景, 返回新掩膜.
    pub fn fill_holes(&self) -> Self {
        let mut ans = self.clone();
        for area in self.background_areas() {
            if !area.iter().any(|p| self.is_at_border(*p)) {
                ans.fill_batch(area, FOREGROUND);
            }
        }
        ans
    }

    /// 裁剪出包围盒 `bbox` 内的部分. 标定保持不变.
    ///
    /// 如果 `bbox` 越界则程序 panic.
    pub fn crop(&self, bbox: &BoundingBox) -> Self {
        let view = self
            .data
            .slice(s![bbox.top()..bbox.bottom(), bbox.left()..bbox.right()]);
        Self {
            data: view.to_owned(),
            calibration: self.calibration.clone(),
        }
    }

    /// 以半径为 `radius` 像素的圆盘为结构元做二值膨胀.
    pub fn dilate(&self, radius: usize) -> Self {
        let disk = disk_offsets(radius);
        Self::from_fn(self.shape(), self.calibration.clone(), |pos| {
            disk.iter()
                .any(|&off| matches!(offset(pos, off), Some(p) if self.is_foreground_at(p)))
        })
    }

    /// 以半径为 `radius` 像素的圆盘为结构元做二值腐蚀. 图像外的像素不参与判断.
    pub fn erode(&self, radius: usize) -> Self {
        let disk = disk_offsets(radius);
        Self::from_fn(self.shape(), self.calibration.clone(), |pos| {
            disk.iter().all(|&off| match offset(pos, off) {
                Some(p) if self.check(p) => self.is_foreground_at(p),
                _ => true,
            })
        })
    }

    /// 二值闭运算 (先膨胀再腐蚀), 用于连接小于 `radius` 像素的缝隙.
    /// `radius == 0` 时返回原掩膜的拷贝.
    pub fn closing(&self, radius: usize) -> Self {
        if radius == 0 {
            return self.clone();
        }
        self.dilate(radius).erode(radius)
    }

    /// 将 `it` 中的每个合法索引对应的像素改为 `new`.
    pub(crate) fn fill_batch<I: IntoIterator<Item = Idx2d>>(&mut self, it: I, new: u8) {
        for pos in it.into_iter() {
            if let Some(p) = self.data.get_mut(pos) {
                *p = new;
            }
        }
    }

    /// 压缩数据.
    pub fn compress(&self) -> CompactMask {
        let buf: Vec<u8> = self.data.iter().copied().collect();
        let mut e = ZlibEncoder::new(Vec::with_capacity(8), Compression::best());
        e.write_all(&buf).expect("Compression error");
        CompactMask {
            buf: e.finish().expect("Compression error"),
            sh: self.shape(),
            calibration: self.calibration.clone(),
        }
    }
}

/// 压缩存储的 [`Mask`]; 不透明类型.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CompactMask {
    /// 压缩的不透明字节流.
    buf: Vec<u8>,

    /// 形状.
    sh: Idx2d,

    /// 标定.
    calibration: Calibration,
}

impl CompactMask {
    /// 解压缩数据. 字节流损坏或长度不符时返回 `Err`.
    pub fn decompress(self) -> io::Result<Mask> {
        let Self {
            buf,
            sh: (h, w),
            calibration,
        } = self;
        let mut d = ZlibDecoder::new(buf.as_slice());
        let mut buf = Vec::with_capacity(h * w);
        d.read_to_end(&mut buf)?;
        let data = Array2::<u8>::from_shape_vec((h, w), buf)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        Ok(Mask::new(data, calibration))
    }
}

/// 半径为 `radius` 的圆盘结构元的所有偏移.
fn disk_offsets(radius: usize) -> Vec<(isize, isize)> {
    let r = radius as isize;
    let mut ans = Vec::with_capacity((2 * radius + 1).pow(2));
    for dh in -r..=r {
        for dw in -r..=r {
            if dh * dh + dw * dw <= r * r {
                ans.push((dh, dw));
            }
        }
    }
    ans
}

/// `pos + off`. 结果为负时返回 `None`.
#[inline]
fn offset((h, w): Idx2d, (dh, dw): (isize, isize)) -> Option<Idx2d> {
    Some((h.checked_add_signed(dh)?, w.checked_add_signed(dw)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square_ring() -> Mask {
        // 7x7, 中间 5x5 方环, 环内 3x3 为空洞.
        Mask::from_fn((7, 7), Calibration::default(), |(h, w)| {
            (1..=5).contains(&h) && (1..=5).contains(&w) && !((2..=4).contains(&h) && (2..=4).contains(&w))
        })
    }

    #[test]
    fn test_new_normalizes() {
        let m = Mask::new(Array2::from_elem((2, 2), 7), Calibration::default());
        assert!(m.data().iter().all(|&p| p == FOREGROUND));
    }

    #[test]
    fn test_fill_holes() {
        let m = square_ring();
        assert_eq!(m.count_foreground(), 16);
        let filled = m.fill_holes();
        assert_eq!(filled.count_foreground(), 25);
        // 接触边缘的背景不会被填充.
        assert_eq!(filled[(0, 0)], BACKGROUND);
    }

    #[test]
    fn test_areas8_joins_diagonals() {
        let m = Mask::from_positions((4, 4), Calibration::default(), [(0, 0), (1, 1), (3, 3)]);
        let areas = m.foreground_areas();
        assert_eq!(areas.len(), 2);
        assert_eq!(areas[0].len(), 2);
        assert_eq!(m.areas4(is_foreground).len(), 3);
    }

    #[test]
    fn test_closing_bridges_gap() {
        // 两个方块之间相隔 1 像素的缝隙.
        let m = Mask::from_fn((9, 15), Calibration::default(), |(h, w)| {
            (2..=6).contains(&h) && ((2..=6).contains(&w) || (8..=12).contains(&w))
        });
        assert_eq!(m.foreground_areas().len(), 2);
        assert_eq!(m.closing(1).foreground_areas().len(), 1);
        assert_eq!(m.closing(0), m);
    }

    #[test]
    fn test_crop() {
        let m = square_ring();
        let bbox = BoundingBox::from_points(m.foreground_pos::<Vec<_>>()).unwrap();
        assert_eq!(bbox.origin(), (1, 1));
        assert_eq!(bbox.shape(), (5, 5));
        let c = m.crop(&bbox);
        assert_eq!(c.shape(), (5, 5));
        assert_eq!(c.count_foreground(), 16);
    }

    #[test]
    fn test_compress_round_trip_keeps_calibration() {
        let cal = Calibration::new(0.2, 0.2, None, "micron").unwrap();
        let m = Mask::from_positions((5, 6), cal.clone(), [(1, 2), (4, 5)]);
        let back = m.compress().decompress().unwrap();
        assert_eq!(back, m);
        assert_eq!(back.calibration(), &cal);
    }
}
