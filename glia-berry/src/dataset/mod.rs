//! 输入文件夹的遍历与图像加载.
//!
//! 提供迭代器风格的数据集获取模式: 文件按文件名排序, 只接受白名单中的扩展名,
//! 每次迭代解码一幅图像.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::io::{DecodeError, StackReader, TiffStackReader};
use crate::Stack;

/// 获取 `{用户主目录}/microglia` 目录下给定继续项组成的全路径.
pub fn home_microglia_dir_with<P: AsRef<Path>, I: IntoIterator<Item = P>>(it: I) -> Option<PathBuf> {
    let mut ans = dirs::home_dir()?;
    ans.push("microglia");
    ans.extend(it);
    Some(ans)
}

/// 已加载的源图像.
#[derive(Debug, Clone)]
pub struct SourceImage {
    /// 文件路径.
    pub path: PathBuf,

    /// 文件名 (含扩展名), 用作测量标签的前缀和输出文件名.
    pub name: String,

    /// 图像栈.
    pub stack: Stack,
}

impl SourceImage {
    /// 由路径和已解码的图像栈创建.
    pub fn new(path: impl Into<PathBuf>, stack: Stack) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self { path, name, stack }
    }
}

/// 按扩展名分派的解码器集合. 默认只含 TIFF 解码器.
pub struct ReaderRegistry {
    readers: Vec<Box<dyn StackReader>>,
}

impl Default for ReaderRegistry {
    fn default() -> Self {
        Self {
            readers: vec![Box::new(TiffStackReader)],
        }
    }
}

impl std::fmt::Debug for ReaderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.readers.iter().map(|r| r.extensions()))
            .finish()
    }
}

impl ReaderRegistry {
    /// 不含任何解码器的集合.
    #[inline]
    pub fn empty() -> Self {
        Self {
            readers: Vec::new(),
        }
    }

    /// 注册解码器. 后注册的优先.
    pub fn register(&mut self, reader: Box<dyn StackReader>) -> &mut Self {
        self.readers.insert(0, reader);
        self
    }

    /// 能读取扩展名 `ext` (不区分大小写) 的解码器.
    pub fn reader_for(&self, ext: &str) -> Option<&dyn StackReader> {
        self.readers
            .iter()
            .find(|r| r.extensions().iter().any(|e| e.eq_ignore_ascii_case(ext)))
            .map(|r| &**r)
    }

    /// 按扩展名选择解码器并读取 `path`.
    pub fn read(&self, path: &Path) -> Result<Stack, DecodeError> {
        let ext = path
            .extension()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        match self.reader_for(&ext) {
            Some(reader) => reader.read(path),
            None => Err(DecodeError::NoReader(ext)),
        }
    }
}

/// 列出 `dir` 下扩展名在白名单内的文件, 按文件名排序. 不递归.
pub fn list_images<P: AsRef<Path>>(dir: P, config: &Config) -> io::Result<Vec<PathBuf>> {
    let mut ans = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let accepted = path
            .extension()
            .and_then(|e| e.to_str())
            .map_or(false, |e| config.accepts_extension(e));
        if accepted {
            ans.push(path);
        }
    }
    ans.sort_unstable_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(ans)
}

/// 创建 `dir` 下图像的加载器.
///
/// # 注意
///
/// `dir` 必须是可读的目录, 否则返回 `Err`. 单个文件的解码失败在迭代时以 `Result::Err` 返回.
pub fn image_loader<'a, P: AsRef<Path>>(
    dir: P,
    config: &Config,
    registry: &'a ReaderRegistry,
) -> io::Result<ImageLoader<'a>> {
    let mut data = list_images(dir, config)?;
    data.reverse();
    Ok(ImageLoader {
        registry,
        data_rev: data,
    })
}

/// 源图像加载器.
#[derive(Debug)]
pub struct ImageLoader<'a> {
    registry: &'a ReaderRegistry,
    data_rev: Vec<PathBuf>,
}

impl Iterator for ImageLoader<'_> {
    type Item = (PathBuf, Result<SourceImage, DecodeError>);

    fn next(&mut self) -> Option<Self::Item> {
        let path = self.data_rev.pop()?;
        let data = self
            .registry
            .read(&path)
            .map(|stack| SourceImage::new(path.clone(), stack));
        Some((path, data))
    }
}

impl ExactSizeIterator for ImageLoader<'_> {
    #[inline]
    fn len(&self) -> usize {
        self.data_rev.len()
    }
}
