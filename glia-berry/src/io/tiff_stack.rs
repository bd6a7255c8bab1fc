//! 多页 TIFF (ImageJ hyperstack) 解码.
//!
//! ImageJ 把 hyperstack 的每个 2D 平面存为一页, 页序为 XYCZT:
//! 第 `(c, z, t)` 个平面位于第 `c + C * (z + Z * t)` 页. 通道数, 层数, 时间点数和
//! z 方向间距等写在 ImageDescription 标签中, 像素尺寸由 X/YResolution 给出.
//! 只读取第一个时间点.

use std::fs::File;
use std::io::{self, BufReader};
use std::path::Path;

use ndarray::{Array3, Array4};
use thiserror::Error;
use tiff::decoder::ifd::Value;
use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::tags::Tag;

use crate::consts::CHANNELS;
use crate::{Calibration, Stack, StackError};

/// 图像无法打开或解码. 属于致命的输入错误.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// IO 错误.
    #[error(transparent)]
    Io(#[from] io::Error),

    /// TIFF 格式错误.
    #[error("malformed TIFF: {0}")]
    Tiff(#[from] tiff::TiffError),

    /// 不支持的像素格式或布局.
    #[error("unsupported image: {0}")]
    Unsupported(String),

    /// 页数与元数据给出的维度不符.
    #[error("{pages} pages cannot hold {channels} channels x {slices} slices")]
    Layout {
        /// 实际页数.
        pages: usize,
        /// 通道数.
        channels: usize,
        /// 层数.
        slices: usize,
    },

    /// 通道数或维度不合法.
    #[error(transparent)]
    Stack(#[from] StackError),

    /// 没有能读取该扩展名的解码器.
    #[error("no reader registered for `.{0}` files")]
    NoReader(String),
}

/// 图像栈解码器. `.nd2` 等专有格式由外部实现.
pub trait StackReader {
    /// 能读取的扩展名 (不含 `.`, 小写).
    fn extensions(&self) -> &[&str];

    /// 读取并解码图像栈.
    fn read(&self, path: &Path) -> Result<Stack, DecodeError>;
}

/// ImageJ hyperstack 元数据.
#[derive(Debug, Clone, PartialEq, Default)]
pub(crate) struct HyperstackInfo {
    pub channels: Option<usize>,
    pub slices: Option<usize>,
    pub frames: Option<usize>,
    pub unit: Option<String>,
    pub spacing: Option<f64>,
}

impl HyperstackInfo {
    /// 解析 `key=value` 形式的 ImageDescription.
    pub fn parse(description: &str) -> Self {
        let mut ans = Self::default();
        for line in description.lines() {
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let value = value.trim();
            match key.trim() {
                "channels" => ans.channels = value.parse().ok(),
                "slices" => ans.slices = value.parse().ok(),
                "frames" => ans.frames = value.parse().ok(),
                "unit" => ans.unit = Some(value.replace("\\u00B5", "µ")),
                "spacing" => ans.spacing = value.parse().ok(),
                _ => {}
            }
        }
        ans
    }

    /// 由页数推断 `(通道数, 层数)`. 没有元数据时, 偶数页视为两个交错的通道.
    pub fn layout(&self, pages: usize) -> Result<(usize, usize), DecodeError> {
        let frames = self.frames.unwrap_or(1).max(1);
        let channels = match self.channels {
            Some(c) => c,
            None if self.slices.is_none() && pages % CHANNELS == 0 => CHANNELS,
            None if self.slices.is_some() => pages / frames / self.slices.unwrap_or(1).max(1),
            None => 1,
        }
        .max(1);
        let slices = self.slices.unwrap_or(pages / frames / channels).max(1);
        if channels * slices * frames > pages || channels * slices == 0 {
            return Err(DecodeError::Layout {
                pages,
                channels,
                slices,
            });
        }
        Ok((channels, slices))
    }
}

/// 以 `f32` 读取当前页.
fn read_page_f32<R: io::Read + io::Seek>(decoder: &mut Decoder<R>) -> Result<Vec<f32>, DecodeError> {
    match decoder.colortype()? {
        tiff::ColorType::Gray(_) => {}
        other => return Err(DecodeError::Unsupported(format!("color type {other:?}"))),
    }
    #[allow(unreachable_patterns)]
    let data = match decoder.read_image()? {
        DecodingResult::U8(buf) => buf.into_iter().map(f32::from).collect(),
        DecodingResult::U16(buf) => buf.into_iter().map(f32::from).collect(),
        DecodingResult::U32(buf) => buf.into_iter().map(|v| v as f32).collect(),
        DecodingResult::U64(buf) => buf.into_iter().map(|v| v as f32).collect(),
        DecodingResult::I8(buf) => buf.into_iter().map(f32::from).collect(),
        DecodingResult::I16(buf) => buf.into_iter().map(f32::from).collect(),
        DecodingResult::I32(buf) => buf.into_iter().map(|v| v as f32).collect(),
        DecodingResult::I64(buf) => buf.into_iter().map(|v| v as f32).collect(),
        DecodingResult::F32(buf) => buf,
        DecodingResult::F64(buf) => buf.into_iter().map(|v| v as f32).collect(),
        _ => return Err(DecodeError::Unsupported("sample format".to_string())),
    };
    Ok(data)
}

/// 读取 X/YResolution 对应的像素尺寸 (每像素的单位长度).
fn pixel_size<R: io::Read + io::Seek>(decoder: &mut Decoder<R>, tag: Tag) -> Option<f64> {
    match decoder.find_tag(tag).ok()?? {
        Value::Rational(n, d) if n > 0 && d > 0 => Some(d as f64 / n as f64),
        Value::Float(f) if f > 0.0 => Some(1.0 / f as f64),
        Value::Double(f) if f > 0.0 => Some(1.0 / f),
        _ => None,
    }
}

/// 打开解码器. 放宽缓冲区限制以容纳大尺寸显微图像.
fn open(path: &Path) -> Result<Decoder<BufReader<File>>, DecodeError> {
    let mut limits = Limits::default();
    limits.decoding_buffer_size = 1024 * 1024 * 1024;
    limits.ifd_value_size = 1024 * 1024 * 1024;
    limits.intermediate_buffer_size = 1024 * 1024 * 1024;
    let file = File::open(path)?;
    Ok(Decoder::new(BufReader::new(file))?.with_limits(limits))
}

/// 依次读取所有页. 所有页的尺寸必须一致.
fn read_pages<R, T, F>(decoder: &mut Decoder<R>, mut read: F) -> Result<((usize, usize), Vec<Vec<T>>), DecodeError>
where
    R: io::Read + io::Seek,
    F: FnMut(&mut Decoder<R>) -> Result<Vec<T>, DecodeError>,
{
    let (w, h) = decoder.dimensions()?;
    let shape = (h as usize, w as usize);
    let mut pages = Vec::with_capacity(8);
    loop {
        if decoder.dimensions()? != (w, h) {
            return Err(DecodeError::Unsupported("pages of different sizes".to_string()));
        }
        let page = read(decoder)?;
        if page.len() != shape.0 * shape.1 {
            return Err(DecodeError::Unsupported("multi-sample pages".to_string()));
        }
        pages.push(page);
        if !decoder.more_images() {
            break;
        }
        decoder.next_image()?;
    }
    Ok((shape, pages))
}

/// ImageJ hyperstack TIFF 解码器.
#[derive(Debug, Clone, Copy, Default)]
pub struct TiffStackReader;

impl StackReader for TiffStackReader {
    fn extensions(&self) -> &[&str] {
        &["tif", "tiff"]
    }

    fn read(&self, path: &Path) -> Result<Stack, DecodeError> {
        let mut decoder = open(path)?;
        let info = decoder
            .get_tag_ascii_string(Tag::ImageDescription)
            .map(|d| HyperstackInfo::parse(&d))
            .unwrap_or_default();
        let pw = pixel_size(&mut decoder, Tag::XResolution);
        let ph = pixel_size(&mut decoder, Tag::YResolution);

        let ((h, w), pages) = read_pages(&mut decoder, read_page_f32)?;
        let (channels, slices) = info.layout(pages.len())?;
        if channels != CHANNELS {
            return Err(StackError::ChannelCount(channels).into());
        }

        let mut data = Array4::<f32>::zeros((channels, slices, h, w));
        for z in 0..slices {
            for c in 0..channels {
                let page = &pages[c + channels * z];
                for (dst, &src) in data
                    .slice_mut(ndarray::s![c, z, .., ..])
                    .iter_mut()
                    .zip(page.iter())
                {
                    *dst = src;
                }
            }
        }

        let calibration = match (pw, ph) {
            (Some(pw), Some(ph)) => Calibration::new(
                pw,
                ph,
                Some(info.spacing.unwrap_or(1.0)),
                info.unit.clone().unwrap_or_else(|| "pixel".to_string()),
            ),
            _ => None,
        }
        .unwrap_or_default();
        log::debug!(
            "{}: {channels} channels, {slices} slices, {h}x{w}, pixel {}x{} {}",
            path.display(),
            calibration.pixel_width(),
            calibration.pixel_height(),
            calibration.unit()
        );
        Ok(Stack::new(data, calibration)?)
    }
}

/// 读取外部分类器输出的多页标签 TIFF, 结果按 `(z, h, w)` 排列.
pub fn read_label_pages<P: AsRef<Path>>(path: P) -> Result<Array3<u8>, DecodeError> {
    let mut decoder = open(path.as_ref())?;
    let ((h, w), pages) = read_pages(&mut decoder, |d| {
        Ok(read_page_f32(d)?
            .into_iter()
            .map(|v| v.clamp(0.0, 255.0) as u8)
            .collect())
    })?;
    let z = pages.len();
    let flat: Vec<u8> = pages.into_iter().flatten().collect();
    Array3::from_shape_vec((z, h, w), flat)
        .map_err(|e| DecodeError::Unsupported(e.to_string()))
}
