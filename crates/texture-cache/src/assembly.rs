//! 按纹理种类把解码结果组装成一块连续的上传缓冲
//!
//! - Flat2D: 解码一次，直接上传
//! - Array2D: 逐层解码，第一层的形状是权威形状，之后每一层必须完全一致
//! - Cube: 按 +X, -X, +Y, -Y, +Z, -Z 的顺序解码 6 个面，规则与数组相同
//!
//! 这里的函数运行在 worker 线程 (Flat2D / Array2D) 或 owner 线程 (Cube) 上，
//! 只接触 ImageDecoder，从不接触 backend。

use std::fmt;

use crate::decoder::{DecodedImage, ImageDecoder, ImageShape};
use crate::error::{LayerRef, TextureError, TextureResult};
use crate::record::{TextureDesc, TextureFlags, TextureKind};

/// 立方体纹理的六个面，顺序即上传顺序
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum CubeFace {
    PositiveX,
    NegativeX,
    PositiveY,
    NegativeY,
    PositiveZ,
    NegativeZ,
}

impl CubeFace {
    pub const ALL: [CubeFace; 6] = [
        CubeFace::PositiveX,
        CubeFace::NegativeX,
        CubeFace::PositiveY,
        CubeFace::NegativeY,
        CubeFace::PositiveZ,
        CubeFace::NegativeZ,
    ];

    /// 面对应的文件名后缀: right, left, up, down, front, back
    pub const fn suffix(self) -> &'static str {
        match self {
            CubeFace::PositiveX => "_r",
            CubeFace::NegativeX => "_l",
            CubeFace::PositiveY => "_u",
            CubeFace::NegativeY => "_d",
            CubeFace::PositiveZ => "_f",
            CubeFace::NegativeZ => "_b",
        }
    }

    pub fn source_name(self, cube_name: &str) -> String {
        format!("{cube_name}{}", self.suffix())
    }
}

impl fmt::Display for CubeFace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            CubeFace::PositiveX => "+X",
            CubeFace::NegativeX => "-X",
            CubeFace::PositiveY => "+Y",
            CubeFace::NegativeY => "-Y",
            CubeFace::PositiveZ => "+Z",
            CubeFace::NegativeZ => "-Z",
        };
        f.write_str(label)
    }
}

/// 组装完成、等待上传的像素数据
///
/// 缓冲区由这个值独占，随着完成消息从 worker 移动到 owner 线程，
/// 无论成功还是失败都会在离开作用域时自动释放。
#[derive(Clone, PartialEq, Debug)]
pub struct AssembledImage {
    pub shape: ImageShape,
    pub layer_count: u32,
    pub pixels: Vec<u8>,
    pub has_transparency: bool,
}

impl AssembledImage {
    pub fn desc(&self, kind: TextureKind, generate_mips: bool) -> TextureDesc {
        let mip_levels = if generate_mips {
            mip_level_count(self.shape.width, self.shape.height)
        } else {
            1
        };
        let mut flags = TextureFlags::empty();
        if self.has_transparency {
            flags |= TextureFlags::HAS_TRANSPARENCY;
        }

        TextureDesc {
            width: self.shape.width,
            height: self.shape.height,
            channel_count: self.shape.channel_count,
            layer_count: self.layer_count,
            mip_levels,
            kind,
            flags,
        }
    }
}

/// 纹理的数据来源，用于首次加载和热重载
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum LoadSource {
    /// 与纹理同名的单张图片
    Flat2D,
    /// 按顺序排列的各层图片名
    Array2D { layers: Vec<String> },
    /// `<name>_r` ... `<name>_b` 六个面
    Cube,
}

impl LoadSource {
    pub fn kind(&self) -> TextureKind {
        match self {
            LoadSource::Flat2D => TextureKind::Flat2D,
            LoadSource::Array2D { .. } => TextureKind::Array2D,
            LoadSource::Cube => TextureKind::Cube,
        }
    }

    pub fn layer_count(&self) -> u32 {
        match self {
            LoadSource::Flat2D => 1,
            LoadSource::Array2D { layers } => layers.len() as u32,
            LoadSource::Cube => CubeFace::ALL.len() as u32,
        }
    }

    pub fn assemble(&self, decoder: &dyn ImageDecoder, name: &str) -> TextureResult<AssembledImage> {
        match self {
            LoadSource::Flat2D => assemble_flat(decoder, name),
            LoadSource::Array2D { layers } => assemble_layers(decoder, name, layers),
            LoadSource::Cube => assemble_cube(decoder, name),
        }
    }
}

pub fn assemble_flat(decoder: &dyn ImageDecoder, name: &str) -> TextureResult<AssembledImage> {
    let _span = tracy_client::span!("assemble_flat");

    let image = decoder.decode(name)?;
    check_pixels(name, &image)?;

    Ok(AssembledImage {
        shape: image.shape(),
        layer_count: 1,
        has_transparency: has_transparency(&image),
        pixels: image.pixels,
    })
}

pub fn assemble_layers(decoder: &dyn ImageDecoder, name: &str, layers: &[String]) -> TextureResult<AssembledImage> {
    let _span = tracy_client::span!("assemble_layers");

    if layers.is_empty() {
        return Err(TextureError::InvalidDescriptor(format!("array texture '{name}' has no layers")));
    }
    let sources = layers.iter().enumerate().map(|(index, layer)| (LayerRef::Layer(index), layer.clone()));
    assemble_stack(decoder, name, sources, layers.len())
}

pub fn assemble_cube(decoder: &dyn ImageDecoder, name: &str) -> TextureResult<AssembledImage> {
    let _span = tracy_client::span!("assemble_cube");

    let sources = CubeFace::ALL.iter().map(|&face| (LayerRef::Face(face), face.source_name(name)));
    assemble_stack(decoder, name, sources, CubeFace::ALL.len())
}

/// 逐层解码并拷贝到共享缓冲区
///
/// 第一层确定形状和缓冲区大小，后续层形状不一致时整体失败，并指出是哪一层。
fn assemble_stack(
    decoder: &dyn ImageDecoder,
    name: &str,
    sources: impl Iterator<Item = (LayerRef, String)>,
    layer_count: usize,
) -> TextureResult<AssembledImage> {
    let mut shape: Option<ImageShape> = None;
    let mut pixels = Vec::new();
    let mut transparent = false;

    for (index, (layer, source)) in sources.enumerate() {
        let image = decoder.decode(&source)?;
        check_pixels(&source, &image)?;

        let expected = *shape.get_or_insert_with(|| {
            pixels = vec![0; image.shape().byte_size() * layer_count];
            image.shape()
        });
        if image.shape() != expected {
            return Err(TextureError::DimensionMismatch {
                name: name.to_string(),
                layer,
                expected,
                found: image.shape(),
            });
        }

        let layer_size = expected.byte_size();
        pixels[index * layer_size..(index + 1) * layer_size].copy_from_slice(&image.pixels);
        transparent |= has_transparency(&image);
    }

    let shape = shape.ok_or_else(|| TextureError::InvalidDescriptor(format!("texture '{name}' has no layers")))?;
    Ok(AssembledImage {
        shape,
        layer_count: layer_count as u32,
        pixels,
        has_transparency: transparent,
    })
}

fn check_pixels(source: &str, image: &DecodedImage) -> TextureResult<()> {
    if image.width == 0 || image.height == 0 || !(1..=4).contains(&image.channel_count) {
        return Err(TextureError::Decode {
            name: source.to_string(),
            reason: format!("unsupported image shape {}", image.shape()),
        });
    }
    if image.pixels.len() != image.shape().byte_size() {
        return Err(TextureError::Decode {
            name: source.to_string(),
            reason: format!("expected {} bytes, got {}", image.shape().byte_size(), image.pixels.len()),
        });
    }
    Ok(())
}

/// 只有带 alpha 通道 (LA / RGBA) 的图片才可能透明
pub fn has_transparency(image: &DecodedImage) -> bool {
    let channels = image.channel_count as usize;
    match channels {
        2 | 4 => image.pixels.chunks_exact(channels).any(|px| px[channels - 1] < 255),
        _ => false,
    }
}

/// floor(log2(max(w, h))) + 1
pub fn mip_level_count(width: u32, height: u32) -> u32 {
    32 - width.max(height).max(1).leading_zeros()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::MemoryImageDecoder;

    fn solid(width: u32, height: u32, rgba: [u8; 4]) -> DecodedImage {
        DecodedImage {
            width,
            height,
            channel_count: 4,
            pixels: rgba.iter().copied().cycle().take((width * height * 4) as usize).collect(),
        }
    }

    fn layers(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_mip_level_count() {
        assert_eq!(mip_level_count(1, 1), 1);
        assert_eq!(mip_level_count(64, 64), 7);
        assert_eq!(mip_level_count(256, 16), 9);
        assert_eq!(mip_level_count(100, 3), 7);
    }

    #[test]
    fn test_transparency_only_for_alpha_channels() {
        assert!(!has_transparency(&solid(2, 2, [0, 0, 0, 255])));
        assert!(has_transparency(&solid(2, 2, [0, 0, 0, 254])));

        let rgb = DecodedImage {
            width: 1,
            height: 1,
            channel_count: 3,
            pixels: vec![0, 0, 0],
        };
        assert!(!has_transparency(&rgb));
    }

    #[test]
    fn test_layers_are_copied_by_index() {
        let _client = tracy_client::Client::start();
        let decoder = MemoryImageDecoder::new();
        decoder.insert("a", solid(2, 2, [1, 1, 1, 255]));
        decoder.insert("b", solid(2, 2, [2, 2, 2, 100]));

        let image = assemble_layers(&decoder, "atlas", &layers(&["a", "b"])).unwrap();
        assert_eq!(image.layer_count, 2);
        assert_eq!(image.pixels.len(), 32);
        assert_eq!(image.pixels[0], 1);
        assert_eq!(image.pixels[16], 2);
        assert!(image.has_transparency);
    }

    #[test]
    fn test_layer_mismatch_names_offending_layer() {
        let _client = tracy_client::Client::start();
        let decoder = MemoryImageDecoder::new();
        decoder.insert("a", solid(64, 64, [0, 0, 0, 255]));
        decoder.insert("b", solid(64, 64, [0, 0, 0, 255]));
        decoder.insert("c", solid(32, 64, [0, 0, 0, 255]));

        let err = assemble_layers(&decoder, "atlas", &layers(&["a", "b", "c"])).unwrap_err();
        match err {
            TextureError::DimensionMismatch { layer, expected, found, .. } => {
                assert_eq!(layer, LayerRef::Layer(2));
                assert_eq!(expected, ImageShape::new(64, 64, 4));
                assert_eq!(found, ImageShape::new(32, 64, 4));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_layer_fails_fast() {
        let _client = tracy_client::Client::start();
        let decoder = MemoryImageDecoder::new();
        decoder.insert("a", solid(2, 2, [0, 0, 0, 255]));

        let err = assemble_layers(&decoder, "atlas", &layers(&["a", "missing", "a"])).unwrap_err();
        assert!(matches!(err, TextureError::NotFound { ref name } if name == "missing"));
        assert_eq!(decoder.decode_count(), 2);
    }

    #[test]
    fn test_cube_mismatch_names_face() {
        let _client = tracy_client::Client::start();
        let decoder = MemoryImageDecoder::new();
        for face in CubeFace::ALL {
            decoder.insert(face.source_name("sky"), solid(8, 8, [0, 0, 0, 255]));
        }
        decoder.insert(
            "sky_f",
            DecodedImage {
                width: 8,
                height: 8,
                channel_count: 3,
                pixels: vec![0; 8 * 8 * 3],
            },
        );

        let err = assemble_cube(&decoder, "sky").unwrap_err();
        assert!(matches!(
            err,
            TextureError::DimensionMismatch {
                layer: LayerRef::Face(CubeFace::PositiveZ),
                ..
            }
        ));
    }

    #[test]
    fn test_cube_faces_in_fixed_order() {
        let _client = tracy_client::Client::start();
        let decoder = MemoryImageDecoder::new();
        for (i, face) in CubeFace::ALL.iter().enumerate() {
            decoder.insert(face.source_name("sky"), solid(1, 1, [i as u8, 0, 0, 255]));
        }

        let image = assemble_cube(&decoder, "sky").unwrap();
        assert_eq!(image.layer_count, 6);
        let firsts: Vec<u8> = image.pixels.chunks_exact(4).map(|px| px[0]).collect();
        assert_eq!(firsts, vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_empty_layer_list_rejected() {
        let _client = tracy_client::Client::start();
        let decoder = MemoryImageDecoder::new();
        assert!(matches!(
            assemble_layers(&decoder, "atlas", &[]),
            Err(TextureError::InvalidDescriptor(_))
        ));
    }
}
