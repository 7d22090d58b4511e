use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};

use image::GenericImageView;

use crate::config::CacheConfig;
use crate::error::DecodeError;

/// 图片的形状：宽、高、通道数
///
/// 数组层和立方体面之间的一致性检查就是比较这个值。
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct ImageShape {
    pub width: u32,
    pub height: u32,
    pub channel_count: u8,
}

impl ImageShape {
    pub const fn new(width: u32, height: u32, channel_count: u8) -> Self {
        Self {
            width,
            height,
            channel_count,
        }
    }

    #[inline]
    pub fn byte_size(&self) -> usize {
        self.width as usize * self.height as usize * self.channel_count as usize
    }
}

impl fmt::Display for ImageShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}x{}", self.width, self.height, self.channel_count)
    }
}

/// 解码后的原始像素数据 (CPU 端)
#[derive(Clone, PartialEq, Debug)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    pub channel_count: u8,
    pub pixels: Vec<u8>,
}

impl DecodedImage {
    #[inline]
    pub fn shape(&self) -> ImageShape {
        ImageShape::new(self.width, self.height, self.channel_count)
    }
}

/// 把资源名同步解码为像素数据
///
/// 运行在 worker 线程上，所以必须是 `Send + Sync`，并且不能持有缓存的任何状态。
pub trait ImageDecoder: Send + Sync {
    fn decode(&self, name: &str) -> Result<DecodedImage, DecodeError>;
}

/// 基于文件系统和 `image` crate 的解码器
///
/// 名字相对于 `root` 解析；名字不带扩展名时，按顺序尝试配置中的扩展名。
pub struct FileImageDecoder {
    root: PathBuf,
    extensions: Vec<String>,
}

// new & init
impl FileImageDecoder {
    pub fn new(root: impl Into<PathBuf>, extensions: Vec<String>) -> Self {
        Self {
            root: root.into(),
            extensions,
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.texture_root.clone(), config.extensions.clone())
    }
}

// tools
impl FileImageDecoder {
    /// 找到名字对应的第一个存在的文件
    pub fn resolve(&self, name: &str) -> Option<PathBuf> {
        let direct = self.root.join(name);
        if Path::new(name).extension().is_some() {
            return direct.is_file().then_some(direct);
        }

        self.extensions.iter().map(|ext| self.root.join(format!("{name}.{ext}"))).find(|path| path.is_file())
    }
}

impl ImageDecoder for FileImageDecoder {
    fn decode(&self, name: &str) -> Result<DecodedImage, DecodeError> {
        let _span = tracy_client::span!("FileImageDecoder::decode");

        let path = self.resolve(name).ok_or_else(|| DecodeError::NotFound { name: name.to_string() })?;
        log::info!("Decoding texture: {:?}", path);

        let img = image::open(&path).map_err(|e| match e {
            image::ImageError::IoError(io) if io.kind() == std::io::ErrorKind::NotFound => {
                DecodeError::NotFound { name: name.to_string() }
            }
            other => DecodeError::Malformed {
                name: name.to_string(),
                reason: other.to_string(),
            },
        })?;

        let (width, height) = img.dimensions();
        // 保留源图的通道数，位深统一转为 8 bit
        let channel_count = img.color().channel_count();
        let pixels = match channel_count {
            1 => img.into_luma8().into_raw(),
            2 => img.into_luma_alpha8().into_raw(),
            3 => img.into_rgb8().into_raw(),
            _ => img.into_rgba8().into_raw(),
        };

        Ok(DecodedImage {
            width,
            height,
            channel_count: channel_count.min(4),
            pixels,
        })
    }
}

/// 内存中的解码器：名字 -> 图片
///
/// 通过 `&self` 即可增删图片，便于在加载过程中替换源数据 (热重载、测试)。
#[derive(Default)]
pub struct MemoryImageDecoder {
    images: RwLock<HashMap<String, DecodedImage>>,
    decode_count: AtomicUsize,
}

impl MemoryImageDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, name: impl Into<String>, image: DecodedImage) {
        if let Ok(mut images) = self.images.write() {
            images.insert(name.into(), image);
        }
    }

    pub fn remove(&self, name: &str) -> Option<DecodedImage> {
        self.images.write().ok().and_then(|mut images| images.remove(name))
    }

    /// 成功或失败的 decode 调用次数
    pub fn decode_count(&self) -> usize {
        self.decode_count.load(Ordering::Relaxed)
    }
}

impl ImageDecoder for MemoryImageDecoder {
    fn decode(&self, name: &str) -> Result<DecodedImage, DecodeError> {
        self.decode_count.fetch_add(1, Ordering::Relaxed);

        let images = self.images.read().map_err(|_| DecodeError::Malformed {
            name: name.to_string(),
            reason: "image table poisoned".to_string(),
        })?;
        images.get(name).cloned().ok_or_else(|| DecodeError::NotFound { name: name.to_string() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(width: u32, height: u32, rgba: [u8; 4]) -> DecodedImage {
        DecodedImage {
            width,
            height,
            channel_count: 4,
            pixels: rgba.iter().copied().cycle().take((width * height * 4) as usize).collect(),
        }
    }

    #[test]
    fn test_memory_decoder_round_trip() {
        let decoder = MemoryImageDecoder::new();
        decoder.insert("rock", solid(2, 2, [1, 2, 3, 255]));

        let image = decoder.decode("rock").unwrap();
        assert_eq!(image.shape(), ImageShape::new(2, 2, 4));
        assert!(matches!(decoder.decode("missing"), Err(DecodeError::NotFound { .. })));
        assert_eq!(decoder.decode_count(), 2);
    }

    #[test]
    fn test_file_decoder_tries_extensions() {
        let _client = tracy_client::Client::start();
        let root = std::env::temp_dir().join(format!("texture-cache-decoder-{}", std::process::id()));
        std::fs::create_dir_all(&root).unwrap();

        let img = image::RgbImage::from_pixel(3, 2, image::Rgb([10, 20, 30]));
        img.save(root.join("brick.png")).unwrap();

        let decoder = FileImageDecoder::new(&root, vec!["jpg".to_string(), "png".to_string()]);
        let image = decoder.decode("brick").unwrap();
        assert_eq!(image.shape(), ImageShape::new(3, 2, 3));
        assert_eq!(&image.pixels[..3], &[10, 20, 30]);

        assert!(matches!(decoder.decode("missing"), Err(DecodeError::NotFound { .. })));

        std::fs::remove_dir_all(&root).ok();
    }
}
