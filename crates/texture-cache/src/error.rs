use std::fmt;

use thiserror::Error;

use crate::assembly::CubeFace;
use crate::decoder::ImageShape;

/// 不一致的层：数组纹理的层索引，或者立方体纹理的面
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum LayerRef {
    Layer(usize),
    Face(CubeFace),
}

impl fmt::Display for LayerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayerRef::Layer(index) => write!(f, "layer {index}"),
            LayerRef::Face(face) => write!(f, "face {face}"),
        }
    }
}

/// ImageDecoder 返回的错误
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("image '{name}' not found")]
    NotFound { name: String },

    #[error("failed to decode image '{name}': {reason}")]
    Malformed { name: String, reason: String },
}

/// 纹理缓存的错误类型
#[derive(Error, Debug)]
pub enum TextureError {
    /// 文件、数组层或者立方体面不存在
    #[error("texture source '{name}' not found")]
    NotFound { name: String },

    #[error("failed to decode '{name}': {reason}")]
    Decode { name: String, reason: String },

    /// 数组层或立方体面与第一层的尺寸/通道数不一致
    #[error("texture '{name}': {layer} is {found}, expected {expected}")]
    DimensionMismatch {
        name: String,
        layer: LayerRef,
        expected: ImageShape,
        found: ImageShape,
    },

    /// 没有空闲的加载槽位
    #[error("load pipeline saturated ({capacity} loads in flight)")]
    PipelineSaturated { capacity: usize },

    #[error("invalid or stale texture handle")]
    InvalidHandle,

    #[error("texture '{name}' is not writable")]
    NotWritable { name: String },

    /// 只用于日志，不会返回给调用者
    #[error("release underflow on '{name}'")]
    ReleaseUnderflow { name: String },

    #[error("texture '{name}' already has a load in flight")]
    LoadInFlight { name: String },

    #[error("write of {len} bytes at offset {offset} exceeds {capacity} bytes of '{name}'")]
    OutOfBounds {
        name: String,
        offset: usize,
        len: usize,
        capacity: usize,
    },

    #[error("invalid texture descriptor: {0}")]
    InvalidDescriptor(String),

    #[error("texture table full ({capacity} entries)")]
    TableFull { capacity: usize },

    #[error("load worker panicked")]
    WorkerPanicked,

    #[error("backend error: {0}")]
    Backend(#[from] anyhow::Error),
}

impl From<DecodeError> for TextureError {
    fn from(err: DecodeError) -> Self {
        match err {
            DecodeError::NotFound { name } => TextureError::NotFound { name },
            DecodeError::Malformed { name, reason } => TextureError::Decode { name, reason },
        }
    }
}

pub type TextureResult<T> = Result<T, TextureError>;
