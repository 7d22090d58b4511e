use bitflags::bitflags;

use crate::handle::INVALID_GENERATION;

/// 纹理种类
///
/// 种类是封闭集合，由 assembly 内部 match 分派，不需要 trait object。
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum TextureKind {
    Flat2D,
    Array2D,
    Cube,
    Writable,
}

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct TextureFlags: u32 {
        /// 可以通过 WriteData / Resize 修改
        const WRITABLE = 1 << 0;
        /// backend 资源由外部持有，缓存不负责销毁
        const WRAPPED = 1 << 1;
        /// 至少有一个像素的 alpha < 255
        const HAS_TRANSPARENCY = 1 << 2;
        /// 深度纹理
        const IS_DEPTH = 1 << 3;
    }
}

/// backend 侧资源的不透明句柄
///
/// 缓存只负责保存和传回，不解释内部的值。
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct BackendHandle(pub u64);

/// 创建 backend 资源时需要的描述信息
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct TextureDesc {
    pub width: u32,
    pub height: u32,
    pub channel_count: u8,
    pub layer_count: u32,
    pub mip_levels: u32,
    pub kind: TextureKind,
    pub flags: TextureFlags,
}

impl TextureDesc {
    /// 单层像素数据的字节数 (mip 0)
    #[inline]
    pub fn layer_byte_size(&self) -> usize {
        self.width as usize * self.height as usize * self.channel_count as usize
    }

    /// 所有层的字节数 (mip 0)
    #[inline]
    pub fn byte_size(&self) -> usize {
        self.layer_byte_size() * self.layer_count as usize
    }
}

/// 缓存内的纹理记录
///
/// 常驻期间由 ReferenceTable 中的条目独占持有。
/// `backend` 有效当且仅当 `generation` 有效，或者该记录是程序生成的默认纹理
/// (默认纹理保持 generation 无效，以此标记为不可驱逐)。
#[derive(Clone, PartialEq, Debug)]
pub struct TextureRecord {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub channel_count: u8,
    pub layer_count: u32,
    pub mip_levels: u32,
    pub kind: TextureKind,
    pub flags: TextureFlags,
    pub generation: u32,
    pub backend: Option<BackendHandle>,
}

// new & init
impl TextureRecord {
    /// 尚未初始化的记录：只有名字和种类，没有 backend 资源
    pub fn uninitialized(name: impl Into<String>, kind: TextureKind) -> Self {
        Self {
            name: name.into(),
            width: 0,
            height: 0,
            channel_count: 0,
            layer_count: 1,
            mip_levels: 1,
            kind,
            flags: TextureFlags::empty(),
            generation: INVALID_GENERATION,
            backend: None,
        }
    }

    pub fn from_desc(name: impl Into<String>, desc: &TextureDesc, backend: BackendHandle, generation: u32) -> Self {
        Self {
            name: name.into(),
            width: desc.width,
            height: desc.height,
            channel_count: desc.channel_count,
            layer_count: desc.layer_count,
            mip_levels: desc.mip_levels,
            kind: desc.kind,
            flags: desc.flags,
            generation,
            backend: Some(backend),
        }
    }
}

// getters
impl TextureRecord {
    #[inline]
    pub fn desc(&self) -> TextureDesc {
        TextureDesc {
            width: self.width,
            height: self.height,
            channel_count: self.channel_count,
            layer_count: self.layer_count,
            mip_levels: self.mip_levels,
            kind: self.kind,
            flags: self.flags,
        }
    }

    #[inline]
    pub fn is_initialized(&self) -> bool {
        self.backend.is_some()
    }

    #[inline]
    pub fn is_writable(&self) -> bool {
        self.flags.contains(TextureFlags::WRITABLE)
    }

    #[inline]
    pub fn is_wrapped(&self) -> bool {
        self.flags.contains(TextureFlags::WRAPPED)
    }

    #[inline]
    pub fn has_transparency(&self) -> bool {
        self.flags.contains(TextureFlags::HAS_TRANSPARENCY)
    }
}
