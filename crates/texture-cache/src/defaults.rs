use crate::assembly::CubeFace;
use crate::backend::GpuResourceBackend;
use crate::error::TextureResult;
use crate::handle::{INVALID_GENERATION, TextureHandle};
use crate::record::{TextureDesc, TextureFlags, TextureKind, TextureRecord};
use crate::registry::{ReferenceEntry, TextureRegistry};

const CHECKER_DIMENSION: u32 = 256;
const CHECKER_CELL: u32 = 32;
const FLAT_DIMENSION: u32 = 16;

const WHITE: [u8; 4] = [255, 255, 255, 255];
const BLACK: [u8; 4] = [0, 0, 0, 255];
const BLUE: [u8; 4] = [0, 0, 255, 255];
/// 切线空间的 +Z
const FLAT_NORMAL: [u8; 4] = [128, 128, 255, 255];
/// R: metallic 0, G: roughness 0.5, B: AO 1
const FLAT_COMBINED: [u8; 4] = [0, 128, 255, 255];

/// 程序生成的默认纹理
///
/// 启动时创建，`auto_release = false` 且 generation 保持无效，不会被普通的 Release 驱逐。
/// 真实纹理还在加载或者加载失败时，渲染使用对应的默认纹理。
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum DefaultTexture {
    /// 256x256 棋盘格
    Checkerboard,
    Diffuse,
    Specular,
    Normal,
    Combined,
    Cube,
    /// 由单层默认纹理平铺而成的数组纹理
    Array,
}

impl DefaultTexture {
    pub const COUNT: usize = 7;

    pub const ALL: [DefaultTexture; Self::COUNT] = [
        DefaultTexture::Checkerboard,
        DefaultTexture::Diffuse,
        DefaultTexture::Specular,
        DefaultTexture::Normal,
        DefaultTexture::Combined,
        DefaultTexture::Cube,
        DefaultTexture::Array,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            DefaultTexture::Checkerboard => "default",
            DefaultTexture::Diffuse => "default_diffuse",
            DefaultTexture::Specular => "default_specular",
            DefaultTexture::Normal => "default_normal",
            DefaultTexture::Combined => "default_combined",
            DefaultTexture::Cube => "default_cube",
            DefaultTexture::Array => "default_array",
        }
    }

    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|d| d.name() == name)
    }

    /// 生成描述和像素数据
    pub fn synthesize(self, array_material_count: u32) -> (TextureDesc, Vec<u8>) {
        match self {
            DefaultTexture::Checkerboard => (
                flat_desc(CHECKER_DIMENSION, 1, TextureKind::Flat2D),
                checkerboard(CHECKER_DIMENSION, CHECKER_CELL),
            ),
            DefaultTexture::Diffuse => (flat_desc(FLAT_DIMENSION, 1, TextureKind::Flat2D), solid(WHITE)),
            DefaultTexture::Specular => (flat_desc(FLAT_DIMENSION, 1, TextureKind::Flat2D), solid(BLACK)),
            DefaultTexture::Normal => (flat_desc(FLAT_DIMENSION, 1, TextureKind::Flat2D), solid(FLAT_NORMAL)),
            DefaultTexture::Combined => (flat_desc(FLAT_DIMENSION, 1, TextureKind::Flat2D), solid(FLAT_COMBINED)),
            DefaultTexture::Cube => {
                let face = checkerboard(FLAT_DIMENSION, FLAT_DIMENSION / 4);
                let pixels = face.repeat(CubeFace::ALL.len());
                (flat_desc(FLAT_DIMENSION, CubeFace::ALL.len() as u32, TextureKind::Cube), pixels)
            }
            DefaultTexture::Array => {
                // 每个材质依次占用 diffuse / specular / normal / combined 四层
                let material: Vec<u8> = [WHITE, BLACK, FLAT_NORMAL, FLAT_COMBINED].into_iter().flat_map(solid).collect();
                let count = array_material_count.max(1);
                (
                    flat_desc(FLAT_DIMENSION, 4 * count, TextureKind::Array2D),
                    material.repeat(count as usize),
                )
            }
        }
    }
}

fn flat_desc(dimension: u32, layer_count: u32, kind: TextureKind) -> TextureDesc {
    TextureDesc {
        width: dimension,
        height: dimension,
        channel_count: 4,
        layer_count,
        mip_levels: 1,
        kind,
        flags: TextureFlags::empty(),
    }
}

fn solid(color: [u8; 4]) -> Vec<u8> {
    color.repeat((FLAT_DIMENSION * FLAT_DIMENSION) as usize)
}

fn checkerboard(dimension: u32, cell: u32) -> Vec<u8> {
    let mut pixels = Vec::with_capacity((dimension * dimension * 4) as usize);
    for y in 0..dimension {
        for x in 0..dimension {
            let color = if (x / cell + y / cell) % 2 == 0 { BLUE } else { WHITE };
            pixels.extend_from_slice(&color);
        }
    }
    pixels
}

/// 缓存中所有默认纹理的句柄
///
/// 同时保留一份记录副本，作为渲染时的兜底，不依赖表中的查找。
pub struct DefaultTextures {
    handles: [TextureHandle; DefaultTexture::COUNT],
    records: Vec<TextureRecord>,
}

// new & init
impl DefaultTextures {
    /// 同步创建所有默认纹理并登记到表中
    pub fn create<B: GpuResourceBackend + ?Sized>(
        registry: &mut TextureRegistry,
        backend: &mut B,
        array_material_count: u32,
    ) -> TextureResult<Self> {
        let _span = tracy_client::span!("DefaultTextures::create");

        let mut handles = [TextureHandle::default(); DefaultTexture::COUNT];
        let mut records = Vec::with_capacity(DefaultTexture::COUNT);

        for default in DefaultTexture::ALL {
            let (desc, pixels) = default.synthesize(array_material_count);
            let backend_handle = backend.create(default.name(), &desc, &pixels)?;
            let record = TextureRecord::from_desc(default.name(), &desc, backend_handle, INVALID_GENERATION);

            handles[default.index()] = registry.insert(
                ReferenceEntry {
                    record: record.clone(),
                    ref_count: 1,
                    auto_release: false,
                    source: None,
                    in_flight: None,
                    indexed: true,
                },
                Some(default.name()),
            )?;
            records.push(record);
            log::info!("Created default texture: {}", default.name());
        }

        Ok(Self { handles, records })
    }
}

// getters
impl DefaultTextures {
    #[inline]
    pub fn handle(&self, default: DefaultTexture) -> TextureHandle {
        self.handles[default.index()]
    }

    #[inline]
    pub fn record(&self, default: DefaultTexture) -> &TextureRecord {
        &self.records[default.index()]
    }

    #[inline]
    pub fn contains(&self, handle: TextureHandle) -> bool {
        self.handles.contains(&handle)
    }

    /// 尚未就绪的纹理应该使用哪一个默认纹理
    pub fn fallback_for(kind: TextureKind) -> DefaultTexture {
        match kind {
            TextureKind::Flat2D | TextureKind::Writable => DefaultTexture::Checkerboard,
            TextureKind::Array2D => DefaultTexture::Array,
            TextureKind::Cube => DefaultTexture::Cube,
        }
    }
}
