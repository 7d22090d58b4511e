//! 带引用计数与异步加载管线的命名纹理缓存
//!
//! # 组成
//! - `TextureRegistry`: 引用表 + 名字索引，折叠同名的重复获取
//! - `LoadSlotPool`: 固定容量的加载槽位，饱和时立即失败而不是阻塞
//! - `assembly`: Flat2D / Array2D / Cube 的组装与跨层校验
//! - `ResourceCache`: 对外的 Facade，负责在 owner 线程上传并替换
//!
//! # 线程模型
//! 所有接口都在 owner 线程上调用。worker 线程 (`JobRunner`) 只调用 `ImageDecoder`，
//! 解码结果通过 channel 交还，在 `ResourceCache::update` 中上传。
//!
//! # Generation
//! 每次成功替换都会递增记录的 generation (首次加载为 0)，
//! 渲染侧比较 generation 即可知道纹理是否被热替换过。

pub mod assembly;
pub mod backend;
pub mod cache;
pub mod config;
pub mod decoder;
pub mod defaults;
pub mod error;
pub mod handle;
pub mod job;
pub mod load_slot;
pub mod record;
pub mod registry;

pub use backend::{GpuResourceBackend, HeadlessBackend};
pub use cache::{LoadEvent, ResourceCache, WritableDesc};
pub use config::CacheConfig;
pub use decoder::{DecodedImage, FileImageDecoder, ImageDecoder, MemoryImageDecoder};
pub use defaults::DefaultTexture;
pub use error::{TextureError, TextureResult};
pub use handle::{TextureHandle, TextureState};
pub use job::{InlineJobRunner, JobRunner, ThreadPoolJobRunner};
pub use record::{BackendHandle, TextureDesc, TextureFlags, TextureKind, TextureRecord};
