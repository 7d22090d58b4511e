use std::sync::Arc;

use anyhow::Context;

use crate::assembly::{AssembledImage, LoadSource, assemble_cube};
use crate::backend::GpuResourceBackend;
use crate::config::CacheConfig;
use crate::decoder::{FileImageDecoder, ImageDecoder};
use crate::defaults::{DefaultTexture, DefaultTextures};
use crate::error::{TextureError, TextureResult};
use crate::handle::{INVALID_GENERATION, TextureHandle, TextureState, next_generation};
use crate::job::{InlineJobRunner, JobRunner, LoadCompletion, LoadRequest, ThreadPoolJobRunner};
use crate::load_slot::LoadSlotPool;
use crate::record::{BackendHandle, TextureDesc, TextureFlags, TextureKind, TextureRecord};
use crate::registry::{ReferenceEntry, TextureRegistry, destroy_record};

/// `update` 中产生的加载结果
#[derive(Debug)]
pub enum LoadEvent {
    Loaded {
        name: String,
        handle: TextureHandle,
        generation: u32,
    },
    Failed {
        name: String,
        handle: TextureHandle,
        error: TextureError,
    },
}

/// 可写纹理的创建参数
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct WritableDesc {
    pub width: u32,
    pub height: u32,
    pub channel_count: u8,
    pub layer_count: u32,
    pub has_transparency: bool,
    pub is_depth: bool,
}

impl WritableDesc {
    pub fn new(width: u32, height: u32, channel_count: u8) -> Self {
        Self {
            width,
            height,
            channel_count,
            layer_count: 1,
            has_transparency: false,
            is_depth: false,
        }
    }

    #[inline]
    pub fn layers(mut self, layer_count: u32) -> Self {
        self.layer_count = layer_count;
        self
    }

    #[inline]
    pub fn transparent(mut self, has_transparency: bool) -> Self {
        self.has_transparency = has_transparency;
        self
    }

    #[inline]
    pub fn depth(mut self, is_depth: bool) -> Self {
        self.is_depth = is_depth;
        self
    }

    fn texture_desc(&self) -> TextureDesc {
        let mut flags = TextureFlags::WRITABLE;
        flags.set(TextureFlags::HAS_TRANSPARENCY, self.has_transparency);
        flags.set(TextureFlags::IS_DEPTH, self.is_depth);

        TextureDesc {
            width: self.width,
            height: self.height,
            channel_count: self.channel_count,
            layer_count: self.layer_count,
            mip_levels: 1,
            kind: TextureKind::Writable,
            flags,
        }
    }

    fn validate(&self, name: &str) -> TextureResult<()> {
        if self.width == 0 || self.height == 0 || self.layer_count == 0 || !(1..=4).contains(&self.channel_count) {
            return Err(TextureError::InvalidDescriptor(format!(
                "writable texture '{name}': {}x{}x{} with {} layers",
                self.width, self.height, self.channel_count, self.layer_count
            )));
        }
        Ok(())
    }
}

/// 纹理缓存 (Facade)
///
/// 组合引用表、名字索引、加载槽位池和默认纹理，对外提供 Acquire / Release 等接口。
/// 职责:
/// 1. 折叠同名的重复 Acquire，维护引用计数与自动释放。
/// 2. Flat2D / Array2D 通过 JobRunner 异步解码，`update` 中在 owner 线程上传并替换。
/// 3. Cube 和可写纹理在调用线程上同步创建。
/// 4. 纹理未就绪或加载失败时，`renderable` 返回对应的默认纹理。
///
/// 所有接口都要求 `&mut self`，只能在 owner 线程 (通常是渲染线程) 上调用；
/// worker 线程只接触 ImageDecoder。
pub struct ResourceCache<B: GpuResourceBackend> {
    config: CacheConfig,

    registry: TextureRegistry,
    slots: LoadSlotPool,
    defaults: DefaultTextures,

    backend: B,
    decoder: Arc<dyn ImageDecoder>,
    job_runner: Box<dyn JobRunner>,

    destroyed: bool,
}

// new & init
impl<B: GpuResourceBackend> ResourceCache<B> {
    pub fn new(
        config: CacheConfig,
        mut backend: B,
        decoder: Arc<dyn ImageDecoder>,
        job_runner: Box<dyn JobRunner>,
    ) -> anyhow::Result<Self> {
        let _span = tracy_client::span!("ResourceCache::new");
        config.validate()?;

        let mut registry = TextureRegistry::new(config.max_texture_count);
        let defaults = DefaultTextures::create(&mut registry, &mut backend, config.default_array_material_count)
            .context("创建默认纹理失败")?;

        log::info!(
            "Texture cache created: max_loading = {}, max_texture_count = {}",
            config.max_loading,
            config.max_texture_count
        );

        Ok(Self {
            slots: LoadSlotPool::new(config.max_loading),
            config,
            registry,
            defaults,
            backend,
            decoder,
            job_runner,
            destroyed: false,
        })
    }

    /// 从 `texture_root` 读取图片，在线程池上解码
    pub fn with_thread_pool(config: CacheConfig, backend: B) -> anyhow::Result<Self> {
        let decoder = Arc::new(FileImageDecoder::from_config(&config));
        let job_runner = Box::new(ThreadPoolJobRunner::new(config.worker_threads)?);
        Self::new(config, backend, decoder, job_runner)
    }

    /// 在调用线程上解码，完成消息在下一次 `update` 时处理
    pub fn with_inline_runner(config: CacheConfig, backend: B, decoder: Arc<dyn ImageDecoder>) -> anyhow::Result<Self> {
        Self::new(config, backend, decoder, Box::new(InlineJobRunner::new()))
    }
}

// acquire
impl<B: GpuResourceBackend> ResourceCache<B> {
    /// 获取单张 2D 纹理
    ///
    /// 非阻塞调用。已有条目时只增加引用计数；否则分配句柄并提交异步加载，
    /// 立即返回的句柄 generation 无效，渲染时使用默认纹理。
    pub fn acquire(&mut self, name: &str, auto_release: bool) -> TextureResult<TextureHandle> {
        let _span = tracy_client::span!("ResourceCache::acquire");
        self.acquire_async(name, LoadSource::Flat2D, auto_release)
    }

    /// 获取数组纹理，`layers` 中的每个名字对应一层
    pub fn acquire_array<S: AsRef<str>>(
        &mut self,
        name: &str,
        layers: &[S],
        auto_release: bool,
    ) -> TextureResult<TextureHandle> {
        let _span = tracy_client::span!("ResourceCache::acquire_array");

        if layers.is_empty() {
            return Err(TextureError::InvalidDescriptor(format!("array texture '{name}' has no layers")));
        }
        let layers = layers.iter().map(|layer| layer.as_ref().to_string()).collect();
        self.acquire_async(name, LoadSource::Array2D { layers }, auto_release)
    }

    /// 获取立方体纹理
    ///
    /// 同步解码六个面并上传，失败时撤销本次调用增加的引用。
    pub fn acquire_cube(&mut self, name: &str, auto_release: bool) -> TextureResult<TextureHandle> {
        let _span = tracy_client::span!("ResourceCache::acquire_cube");

        if let Some(handle) = self.default_by_name(name, TextureKind::Cube)? {
            return Ok(handle);
        }
        self.check_kind(name, TextureKind::Cube)?;

        let outcome =
            self.registry.process_reference(name, 1, auto_release, TextureKind::Cube, &mut self.backend)?;
        if !outcome.needs_creation {
            return Ok(outcome.handle);
        }

        match self.load_cube(outcome.handle) {
            Ok(_) => Ok(outcome.handle),
            Err(err) => {
                log::error!("Failed to load cube texture '{}': {}", name, err);
                self.registry.rollback_acquire(&outcome);
                Err(err)
            }
        }
    }

    /// 获取单层可写纹理
    pub fn acquire_writable(
        &mut self,
        name: &str,
        desc: WritableDesc,
        auto_release: bool,
    ) -> TextureResult<TextureHandle> {
        let _span = tracy_client::span!("ResourceCache::acquire_writable");

        if desc.layer_count != 1 {
            return Err(TextureError::InvalidDescriptor(format!(
                "writable texture '{name}' has {} layers, use acquire_array_writable",
                desc.layer_count
            )));
        }
        self.acquire_writable_impl(name, desc, auto_release)
    }

    /// 获取多层可写纹理
    pub fn acquire_array_writable(
        &mut self,
        name: &str,
        desc: WritableDesc,
        auto_release: bool,
    ) -> TextureResult<TextureHandle> {
        let _span = tracy_client::span!("ResourceCache::acquire_array_writable");
        self.acquire_writable_impl(name, desc, auto_release)
    }

    /// 接管外部持有的 backend 资源 (render target、swapchain image、深度缓冲等)
    ///
    /// `register` 为 false 时不登记名字，只能通过返回的句柄访问。
    /// 包装纹理不会被自动释放，缓存也从不销毁它的 backend 资源。
    pub fn wrap_internal(
        &mut self,
        name: &str,
        desc: TextureDesc,
        backend_handle: BackendHandle,
        register: bool,
    ) -> TextureResult<TextureHandle> {
        let _span = tracy_client::span!("ResourceCache::wrap_internal");

        let mut desc = desc;
        desc.flags |= TextureFlags::WRAPPED;

        let handle = self.registry.insert(
            ReferenceEntry {
                record: TextureRecord::from_desc(name, &desc, backend_handle, next_generation(INVALID_GENERATION)),
                ref_count: 1,
                auto_release: false,
                source: None,
                in_flight: None,
                indexed: register,
            },
            register.then_some(name),
        )?;

        log::info!("Wrapped texture: {} ({}x{})", name, desc.width, desc.height);
        Ok(handle)
    }

    fn acquire_async(&mut self, name: &str, source: LoadSource, auto_release: bool) -> TextureResult<TextureHandle> {
        if let Some(handle) = self.default_by_name(name, source.kind())? {
            return Ok(handle);
        }
        self.check_kind(name, source.kind())?;

        // 饱和检查必须在修改引用计数之前，保证失败时没有副作用
        let will_submit = match self.registry.find(name).and_then(|handle| self.registry.get(handle)) {
            None => true,
            Some(entry) => !entry.record.is_initialized() && entry.in_flight.is_none(),
        };
        if will_submit && self.slots.is_saturated() {
            return Err(TextureError::PipelineSaturated {
                capacity: self.slots.capacity(),
            });
        }

        let outcome = self.registry.process_reference(name, 1, auto_release, source.kind(), &mut self.backend)?;
        let Some(entry) = self.registry.get_mut(outcome.handle) else {
            return Err(TextureError::InvalidHandle);
        };
        // 已经在加载中：只增加引用，不重复提交
        if !outcome.needs_creation || entry.in_flight.is_some() {
            return Ok(outcome.handle);
        }

        // 重新获取一个首次加载失败的条目时，以最新的来源为准
        entry.source = Some(source);
        if let Err(err) = self.submit_load(outcome.handle) {
            self.registry.rollback_acquire(&outcome);
            return Err(err);
        }
        Ok(outcome.handle)
    }

    fn acquire_writable_impl(
        &mut self,
        name: &str,
        desc: WritableDesc,
        auto_release: bool,
    ) -> TextureResult<TextureHandle> {
        if let Some(handle) = self.default_by_name(name, TextureKind::Writable)? {
            return Ok(handle);
        }
        desc.validate(name)?;
        self.check_kind(name, TextureKind::Writable)?;

        let outcome =
            self.registry.process_reference(name, 1, auto_release, TextureKind::Writable, &mut self.backend)?;
        if !outcome.needs_creation {
            return Ok(outcome.handle);
        }

        let texture_desc = desc.texture_desc();
        let backend_handle = match self.backend.create_writable(name, &texture_desc) {
            Ok(backend_handle) => backend_handle,
            Err(err) => {
                log::error!("Failed to create writable texture '{}': {:#}", name, err);
                self.registry.rollback_acquire(&outcome);
                return Err(err.into());
            }
        };

        if let Some(entry) = self.registry.get_mut(outcome.handle) {
            entry.record = TextureRecord::from_desc(
                name,
                &texture_desc,
                backend_handle,
                next_generation(INVALID_GENERATION),
            );
        }
        log::info!(
            "Created writable texture: {} ({}x{}x{}, {} layers)",
            name,
            desc.width,
            desc.height,
            desc.channel_count,
            desc.layer_count
        );
        Ok(outcome.handle)
    }
}

// release
impl<B: GpuResourceBackend> ResourceCache<B> {
    /// 按名字释放一次引用
    ///
    /// 未知名字只会记录警告；默认纹理不受影响。
    pub fn release(&mut self, name: &str) -> TextureResult<()> {
        let _span = tracy_client::span!("ResourceCache::release");

        if DefaultTexture::from_name(name).is_some() {
            log::warn!("Release of default texture '{}' ignored", name);
            return Ok(());
        }
        self.registry
            .process_reference(name, -1, false, TextureKind::Flat2D, &mut self.backend)
            .map(|_| ())
    }

    /// 按句柄释放一次引用，过期的句柄返回 InvalidHandle
    pub fn release_handle(&mut self, handle: TextureHandle) -> TextureResult<()> {
        let _span = tracy_client::span!("ResourceCache::release_handle");

        if self.defaults.contains(handle) {
            log::warn!("Release of default texture handle {:?} ignored", handle);
            return Ok(());
        }
        self.registry.adjust(handle, -1, &mut self.backend).map(|_| ())
    }
}

// modify
impl<B: GpuResourceBackend> ResourceCache<B> {
    /// 重新从原始来源加载纹理
    ///
    /// Flat2D / Array2D 走异步管线，Cube 同步加载。失败时原有记录保持不变。
    pub fn reload(&mut self, handle: TextureHandle) -> TextureResult<()> {
        let _span = tracy_client::span!("ResourceCache::reload");

        let entry = self.registry.get(handle).ok_or(TextureError::InvalidHandle)?;
        let name = &entry.record.name;
        if self.defaults.contains(handle) {
            return Err(TextureError::InvalidDescriptor(format!("default texture '{name}' cannot be reloaded")));
        }
        let Some(source) = &entry.source else {
            return Err(TextureError::InvalidDescriptor(format!("texture '{name}' has no load source")));
        };
        if entry.in_flight.is_some() {
            return Err(TextureError::LoadInFlight { name: name.clone() });
        }

        if matches!(source, LoadSource::Cube) {
            self.load_cube(handle).map(|_| ())
        } else {
            self.submit_load(handle)
        }
    }

    /// 修改可写纹理的尺寸
    ///
    /// `regenerate` 为 true 时重新分配 backend 资源并更新记录的尺寸 (包装纹理的资源由外部负责)；
    /// 为 false 时只递增 generation，尺寸保持不变。
    pub fn resize(&mut self, handle: TextureHandle, width: u32, height: u32, regenerate: bool) -> TextureResult<()> {
        let _span = tracy_client::span!("ResourceCache::resize");

        let entry = self.registry.get_mut(handle).ok_or(TextureError::InvalidHandle)?;
        let record = &mut entry.record;
        if !record.is_writable() {
            return Err(TextureError::NotWritable {
                name: record.name.clone(),
            });
        }
        if width == 0 || height == 0 {
            return Err(TextureError::InvalidDescriptor(format!(
                "cannot resize '{}' to {}x{}",
                record.name, width, height
            )));
        }

        if !regenerate {
            // 记录的尺寸必须和 backend 资源一致，否则 write_data 的边界检查会失效
            record.generation = next_generation(record.generation);
            log::info!(
                "Texture {} keeps {}x{}, requested {}x{} without regenerate (generation {})",
                record.name,
                record.width,
                record.height,
                width,
                height,
                record.generation
            );
            return Ok(());
        }

        if !record.is_wrapped()
            && let Some(backend_handle) = record.backend
        {
            self.backend.resize(backend_handle, width, height)?;
        }

        record.width = width;
        record.height = height;
        record.generation = next_generation(record.generation);
        log::info!("Resized texture: {} -> {}x{} (generation {})", record.name, width, height, record.generation);
        Ok(())
    }

    /// 向可写纹理写入数据，`offset` 以字节为单位，覆盖所有层的 mip 0
    pub fn write_data(&mut self, handle: TextureHandle, offset: usize, bytes: &[u8]) -> TextureResult<()> {
        let _span = tracy_client::span!("ResourceCache::write_data");

        let record = &self.registry.get(handle).ok_or(TextureError::InvalidHandle)?.record;
        if !record.is_writable() {
            return Err(TextureError::NotWritable {
                name: record.name.clone(),
            });
        }

        let capacity = record.desc().byte_size();
        if offset.checked_add(bytes.len()).is_none_or(|end| end > capacity) {
            return Err(TextureError::OutOfBounds {
                name: record.name.clone(),
                offset,
                len: bytes.len(),
                capacity,
            });
        }

        let backend_handle = record.backend.ok_or(TextureError::InvalidHandle)?;
        self.backend.write_data(backend_handle, offset, bytes)?;
        Ok(())
    }

    /// 替换包装纹理的外部资源 (例如 swapchain 重建之后)，返回新的 generation
    pub fn update_wrapped(
        &mut self,
        handle: TextureHandle,
        backend_handle: BackendHandle,
        width: u32,
        height: u32,
    ) -> TextureResult<u32> {
        let _span = tracy_client::span!("ResourceCache::update_wrapped");

        let record = &mut self.registry.get_mut(handle).ok_or(TextureError::InvalidHandle)?.record;
        if !record.is_wrapped() {
            return Err(TextureError::InvalidDescriptor(format!("texture '{}' is not wrapped", record.name)));
        }

        record.backend = Some(backend_handle);
        record.width = width;
        record.height = height;
        record.generation = next_generation(record.generation);
        Ok(record.generation)
    }
}

// update
impl<B: GpuResourceBackend> ResourceCache<B> {
    /// 处理已经完成的加载 (每帧调用)
    ///
    /// 每条完成消息在 owner 线程上恰好执行一次 on-success 或 on-failure。
    pub fn update(&mut self) -> Vec<LoadEvent> {
        let _span = tracy_client::span!("ResourceCache::update");

        let mut events = Vec::new();
        while let Some(completion) = self.job_runner.try_recv() {
            if let Some(event) = self.complete_load(completion) {
                events.push(event);
            }
        }
        events
    }

    fn complete_load(&mut self, completion: LoadCompletion) -> Option<LoadEvent> {
        // 槽位无论成功失败都在这里归还，解码数据随 completion 一起释放
        let Some(slot) = self.slots.release(completion.slot) else {
            log::warn!("Completion for unknown load slot {:?} dropped", completion.slot);
            return None;
        };

        let entry = match self.registry.get_mut(slot.target) {
            Some(entry) if entry.in_flight == Some(slot.id) => entry,
            _ => {
                log::warn!("Discard load of '{}': texture was released while loading", slot.name);
                return None;
            }
        };
        entry.in_flight = None;

        let result = completion.result.and_then(|image| {
            if image.layer_count != slot.expected_layer_count {
                return Err(TextureError::InvalidDescriptor(format!(
                    "texture '{}' expected {} layers, got {}",
                    slot.name, slot.expected_layer_count, image.layer_count
                )));
            }
            self.swap_in(slot.target, image, slot.kind)
        });

        match result {
            Ok(generation) => {
                if slot.generation_at_request == INVALID_GENERATION {
                    log::info!("Texture loaded: {}", slot.name);
                } else {
                    log::info!("Texture reloaded: {} (generation {})", slot.name, generation);
                }
                Some(LoadEvent::Loaded {
                    name: slot.name,
                    handle: slot.target,
                    generation,
                })
            }
            Err(error) => {
                log::error!("Failed to load texture '{}': {}", slot.name, error);

                let first_load = self.registry.get(slot.target).is_some_and(|entry| !entry.record.is_initialized());
                if first_load && self.config.evict_on_first_load_failure {
                    log::info!("Evict texture after failed first load: {}", slot.name);
                    self.registry.remove(slot.target);
                }
                Some(LoadEvent::Failed {
                    name: slot.name,
                    handle: slot.target,
                    error,
                })
            }
        }
    }

    /// 上传新数据并替换记录，旧的 backend 资源在替换完成之后才销毁
    fn swap_in(&mut self, handle: TextureHandle, image: AssembledImage, kind: TextureKind) -> TextureResult<u32> {
        let _span = tracy_client::span!("ResourceCache::swap_in");

        let name = self.registry.get(handle).ok_or(TextureError::InvalidHandle)?.record.name.clone();
        let desc = image.desc(kind, self.config.generate_mips);
        let backend_handle = self.backend.create(&name, &desc, &image.pixels)?;

        let Some(entry) = self.registry.get_mut(handle) else {
            self.backend.destroy(backend_handle);
            return Err(TextureError::InvalidHandle);
        };
        let generation = next_generation(entry.record.generation);
        let old = std::mem::replace(
            &mut entry.record,
            TextureRecord::from_desc(name, &desc, backend_handle, generation),
        );
        destroy_record(&old, &mut self.backend);

        Ok(generation)
    }

    fn submit_load(&mut self, handle: TextureHandle) -> TextureResult<()> {
        let entry = self.registry.get_mut(handle).ok_or(TextureError::InvalidHandle)?;
        let name = entry.record.name.clone();
        let source = entry
            .source
            .clone()
            .ok_or_else(|| TextureError::InvalidDescriptor(format!("texture '{name}' has no load source")))?;

        let slot =
            self.slots.reserve(handle, &name, source.kind(), source.layer_count(), entry.record.generation)?;
        entry.in_flight = Some(slot);
        log::info!("Request load texture: {}", name);

        let decoder = Arc::clone(&self.decoder);
        self.job_runner.submit(LoadRequest {
            slot,
            entry: Box::new(move || source.assemble(decoder.as_ref(), &name)),
        });
        Ok(())
    }

    fn load_cube(&mut self, handle: TextureHandle) -> TextureResult<u32> {
        let entry = self.registry.get_mut(handle).ok_or(TextureError::InvalidHandle)?;
        let name = entry.record.name.clone();
        entry.source = Some(LoadSource::Cube);

        let image = assemble_cube(self.decoder.as_ref(), &name)?;
        let generation = self.swap_in(handle, image, TextureKind::Cube)?;
        log::info!("Cube texture loaded: {} (generation {})", name, generation);
        Ok(generation)
    }
}

// getters
impl<B: GpuResourceBackend> ResourceCache<B> {
    pub fn get(&self, handle: TextureHandle) -> TextureResult<&TextureRecord> {
        self.registry.get(handle).map(|entry| &entry.record).ok_or(TextureError::InvalidHandle)
    }

    /// 获取可以直接绑定的纹理记录
    ///
    /// 纹理已上传时返回它本身；仍在加载、加载失败或者句柄已失效时返回对应种类的默认纹理。
    pub fn renderable(&self, handle: TextureHandle) -> &TextureRecord {
        match self.registry.get(handle) {
            Some(entry) if entry.record.is_initialized() => &entry.record,
            Some(entry) => self.defaults.record(DefaultTextures::fallback_for(entry.record.kind)),
            None => self.defaults.record(DefaultTexture::Checkerboard),
        }
    }

    #[inline]
    pub fn state(&self, handle: TextureHandle) -> TextureState {
        self.registry.state(handle)
    }

    #[inline]
    pub fn ref_count(&self, handle: TextureHandle) -> Option<u64> {
        self.registry.get(handle).map(|entry| entry.ref_count)
    }

    #[inline]
    pub fn find(&self, name: &str) -> Option<TextureHandle> {
        self.registry.find(name)
    }

    /// 条目数量，包含默认纹理
    #[inline]
    pub fn len(&self) -> usize {
        self.registry.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }

    /// 正在进行中的异步加载数量
    #[inline]
    pub fn in_flight(&self) -> usize {
        self.slots.in_flight()
    }

    #[inline]
    pub fn is_default(&self, handle: TextureHandle) -> bool {
        self.defaults.contains(handle)
    }

    #[inline]
    pub fn default_handle(&self, default: DefaultTexture) -> TextureHandle {
        self.defaults.handle(default)
    }

    #[inline]
    pub fn default_texture(&self) -> TextureHandle {
        self.defaults.handle(DefaultTexture::Checkerboard)
    }

    #[inline]
    pub fn default_diffuse(&self) -> TextureHandle {
        self.defaults.handle(DefaultTexture::Diffuse)
    }

    #[inline]
    pub fn default_specular(&self) -> TextureHandle {
        self.defaults.handle(DefaultTexture::Specular)
    }

    #[inline]
    pub fn default_normal(&self) -> TextureHandle {
        self.defaults.handle(DefaultTexture::Normal)
    }

    #[inline]
    pub fn default_combined(&self) -> TextureHandle {
        self.defaults.handle(DefaultTexture::Combined)
    }

    #[inline]
    pub fn default_cube(&self) -> TextureHandle {
        self.defaults.handle(DefaultTexture::Cube)
    }

    #[inline]
    pub fn default_array(&self) -> TextureHandle {
        self.defaults.handle(DefaultTexture::Array)
    }

    #[inline]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    #[inline]
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    #[inline]
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }
}

// tools
impl<B: GpuResourceBackend> ResourceCache<B> {
    /// 默认纹理的名字不参与引用计数，直接返回对应句柄
    ///
    /// 请求的种类和默认纹理不一致时返回 `InvalidDescriptor`。
    fn default_by_name(&self, name: &str, kind: TextureKind) -> TextureResult<Option<TextureHandle>> {
        let Some(default) = DefaultTexture::from_name(name) else {
            return Ok(None);
        };
        let default_kind = self.defaults.record(default).kind;
        if default_kind != kind {
            return Err(TextureError::InvalidDescriptor(format!(
                "default texture '{name}' is {default_kind:?}, requested as {kind:?}"
            )));
        }
        log::debug!("Acquire of default texture '{}' does not change its reference count", name);
        Ok(Some(self.defaults.handle(default)))
    }

    fn check_kind(&self, name: &str, kind: TextureKind) -> TextureResult<()> {
        match self.registry.find(name).and_then(|handle| self.registry.get(handle)) {
            Some(entry) if entry.record.kind != kind => Err(TextureError::InvalidDescriptor(format!(
                "texture '{name}' is already registered as {:?}",
                entry.record.kind
            ))),
            _ => Ok(()),
        }
    }
}

// destroy
impl<B: GpuResourceBackend> ResourceCache<B> {
    /// 关闭加载线程并销毁所有 backend 资源 (包装纹理除外)
    ///
    /// 之后缓存不能再使用；未被调用时由 Drop 完成同样的工作。
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        let _span = tracy_client::span!("ResourceCache::destroy");

        self.job_runner.shutdown();
        let mut discarded = 0;
        while self.job_runner.try_recv().is_some() {
            discarded += 1;
        }
        if discarded > 0 {
            log::info!("Discarded {} undelivered texture loads", discarded);
        }
        let abandoned = self.slots.drain();
        for slot in &abandoned {
            log::debug!("Abandoned load of {} (generation {})", slot.name, slot.generation_at_request);
        }
        if !abandoned.is_empty() {
            log::info!("Released {} in-flight load slots", abandoned.len());
        }

        for entry in self.registry.drain() {
            destroy_record(&entry.record, &mut self.backend);
        }

        self.destroyed = true;
        log::info!("Texture cache destroyed");
    }
}

impl<B: GpuResourceBackend> Drop for ResourceCache<B> {
    fn drop(&mut self) {
        self.destroy();
    }
}
