//! 在无 GPU 的环境下驱动纹理缓存
//!
//! 用法: `texture_cache_demo [--config <path>] <request>...`
//! - `rock`: 单张 2D 纹理
//! - `cube:sky`: 立方体纹理，读取 sky_r / sky_l / sky_u / sky_d / sky_f / sky_b
//! - `array:atlas=a,b,c`: 数组纹理

use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Context;
use texture_cache::{CacheConfig, HeadlessBackend, LoadEvent, ResourceCache, TextureError, TextureHandle};
use texture_cache_tools::init_log::init_log;
use texture_cache_tools::paths::ToolPaths;

const LOAD_TIMEOUT: Duration = Duration::from_secs(30);

enum Request {
    Flat(String),
    Cube(String),
    Array { name: String, layers: Vec<String> },
}

impl Request {
    fn parse(arg: &str) -> anyhow::Result<Self> {
        if let Some(name) = arg.strip_prefix("cube:") {
            return Ok(Request::Cube(name.to_string()));
        }
        if let Some(body) = arg.strip_prefix("array:") {
            let (name, layers) = body.split_once('=').with_context(|| format!("数组请求缺少 '=': {}", arg))?;
            let layers = layers.split(',').filter(|s| !s.is_empty()).map(str::to_string).collect();
            return Ok(Request::Array {
                name: name.to_string(),
                layers,
            });
        }
        Ok(Request::Flat(arg.to_string()))
    }

    fn name(&self) -> &str {
        match self {
            Request::Flat(name) | Request::Cube(name) => name,
            Request::Array { name, .. } => name,
        }
    }

    fn acquire(&self, cache: &mut ResourceCache<HeadlessBackend>) -> Result<TextureHandle, TextureError> {
        match self {
            Request::Flat(name) => cache.acquire(name, true),
            Request::Cube(name) => cache.acquire_cube(name, true),
            Request::Array { name, layers } => cache.acquire_array(name, layers.as_slice(), true),
        }
    }
}

fn parse_args() -> anyhow::Result<(Option<PathBuf>, Vec<Request>)> {
    let mut config_path = None;
    let mut requests = Vec::new();

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            config_path = Some(PathBuf::from(args.next().context("--config 需要一个路径")?));
        } else {
            requests.push(Request::parse(&arg)?);
        }
    }
    Ok((config_path, requests))
}

fn load_config(path: Option<PathBuf>) -> anyhow::Result<CacheConfig> {
    let path = path.unwrap_or_else(ToolPaths::default_config_path);
    if path.exists() {
        log::info!("Load cache config: {}", path.display());
        return CacheConfig::from_file(&path);
    }

    log::info!("No cache config at {}, using defaults", path.display());
    Ok(CacheConfig {
        texture_root: ToolPaths::textures_path(),
        ..Default::default()
    })
}

fn log_events(events: Vec<LoadEvent>) {
    for event in events {
        match event {
            LoadEvent::Loaded { name, generation, .. } => {
                log::info!("Loaded '{}' (generation {})", name, generation);
            }
            LoadEvent::Failed { name, error, .. } => {
                log::error!("Failed '{}': {}", name, error);
            }
        }
    }
}

fn main() -> anyhow::Result<()> {
    init_log();
    let _client = tracy_client::Client::start();

    let (config_path, requests) = parse_args()?;
    let config = load_config(config_path)?;
    let mut cache = ResourceCache::with_thread_pool(config, HeadlessBackend::new())?;

    let deadline = Instant::now() + LOAD_TIMEOUT;
    let mut acquired = Vec::new();
    for request in &requests {
        loop {
            match request.acquire(&mut cache) {
                Ok(handle) => {
                    acquired.push((request.name().to_string(), handle));
                    break;
                }
                // 槽位满了就先处理完成的加载，再重试
                Err(TextureError::PipelineSaturated { .. }) if Instant::now() < deadline => {
                    log_events(cache.update());
                    thread::sleep(Duration::from_millis(5));
                }
                Err(err) => {
                    log::error!("Acquire '{}' failed: {}", request.name(), err);
                    break;
                }
            }
        }
    }

    while cache.in_flight() > 0 && Instant::now() < deadline {
        log_events(cache.update());
        thread::sleep(Duration::from_millis(5));
    }
    log_events(cache.update());

    for (name, handle) in &acquired {
        let record = cache.renderable(*handle);
        log::info!(
            "{}: {:?}, renders '{}' {}x{}x{} ({} layers, {} mips)",
            name,
            cache.state(*handle),
            record.name,
            record.width,
            record.height,
            record.channel_count,
            record.layer_count,
            record.mip_levels
        );
    }

    for (name, _) in &acquired {
        cache.release(name)?;
    }
    cache.destroy();

    let backend = cache.backend();
    log::info!(
        "Backend resources: created {}, destroyed {}, live {}",
        backend.created_count(),
        backend.destroyed_count(),
        backend.live_count()
    );
    Ok(())
}
