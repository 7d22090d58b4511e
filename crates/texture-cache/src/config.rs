use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::defaults::DefaultTexture;

/// 纹理缓存的配置
///
/// 可以从 TOML 文件加载，缺省的字段使用默认值。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// 同时进行的异步加载数量上限
    pub max_loading: usize,

    /// 缓存中条目数量上限 (包含默认纹理)
    pub max_texture_count: usize,

    /// FileImageDecoder 查找纹理的根目录
    pub texture_root: PathBuf,

    /// 名字不带扩展名时依次尝试的扩展名
    pub extensions: Vec<String>,

    /// 是否为解码得到的纹理生成完整的 mip 链
    pub generate_mips: bool,

    /// 首次加载失败时是否直接删除条目
    /// - false: 条目保持 Reserved，句柄仍然有效，再次 Acquire 会重新提交
    /// - true: 条目和名字索引一起删除，调用者需要重新 Acquire
    pub evict_on_first_load_failure: bool,

    /// worker 线程数，0 表示使用 rayon 的默认值
    pub worker_threads: usize,

    /// 默认数组纹理中重复的材质数量
    pub default_array_material_count: u32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_loading: 32,
            max_texture_count: 1024,
            texture_root: PathBuf::from("textures"),
            extensions: ["png", "jpg", "jpeg", "tga", "bmp"].iter().map(|s| s.to_string()).collect(),
            generate_mips: true,
            evict_on_first_load_failure: false,
            worker_threads: 0,
            default_array_material_count: 4,
        }
    }
}

impl CacheConfig {
    /// 从 TOML 文件加载配置
    ///
    /// 相对的 `texture_root` 以配置文件所在目录为基准。
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).with_context(|| format!("读取配置文件失败: {:?}", path))?;

        let mut config: CacheConfig =
            toml::from_str(&content).with_context(|| format!("解析 TOML 配置失败: {:?}", path))?;
        if config.texture_root.is_relative()
            && let Some(dir) = path.parent()
        {
            config.texture_root = dir.join(&config.texture_root);
        }

        config.validate()?;
        Ok(config)
    }

    /// 保存配置到 TOML 文件
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self).context("序列化配置失败")?;

        fs::write(path.as_ref(), content).with_context(|| format!("写入配置文件失败: {:?}", path.as_ref()))?;

        Ok(())
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.max_loading > 0, "max_loading 必须大于 0");
        anyhow::ensure!(
            self.max_texture_count > DefaultTexture::COUNT,
            "max_texture_count 必须大于默认纹理数量 ({})",
            DefaultTexture::COUNT
        );
        anyhow::ensure!(self.default_array_material_count > 0, "default_array_material_count 必须大于 0");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: CacheConfig = toml::from_str("max_loading = 4\ngenerate_mips = false\n").unwrap();
        assert_eq!(config.max_loading, 4);
        assert!(!config.generate_mips);
        assert_eq!(config.max_texture_count, CacheConfig::default().max_texture_count);
        assert_eq!(config.extensions, CacheConfig::default().extensions);
    }

    #[test]
    fn test_validate_rejects_zero_slots() {
        let config = CacheConfig {
            max_loading: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file_resolves_relative_root() {
        let dir = std::env::temp_dir().join(format!("texture-cache-config-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("cache.toml");

        let config = CacheConfig {
            texture_root: PathBuf::from("assets"),
            max_loading: 8,
            ..Default::default()
        };
        config.save_to_file(&path).unwrap();

        let loaded = CacheConfig::from_file(&path).unwrap();
        assert_eq!(loaded.max_loading, 8);
        assert_eq!(loaded.texture_root, dir.join("assets"));

        fs::remove_dir_all(&dir).ok();
    }
}
