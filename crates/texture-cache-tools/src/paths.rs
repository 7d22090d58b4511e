use std::path::{Path, PathBuf};

/// 基于工作区根目录的路径
///
/// 根目录通过 `CARGO_MANIFEST_DIR` 推导，不依赖当前工作目录。
pub struct ToolPaths {}

impl ToolPaths {
    /// 工作区根目录 (`crates/<tool>` 的上两级)
    pub fn workspace_path() -> PathBuf {
        let manifest = Path::new(env!("CARGO_MANIFEST_DIR"));
        manifest.ancestors().nth(2).unwrap_or(manifest).to_path_buf()
    }

    /// 没有通过命令行指定时使用的缓存配置文件
    pub fn default_config_path() -> PathBuf {
        Self::workspace_path().join("texture_cache.toml")
    }

    pub fn textures_path() -> PathBuf {
        Self::workspace_path().join("textures")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workspace_contains_tool_crate() {
        let manifest = ToolPaths::workspace_path().join("crates").join("texture-cache-tools").join("Cargo.toml");
        assert!(manifest.exists(), "{}", manifest.display());
        assert_eq!(ToolPaths::default_config_path().file_name().unwrap(), "texture_cache.toml");
    }
}
