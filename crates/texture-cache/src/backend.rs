use slotmap::{Key, KeyData, SlotMap, new_key_type};

use crate::record::{BackendHandle, TextureDesc};

/// GPU 侧资源的创建、写入与销毁
///
/// 只允许在 owner 线程上调用；worker 线程永远不会接触 backend。
pub trait GpuResourceBackend {
    /// 用完整的像素数据 (所有层的 mip 0，层与层连续存放) 创建资源
    fn create(&mut self, name: &str, desc: &TextureDesc, pixels: &[u8]) -> anyhow::Result<BackendHandle>;

    /// 创建内容为空的可写资源
    fn create_writable(&mut self, name: &str, desc: &TextureDesc) -> anyhow::Result<BackendHandle>;

    fn destroy(&mut self, handle: BackendHandle);

    /// 重新分配存储，原有内容不保留
    fn resize(&mut self, handle: BackendHandle, width: u32, height: u32) -> anyhow::Result<()>;

    fn write_data(&mut self, handle: BackendHandle, offset: usize, bytes: &[u8]) -> anyhow::Result<()>;
}

new_key_type! { struct HeadlessImageKey; }

/// HeadlessBackend 中的一张图片
#[derive(Clone, Debug)]
pub struct HeadlessImage {
    pub name: String,
    pub desc: TextureDesc,
    pub pixels: Vec<u8>,
}

/// 纯内存的 backend
///
/// 不需要 GPU，像素数据保存在 CPU 内存中。用于离线工具和测试，
/// 同时统计创建/销毁次数，方便检查资源泄漏。
#[derive(Default)]
pub struct HeadlessBackend {
    images: SlotMap<HeadlessImageKey, HeadlessImage>,
    created: usize,
    destroyed: usize,
    fail_creates: bool,
}

// new & init
impl HeadlessBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

// getters
impl HeadlessBackend {
    pub fn image(&self, handle: BackendHandle) -> Option<&HeadlessImage> {
        self.images.get(Self::key(handle))
    }

    /// 当前存活的资源数量
    pub fn live_count(&self) -> usize {
        self.images.len()
    }

    pub fn created_count(&self) -> usize {
        self.created
    }

    pub fn destroyed_count(&self) -> usize {
        self.destroyed
    }

    /// 让之后的 create / create_writable 全部失败，模拟显存不足
    pub fn set_fail_creates(&mut self, fail: bool) {
        self.fail_creates = fail;
    }
}

// tools
impl HeadlessBackend {
    #[inline]
    fn key(handle: BackendHandle) -> HeadlessImageKey {
        KeyData::from_ffi(handle.0).into()
    }

    #[inline]
    fn handle(key: HeadlessImageKey) -> BackendHandle {
        BackendHandle(key.data().as_ffi())
    }

    fn insert(&mut self, name: &str, desc: &TextureDesc, pixels: Vec<u8>) -> BackendHandle {
        let key = self.images.insert(HeadlessImage {
            name: name.to_string(),
            desc: *desc,
            pixels,
        });
        self.created += 1;
        Self::handle(key)
    }
}

impl GpuResourceBackend for HeadlessBackend {
    fn create(&mut self, name: &str, desc: &TextureDesc, pixels: &[u8]) -> anyhow::Result<BackendHandle> {
        anyhow::ensure!(!self.fail_creates, "headless backend: create of '{}' rejected", name);
        anyhow::ensure!(
            pixels.len() == desc.byte_size(),
            "headless backend: '{}' expects {} bytes, got {}",
            name,
            desc.byte_size(),
            pixels.len()
        );

        Ok(self.insert(name, desc, pixels.to_vec()))
    }

    fn create_writable(&mut self, name: &str, desc: &TextureDesc) -> anyhow::Result<BackendHandle> {
        anyhow::ensure!(!self.fail_creates, "headless backend: create of '{}' rejected", name);

        Ok(self.insert(name, desc, vec![0; desc.byte_size()]))
    }

    fn destroy(&mut self, handle: BackendHandle) {
        if self.images.remove(Self::key(handle)).is_some() {
            self.destroyed += 1;
        } else {
            log::warn!("headless backend: destroy of unknown handle {:?}", handle);
        }
    }

    fn resize(&mut self, handle: BackendHandle, width: u32, height: u32) -> anyhow::Result<()> {
        let image = self
            .images
            .get_mut(Self::key(handle))
            .ok_or_else(|| anyhow::anyhow!("headless backend: resize of unknown handle {:?}", handle))?;

        image.desc.width = width;
        image.desc.height = height;
        image.pixels = vec![0; image.desc.byte_size()];
        Ok(())
    }

    fn write_data(&mut self, handle: BackendHandle, offset: usize, bytes: &[u8]) -> anyhow::Result<()> {
        let image = self
            .images
            .get_mut(Self::key(handle))
            .ok_or_else(|| anyhow::anyhow!("headless backend: write to unknown handle {:?}", handle))?;

        let end = offset + bytes.len();
        anyhow::ensure!(end <= image.pixels.len(), "headless backend: write past end of '{}'", image.name);
        image.pixels[offset..end].copy_from_slice(bytes);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{TextureFlags, TextureKind};

    fn desc(width: u32, height: u32) -> TextureDesc {
        TextureDesc {
            width,
            height,
            channel_count: 4,
            layer_count: 1,
            mip_levels: 1,
            kind: TextureKind::Writable,
            flags: TextureFlags::WRITABLE,
        }
    }

    #[test]
    fn test_create_and_destroy_counts() {
        let mut backend = HeadlessBackend::new();
        let handle = backend.create("a", &desc(1, 1), &[1, 2, 3, 4]).unwrap();
        assert_eq!(backend.live_count(), 1);
        assert_eq!(backend.image(handle).unwrap().pixels, vec![1, 2, 3, 4]);

        backend.destroy(handle);
        assert_eq!(backend.live_count(), 0);
        assert_eq!(backend.created_count(), 1);
        assert_eq!(backend.destroyed_count(), 1);
        assert!(backend.image(handle).is_none());
    }

    #[test]
    fn test_create_rejects_short_buffer() {
        let mut backend = HeadlessBackend::new();
        assert!(backend.create("a", &desc(2, 2), &[0; 4]).is_err());
        assert_eq!(backend.created_count(), 0);
    }

    #[test]
    fn test_write_and_resize() {
        let mut backend = HeadlessBackend::new();
        let handle = backend.create_writable("w", &desc(2, 1)).unwrap();

        backend.write_data(handle, 4, &[9, 9, 9, 9]).unwrap();
        assert_eq!(&backend.image(handle).unwrap().pixels[4..], &[9, 9, 9, 9]);
        assert!(backend.write_data(handle, 6, &[0; 4]).is_err());

        backend.resize(handle, 4, 4).unwrap();
        assert_eq!(backend.image(handle).unwrap().pixels.len(), 64);
    }
}
