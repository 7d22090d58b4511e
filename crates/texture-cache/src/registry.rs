use std::collections::HashMap;

use slotmap::{Key, SlotMap};

use crate::assembly::LoadSource;
use crate::backend::GpuResourceBackend;
use crate::error::{TextureError, TextureResult};
use crate::handle::{TextureHandle, TextureState};
use crate::load_slot::LoadSlotId;
use crate::record::{TextureKind, TextureRecord};

/// ReferenceTable 中的一个条目
///
/// 独占持有纹理记录；引用计数归零且 `auto_release` 为 true 时整个条目被销毁。
#[derive(Debug)]
pub struct ReferenceEntry {
    pub record: TextureRecord,
    pub ref_count: u64,
    pub auto_release: bool,
    /// 首次加载和热重载使用的数据来源；可写、包装和默认纹理没有来源
    pub source: Option<LoadSource>,
    /// 正在进行的加载，同一个句柄同时最多只有一个
    pub in_flight: Option<LoadSlotId>,
    /// 是否登记在名字索引中 (不登记的包装纹理只能通过句柄访问)
    pub indexed: bool,
}

/// `process_reference` 的结果
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct ReferenceOutcome {
    /// 名字对应的句柄；释放一个未知名字时为 null
    pub handle: TextureHandle,
    /// 条目还没有 backend 资源，需要调用者创建或加载
    pub needs_creation: bool,
    /// 本次调用新建了条目
    pub created: bool,
    /// 本次调用销毁了条目
    pub destroyed: bool,
}

impl ReferenceOutcome {
    fn none() -> Self {
        Self {
            handle: TextureHandle::null(),
            needs_creation: false,
            created: false,
            destroyed: false,
        }
    }
}

/// 引用表 + 名字索引
///
/// - entries: handle -> {record, ref_count, auto_release}，持有所有常驻纹理的权威副本
/// - names: name -> handle，把同名的重复 Acquire 折叠到同一个条目
///
/// 所有修改都需要 `&mut self`，由 owner 线程独占，因此同一个名字上的
/// `process_reference` 天然是原子的。
pub struct TextureRegistry {
    entries: SlotMap<TextureHandle, ReferenceEntry>,
    names: HashMap<String, TextureHandle>,
    capacity: usize,
}

// new & init
impl TextureRegistry {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: SlotMap::with_capacity_and_key(capacity),
            names: HashMap::with_capacity(capacity),
            capacity,
        }
    }
}

// getters
impl TextureRegistry {
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    pub fn find(&self, name: &str) -> Option<TextureHandle> {
        self.names.get(name).copied()
    }

    #[inline]
    pub fn get(&self, handle: TextureHandle) -> Option<&ReferenceEntry> {
        self.entries.get(handle)
    }

    #[inline]
    pub fn get_mut(&mut self, handle: TextureHandle) -> Option<&mut ReferenceEntry> {
        self.entries.get_mut(handle)
    }

    pub fn state(&self, handle: TextureHandle) -> TextureState {
        match self.entries.get(handle) {
            None => TextureState::Unresident,
            Some(entry) if entry.in_flight.is_some() => TextureState::Loading,
            Some(entry) if entry.record.is_initialized() => TextureState::Resident,
            Some(_) => TextureState::Reserved,
        }
    }
}

// reference counting
impl TextureRegistry {
    /// 按名字调整引用计数
    ///
    /// - 未知名字 + 负增量：忽略并警告 (释放了从未获取的纹理)
    /// - 未知名字 + 正增量：新建未初始化的条目，需要创建
    /// - 已知名字：调整引用计数 (最低为 0)；增加引用且记录未初始化时需要创建
    /// - 引用计数归零且 auto_release：释放 backend 资源，删除索引和条目
    pub fn process_reference<B: GpuResourceBackend + ?Sized>(
        &mut self,
        name: &str,
        ref_delta: i64,
        auto_release: bool,
        kind: TextureKind,
        backend: &mut B,
    ) -> TextureResult<ReferenceOutcome> {
        let Some(handle) = self.find(name) else {
            if ref_delta <= 0 {
                log::warn!("{}", TextureError::ReleaseUnderflow { name: name.to_string() });
                return Ok(ReferenceOutcome::none());
            }
            let handle = self.insert(
                ReferenceEntry {
                    record: TextureRecord::uninitialized(name, kind),
                    ref_count: ref_delta as u64,
                    auto_release,
                    source: None,
                    in_flight: None,
                    indexed: true,
                },
                Some(name),
            )?;
            return Ok(ReferenceOutcome {
                handle,
                needs_creation: true,
                created: true,
                destroyed: false,
            });
        };

        self.adjust(handle, ref_delta, backend)
    }

    /// 按句柄调整引用计数，语义与 `process_reference` 相同
    pub fn adjust<B: GpuResourceBackend + ?Sized>(
        &mut self,
        handle: TextureHandle,
        ref_delta: i64,
        backend: &mut B,
    ) -> TextureResult<ReferenceOutcome> {
        let entry = self.entries.get_mut(handle).ok_or(TextureError::InvalidHandle)?;

        if ref_delta >= 0 {
            entry.ref_count = entry.ref_count.saturating_add(ref_delta as u64);
            return Ok(ReferenceOutcome {
                handle,
                needs_creation: ref_delta > 0 && !entry.record.is_initialized(),
                created: false,
                destroyed: false,
            });
        }

        let decrement = ref_delta.unsigned_abs();
        if entry.ref_count < decrement {
            log::warn!("{}", TextureError::ReleaseUnderflow { name: entry.record.name.clone() });
        }
        entry.ref_count = entry.ref_count.saturating_sub(decrement);

        let destroyed = entry.ref_count == 0 && entry.auto_release;
        if destroyed && let Some(entry) = self.remove(handle) {
            log::info!("Destroy texture: {}", entry.record.name);
            destroy_record(&entry.record, backend);
        }

        Ok(ReferenceOutcome {
            handle,
            needs_creation: false,
            created: false,
            destroyed,
        })
    }

    /// 撤销一次失败的同步 Acquire
    ///
    /// 新建的条目直接删除；已有的条目只把引用计数减回去，不触发自动释放。
    pub fn rollback_acquire(&mut self, outcome: &ReferenceOutcome) {
        if outcome.created {
            self.remove(outcome.handle);
        } else if let Some(entry) = self.entries.get_mut(outcome.handle) {
            entry.ref_count = entry.ref_count.saturating_sub(1);
        }
    }
}

// insert & remove
impl TextureRegistry {
    /// 插入一个条目；`name` 为 Some 时同时登记到名字索引
    pub fn insert(&mut self, entry: ReferenceEntry, name: Option<&str>) -> TextureResult<TextureHandle> {
        if self.entries.len() >= self.capacity {
            return Err(TextureError::TableFull {
                capacity: self.capacity,
            });
        }
        if let Some(name) = name
            && self.names.contains_key(name)
        {
            return Err(TextureError::InvalidDescriptor(format!("texture '{name}' is already registered")));
        }

        let handle = self.entries.insert(entry);
        if let Some(name) = name {
            self.names.insert(name.to_string(), handle);
        }
        Ok(handle)
    }

    /// 删除条目以及对应的名字索引，不接触 backend
    pub fn remove(&mut self, handle: TextureHandle) -> Option<ReferenceEntry> {
        let entry = self.entries.remove(handle)?;
        if entry.indexed && self.names.get(&entry.record.name) == Some(&handle) {
            self.names.remove(&entry.record.name);
        }
        Some(entry)
    }

    /// 清空所有条目 (关闭时使用)
    pub fn drain(&mut self) -> Vec<ReferenceEntry> {
        self.names.clear();
        self.entries.drain().map(|(_, entry)| entry).collect()
    }
}

/// 释放记录持有的 backend 资源；包装纹理的资源由外部持有，不释放
pub fn destroy_record<B: GpuResourceBackend + ?Sized>(record: &TextureRecord, backend: &mut B) {
    if let Some(backend_handle) = record.backend
        && !record.is_wrapped()
    {
        backend.destroy(backend_handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::HeadlessBackend;
    use crate::record::{TextureDesc, TextureFlags};

    fn desc() -> TextureDesc {
        TextureDesc {
            width: 1,
            height: 1,
            channel_count: 4,
            layer_count: 1,
            mip_levels: 1,
            kind: TextureKind::Flat2D,
            flags: TextureFlags::empty(),
        }
    }

    /// 模拟一次成功的加载，让条目变为已初始化
    fn upload(registry: &mut TextureRegistry, backend: &mut HeadlessBackend, handle: TextureHandle) {
        let backend_handle = backend.create("x", &desc(), &[0; 4]).unwrap();
        let entry = registry.get_mut(handle).unwrap();
        entry.record = TextureRecord::from_desc(entry.record.name.clone(), &desc(), backend_handle, 0);
    }

    #[test]
    fn test_repeated_acquire_folds() {
        let mut registry = TextureRegistry::new(16);
        let mut backend = HeadlessBackend::new();

        let first = registry.process_reference("rock", 1, true, TextureKind::Flat2D, &mut backend).unwrap();
        assert!(first.needs_creation && first.created);

        for _ in 0..4 {
            let again = registry.process_reference("rock", 1, true, TextureKind::Flat2D, &mut backend).unwrap();
            assert_eq!(again.handle, first.handle);
            assert!(!again.created);
        }

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get(first.handle).unwrap().ref_count, 5);
    }

    #[test]
    fn test_needs_creation_until_initialized() {
        let mut registry = TextureRegistry::new(16);
        let mut backend = HeadlessBackend::new();

        let first = registry.process_reference("rock", 1, true, TextureKind::Flat2D, &mut backend).unwrap();
        let second = registry.process_reference("rock", 1, true, TextureKind::Flat2D, &mut backend).unwrap();
        assert!(second.needs_creation);

        upload(&mut registry, &mut backend, first.handle);
        let third = registry.process_reference("rock", 1, true, TextureKind::Flat2D, &mut backend).unwrap();
        assert!(!third.needs_creation);
        assert_eq!(registry.state(first.handle), TextureState::Resident);
    }

    #[test]
    fn test_balanced_release_destroys_entry() {
        let mut registry = TextureRegistry::new(16);
        let mut backend = HeadlessBackend::new();

        let handle = registry.process_reference("rock", 1, true, TextureKind::Flat2D, &mut backend).unwrap().handle;
        registry.process_reference("rock", 1, true, TextureKind::Flat2D, &mut backend).unwrap();
        upload(&mut registry, &mut backend, handle);

        let outcome = registry.process_reference("rock", -1, true, TextureKind::Flat2D, &mut backend).unwrap();
        assert!(!outcome.destroyed);
        assert_eq!(registry.find("rock"), Some(handle));

        let outcome = registry.process_reference("rock", -1, true, TextureKind::Flat2D, &mut backend).unwrap();
        assert!(outcome.destroyed);
        assert!(registry.find("rock").is_none());
        assert!(registry.get(handle).is_none());
        assert_eq!(backend.live_count(), 0);
    }

    #[test]
    fn test_release_unknown_name_is_noop() {
        let mut registry = TextureRegistry::new(16);
        let mut backend = HeadlessBackend::new();

        let outcome = registry.process_reference("ghost", -1, true, TextureKind::Flat2D, &mut backend).unwrap();
        assert!(outcome.handle.is_null());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_no_auto_release_saturates_at_zero() {
        let mut registry = TextureRegistry::new(16);
        let mut backend = HeadlessBackend::new();

        let handle = registry.process_reference("ui", 1, false, TextureKind::Flat2D, &mut backend).unwrap().handle;
        for _ in 0..3 {
            let outcome = registry.adjust(handle, -1, &mut backend).unwrap();
            assert!(!outcome.destroyed);
        }
        assert_eq!(registry.get(handle).unwrap().ref_count, 0);
    }

    #[test]
    fn test_capacity_limit() {
        let mut registry = TextureRegistry::new(1);
        let mut backend = HeadlessBackend::new();

        registry.process_reference("a", 1, true, TextureKind::Flat2D, &mut backend).unwrap();
        let err = registry.process_reference("b", 1, true, TextureKind::Flat2D, &mut backend).unwrap_err();
        assert!(matches!(err, TextureError::TableFull { capacity: 1 }));
    }

    #[test]
    fn test_rollback_removes_new_entry() {
        let mut registry = TextureRegistry::new(4);
        let mut backend = HeadlessBackend::new();

        let outcome = registry.process_reference("sky", 1, true, TextureKind::Cube, &mut backend).unwrap();
        registry.rollback_acquire(&outcome);
        assert!(registry.find("sky").is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_stale_handle_after_destroy() {
        let mut registry = TextureRegistry::new(4);
        let mut backend = HeadlessBackend::new();

        let old = registry.process_reference("rock", 1, true, TextureKind::Flat2D, &mut backend).unwrap().handle;
        registry.process_reference("rock", -1, true, TextureKind::Flat2D, &mut backend).unwrap();
        let new = registry.process_reference("rock", 1, true, TextureKind::Flat2D, &mut backend).unwrap().handle;

        assert_ne!(old, new);
        assert!(matches!(registry.adjust(old, 1, &mut backend), Err(TextureError::InvalidHandle)));
    }
}
