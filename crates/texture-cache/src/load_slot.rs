use crate::error::{TextureError, TextureResult};
use crate::handle::TextureHandle;
use crate::record::TextureKind;

/// 加载槽位的标识
///
/// `epoch` 在槽位每次被回收时递增，旧的 id 不会误命中新的加载。
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct LoadSlotId {
    index: u32,
    epoch: u32,
}

/// 一次正在进行的异步加载
///
/// 加载过程中只被管线持有：entry 阶段 worker 持有解码数据，
/// 回调阶段 owner 线程把槽位取出并和解码结果一起消费。
#[derive(Clone, Debug)]
pub struct LoadSlot {
    pub id: LoadSlotId,
    pub target: TextureHandle,
    pub name: String,
    pub kind: TextureKind,
    pub expected_layer_count: u32,
    /// 提交时目标记录的 generation，无效表示首次加载，否则为重新加载
    pub generation_at_request: u32,
}

/// 固定容量的加载槽位池
///
/// 用空闲索引栈管理槽位，申请和归还都是 O(1)。
pub struct LoadSlotPool {
    slots: Vec<Option<LoadSlot>>,
    epochs: Vec<u32>,
    free: Vec<u32>,
}

// new & init
impl LoadSlotPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![None; capacity],
            epochs: vec![0; capacity],
            // 倒序压栈，从 0 号槽位开始分配
            free: (0..capacity as u32).rev().collect(),
        }
    }
}

// getters
impl LoadSlotPool {
    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// 正在进行中的加载数量
    #[inline]
    pub fn in_flight(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    #[inline]
    pub fn is_saturated(&self) -> bool {
        self.free.is_empty()
    }

    pub fn get(&self, id: LoadSlotId) -> Option<&LoadSlot> {
        self.slots.get(id.index as usize)?.as_ref().filter(|slot| slot.id == id)
    }
}

// reserve & release
impl LoadSlotPool {
    /// 申请一个空闲槽位
    ///
    /// 没有空闲槽位时立即失败，不产生任何副作用。
    pub fn reserve(
        &mut self,
        target: TextureHandle,
        name: &str,
        kind: TextureKind,
        expected_layer_count: u32,
        generation_at_request: u32,
    ) -> TextureResult<LoadSlotId> {
        let index = self.free.pop().ok_or(TextureError::PipelineSaturated {
            capacity: self.capacity(),
        })?;

        let id = LoadSlotId {
            index,
            epoch: self.epochs[index as usize],
        };
        self.slots[index as usize] = Some(LoadSlot {
            id,
            target,
            name: name.to_string(),
            kind,
            expected_layer_count,
            generation_at_request,
        });

        Ok(id)
    }

    /// 归还槽位，并把槽位的内容交给调用者
    ///
    /// id 已经过期时返回 None。
    pub fn release(&mut self, id: LoadSlotId) -> Option<LoadSlot> {
        let index = id.index as usize;
        if self.get(id).is_none() {
            return None;
        }

        let slot = self.slots[index].take();
        self.epochs[index] = self.epochs[index].wrapping_add(1);
        self.free.push(id.index);
        slot
    }

    /// 归还所有槽位 (关闭时使用)
    pub fn drain(&mut self) -> Vec<LoadSlot> {
        let ids: Vec<LoadSlotId> = self.slots.iter().flatten().map(|slot| slot.id).collect();
        ids.into_iter().filter_map(|id| self.release(id)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::INVALID_GENERATION;
    use slotmap::KeyData;

    fn target(n: u64) -> TextureHandle {
        KeyData::from_ffi((1 << 32) | n).into()
    }

    #[test]
    fn test_reserve_until_saturated() {
        let mut pool = LoadSlotPool::new(2);
        pool.reserve(target(1), "a", TextureKind::Flat2D, 1, INVALID_GENERATION).unwrap();
        pool.reserve(target(2), "b", TextureKind::Flat2D, 1, INVALID_GENERATION).unwrap();
        assert!(pool.is_saturated());

        let err = pool.reserve(target(3), "c", TextureKind::Flat2D, 1, INVALID_GENERATION).unwrap_err();
        assert!(matches!(err, TextureError::PipelineSaturated { capacity: 2 }));
        assert_eq!(pool.in_flight(), 2);
    }

    #[test]
    fn test_release_recycles_slot() {
        let mut pool = LoadSlotPool::new(1);
        let id = pool.reserve(target(1), "a", TextureKind::Array2D, 3, INVALID_GENERATION).unwrap();

        let slot = pool.release(id).unwrap();
        assert_eq!(slot.name, "a");
        assert_eq!(slot.expected_layer_count, 3);
        assert_eq!(pool.in_flight(), 0);

        let again = pool.reserve(target(2), "b", TextureKind::Flat2D, 1, 0).unwrap();
        assert_ne!(id, again);
    }

    #[test]
    fn test_stale_id_is_ignored() {
        let mut pool = LoadSlotPool::new(1);
        let id = pool.reserve(target(1), "a", TextureKind::Flat2D, 1, INVALID_GENERATION).unwrap();
        pool.release(id);
        let fresh = pool.reserve(target(2), "b", TextureKind::Flat2D, 1, INVALID_GENERATION).unwrap();

        assert!(pool.release(id).is_none());
        assert_eq!(pool.get(fresh).unwrap().name, "b");
    }

    #[test]
    fn test_drain_releases_everything() {
        let mut pool = LoadSlotPool::new(3);
        pool.reserve(target(1), "a", TextureKind::Flat2D, 1, INVALID_GENERATION).unwrap();
        pool.reserve(target(2), "b", TextureKind::Flat2D, 1, INVALID_GENERATION).unwrap();

        assert_eq!(pool.drain().len(), 2);
        assert_eq!(pool.in_flight(), 0);
    }
}
