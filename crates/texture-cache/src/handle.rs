use slotmap::new_key_type;

// 强类型句柄
// 使用 slotmap 的 generational index 机制，句柄被释放后同一个 key 不会再次生效，
// 持有旧句柄的调用者只会得到 InvalidHandle，而不会读到别的纹理。
// 句柄本身只是一个轻量级的 ID (u64)，可以安全地 Copy/Clone。
new_key_type! { pub struct TextureHandle; }

/// 表示 "从未上传" 或 "常驻默认纹理" 的 generation 哨兵值
pub const INVALID_GENERATION: u32 = u32::MAX;

/// 计算一次成功替换之后的 generation
///
/// 首次上传从 0 开始，之后每次 +1。到达 `INVALID_GENERATION - 1` 之后回绕到 0 并跳过哨兵值，
/// 因此 generation 只保证 "每次替换都与上一次不同"，不保证全局单调。
/// 消费者应该用 `!=` 判断变化，不要用 `>` 比较新旧。
#[inline]
pub fn next_generation(current: u32) -> u32 {
    if current == INVALID_GENERATION {
        return 0;
    }
    match current.wrapping_add(1) {
        INVALID_GENERATION => 0,
        next => next,
    }
}

/// 纹理句柄的状态机
///
/// 状态流转: Unresident -> Reserved -> Loading -> Resident
///                          ^             |
///                          \--(失败)-----/
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TextureState {
    /// 句柄无效，或者条目已经被释放
    Unresident,
    /// 条目已经分配，但还没有可用的 GPU 数据，也没有正在进行的加载
    Reserved,
    /// 后台线程正在解码，完成后在 owner 线程上替换
    Loading,
    /// GPU 资源已就绪，可以直接绑定
    Resident,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_generation_is_zero() {
        assert_eq!(next_generation(INVALID_GENERATION), 0);
    }

    #[test]
    fn test_generation_increments() {
        assert_eq!(next_generation(0), 1);
        assert_eq!(next_generation(41), 42);
    }

    #[test]
    fn test_generation_wraps_past_sentinel() {
        let last = INVALID_GENERATION - 1;
        assert_eq!(next_generation(last - 1), last);
        assert_eq!(next_generation(last), 0);
        assert_ne!(next_generation(last), last);
        assert_ne!(next_generation(last), INVALID_GENERATION);
    }
}
