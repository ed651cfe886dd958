//! 粒子系统使用的确定性随机数生成器（xorshift64）。
//!
//! 固定种子下每次运行的粒子序列完全一致，便于测试与录制。

/// 默认种子
pub const DEFAULT_SEED: u64 = 0x5EED_CAFE;

#[derive(Debug, Clone)]
pub struct ParticleRng {
    state: u64,
}

impl ParticleRng {
    pub fn new(seed: u64) -> Self {
        // xorshift 的状态不能为 0
        let state = if seed == 0 { DEFAULT_SEED } else { seed };
        Self { state }
    }

    pub fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        x
    }

    /// [0.0, 1.0)
    pub fn next_f32(&mut self) -> f32 {
        (self.next_u64() >> 40) as f32 / (1u64 << 24) as f32
    }

    /// [min, max)
    pub fn range(&mut self, min: f32, max: f32) -> f32 {
        min + (max - min) * self.next_f32()
    }

    /// 以概率 `p` 返回 true
    pub fn chance(&mut self, p: f32) -> bool {
        self.next_f32() < p
    }

    /// [0, len)
    pub fn index(&mut self, len: usize) -> usize {
        if len == 0 {
            return 0;
        }
        (self.next_u64() % len as u64) as usize
    }
}

impl Default for ParticleRng {
    fn default() -> Self {
        Self::new(DEFAULT_SEED)
    }
}
