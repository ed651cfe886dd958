//! 挂钟时间（自动昼夜使用）

use std::cell::Cell;
use std::rc::Rc;

use chrono::Timelike;

/// 提供当前小时（0-23）
pub trait WallClock {
    fn hour(&self) -> u32;
}

/// 本地时区的系统时钟
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalClock;

impl WallClock for LocalClock {
    fn hour(&self) -> u32 {
        chrono::Local::now().hour()
    }
}

/// 固定小时的时钟，克隆之间共享同一个值
#[derive(Debug, Clone, Default)]
pub struct FixedClock {
    hour: Rc<Cell<u32>>,
}

impl FixedClock {
    pub fn new(hour: u32) -> Self {
        Self {
            hour: Rc::new(Cell::new(hour % 24)),
        }
    }

    pub fn set_hour(&self, hour: u32) {
        self.hour.set(hour % 24);
    }
}

impl WallClock for FixedClock {
    fn hour(&self) -> u32 {
        self.hour.get()
    }
}
