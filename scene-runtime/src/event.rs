//! # Event 模块
//!
//! 类型化的发布/订阅总线，以及引擎对外发出的 [`SceneEvent`]。
//!
//! ## 设计说明
//!
//! - `on()` 返回 [`Subscription`]，调用 `dispose()` 取消订阅；
//!   也可以用 `off(kind, id)` 显式取消。
//! - 分发时先对监听者列表做快照，处理函数内可以安全地订阅/取消订阅。
//! - 单个处理函数 panic 会被捕获并记录日志，不影响其他监听者，也不会传播给调用方。

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::rc::{Rc, Weak};

use tracing::error;

use crate::descriptor::SceneDescriptor;
use crate::state::{EngineState, Season, TimeOfDay, Weather};

/// 可以在总线上分发的事件
pub trait BusEvent {
    /// 事件类别（订阅键）
    type Kind: Copy + Eq + Hash + Debug;

    fn kind(&self) -> Self::Kind;
}

/// 订阅标识
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    pub fn value(&self) -> u64 {
        self.0
    }
}

type Handler<E> = Rc<dyn Fn(&E)>;

struct Listeners<E: BusEvent> {
    next_id: u64,
    by_kind: HashMap<E::Kind, Vec<(SubscriptionId, Handler<E>)>>,
}

impl<E: BusEvent> Listeners<E> {
    fn remove(&mut self, kind: E::Kind, id: SubscriptionId) -> bool {
        let Some(list) = self.by_kind.get_mut(&kind) else {
            return false;
        };
        let before = list.len();
        list.retain(|(sid, _)| *sid != id);
        let removed = list.len() != before;
        if list.is_empty() {
            self.by_kind.remove(&kind);
        }
        removed
    }
}

/// 发布/订阅总线
///
/// 单线程使用（内部为 `Rc<RefCell<_>>`），每个引擎实例拥有独立的总线。
pub struct EventBus<E: BusEvent> {
    inner: Rc<RefCell<Listeners<E>>>,
}

impl<E: BusEvent + 'static> EventBus<E> {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(Listeners {
                next_id: 1,
                by_kind: HashMap::new(),
            })),
        }
    }

    /// 订阅某一类事件
    pub fn on(&self, kind: E::Kind, handler: impl Fn(&E) + 'static) -> Subscription<E> {
        let mut inner = self.inner.borrow_mut();
        let id = SubscriptionId(inner.next_id);
        inner.next_id += 1;
        inner
            .by_kind
            .entry(kind)
            .or_default()
            .push((id, Rc::new(handler)));

        Subscription {
            id,
            kind,
            bus: Rc::downgrade(&self.inner),
        }
    }

    /// 取消订阅，返回是否确实移除了监听者
    pub fn off(&self, kind: E::Kind, id: SubscriptionId) -> bool {
        self.inner.borrow_mut().remove(kind, id)
    }

    /// 分发事件，返回成功执行的处理函数数量
    pub fn emit(&self, event: &E) -> usize {
        let kind = event.kind();
        let snapshot: Vec<(SubscriptionId, Handler<E>)> = {
            let inner = self.inner.borrow();
            match inner.by_kind.get(&kind) {
                Some(list) => list.clone(),
                None => return 0,
            }
        };

        let mut delivered = 0;
        for (id, handler) in snapshot {
            match catch_unwind(AssertUnwindSafe(|| handler(event))) {
                Ok(()) => delivered += 1,
                Err(_) => {
                    error!(kind = ?kind, subscription = id.value(), "事件处理函数 panic，已跳过");
                }
            }
        }
        delivered
    }

    /// 移除全部监听者
    pub fn clear(&self) {
        self.inner.borrow_mut().by_kind.clear();
    }

    /// 某类事件的监听者数量
    pub fn listener_count(&self, kind: E::Kind) -> usize {
        self.inner
            .borrow()
            .by_kind
            .get(&kind)
            .map(Vec::len)
            .unwrap_or(0)
    }
}

impl<E: BusEvent + 'static> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: BusEvent> std::fmt::Debug for EventBus<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("EventBus")
            .field("kinds", &inner.by_kind.len())
            .finish()
    }
}

/// 订阅句柄（disposer）
///
/// 只持有总线的弱引用；总线销毁后 `dispose()` 返回 `false`。
/// 丢弃句柄不会自动取消订阅。
pub struct Subscription<E: BusEvent> {
    id: SubscriptionId,
    kind: E::Kind,
    bus: Weak<RefCell<Listeners<E>>>,
}

impl<E: BusEvent> Subscription<E> {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn kind(&self) -> E::Kind {
        self.kind
    }

    /// 取消订阅
    pub fn dispose(self) -> bool {
        match self.bus.upgrade() {
            Some(bus) => bus.borrow_mut().remove(self.kind, self.id),
            None => false,
        }
    }
}

/// 加载进度
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoadProgress {
    pub loaded: usize,
    pub total: usize,
    /// 0.0 - 100.0
    pub percent: f32,
}

impl LoadProgress {
    pub fn new(loaded: usize, total: usize) -> Self {
        let percent = if total == 0 {
            100.0
        } else {
            loaded as f32 * 100.0 / total as f32
        };
        Self {
            loaded,
            total,
            percent,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.loaded >= self.total
    }
}

/// 场景事件类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SceneEventKind {
    StateChange,
    Load,
    LoadProgress,
    TimeChange,
    WeatherChange,
    SeasonChange,
    AnimationStart,
    AnimationComplete,
}

impl SceneEventKind {
    pub const ALL: [SceneEventKind; 8] = [
        Self::StateChange,
        Self::Load,
        Self::LoadProgress,
        Self::TimeChange,
        Self::WeatherChange,
        Self::SeasonChange,
        Self::AnimationStart,
        Self::AnimationComplete,
    ];
}

/// 引擎对外发出的通知
#[derive(Debug, Clone, PartialEq)]
pub enum SceneEvent {
    StateChange { state: EngineState },
    Load(Box<SceneDescriptor>),
    LoadProgress(LoadProgress),
    TimeChange { new: TimeOfDay, old: TimeOfDay },
    WeatherChange { new: Weather, old: Weather },
    SeasonChange(Season),
    AnimationStart(String),
    AnimationComplete(String),
}

impl BusEvent for SceneEvent {
    type Kind = SceneEventKind;

    fn kind(&self) -> SceneEventKind {
        match self {
            Self::StateChange { .. } => SceneEventKind::StateChange,
            Self::Load(_) => SceneEventKind::Load,
            Self::LoadProgress(_) => SceneEventKind::LoadProgress,
            Self::TimeChange { .. } => SceneEventKind::TimeChange,
            Self::WeatherChange { .. } => SceneEventKind::WeatherChange,
            Self::SeasonChange(_) => SceneEventKind::SeasonChange,
            Self::AnimationStart(_) => SceneEventKind::AnimationStart,
            Self::AnimationComplete(_) => SceneEventKind::AnimationComplete,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn weather_event() -> SceneEvent {
        SceneEvent::WeatherChange {
            new: Weather::Rain,
            old: Weather::Clear,
        }
    }

    #[test]
    fn test_emit_reaches_matching_kind_only() {
        let bus = EventBus::<SceneEvent>::new();
        let hits = Rc::new(Cell::new(0));

        let h = hits.clone();
        let _sub = bus.on(SceneEventKind::WeatherChange, move |_| h.set(h.get() + 1));

        assert_eq!(bus.emit(&weather_event()), 1);
        assert_eq!(bus.emit(&SceneEvent::SeasonChange(Season::Fall)), 0);
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn test_dispose_and_off() {
        let bus = EventBus::<SceneEvent>::new();
        let sub = bus.on(SceneEventKind::WeatherChange, |_| {});
        let other = bus.on(SceneEventKind::WeatherChange, |_| {});
        assert_eq!(bus.listener_count(SceneEventKind::WeatherChange), 2);

        assert!(sub.dispose());
        assert!(bus.off(SceneEventKind::WeatherChange, other.id()));
        assert!(!bus.off(SceneEventKind::WeatherChange, other.id()));
        assert_eq!(bus.listener_count(SceneEventKind::WeatherChange), 0);
    }

    #[test]
    fn test_dispose_after_bus_dropped() {
        let bus = EventBus::<SceneEvent>::new();
        let sub = bus.on(SceneEventKind::Load, |_| {});
        drop(bus);
        assert!(!sub.dispose());
    }

    #[test]
    fn test_panicking_listener_does_not_block_others() {
        let bus = EventBus::<SceneEvent>::new();
        let reached = Rc::new(Cell::new(false));

        let _a = bus.on(SceneEventKind::WeatherChange, |_| panic!("listener failure"));
        let r = reached.clone();
        let _b = bus.on(SceneEventKind::WeatherChange, move |_| r.set(true));

        assert_eq!(bus.emit(&weather_event()), 1);
        assert!(reached.get());
    }

    #[test]
    fn test_unsubscribe_during_dispatch_uses_snapshot() {
        let bus = Rc::new(EventBus::<SceneEvent>::new());
        let second_calls = Rc::new(Cell::new(0));
        let second_id: Rc<Cell<Option<SubscriptionId>>> = Rc::new(Cell::new(None));

        // 第一个监听者在分发中取消第二个，并新增一个
        let bus_ref = Rc::downgrade(&bus);
        let target = second_id.clone();
        let _first = bus.on(SceneEventKind::WeatherChange, move |_| {
            if let (Some(bus), Some(id)) = (bus_ref.upgrade(), target.get()) {
                bus.off(SceneEventKind::WeatherChange, id);
                let _late = bus.on(SceneEventKind::SeasonChange, |_| {});
            }
        });

        let sc = second_calls.clone();
        let second = bus.on(SceneEventKind::WeatherChange, move |_| sc.set(sc.get() + 1));
        second_id.set(Some(second.id()));

        bus.emit(&weather_event());
        // 快照中的第二个监听者仍然收到本次事件
        assert_eq!(second_calls.get(), 1);
        assert_eq!(bus.listener_count(SceneEventKind::WeatherChange), 1);

        bus.emit(&weather_event());
        assert_eq!(second_calls.get(), 1);
        assert_eq!(bus.listener_count(SceneEventKind::SeasonChange), 2);
    }

    #[test]
    fn test_load_progress_percent() {
        assert_eq!(LoadProgress::new(1, 4).percent, 25.0);
        assert_eq!(LoadProgress::new(0, 0).percent, 100.0);
        assert!(LoadProgress::new(3, 3).is_complete());
        assert!(!LoadProgress::new(2, 3).is_complete());
    }
}
