use intmap::IntMap;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll, Waker};

use crate::executor;
use crate::{
    error::RstbError,
    signal::SimObject,
    sim_if::{SimCallback, SIM_IF},
    value::Val,
    RstbResult, SimpleResult,
};

thread_local! {
    // key is signal handle as u64
    static EDGE_MAP: RefCell<IntMap<CallbackHandles>> = RefCell::new(IntMap::new());
    // key is absolute callback time in steps
    static TIMER_MAP: RefCell<IntMap<CallbackHandles>> = RefCell::new(IntMap::new());
    static READ_ONLY: RefCell<CallbackHandles> = RefCell::new(CallbackHandles::empty());
    static READ_WRITE: RefCell<CallbackHandles> = RefCell::new(CallbackHandles::empty());
}

struct CallbackHandles {
    handle: Option<usize>,
    callbacks: VecDeque<TrigShared>,
}

impl CallbackHandles {
    fn empty() -> Self {
        CallbackHandles {
            handle: None,
            callbacks: VecDeque::new(),
        }
    }
    fn with_first(handle: usize, shared: TrigShared) -> Self {
        let mut callbacks = VecDeque::new();
        callbacks.push_back(shared);
        CallbackHandles {
            handle: Some(handle),
            callbacks,
        }
    }
}

#[derive(PartialEq, Clone, Copy, Debug)]
pub enum EdgeKind {
    Any,
    Rising,
    Falling,
}

pub(crate) fn cancel_all_triggers() {
    let mut handles = Vec::new();
    for sync in [&READ_ONLY, &READ_WRITE] {
        sync.with(|s| {
            let mut s = s.borrow_mut();
            s.callbacks.clear();
            handles.extend(s.handle.take());
        });
    }
    for map in [&TIMER_MAP, &EDGE_MAP] {
        map.with(|m| {
            // TrigShared wakers are dropped here
            handles.extend(m.borrow_mut().drain().filter_map(|(_, cb)| cb.handle));
        });
    }
    for handle in handles {
        let _ = SIM_IF.cancel_callback(handle);
    }
}

#[derive(Debug, Clone)]
struct TrigShared {
    waker: Waker,
    // If trigger is an edge, the react method needs to know if it is a rising or falling edge
    // so an existing callback does not have to be rescheduled.
    edge_kind: EdgeKind,
}

#[derive(Clone, Debug)]
enum TrigKind {
    Edge(usize, EdgeKind),
    Timer(u64),
    ReadWrite,
    ReadOnly,
    Invalid(RstbError),
}

/// A simulator event a task can await.
///
/// Resolves to `Err` if the trigger could not be registered with the
/// simulator (e.g. a timer that is not representable at the simulator's
/// time precision).
#[derive(Clone, Debug)]
pub struct Trigger {
    kind: TrigKind,
    awaited: bool,
}

impl Trigger {
    fn new(kind: TrigKind) -> Self {
        Trigger {
            kind,
            awaited: false,
        }
    }
    pub fn timer(time: u64, unit: &str) -> Self {
        match SIM_IF.get_sim_steps(time as f64, unit) {
            Ok(steps) => Trigger::new(TrigKind::Timer(steps)),
            Err(e) => Trigger::new(TrigKind::Invalid(e)),
        }
    }
    pub fn timer_steps(steps: u64) -> Self {
        Trigger::new(TrigKind::Timer(steps))
    }
    pub async fn timer_ro(time: u64, unit: &str) -> RstbResult {
        Trigger::timer(time, unit).await?;
        Trigger::read_only().await?;
        Ok(Val::None)
    }
    pub async fn timer_rw(time: u64, unit: &str) -> RstbResult {
        Trigger::timer(time, unit).await?;
        Trigger::read_write().await?;
        Ok(Val::None)
    }
    pub fn edge(signal: SimObject) -> Self {
        Trigger::new(TrigKind::Edge(signal.handle(), EdgeKind::Any))
    }
    pub fn rising_edge(signal: SimObject) -> Self {
        Trigger::new(TrigKind::Edge(signal.handle(), EdgeKind::Rising))
    }
    pub fn falling_edge(signal: SimObject) -> Self {
        Trigger::new(TrigKind::Edge(signal.handle(), EdgeKind::Falling))
    }
    pub fn read_write() -> Self {
        Trigger::new(TrigKind::ReadWrite)
    }
    pub fn read_only() -> Self {
        Trigger::new(TrigKind::ReadOnly)
    }

    fn register(&self, mut shared: TrigShared) -> SimpleResult<()> {
        match &self.kind {
            TrigKind::ReadWrite => READ_WRITE.with(|rw| {
                let mut rw = rw.borrow_mut();
                rw.callbacks.push_back(shared);
                if rw.handle.is_none() {
                    rw.handle = Some(SIM_IF.register_callback(SimCallback::ReadWrite)?);
                }
                Ok(())
            }),
            TrigKind::ReadOnly => READ_ONLY.with(|ro| {
                let mut ro = ro.borrow_mut();
                ro.callbacks.push_back(shared);
                if ro.handle.is_none() {
                    ro.handle = Some(SIM_IF.register_callback(SimCallback::ReadOnly)?);
                }
                Ok(())
            }),
            TrigKind::Timer(t) => TIMER_MAP.with(|timers| {
                let mut timers = timers.borrow_mut();
                // Add current time to key since simulator will send back absolute time, not delta
                let abs_time = t + SIM_IF.get_sim_time_steps();
                if let Some(callbacks) = timers.get_mut(abs_time) {
                    callbacks.callbacks.push_back(shared);
                } else {
                    let handle = SIM_IF.register_callback(SimCallback::Time(*t))?;
                    timers.insert(abs_time, CallbackHandles::with_first(handle, shared));
                }
                Ok(())
            }),
            TrigKind::Edge(sig_hdl, edge_kind) => EDGE_MAP.with(|edges| {
                shared.edge_kind = *edge_kind;
                let mut edges = edges.borrow_mut();
                if let Some(callbacks) = edges.get_mut(*sig_hdl as u64) {
                    callbacks.callbacks.push_back(shared);
                } else {
                    let handle = SIM_IF.register_callback(SimCallback::Edge(*sig_hdl))?;
                    edges.insert(*sig_hdl as u64, CallbackHandles::with_first(handle, shared));
                }
                Ok(())
            }),
            TrigKind::Invalid(e) => Err(e.clone()),
        }
    }
}

impl Future for Trigger {
    type Output = SimpleResult<()>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        // Trigger must only be awaited once, so the second time it is polled it must be because
        // the waker signaled its completion.
        if self.awaited {
            Poll::Ready(Ok(()))
        } else {
            self.awaited = true;
            let shared = TrigShared {
                waker: cx.waker().clone(),
                edge_kind: EdgeKind::Any,
            };
            match self.register(shared) {
                Ok(()) => Poll::Pending,
                Err(e) => Poll::Ready(Err(e)),
            }
        }
    }
}

/// Called by the simulator when a registered callback fires.
///
/// Wakes all tasks awaiting the matching triggers and runs them. Callbacks
/// that no longer have waiting triggers (cancelled in the meantime) are
/// ignored.
#[inline]
pub fn react(cb: SimCallback, edge: Option<EdgeKind>) {
    let vec_wake: Option<VecDeque<TrigShared>> = match cb {
        SimCallback::ReadWrite => READ_WRITE.with(|rw| {
            let mut rw = rw.borrow_mut();
            // remove handle, since CB is now done
            rw.handle.take()?;
            Some(std::mem::take(&mut rw.callbacks))
        }),
        SimCallback::ReadOnly => READ_ONLY.with(|ro| {
            let mut ro = ro.borrow_mut();
            ro.handle.take()?;
            Some(std::mem::take(&mut ro.callbacks))
        }),
        SimCallback::Time(t) => {
            TIMER_MAP.with(|timers| timers.borrow_mut().remove(t).map(|cb| cb.callbacks))
        }
        SimCallback::Edge(sig_hdl) => react_edge(sig_hdl, edge.unwrap_or(EdgeKind::Any)),
    };

    if let Some(vec_wake) = vec_wake {
        for shared in vec_wake {
            shared.waker.wake();
        }
        // execute woken tasks
        executor::run_once();
    }
}

fn react_edge(sig_hdl: usize, edge: EdgeKind) -> Option<VecDeque<TrigShared>> {
    let mut callbacks = EDGE_MAP.with(|edges| edges.borrow_mut().remove(sig_hdl as u64))?;
    let (vec_wake, vec_resched): (VecDeque<_>, VecDeque<_>) = callbacks
        .callbacks
        .drain(..)
        .partition(|trig| edge == EdgeKind::Any || trig.edge_kind == EdgeKind::Any || trig.edge_kind == edge);
    if vec_resched.is_empty() {
        // if no callbacks are remaining, cancel
        if let Some(handle) = callbacks.handle.take() {
            let _ = SIM_IF.cancel_callback(handle);
        }
    } else {
        // put rescheduled callbacks back into EDGE_MAP
        callbacks.callbacks = vec_resched;
        EDGE_MAP.with(|edges| edges.borrow_mut().insert(sig_hdl as u64, callbacks));
    }
    if vec_wake.is_empty() {
        None
    } else {
        Some(vec_wake)
    }
}
