//! In-process event-driven simulator backend.
//!
//! The kernel is a signal store plus scheduler: it holds the ports of a
//! [`Design`], applies scheduled writes, and reports value changes, timer
//! expiry and synchronization points back to the harness through
//! [`trigger::react`]. It evaluates no HDL logic.
//!
//! Each simulated time step is processed as follows:
//!
//! 1. apply pending writes and fire value-change callbacks for signals that
//!    changed,
//! 2. fire the ReadWrite callback if one is registered,
//! 3. repeat 1-2 until nothing changes,
//! 4. fire the ReadOnly callback (writes are rejected here),
//! 5. advance to the earliest registered timer.
//!
//! State is thread-local so independent simulations can run on separate
//! threads.

use num_format::{Locale, ToFormattedString};
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};

use crate::error::RstbError;
use crate::sim_if::{ldexp10, ObjectKind, SimCallback, SimIf, WriteKind};
use crate::trigger::{self, EdgeKind};
use crate::SimpleResult;

/// Maximum evaluation passes at a single time step.
pub const MAX_DELTAS: u32 = 10_000;

thread_local! {
    static KERNEL: RefCell<Option<KernelState>> = RefCell::new(None);
}

/// A port of the simulated design.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Port {
    pub name: String,
    pub width: u32,
}

/// Description of the design under test: a top-level scope and its ports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Design {
    pub name: String,
    pub ports: Vec<Port>,
}

impl Design {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ports: Vec::new(),
        }
    }

    /// Adds a port of the given bit width (1..=32).
    pub fn port(mut self, name: &str, width: u32) -> Self {
        self.ports.push(Port {
            name: name.to_string(),
            width,
        });
        self
    }
}

/// A recorded value change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceEvent {
    pub time_fs: u64,
    pub signal: String,
    pub value: u32,
}

impl TraceEvent {
    pub fn time_ns(&self) -> f64 {
        self.time_fs as f64 / 1e6
    }
}

/// A message emitted through [`SimIf::log`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub time_fs: u64,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Active,
    ReadOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Registered {
    Time(u64),
    Edge(usize),
    ReadWrite,
    ReadOnly,
}

#[derive(Debug)]
struct Object {
    full_name: String,
    kind: ObjectKind,
    // None is unresolved (x)
    value: Option<u32>,
    forced: Option<u32>,
}

impl Object {
    fn effective(&self) -> Option<u32> {
        self.forced.or(self.value)
    }
}

#[derive(Debug)]
struct PendingWrite {
    handle: usize,
    value: u32,
    kind: WriteKind,
}

#[derive(Debug)]
struct KernelState {
    precision: i8,
    time: u64,
    phase: Phase,
    objects: Vec<Object>,
    names: HashMap<String, usize>,
    pending: Vec<PendingWrite>,
    callbacks: HashMap<usize, Registered>,
    timers: BTreeMap<u64, Vec<usize>>,
    next_cb: usize,
    trace: Vec<TraceEvent>,
    log: Vec<LogRecord>,
}

impl KernelState {
    fn new(design: &Design, precision: i8) -> SimpleResult<Self> {
        if !(-15..=0).contains(&precision) {
            return Err(RstbError::InvalidPrecision(precision));
        }
        let mut state = Self {
            precision,
            time: 0,
            phase: Phase::Active,
            objects: Vec::with_capacity(design.ports.len() + 1),
            names: HashMap::new(),
            pending: Vec::new(),
            callbacks: HashMap::new(),
            timers: BTreeMap::new(),
            next_cb: 1,
            trace: Vec::new(),
            log: Vec::new(),
        };
        state.add_object(design.name.clone(), ObjectKind::Hier);
        for port in &design.ports {
            if port.width == 0 || port.width > 32 {
                return Err(RstbError::Config {
                    key: format!("{}.{}", design.name, port.name),
                    reason: format!("unsupported port width {}", port.width),
                });
            }
            state.add_object(
                format!("{}.{}", design.name, port.name),
                ObjectKind::Int(port.width),
            );
        }
        Ok(state)
    }

    fn add_object(&mut self, full_name: String, kind: ObjectKind) {
        self.objects.push(Object {
            full_name: full_name.clone(),
            kind,
            value: None,
            forced: None,
        });
        // handles start at 1
        self.names.insert(full_name, self.objects.len());
    }

    fn object(&self, handle: usize) -> SimpleResult<&Object> {
        handle
            .checked_sub(1)
            .and_then(|i| self.objects.get(i))
            .ok_or(RstbError::InvalidHandle(handle))
    }

    fn time_fs(&self) -> u64 {
        self.time * 10_u64.pow((self.precision + 15) as u32)
    }

    fn new_callback(&mut self, reg: Registered) -> usize {
        let id = self.next_cb;
        self.next_cb += 1;
        self.callbacks.insert(id, reg);
        id
    }

    fn take_sync(&mut self, reg: Registered) -> bool {
        let id = self
            .callbacks
            .iter()
            .find(|(_, r)| **r == reg)
            .map(|(id, _)| *id);
        match id {
            Some(id) => {
                self.callbacks.remove(&id);
                true
            }
            None => false,
        }
    }

    fn has_edge_callback(&self, sig: usize) -> bool {
        self.callbacks
            .values()
            .any(|r| *r == Registered::Edge(sig))
    }

    // Applies all pending writes; returns changed signals in first-write order.
    fn apply_pending(&mut self) -> Vec<(usize, EdgeKind)> {
        let pending = std::mem::take(&mut self.pending);
        let mut before: Vec<(usize, Option<u32>)> = Vec::new();
        for write in pending {
            let obj = &mut self.objects[write.handle - 1];
            if !before.iter().any(|(h, _)| *h == write.handle) {
                before.push((write.handle, obj.effective()));
            }
            match write.kind {
                WriteKind::Deposit => obj.value = Some(write.value),
                WriteKind::Force => obj.forced = Some(write.value),
                WriteKind::Release => obj.forced = None,
            }
        }
        let time_fs = self.time_fs();
        let mut changes = Vec::new();
        for (handle, old) in before {
            let obj = &self.objects[handle - 1];
            let new = obj.effective();
            if new == old {
                continue;
            }
            if let Some(value) = new {
                self.trace.push(TraceEvent {
                    time_fs,
                    signal: obj.full_name.clone(),
                    value,
                });
                let edge = match (obj.kind, value) {
                    (ObjectKind::Int(1), 1) => EdgeKind::Rising,
                    (ObjectKind::Int(1), 0) => EdgeKind::Falling,
                    _ => EdgeKind::Any,
                };
                changes.push((handle, edge));
            }
        }
        changes
    }

    fn next_timer(&mut self) -> Option<(u64, Vec<usize>)> {
        let (time, ids) = self.timers.pop_first()?;
        let live = ids
            .into_iter()
            .filter(|id| self.callbacks.remove(id).is_some())
            .collect();
        Some((time, live))
    }
}

fn with_state<R>(f: impl FnOnce(&mut KernelState) -> SimpleResult<R>) -> SimpleResult<R> {
    KERNEL.with(|k| match k.borrow_mut().as_mut() {
        Some(state) => f(state),
        None => Err(RstbError::NoSimulator),
    })
}

/// Sets up a fresh simulator for `design` on the current thread.
pub fn init(design: &Design, precision: i8) -> SimpleResult<()> {
    let state = KernelState::new(design, precision)?;
    KERNEL.with(|k| k.borrow_mut().replace(state));
    Ok(())
}

/// Runs the event loop until no timers remain.
///
/// Returns `false` if `time_limit` (in steps) stopped the run early.
pub fn run(time_limit: Option<u64>) -> SimpleResult<bool> {
    loop {
        settle()?;
        if with_state(|s| Ok(s.take_sync(Registered::ReadOnly)))? {
            with_state(|s| {
                s.phase = Phase::ReadOnly;
                Ok(())
            })?;
            trigger::react(SimCallback::ReadOnly, None);
            with_state(|s| {
                s.phase = Phase::Active;
                Ok(())
            })?;
        }
        let next = with_state(|s| Ok(s.next_timer()))?;
        let Some((time, ids)) = next else {
            return Ok(true);
        };
        if ids.is_empty() {
            continue;
        }
        if let Some(limit) = time_limit {
            if time > limit {
                with_state(|s| {
                    s.time = limit;
                    Ok(())
                })?;
                return Ok(false);
            }
        }
        with_state(|s| {
            s.time = time;
            Ok(())
        })?;
        // callbacks sharing a time are grouped by the trigger layer
        trigger::react(SimCallback::Time(time), None);
    }
}

fn settle() -> SimpleResult<()> {
    for _ in 0..MAX_DELTAS {
        let changes = with_state(|s| Ok(s.apply_pending()))?;
        if !changes.is_empty() {
            for (sig, edge) in changes {
                if with_state(|s| Ok(s.has_edge_callback(sig)))? {
                    trigger::react(SimCallback::Edge(sig), Some(edge));
                }
            }
            continue;
        }
        if with_state(|s| Ok(s.take_sync(Registered::ReadWrite)))? {
            trigger::react(SimCallback::ReadWrite, None);
            continue;
        }
        return Ok(());
    }
    with_state(|s| {
        Err(RstbError::DeltaCycleLimit {
            time_fs: s.time_fs(),
            max_deltas: MAX_DELTAS,
        })
    })
}

/// Value-change trace recorded so far.
pub fn trace() -> SimpleResult<Vec<TraceEvent>> {
    with_state(|s| Ok(s.trace.clone()))
}

/// Log records emitted so far.
pub fn log_records() -> SimpleResult<Vec<LogRecord>> {
    with_state(|s| Ok(s.log.clone()))
}

/// Current simulation time in femtoseconds.
pub fn time_fs() -> SimpleResult<u64> {
    with_state(|s| Ok(s.time_fs()))
}

/// Full names and widths of all signals, in declaration order.
pub fn signals() -> SimpleResult<Vec<(String, u32)>> {
    with_state(|s| {
        Ok(s.objects
            .iter()
            .filter_map(|o| match o.kind {
                ObjectKind::Int(width) => Some((o.full_name.clone(), width)),
                _ => None,
            })
            .collect())
    })
}

/// [`SimIf`] implementation backed by the thread-local kernel.
pub(crate) struct Kernel;

impl SimIf for Kernel {
    fn put_value(&self, handle: usize, value: i64, kind: WriteKind) -> SimpleResult<()> {
        with_state(|s| {
            let obj = s.object(handle)?;
            let width = match obj.kind {
                ObjectKind::Int(width) => width,
                _ => {
                    return Err(RstbError::NotModifiable {
                        name: obj.full_name.clone(),
                    })
                }
            };
            if s.phase == Phase::ReadOnly {
                return Err(RstbError::ReadOnlyWrite {
                    name: obj.full_name.clone(),
                });
            }
            // negative values are accepted as two's complement of the port width
            let max = 1_i64 << width;
            let min = -(1_i64 << (width - 1));
            if value >= max || value < min {
                return Err(RstbError::ValueOutOfRange {
                    name: obj.full_name.clone(),
                    value,
                    width,
                });
            }
            let bits = (value & (max - 1)) as u32;
            s.pending.push(PendingWrite {
                handle,
                value: bits,
                kind,
            });
            Ok(())
        })
    }

    fn get_value_u32(&self, handle: usize) -> SimpleResult<u32> {
        with_state(|s| {
            let obj = s.object(handle)?;
            obj.effective().ok_or_else(|| RstbError::UnresolvedValue {
                name: obj.full_name.clone(),
            })
        })
    }

    fn get_value_bin(&self, handle: usize) -> SimpleResult<String> {
        with_state(|s| {
            let obj = s.object(handle)?;
            let width = match obj.kind {
                ObjectKind::Int(width) => width as usize,
                _ => {
                    return Err(RstbError::NotModifiable {
                        name: obj.full_name.clone(),
                    })
                }
            };
            Ok(match obj.effective() {
                Some(v) => format!("{:0width$b}", v, width = width),
                None => "x".repeat(width),
            })
        })
    }

    fn get_handle_by_name(&self, name: &str) -> SimpleResult<usize> {
        with_state(|s| {
            s.names
                .get(name)
                .copied()
                .ok_or_else(|| RstbError::ObjectNotFound {
                    name: name.to_string(),
                })
        })
    }

    fn get_root_handle(&self) -> SimpleResult<usize> {
        with_state(|s| {
            if s.objects.is_empty() {
                Err(RstbError::InvalidHandle(1))
            } else {
                Ok(1)
            }
        })
    }

    fn get_kind(&self, handle: usize) -> SimpleResult<ObjectKind> {
        with_state(|s| Ok(s.object(handle)?.kind))
    }

    fn get_full_name(&self, handle: usize) -> SimpleResult<String> {
        with_state(|s| Ok(s.object(handle)?.full_name.clone()))
    }

    fn get_sim_time_steps(&self) -> u64 {
        with_state(|s| Ok(s.time)).unwrap_or(0)
    }

    fn get_sim_precision(&self) -> i8 {
        with_state(|s| Ok(s.precision)).unwrap_or(-12)
    }

    fn register_callback(&self, cb: SimCallback) -> SimpleResult<usize> {
        with_state(|s| {
            let id = match cb {
                SimCallback::Time(delay) => {
                    let abs = s.time + delay;
                    let id = s.new_callback(Registered::Time(abs));
                    s.timers.entry(abs).or_default().push(id);
                    id
                }
                SimCallback::Edge(sig) => {
                    s.object(sig)?;
                    s.new_callback(Registered::Edge(sig))
                }
                SimCallback::ReadWrite => s.new_callback(Registered::ReadWrite),
                SimCallback::ReadOnly => s.new_callback(Registered::ReadOnly),
            };
            Ok(id)
        })
    }

    fn cancel_callback(&self, cb_hdl: usize) -> SimpleResult<()> {
        with_state(|s| match s.callbacks.remove(&cb_hdl) {
            Some(Registered::Time(abs)) => {
                if let Some(ids) = s.timers.get_mut(&abs) {
                    ids.retain(|id| *id != cb_hdl);
                    if ids.is_empty() {
                        s.timers.remove(&abs);
                    }
                }
                Ok(())
            }
            Some(_) => Ok(()),
            None => Err(RstbError::InvalidCallback(cb_hdl)),
        })
    }

    fn log(&self, msg: &str) {
        let record = with_state(|s| {
            let t = ldexp10(s.time as f64, s.precision + 9);
            let int = t.floor() as u64;
            let mut frac_str = format!("{:.3}", t % 1.0);
            frac_str.remove(0);
            let line = format!(
                "{:>12}{}ns {}",
                int.to_formatted_string(&Locale::en),
                frac_str,
                msg
            );
            s.log.push(LogRecord {
                time_fs: s.time_fs(),
                message: msg.to_string(),
            });
            Ok(line)
        });
        match record {
            Ok(line) => eprintln!("{}", line),
            Err(_) => eprintln!("{}", msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn design() -> Design {
        Design::new("top").port("clk", 1).port("data", 8)
    }

    #[test]
    fn handles_resolve_by_full_name() {
        init(&design(), -12).unwrap();
        let k = Kernel;
        let root = k.get_root_handle().unwrap();
        assert_eq!(k.get_full_name(root).unwrap(), "top");
        assert_eq!(k.get_kind(root).unwrap(), ObjectKind::Hier);
        let data = k.get_handle_by_name("top.data").unwrap();
        assert_eq!(k.get_kind(data).unwrap(), ObjectKind::Int(8));
        assert!(matches!(
            k.get_handle_by_name("top.missing"),
            Err(RstbError::ObjectNotFound { .. })
        ));
    }

    #[test]
    fn writes_apply_when_settled() {
        init(&design(), -12).unwrap();
        let k = Kernel;
        let clk = k.get_handle_by_name("top.clk").unwrap();
        assert_eq!(k.get_value_bin(clk).unwrap(), "x");
        k.put_value(clk, 1, WriteKind::Deposit).unwrap();
        assert!(k.get_value_u32(clk).is_err());
        assert!(run(None).unwrap());
        assert_eq!(k.get_value_u32(clk).unwrap(), 1);
        let trace = trace().unwrap();
        assert_eq!(trace.len(), 1);
        assert_eq!(trace[0].signal, "top.clk");
    }

    #[test]
    fn values_must_fit_width() {
        init(&design(), -12).unwrap();
        let k = Kernel;
        let clk = k.get_handle_by_name("top.clk").unwrap();
        assert!(matches!(
            k.put_value(clk, 2, WriteKind::Deposit),
            Err(RstbError::ValueOutOfRange { width: 1, .. })
        ));
        let data = k.get_handle_by_name("top.data").unwrap();
        k.put_value(data, -1, WriteKind::Deposit).unwrap();
        run(None).unwrap();
        assert_eq!(k.get_value_bin(data).unwrap(), "11111111");
    }

    #[test]
    fn force_overrides_deposit_until_release() {
        init(&design(), -12).unwrap();
        let k = Kernel;
        let data = k.get_handle_by_name("top.data").unwrap();
        k.put_value(data, 3, WriteKind::Deposit).unwrap();
        k.put_value(data, 7, WriteKind::Force).unwrap();
        run(None).unwrap();
        assert_eq!(k.get_value_u32(data).unwrap(), 7);
        k.put_value(data, 9, WriteKind::Deposit).unwrap();
        run(None).unwrap();
        assert_eq!(k.get_value_u32(data).unwrap(), 7);
        k.put_value(data, 0, WriteKind::Release).unwrap();
        run(None).unwrap();
        assert_eq!(k.get_value_u32(data).unwrap(), 9);
    }

    #[test]
    fn cancelled_timer_does_not_advance_time() {
        init(&design(), -12).unwrap();
        let k = Kernel;
        let id = k.register_callback(SimCallback::Time(5_000)).unwrap();
        k.cancel_callback(id).unwrap();
        assert_eq!(k.cancel_callback(id), Err(RstbError::InvalidCallback(id)));
        run(None).unwrap();
        assert_eq!(k.get_sim_time_steps(), 0);
    }

    #[test]
    fn time_limit_stops_run() {
        init(&design(), -12).unwrap();
        let k = Kernel;
        k.register_callback(SimCallback::Time(10_000)).unwrap();
        assert!(!run(Some(4_000)).unwrap());
        assert_eq!(k.get_sim_time_steps(), 4_000);
    }

    #[test]
    fn invalid_precision_is_rejected() {
        assert_eq!(
            init(&design(), 3),
            Err(RstbError::InvalidPrecision(3))
        );
    }

    #[test]
    fn log_records_carry_time() {
        init(&design(), -12).unwrap();
        Kernel.log("hello");
        let log = log_records().unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].message, "hello");
        assert_eq!(log[0].time_fs, 0);
    }
}
