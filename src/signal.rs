use intmap::IntMap;
use std::cell::RefCell;
use std::collections::HashMap;

use crate::logger::SimLogger;
use crate::sim_if::{ObjectKind, WriteKind, SIM_IF};
use crate::trigger::Trigger;
use crate::value::Val;
use crate::{RstbError, RstbResult, SimpleResult};

thread_local! {
    static SIG_MAP_NAME: RefCell<HashMap<String, usize>> = RefCell::new(HashMap::new());
    static SIG_MAP: RefCell<IntMap<SimObject>> = RefCell::new(IntMap::new());
}

/// Handle to an object (scope or signal) in the simulated design.
///
/// `SimObject` is `Copy`; the simulator owns the object for the whole
/// simulation and handles stay valid until the next simulation is set up.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SimObject {
    pub(crate) handle: usize,
    pub(crate) kind: ObjectKind,
}

pub(crate) fn clear_objects() {
    SIG_MAP_NAME.with(|m| m.borrow_mut().clear());
    SIG_MAP.with(|m| m.borrow_mut().clear());
}

impl SimObject {
    pub fn handle(&self) -> usize {
        self.handle
    }

    pub fn kind(&self) -> ObjectKind {
        self.kind
    }

    pub fn name(&self) -> SimpleResult<String> {
        SIM_IF.get_full_name(self.handle)
    }

    pub fn size(&self) -> Option<u32> {
        match self.kind {
            ObjectKind::Int(size) => Some(size),
            _ => None,
        }
    }

    pub fn is_modifiable(&self) -> bool {
        matches!(self.kind, ObjectKind::Int(_))
    }

    /// Looks up the child `name` of this scope.
    pub fn c(&self, name: &str) -> SimpleResult<Self> {
        let mut child_name = self.name()?;
        child_name.push('.');
        child_name.push_str(name);
        SimObject::from_name(&child_name)
    }

    pub fn from_handle(handle: usize) -> SimpleResult<Self> {
        if let Some(signal) = SIG_MAP.with(|m| m.borrow().get(handle as u64).copied()) {
            return Ok(signal);
        }
        SimObject::new_from_handle(handle)
    }

    pub fn from_name(full_name: &str) -> SimpleResult<Self> {
        let handle = SIG_MAP_NAME.with(|m| m.borrow().get(full_name).copied());
        match handle {
            Some(h) => SimObject::from_handle(h),
            None => SimObject::new_from_name(full_name),
        }
    }

    fn new_from_name(full_name: &str) -> SimpleResult<Self> {
        let handle = SIM_IF.get_handle_by_name(full_name)?;
        SimObject::new_from_handle(handle)
    }

    fn new_from_handle(handle: usize) -> SimpleResult<Self> {
        let signal = SimObject {
            handle,
            kind: SIM_IF.get_kind(handle)?,
        };
        let name = signal.name()?;
        SIG_MAP.with(|m| m.borrow_mut().insert(handle as u64, signal));
        SIG_MAP_NAME.with(|m| m.borrow_mut().insert(name, handle));
        Ok(signal)
    }

    pub fn get_root() -> SimpleResult<Self> {
        SimObject::from_handle(SIM_IF.get_root_handle()?)
    }

    /// Scoped logger named after this object.
    pub fn log(&self) -> SimLogger {
        SimLogger::new(self.name().unwrap_or_else(|_| format!("<{}>", self.handle)))
    }

    pub fn u32(&self) -> SimpleResult<u32> {
        SIM_IF.get_value_u32(self.handle)
    }

    pub fn i32(&self) -> SimpleResult<i32> {
        let size = self.size().ok_or_else(|| self.not_modifiable())?;
        let raw = self.u32()?;
        // sign-extend from the port width
        let shift = 32 - size;
        Ok(((raw << shift) as i32) >> shift)
    }

    pub fn bin(&self) -> SimpleResult<String> {
        SIM_IF.get_value_bin(self.handle)
    }

    /// Schedules `val` to be written; visible once the current evaluation pass settles.
    pub fn set(&self, val: i32) -> SimpleResult<()> {
        self.put(val as i64, WriteKind::Deposit)
    }

    pub fn set_u32(&self, val: u32) -> SimpleResult<()> {
        self.put(val as i64, WriteKind::Deposit)
    }

    pub fn force(&self, val: i32) -> SimpleResult<()> {
        self.put(val as i64, WriteKind::Force)
    }

    pub fn release(&self) -> SimpleResult<()> {
        self.put(0, WriteKind::Release)
    }

    fn put(&self, val: i64, kind: WriteKind) -> SimpleResult<()> {
        if !self.is_modifiable() {
            return Err(self.not_modifiable());
        }
        SIM_IF.put_value(self.handle, val, kind)
    }

    fn not_modifiable(&self) -> RstbError {
        RstbError::NotModifiable {
            name: self.name().unwrap_or_else(|_| format!("<{}>", self.handle)),
        }
    }

    // convenience functions to get edge triggers for this signal
    pub fn rising_edge(self) -> Trigger {
        Trigger::rising_edge(self)
    }
    pub async fn rising_edge_ro(self) -> RstbResult {
        self.rising_edge().await?;
        Trigger::read_only().await?;
        Ok(Val::None)
    }
    pub async fn rising_edge_rw(self) -> RstbResult {
        self.rising_edge().await?;
        Trigger::read_write().await?;
        Ok(Val::None)
    }
    pub fn falling_edge(self) -> Trigger {
        Trigger::falling_edge(self)
    }
    pub fn edge(self) -> Trigger {
        Trigger::edge(self)
    }
}
