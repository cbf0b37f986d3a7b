use crate::error::RstbError;
use crate::kernel;
use crate::SimpleResult;
use lazy_static::lazy_static;

lazy_static! {
    pub static ref SIM_IF: Box<dyn SimIf + Sync> = new_interface();
}

fn new_interface() -> Box<dyn SimIf + Sync> {
    Box::new(kernel::Kernel)
}

#[derive(Debug, Hash, Clone, Copy, Eq, PartialEq)]
pub enum SimCallback {
    // relative delay on registration, absolute time when reported back
    Time(u64),
    Edge(usize),
    ReadWrite,
    ReadOnly,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ObjectKind {
    Int(u32),
    Hier,
    Other,
}

/// Value write mode.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum WriteKind {
    Deposit,
    Force,
    Release,
}

/// Interface between the harness and a simulator.
///
/// All handles are opaque `usize` values handed out by the simulator.
pub trait SimIf {
    fn put_value(&self, handle: usize, value: i64, kind: WriteKind) -> SimpleResult<()>;
    fn get_value_u32(&self, handle: usize) -> SimpleResult<u32>;
    fn get_value_bin(&self, handle: usize) -> SimpleResult<String>;
    fn get_handle_by_name(&self, name: &str) -> SimpleResult<usize>;
    fn get_root_handle(&self) -> SimpleResult<usize>;
    fn get_kind(&self, handle: usize) -> SimpleResult<ObjectKind>;
    fn get_full_name(&self, handle: usize) -> SimpleResult<String>;
    fn get_sim_time_steps(&self) -> u64;
    fn get_sim_precision(&self) -> i8;
    fn register_callback(&self, cb: SimCallback) -> SimpleResult<usize>;
    fn cancel_callback(&self, cb_hdl: usize) -> SimpleResult<()>;
    fn log(&self, msg: &str);

    fn get_sim_time(&self, unit: &str) -> SimpleResult<f64> {
        // this function does not preserve precision, so don't use carelessly
        let t = self.get_sim_time_steps() as f64;
        let precision = self.get_sim_precision();
        Ok(ldexp10(t, precision - time_scale(unit)?))
    }
    fn get_sim_steps(&self, time: f64, unit: &str) -> SimpleResult<u64> {
        let precision = self.get_sim_precision();
        let steps = ldexp10(time, time_scale(unit)? - precision);
        if steps >= 0.0 && steps % 1.0 == 0.0 {
            Ok(steps as u64)
        } else {
            Err(RstbError::TimePrecision {
                time,
                unit: unit.to_string(),
                precision: precision_name(precision),
            })
        }
    }
}

pub(crate) fn time_scale(unit: &str) -> SimpleResult<i8> {
    match unit {
        "fs" => Ok(-15),
        "ps" => Ok(-12),
        "ns" => Ok(-9),
        "us" => Ok(-6),
        "ms" => Ok(-3),
        "sec" => Ok(0),
        _ => Err(RstbError::InvalidTimeUnit(unit.to_string())),
    }
}

pub(crate) fn precision_name(precision: i8) -> String {
    match precision {
        -15 => "fs".to_string(),
        -12 => "ps".to_string(),
        -9 => "ns".to_string(),
        -6 => "us".to_string(),
        -3 => "ms".to_string(),
        0 => "sec".to_string(),
        p => format!("1e{} s", p),
    }
}

pub(crate) fn ldexp10(frac: f64, exp: i8) -> f64 {
    // Like math.ldexp, but base 10
    if exp >= 0 {
        frac * 10_u64.pow(exp as u32) as f64
    } else {
        let div = 10_u64.pow(-exp as u32) as f64;
        frac / div
    }
}
