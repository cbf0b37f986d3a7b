mod config;
mod error;
mod executor;
mod junit;
pub mod kernel;
mod logger;
pub mod prelude;
mod rstb_obj;
pub mod rv32i;
mod signal;
pub mod sim_if;
mod trigger;
mod value;
pub mod waveform;

use once_cell::sync::OnceCell;
use prettytable::{Cell, Row, Table};
use std::cell::RefCell;
use std::sync::Arc;
use std::time;

pub use config::TbConfig;
pub use error::RstbError;
pub use executor::{JoinHandle, Task};
pub use kernel::{Design, LogRecord, TraceEvent};
pub use logger::{LogLevel, SimLogger};
pub use signal::SimObject;
pub use test::{RstbTests, Test, TestFn};
pub use trigger::{EdgeKind, Trigger};
pub use value::Val;

use rstb_obj::RstbObjSafe;
use sim_if::SIM_IF;

pub type SimpleResult<T> = Result<T, RstbError>;
pub type RstbResult = Result<Val, RstbError>;

/// Name of the test suite in reports; set by [`run_with_sim!`].
pub static CRATE_NAME: OnceCell<String> = OnceCell::new();

thread_local! {
    static SIM_START_TIME: RefCell<Option<time::Instant>> = const { RefCell::new(None) };
    static CURRENT_TEST: RefCell<Option<(Arc<Task>, RstbObjSafe<Test>)>> = const { RefCell::new(None) };
}

/// Outcome of one test.
#[derive(Debug, Clone, PartialEq)]
pub struct TestReport {
    pub name: String,
    pub result: RstbResult,
    pub time_secs: f64,
    pub sim_time_ns: f64,
}

impl TestReport {
    pub fn passed(&self) -> bool {
        self.result.is_ok()
    }
}

/// Everything a finished simulation produced.
#[derive(Debug, Clone, PartialEq)]
pub struct SimReport {
    pub tests: Vec<TestReport>,
    pub sim_time_ns: f64,
    pub real_time_secs: f64,
    /// `false` if the configured time limit cut the simulation short.
    pub completed: bool,
    pub trace: Vec<TraceEvent>,
    pub log: Vec<LogRecord>,
}

impl SimReport {
    /// `true` if at least one test ran and all tests passed.
    ///
    /// A run where the testcase filter selected nothing counts as not passed.
    pub fn passed(&self) -> bool {
        !self.tests.is_empty() && self.tests.iter().all(TestReport::passed)
    }

    pub fn test(&self, name: &str) -> Option<&TestReport> {
        self.tests.iter().find(|t| t.name == name)
    }

    /// Value changes of one signal as `(time_ns, value)` pairs.
    pub fn signal_trace(&self, full_name: &str) -> Vec<(f64, u32)> {
        self.trace
            .iter()
            .filter(|ev| ev.signal == full_name)
            .map(|ev| (ev.time_ns(), ev.value))
            .collect()
    }
}

/// Passes the running test, if it has not already passed or failed.
pub fn pass_test(msg: &str) {
    end_test(Ok(Val::String(msg.to_string())));
}

/// Fails the running test, if it has not already passed or failed.
pub fn fail_test(msg: &str) {
    end_test(Err(RstbError::TestFailed(msg.to_string())));
}

fn end_test(result: RstbResult) {
    if let Some((task, test)) = CURRENT_TEST.with(|c| c.borrow_mut().take()) {
        let sim_time = SIM_IF.get_sim_time("ns").unwrap_or(0.0);
        let line = test.with_mut(|t| {
            let line = match &result {
                Ok(_) => format!("Test {} passed", t.name),
                Err(e) => format!("Test {} failed: {}", t.name, e),
            };
            t.finish(result, sim_time);
            line
        });
        SIM_IF.log(&line);
        tear_down_test(task);
    }
}

fn tear_down_test(test: Arc<Task>) {
    trigger::cancel_all_triggers();
    executor::clear_ready_queue();
    test.cancel();
}

fn start_of_simulation() -> SimpleResult<()> {
    SIM_START_TIME.with(|t| t.borrow_mut().replace(time::Instant::now()));

    let sim_root = SimObject::get_root()?;

    // All tests are scheduled in a chain at simulation start up by awaiting the previous test completion.
    let mut join_handle: Option<JoinHandle> = None;
    for test in test::tests().iter().cloned() {
        let name = test.get().name.clone();
        join_handle = Some(Task::spawn_from_future(
            async move {
                // await previous test, if there is one
                if let Some(handle) = join_handle {
                    let _ = handle.await;
                    // the previous test may have ended in ReadOnly; start this one in the active phase
                    Trigger::timer_steps(0).await?;
                }
                let test_handle = Task::spawn_from_future(
                    {
                        let test = test.clone();
                        async move {
                            let generator = test.with_mut(|t| {
                                t.start(SIM_IF.get_sim_time("ns").unwrap_or(0.0));
                                SIM_IF.log(&format!("Running test {}", t.name));
                                t.generator
                            });
                            end_test((generator)(sim_root).await);
                            Ok(Val::None)
                        }
                    },
                    &name,
                );
                // set current test handle
                if let Some(task) = test_handle.task() {
                    CURRENT_TEST.with(|c| c.borrow_mut().replace((task, test)));
                }
                // await test execution
                let _ = test_handle.await;
                Ok(Val::None)
            },
            "test chain",
        ));
    }

    // execute first simulation tick
    executor::run_once();
    Ok(())
}

fn table_row(cells: &[&str]) -> Row {
    Row::new(cells.iter().map(|c| Cell::new(c)).collect())
}

fn end_of_simulation(config: &TbConfig, completed: bool) -> SimpleResult<SimReport> {
    if !completed {
        SIM_IF.log("Simulation stopped at time limit");
    }
    // a test still waiting on a trigger can never finish now
    if CURRENT_TEST.with(|c| c.borrow().is_some()) {
        end_test(Err(RstbError::TestFailed(
            "test did not complete before end of simulation".to_string(),
        )));
    }

    let duration = SIM_START_TIME
        .with(|t| t.borrow_mut().take())
        .map(|t| t.elapsed().as_secs_f64())
        .unwrap_or(0.0);
    let final_sim_time = SIM_IF.get_sim_time("ns")?;
    let tests = test::tests();
    if tests.is_empty() {
        SIM_IF.log("No tests selected");
    }

    let mut table = Table::new();
    table.set_titles(table_row(&[
        "TEST",
        "RESULT",
        "REAL TIME (s)",
        "SIM TIME (ns)",
        "SIM SPEED (ns/s)",
    ]));
    let mut reports = Vec::with_capacity(tests.len());
    for test in tests.iter() {
        let t = test.get();
        let result = t
            .result
            .clone()
            .unwrap_or_else(|| Err(RstbError::TestFailed("test did not run".to_string())));
        let sim_speed = if t.time_secs > 0.0 { t.sim_time_ns / t.time_secs } else { 0.0 };
        let verdict = if result.is_ok() { "PASS" } else { "FAIL" };
        table.add_row(table_row(&[
            &t.name,
            verdict,
            &format!("{:.3}", t.time_secs),
            &format!("{:.3}", t.sim_time_ns),
            &format!("{:.3}", sim_speed),
        ]));
        reports.push(TestReport {
            name: t.name.clone(),
            result,
            time_secs: t.time_secs,
            sim_time_ns: t.sim_time_ns,
        });
    }
    for line in table.to_string().lines() {
        SIM_IF.log(line);
    }

    let sim_speed = if duration > 0.0 { final_sim_time / duration } else { 0.0 };
    SIM_IF.log("TOTAL SIMULATION");
    SIM_IF.log(&format!("Simulation time: {} ns", final_sim_time));
    SIM_IF.log(&format!("Real time: {:.3} s", duration));
    SIM_IF.log(&format!("Simulation speed: {:.3} ns/s", sim_speed));

    let trace = kernel::trace()?;
    if let Some(path) = &config.results {
        let suite = CRATE_NAME.get().map(String::as_str).unwrap_or("rstb");
        junit::create_junit_xml(suite, &tests, path)?;
    }
    if let Some(path) = &config.vcd {
        let scope = SimObject::get_root()?.name()?;
        let file = std::io::BufWriter::new(std::fs::File::create(path)?);
        waveform::write_vcd(file, &scope, &kernel::signals()?, &trace)?;
    }

    Ok(SimReport {
        tests: reports,
        sim_time_ns: final_sim_time,
        real_time_secs: duration,
        completed,
        trace,
        log: kernel::log_records()?,
    })
}

/// Runs `tests` against a fresh simulation of `design` on the current thread.
///
/// Tests run one after another in registration order, filtered by
/// [`TbConfig::testcase`]. Test failures are reported in the returned
/// [`SimReport`]; `Err` is returned only if the simulation itself could not
/// run or its reports could not be written.
pub fn run_simulation(
    design: &Design,
    mut tests: RstbTests,
    config: &TbConfig,
) -> SimpleResult<SimReport> {
    kernel::init(design, config.precision)?;
    logger::set_log_level(config.log_level);
    signal::clear_objects();
    trigger::cancel_all_triggers();
    executor::clear_ready_queue();
    CURRENT_TEST.with(|c| c.borrow_mut().take());

    tests.retain(|t| config.selects(&t.name));
    test::set_tests(tests);

    start_of_simulation()?;
    let limit = match config.time_limit_ns {
        Some(ns) => Some(SIM_IF.get_sim_steps(ns as f64, "ns")?),
        None => None,
    };
    let completed = kernel::run(limit)?;
    end_of_simulation(config, completed)
}

/// Registers test functions and generates `rstb_tests()` and `rstb_run()`
/// for them.
///
/// ```ignore
/// rv32i_tb::run_with_sim!(my_design(); test_a, test_b);
/// ```
#[macro_export]
macro_rules! run_with_sim {
    ($design:expr; $( $i:ident ),+ $(,)?) => {
        pub fn rstb_tests() -> $crate::RstbTests {
            let mut tests = $crate::RstbTests::new();
            $(tests.push($crate::Test::new(stringify!($i), |sim_root| {
                $crate::prelude::FutureExt::boxed($i(sim_root))
            }));)+
            tests
        }

        pub fn rstb_run(config: &$crate::TbConfig) -> $crate::SimpleResult<$crate::SimReport> {
            let _ = $crate::CRATE_NAME.set(std::module_path!().to_string());
            $crate::run_simulation(&$design, rstb_tests(), config)
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_table_renders() {
        let mut table = Table::new();
        table.set_titles(table_row(&["TEST", "RESULT"]));
        table.add_row(table_row(&["simple_boot_test", "PASS"]));
        let text = table.to_string();
        assert!(text.contains("TEST"));
        assert!(text.lines().any(|l| l.contains("simple_boot_test") && l.contains("PASS")));
    }
}
