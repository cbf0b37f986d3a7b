use rv32i_tb::prelude::{RstbError, TbConfig, Val};

mod edges {
    use rv32i_tb::prelude::*;

    async fn clock(clk: SimObject) -> RstbResult {
        loop {
            clk.set(0)?;
            Trigger::timer(5, "ns").await?;
            clk.set(1)?;
            Trigger::timer(5, "ns").await?;
        }
    }

    async fn watchdog() -> RstbResult {
        Trigger::timer(10, "ns").await?;
        fail_test("watchdog expired");
        Ok(Val::None)
    }

    pub async fn forked_failure(_dut: SimObject) -> RstbResult {
        Task::fork(watchdog());
        Trigger::timer(100, "ns").await?;
        Ok(Val::None)
    }

    pub async fn count_edges(dut: SimObject) -> RstbResult {
        let start = SIM_IF.get_sim_time("ns")?;
        let clk = dut.c("CLK")?;
        Task::fork(clock(clk));
        for _ in 0..10 {
            clk.rising_edge().await?;
        }
        let elapsed = SIM_IF.get_sim_time("ns")? - start;
        if elapsed != 95.0 {
            return Err(RstbError::TestFailed(format!("10th rising edge after {} ns", elapsed)));
        }
        Ok(Val::Int(10))
    }

    pub async fn joins_forked_result(_dut: SimObject) -> RstbResult {
        let handle = Task::fork(async { Ok(Val::Int(42)) });
        match handle.await? {
            Val::Int(42) => Ok(Val::None),
            other => Err(RstbError::TestFailed(format!("unexpected {}", other))),
        }
    }

    pub async fn bad_timer_unit(_dut: SimObject) -> RstbResult {
        Trigger::timer(1, "fortnight").await?;
        Ok(Val::None)
    }

    rv32i_tb::run_with_sim!(
        Design::new("top").port("CLK", 1);
        forked_failure, count_edges, joins_forked_result, bad_timer_unit
    );
}

mod phases {
    use rv32i_tb::prelude::*;
    use std::sync::{Arc, Mutex};

    async fn clock(clk: SimObject) -> RstbResult {
        loop {
            clk.set(0)?;
            Trigger::timer(5, "ns").await?;
            clk.set(1)?;
            Trigger::timer(5, "ns").await?;
        }
    }

    async fn pulse(clk: SimObject) -> RstbResult {
        clk.set(1)?;
        Trigger::timer(2, "ns").await?;
        clk.set(0)?;
        Ok(Val::None)
    }

    async fn mark(
        trigger: Trigger,
        label: &'static str,
        order: Arc<Mutex<Vec<&'static str>>>,
    ) -> RstbResult {
        trigger.await?;
        order.lock().unwrap().push(label);
        Ok(Val::None)
    }

    // finishes while the simulator is in its ReadOnly phase
    pub async fn write_in_read_only_is_rejected(dut: SimObject) -> RstbResult {
        let clk = dut.c("CLK")?;
        clk.set(0)?;
        Trigger::timer_ro(5, "ns").await?;
        match clk.set(1) {
            Err(RstbError::ReadOnlyWrite { .. }) => Ok(Val::None),
            other => Err(RstbError::TestFailed(format!("write in ReadOnly gave {:?}", other))),
        }
    }

    pub async fn read_write_then_read_only(dut: SimObject) -> RstbResult {
        let clk = dut.c("CLK")?;
        clk.set(0)?;
        Trigger::timer_rw(3, "ns").await?;
        clk.set(1)?;
        Trigger::read_only().await?;
        Ok(Val::Int(clk.u32()? as i32))
    }

    pub async fn falling_edge_passes_early(dut: SimObject) -> RstbResult {
        let clk = dut.c("CLK")?;
        let start = SIM_IF.get_sim_time("ns")?;
        Task::fork(pulse(clk));
        clk.falling_edge().await?;
        let elapsed = SIM_IF.get_sim_time("ns")? - start;
        pass_test(&format!("falling at {}", elapsed));
        Ok(Val::None)
    }

    pub async fn settle_order(dut: SimObject) -> RstbResult {
        let clk = dut.c("CLK")?;
        let order = Arc::new(Mutex::new(Vec::new()));
        let handles = vec![
            Task::fork(mark(Trigger::read_only(), "read_only", order.clone())),
            Task::fork(mark(Trigger::read_write(), "read_write", order.clone())),
            Task::fork(mark(clk.edge(), "edge", order.clone())),
        ];
        clk.set(if clk.u32()? == 0 { 1 } else { 0 })?;
        Trigger::timer(1, "ns").await?;
        for handle in handles {
            handle.await?;
        }
        let order = order.lock().unwrap().join(",");
        Ok(Val::String(order))
    }

    pub async fn edge_sync_helpers(dut: SimObject) -> RstbResult {
        let clk = dut.c("CLK")?;
        Task::fork(clock(clk));
        clk.rising_edge_rw().await?;
        clk.set(0)?;
        Trigger::read_only().await?;
        let after_rw = clk.u32()?;
        clk.rising_edge_ro().await?;
        let after_ro = clk.u32()?;
        Ok(Val::String(format!("{}{}", after_rw, after_ro)))
    }

    rv32i_tb::run_with_sim!(
        Design::new("top").port("CLK", 1);
        write_in_read_only_is_rejected,
        read_write_then_read_only,
        falling_edge_passes_early,
        settle_order,
        edge_sync_helpers
    );
}

mod runaway {
    use rv32i_tb::prelude::*;

    pub async fn toggles_without_time(dut: SimObject) -> RstbResult {
        let clk = dut.c("CLK")?;
        let mut level = 0;
        loop {
            clk.set(level)?;
            level ^= 1;
            Trigger::read_write().await?;
        }
    }

    rv32i_tb::run_with_sim!(Design::new("top").port("CLK", 1); toggles_without_time);
}

fn quiet() -> TbConfig {
    TbConfig::default().with_results(None)
}

#[test]
fn failure_in_forked_task_ends_test_and_next_runs() {
    let report = edges::rstb_run(&quiet()).unwrap();
    let failed = report.test("forked_failure").unwrap();
    assert_eq!(
        failed.result,
        Err(RstbError::TestFailed("watchdog expired".into()))
    );
    assert_eq!(failed.sim_time_ns, 10.0);

    let edges = report.test("count_edges").unwrap();
    assert_eq!(edges.result, Ok(Val::Int(10)));
    assert_eq!(edges.sim_time_ns, 95.0);
}

#[test]
fn forked_results_are_joined() {
    let report = edges::rstb_run(&quiet()).unwrap();
    assert!(report.test("joins_forked_result").unwrap().passed());
}

#[test]
fn invalid_timer_unit_fails_test() {
    let report = edges::rstb_run(&quiet()).unwrap();
    assert_eq!(
        report.test("bad_timer_unit").unwrap().result,
        Err(RstbError::InvalidTimeUnit("fortnight".into()))
    );
    assert!(!report.passed());
}

#[test]
fn tests_run_in_registration_order() {
    let report = edges::rstb_run(&quiet()).unwrap();
    let names: Vec<_> = report.tests.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(
        names,
        vec!["forked_failure", "count_edges", "joins_forked_result", "bad_timer_unit"]
    );
}

#[test]
fn filtered_run_only_executes_selected_test() {
    let config = quiet().with_testcase(&["count_edges"]);
    let report = edges::rstb_run(&config).unwrap();
    assert_eq!(report.tests.len(), 1);
    assert!(report.passed());
    assert_eq!(report.sim_time_ns, 95.0);
}

#[test]
fn tests_after_read_only_finish_start_in_active_phase() {
    let report = phases::rstb_run(&quiet()).unwrap();
    assert!(report.passed(), "{:?}", report.tests);
    let rw = report.test("read_write_then_read_only").unwrap();
    assert_eq!(rw.result, Ok(Val::Int(1)));
    assert_eq!(rw.sim_time_ns, 3.0);
}

#[test]
fn write_during_read_only_is_rejected() {
    let report = phases::rstb_run(&quiet()).unwrap();
    let test = report.test("write_in_read_only_is_rejected").unwrap();
    assert_eq!(test.result, Ok(Val::None));
    assert_eq!(test.sim_time_ns, 5.0);
}

#[test]
fn pass_test_ends_test_with_message() {
    let report = phases::rstb_run(&quiet()).unwrap();
    assert_eq!(
        report.test("falling_edge_passes_early").unwrap().result,
        Ok(Val::String("falling at 2".into()))
    );
}

#[test]
fn edges_fire_before_read_write_and_read_only() {
    let report = phases::rstb_run(&quiet()).unwrap();
    assert_eq!(
        report.test("settle_order").unwrap().result,
        Ok(Val::String("edge,read_write,read_only".into()))
    );
}

#[test]
fn edge_helpers_resume_in_sync_phase() {
    let report = phases::rstb_run(&quiet()).unwrap();
    // the ReadWrite write is visible in ReadOnly, the next rising edge is read back as 1
    assert_eq!(
        report.test("edge_sync_helpers").unwrap().result,
        Ok(Val::String("01".into()))
    );
}

#[test]
fn zero_delay_loop_hits_delta_limit() {
    match runaway::rstb_run(&quiet()) {
        Err(RstbError::DeltaCycleLimit {
            time_fs,
            max_deltas,
        }) => {
            assert_eq!(time_fs, 0);
            assert_eq!(max_deltas, rv32i_tb::kernel::MAX_DELTAS);
        }
        other => panic!("unexpected {:?}", other),
    }
}
