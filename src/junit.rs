use junit_report::{Duration, ReportBuilder, TestCaseBuilder, TestSuiteBuilder};
use std::path::Path;

use crate::error::RstbError;
use crate::test::RstbTests;
use crate::SimpleResult;

pub(crate) fn create_junit_xml(suite: &str, tests: &RstbTests, path: &Path) -> SimpleResult<()> {
    let mut test_cases = Vec::new();

    for t in tests.iter().map(|obj| obj.get()) {
        let time = Duration::seconds_f64(t.time_secs);
        let tc = match t.result.as_ref() {
            Some(Ok(_)) => TestCaseBuilder::success(&t.name, time),
            Some(Err(e)) => TestCaseBuilder::failure(&t.name, time, "failure", &e.to_string()),
            None => TestCaseBuilder::failure(&t.name, time, "failure", "test did not run"),
        }
        .build();
        test_cases.push(tc);
    }

    let test_suite = TestSuiteBuilder::new(suite)
        .add_testcases(test_cases)
        .build();
    let report = ReportBuilder::new().add_testsuite(test_suite).build();
    let file = std::fs::File::create(path)?;
    report
        .write_xml(file)
        .map_err(|e| RstbError::Report(e.to_string()))
}
