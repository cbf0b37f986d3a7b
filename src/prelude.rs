pub use crate::executor::{JoinHandle, Task};
pub use crate::trigger::{EdgeKind, Trigger};
pub use crate::signal::SimObject;
pub use crate::sim_if::SIM_IF;
pub use futures::future::FutureExt;
pub use crate::{RstbError, RstbResult, SimpleResult, TbConfig, Val};
pub use crate::{pass_test, fail_test, run_simulation, run_with_sim};
pub use crate::kernel::Design;
pub use crate::logger::SimLogger;
