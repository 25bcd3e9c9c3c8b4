/*!
# Docker Aquarium DevKit - stubs and helpers for engine tests

Library for exercising the monitoring engine without a container runtime:
- Scriptable metrics source (lists, delays, failures per container)
- Event recorder subscriber for assertions
- Fixture builders for records and metrics snapshots
- Test harness wiring all of the above to a `MonitoringEngine`
*/

pub mod fixtures;
pub mod source_stub;
pub mod test_utils;

pub use fixtures::{metrics, record};
pub use source_stub::{ListStep, MetricsStep, ScriptedSource};
pub use test_utils::{EventRecorder, TestHarness};
