mod crash_report;

pub use crash_report::{CrashReport, Injuries};
#[cfg(test)]
pub(crate) use crash_report::sample_report;
