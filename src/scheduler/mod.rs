//! Cron-driven unattended cycles.

pub mod cron;
pub mod engine;

pub use self::cron::CycleSchedule;
pub use self::engine::run_scheduler_loop;
