//! Hardware initialisation and task-level helpers.

pub mod hw_init;
pub mod task_pin;
pub mod watchdog;
