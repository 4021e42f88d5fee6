pub mod reminder;

pub use reminder::{run_reminder_scan, start_reminder_scheduler};
