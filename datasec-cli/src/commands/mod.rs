mod backup;
mod cron;
mod serve;
mod settings;

// Backup commands
pub use backup::{list_jobs, run_backup, show_job};

// Settings commands
pub use settings::{set_settings, show_settings};

// Scheduler
pub use serve::run_serve;

// Cron helper
pub use cron::run_cron;
