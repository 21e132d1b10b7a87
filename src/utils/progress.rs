use log::info;

/// Receives coarse progress milestones (0.0 to 1.0) of a tool run.
pub trait Progress: Send + Sync {
    fn report(&self, fraction: f32);
}

/// Writes milestones to the log.
#[derive(Debug, Default, Clone)]
pub struct LogProgress {
    pub label: String,
}

impl LogProgress {
    pub fn new(label: &str) -> Self {
        Self { label: label.to_string() }
    }
}

impl Progress for LogProgress {
    fn report(&self, fraction: f32) {
        info!("{} progress: {:.0}%", self.label, fraction.clamp(0.0, 1.0) * 100.0);
    }
}
