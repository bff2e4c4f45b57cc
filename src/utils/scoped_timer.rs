use tokio::time::Instant;
use tracing::debug;

/// Logs how long the enclosing scope took once it is dropped.
///
/// ```ignore
/// let _timer = ScopedTimer::new("etcd::put");
/// ```
pub struct ScopedTimer {
    start: Instant,
    name: &'static str,
}

impl ScopedTimer {
    pub fn new(name: &'static str) -> Self {
        Self {
            start: Instant::now(),
            name,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn elapsed_ms(&self) -> u128 {
        self.start.elapsed().as_millis()
    }
}

impl Drop for ScopedTimer {
    fn drop(&mut self) {
        debug!(name = self.name, elapsed_ms = self.elapsed_ms() as u64, "scope finished");
    }
}
