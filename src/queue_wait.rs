//! Queue wait side channel
//!
//! When a request is admitted, the throttle stores how long it waited for an
//! in-flight slot in the request extensions. Downstream logging can read it
//! back without depending on the throttle itself.

use std::time::Duration;

use axum::http::Extensions;

/// Time a request spent between arriving at the throttle and being granted a slot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct QueueWait(Duration);

impl QueueWait {
    pub fn new(wait: Duration) -> Self {
        Self(wait)
    }

    pub fn duration(&self) -> Duration {
        self.0
    }

    /// Queue wait recorded on a request, zero if the request never passed the throttle
    pub fn from_extensions(extensions: &Extensions) -> Duration {
        extensions
            .get::<QueueWait>()
            .map(QueueWait::duration)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_is_zero() {
        let extensions = Extensions::new();
        assert_eq!(QueueWait::from_extensions(&extensions), Duration::ZERO);
    }

    #[test]
    fn test_recorded_value() {
        let mut extensions = Extensions::new();
        extensions.insert(QueueWait::new(Duration::from_millis(42)));
        assert_eq!(
            QueueWait::from_extensions(&extensions),
            Duration::from_millis(42)
        );
    }
}
