//! Deploy ID allocation

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;

/// Allocates deploy IDs of the form `<app>-<env>-<millis>`.
///
/// The millisecond component is strictly increasing for the lifetime of the
/// generator, so two runs never share an ID even within the same millisecond.
#[derive(Debug, Default)]
pub struct DeployIdGenerator {
    last_millis: AtomicI64,
}

impl DeployIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self, app: &str, env: &str) -> String {
        format!("{}-{}-{}", app, env, self.next_millis())
    }

    fn next_millis(&self) -> i64 {
        let now = Utc::now().timestamp_millis();
        let mut last = self.last_millis.load(Ordering::SeqCst);
        loop {
            let candidate = now.max(last + 1);
            match self.last_millis.compare_exchange_weak(
                last,
                candidate,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return candidate,
                Err(actual) => last = actual,
            }
        }
    }
}
