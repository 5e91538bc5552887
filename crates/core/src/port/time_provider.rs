/// Clock abstraction so scheduling logic can be tested with a frozen or
/// hand-advanced clock.
pub trait TimeProvider: Send + Sync {
    /// Current time as epoch milliseconds (UTC).
    fn now_millis(&self) -> i64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeProvider;

impl TimeProvider for SystemTimeProvider {
    fn now_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

pub mod mocks {
    use std::sync::atomic::{AtomicI64, Ordering};

    use super::TimeProvider;

    /// Clock that only moves when the test says so.
    #[derive(Debug, Default)]
    pub struct FixedTimeProvider {
        now_millis: AtomicI64,
    }

    impl FixedTimeProvider {
        pub fn at(now_millis: i64) -> Self {
            Self {
                now_millis: AtomicI64::new(now_millis),
            }
        }

        pub fn set(&self, now_millis: i64) {
            self.now_millis.store(now_millis, Ordering::SeqCst);
        }

        pub fn advance(&self, delta_millis: i64) {
            self.now_millis.fetch_add(delta_millis, Ordering::SeqCst);
        }
    }

    impl TimeProvider for FixedTimeProvider {
        fn now_millis(&self) -> i64 {
            self.now_millis.load(Ordering::SeqCst)
        }
    }
}
