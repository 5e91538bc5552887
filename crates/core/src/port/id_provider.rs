/// Job id generation, abstracted so tests can use predictable ids.
pub trait IdProvider: Send + Sync {
    fn new_job_id(&self) -> String;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct UuidIdProvider;

impl IdProvider for UuidIdProvider {
    fn new_job_id(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

pub mod mocks {
    use std::sync::atomic::{AtomicU64, Ordering};

    use super::IdProvider;

    /// Hands out "job-1", "job-2", ... in call order.
    #[derive(Debug, Default)]
    pub struct SequenceIdProvider {
        counter: AtomicU64,
    }

    impl IdProvider for SequenceIdProvider {
        fn new_job_id(&self) -> String {
            let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
            format!("job-{n}")
        }
    }
}
