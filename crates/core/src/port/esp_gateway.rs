use async_trait::async_trait;
use thiserror::Error;

use crate::domain::SegmentDefinition;

/// Rate-limit details extracted from a throttled ESP response.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ThrottleSignal {
    /// Seconds the ESP asked us to wait, when it said.
    pub retry_after_secs: Option<u64>,
    /// Raw limit description from the response body, e.g. "burst exceeded"
    /// or "daily segment creation quota reached".
    pub detail: Option<String>,
}

/// Classified result of one segment-creation call. Transport and credential
/// problems are errors instead; everything here is a definitive answer from
/// the ESP.
#[derive(Debug, Clone, PartialEq)]
pub enum CreateOutcome {
    Created { esp_segment_id: String },
    /// A segment with this definition or name already exists in the account.
    AlreadyExists,
    RateLimited(ThrottleSignal),
    /// The ESP rejected the definition itself. Retrying the same call
    /// cannot succeed.
    HardFailure { reason: String },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EspError {
    #[error("ESP transport error: {0}")]
    Transport(String),

    #[error("ESP rejected credential: {0}")]
    InvalidCredential(String),

    #[error("Unexpected ESP response: {0}")]
    UnexpectedResponse(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetricEntry {
    pub id: String,
    pub name: String,
}

/// One page of the account's metric inventory.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MetricPage {
    pub metrics: Vec<MetricEntry>,
    pub next_cursor: Option<String>,
}

/// Outbound interface to the email service provider.
#[async_trait]
pub trait EspGateway: Send + Sync {
    /// Attempt to create one segment in the account behind `credential_ref`.
    async fn create_segment(
        &self,
        credential_ref: &str,
        definition: &SegmentDefinition,
    ) -> Result<CreateOutcome, EspError>;

    /// Fetch one page of the account's event metrics.
    async fn list_metrics(
        &self,
        credential_ref: &str,
        cursor: Option<&str>,
    ) -> Result<MetricPage, EspError>;
}

pub mod mocks {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::{CreateOutcome, EspError, EspGateway, MetricEntry, MetricPage};
    use crate::domain::SegmentDefinition;

    /// Scripted gateway for tests. Queued create outcomes are consumed in
    /// call order; once the queue runs dry every call succeeds with a
    /// generated segment id. Metric pages are addressed by stringified
    /// index cursors.
    pub struct ScriptedEspGateway {
        metric_pages: Vec<MetricPage>,
        list_errors: Mutex<VecDeque<EspError>>,
        create_script: Mutex<VecDeque<Result<CreateOutcome, EspError>>>,
        create_calls: Mutex<Vec<String>>,
    }

    impl ScriptedEspGateway {
        pub fn new() -> Self {
            Self {
                metric_pages: Vec::new(),
                list_errors: Mutex::new(VecDeque::new()),
                create_script: Mutex::new(VecDeque::new()),
                create_calls: Mutex::new(Vec::new()),
            }
        }

        /// Single-page metric inventory from (name, id) pairs.
        pub fn with_metrics(pairs: Vec<(&str, &str)>) -> Self {
            Self::with_metric_pages(vec![pairs])
        }

        /// Multi-page inventory; cursors are generated automatically.
        pub fn with_metric_pages(pages: Vec<Vec<(&str, &str)>>) -> Self {
            let total = pages.len();
            let metric_pages = pages
                .into_iter()
                .enumerate()
                .map(|(index, pairs)| MetricPage {
                    metrics: pairs
                        .into_iter()
                        .map(|(name, id)| MetricEntry {
                            id: id.to_string(),
                            name: name.to_string(),
                        })
                        .collect(),
                    next_cursor: if index + 1 < total {
                        Some((index + 1).to_string())
                    } else {
                        None
                    },
                })
                .collect();
            Self {
                metric_pages,
                ..Self::new()
            }
        }

        pub fn push_create(&self, outcome: CreateOutcome) {
            self.create_script.lock().unwrap().push_back(Ok(outcome));
        }

        pub fn push_create_error(&self, error: EspError) {
            self.create_script.lock().unwrap().push_back(Err(error));
        }

        pub fn push_list_error(&self, error: EspError) {
            self.list_errors.lock().unwrap().push_back(error);
        }

        /// Segment ids passed to `create_segment`, in call order.
        pub fn create_calls(&self) -> Vec<String> {
            self.create_calls.lock().unwrap().clone()
        }
    }

    impl Default for ScriptedEspGateway {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl EspGateway for ScriptedEspGateway {
        async fn create_segment(
            &self,
            _credential_ref: &str,
            definition: &SegmentDefinition,
        ) -> Result<CreateOutcome, EspError> {
            let call_number = {
                let mut calls = self.create_calls.lock().unwrap();
                calls.push(definition.segment_id.clone());
                calls.len()
            };
            if let Some(scripted) = self.create_script.lock().unwrap().pop_front() {
                return scripted;
            }
            Ok(CreateOutcome::Created {
                esp_segment_id: format!("esp-{call_number}"),
            })
        }

        async fn list_metrics(
            &self,
            _credential_ref: &str,
            cursor: Option<&str>,
        ) -> Result<MetricPage, EspError> {
            if let Some(error) = self.list_errors.lock().unwrap().pop_front() {
                return Err(error);
            }
            let index: usize = match cursor {
                None => 0,
                Some(raw) => raw
                    .parse()
                    .map_err(|_| EspError::UnexpectedResponse(format!("bad cursor '{raw}'")))?,
            };
            Ok(self.metric_pages.get(index).cloned().unwrap_or_default())
        }
    }
}
