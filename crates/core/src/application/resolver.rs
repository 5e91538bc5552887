use std::sync::Arc;

use tracing::debug;

use crate::domain::MetricLookup;
use crate::port::{EspError, EspGateway};

/// Upper bound on metric pages fetched per pass. A cursor loop past this is
/// a broken ESP response, not a big account.
const MAX_METRIC_PAGES: usize = 50;

/// Builds the name-to-id metric index for one account by walking the ESP's
/// paginated metric listing.
pub struct MetricResolver {
    gateway: Arc<dyn EspGateway>,
}

impl MetricResolver {
    pub fn new(gateway: Arc<dyn EspGateway>) -> Self {
        Self { gateway }
    }

    pub async fn resolve(&self, credential_ref: &str) -> Result<MetricLookup, EspError> {
        let mut pairs: Vec<(String, String)> = Vec::new();
        let mut cursor: Option<String> = None;
        for page_number in 1..=MAX_METRIC_PAGES {
            let page = self
                .gateway
                .list_metrics(credential_ref, cursor.as_deref())
                .await?;
            pairs.extend(page.metrics.into_iter().map(|m| (m.name, m.id)));
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => {
                    let lookup = MetricLookup::from_pairs(pairs);
                    debug!(
                        credential_ref = %credential_ref,
                        pages = page_number,
                        metrics = lookup.len(),
                        "Metric inventory resolved"
                    );
                    return Ok(lookup);
                }
            }
        }
        Err(EspError::UnexpectedResponse(format!(
            "metric listing did not terminate within {MAX_METRIC_PAGES} pages"
        )))
    }
}
