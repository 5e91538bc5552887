// ESP Wire Format and Response Classification

use segmill_core::domain::{ConditionTree, SegmentDefinition};
use segmill_core::port::{CreateOutcome, EspError, MetricEntry, MetricPage, ThrottleSignal};
use serde::{Deserialize, Serialize};

const MAX_SNIPPET_CHARS: usize = 200;

/// Body of the create-segment POST.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CreateSegmentRequest<'a> {
    pub name: &'a str,
    pub condition_tree: &'a ConditionTree,
}

impl<'a> CreateSegmentRequest<'a> {
    pub fn from_definition(definition: &'a SegmentDefinition) -> Self {
        Self {
            name: &definition.name,
            condition_tree: &definition.condition,
        }
    }
}

#[derive(Debug, Deserialize)]
struct CreateSegmentResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct MetricsResponse {
    pub metrics: Vec<WireMetric>,
    #[serde(default)]
    pub next_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireMetric {
    pub id: String,
    pub name: String,
}

impl From<MetricsResponse> for MetricPage {
    fn from(response: MetricsResponse) -> Self {
        MetricPage {
            metrics: response
                .metrics
                .into_iter()
                .map(|metric| MetricEntry {
                    id: metric.id,
                    name: metric.name,
                })
                .collect(),
            next_cursor: response.next_cursor,
        }
    }
}

/// Map one raw create-segment response onto the outcome taxonomy. Response
/// shapes the mapping does not recognize become a hard failure for this
/// segment, never a crash.
pub(crate) fn classify_create_response(
    status: u16,
    retry_after_secs: Option<u64>,
    body: &str,
) -> Result<CreateOutcome, EspError> {
    match status {
        200..=299 => match serde_json::from_str::<CreateSegmentResponse>(body) {
            Ok(parsed) => Ok(CreateOutcome::Created {
                esp_segment_id: parsed.id,
            }),
            Err(_) => Ok(CreateOutcome::HardFailure {
                reason: format!("HTTP {status} response carried no segment id"),
            }),
        },
        409 => Ok(CreateOutcome::AlreadyExists),
        429 => Ok(CreateOutcome::RateLimited(ThrottleSignal {
            retry_after_secs,
            detail: error_detail(body),
        })),
        401 | 403 => Err(EspError::InvalidCredential(format!(
            "HTTP {status}: {}",
            error_detail(body).unwrap_or_else(|| "no detail".to_string())
        ))),
        400..=499 => {
            let detail = error_detail(body).unwrap_or_else(|| format!("HTTP {status}"));
            // Some accounts report a name collision as a 400 with a message
            // instead of a 409.
            if is_duplicate_message(&detail) {
                Ok(CreateOutcome::AlreadyExists)
            } else {
                Ok(CreateOutcome::HardFailure {
                    reason: format!("HTTP {status}: {detail}"),
                })
            }
        }
        _ => Ok(CreateOutcome::HardFailure {
            reason: format!("unrecognized ESP response: HTTP {status}"),
        }),
    }
}

fn is_duplicate_message(detail: &str) -> bool {
    let lower = detail.to_lowercase();
    lower.contains("already exists") || lower.contains("duplicate")
}

/// Pull a human-readable message out of an error body, whatever its exact
/// shape. Falls back to a trimmed snippet of the raw body.
pub(crate) fn error_detail(body: &str) -> Option<String> {
    #[derive(Deserialize)]
    struct ErrorBody {
        message: Option<String>,
        detail: Option<String>,
    }

    if let Ok(parsed) = serde_json::from_str::<ErrorBody>(body) {
        if let Some(message) = parsed.message.or(parsed.detail) {
            return Some(message);
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(snippet(trimmed))
    }
}

pub(crate) fn snippet(body: &str) -> String {
    let trimmed = body.trim();
    match trimmed.char_indices().nth(MAX_SNIPPET_CHARS) {
        Some((cut, _)) => format!("{}...", &trimmed[..cut]),
        None => trimmed.to_string(),
    }
}
