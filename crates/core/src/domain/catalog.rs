use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::job::JobParameters;
use crate::domain::metrics::MetricLookup;

pub type SegmentId = String;

/// Reference to an ESP event metric. Templates carry names; the rendered
/// definition carries the platform-assigned id for the target account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricRef {
    Name { name: String },
    Id { id: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparator {
    Gt,
    Gte,
    Lt,
    Lte,
    Eq,
}

/// How a metric condition aggregates matching events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Measurement {
    Count,
    Sum,
}

/// A numeric bound: either fixed, or a named threshold the caller may
/// override per job (falling back to the template's default).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Amount {
    Literal(f64),
    Threshold {
        threshold: String,
        #[serde(default)]
        default: f64,
    },
}

/// Boolean condition tree over profile behavior. `Metric` leaves reference
/// event metrics, `Property` leaves reference profile attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConditionTree {
    All {
        conditions: Vec<ConditionTree>,
    },
    Any {
        conditions: Vec<ConditionTree>,
    },
    Metric {
        metric: MetricRef,
        measurement: Measurement,
        comparator: Comparator,
        value: Amount,
        #[serde(skip_serializing_if = "Option::is_none")]
        window_days: Option<i64>,
    },
    Property {
        field: String,
        comparator: Comparator,
        value: serde_json::Value,
    },
}

/// What to do when a template's metric is not defined in the target account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Fallback {
    /// Record the segment as permanently failed and move on.
    Skip,
    /// Render this alternate condition instead. If the alternate also needs
    /// an absent metric the segment degrades to a skip.
    Substitute { condition: ConditionTree },
}

impl Default for Fallback {
    fn default() -> Self {
        Fallback::Skip
    }
}

/// One reusable segment definition. Everything account-specific (metric ids,
/// threshold values, currency) is substituted at render time, which keeps a
/// single catalog entry valid for every credential.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentTemplate {
    pub id: SegmentId,
    /// Display name with `{currency}` and `{threshold:key}` placeholders.
    pub name_template: String,
    pub condition: ConditionTree,
    #[serde(default)]
    pub fallback: Fallback,
}

impl SegmentTemplate {
    /// Metric names the primary condition depends on.
    pub fn required_metrics(&self) -> Vec<String> {
        let mut names = Vec::new();
        collect_metric_names(&self.condition, &mut names);
        names.dedup();
        names
    }
}

fn collect_metric_names(condition: &ConditionTree, out: &mut Vec<String>) {
    match condition {
        ConditionTree::All { conditions } | ConditionTree::Any { conditions } => {
            for child in conditions {
                collect_metric_names(child, out);
            }
        }
        ConditionTree::Metric { metric, .. } => {
            if let MetricRef::Name { name } = metric {
                if !out.contains(name) {
                    out.push(name.clone());
                }
            }
        }
        ConditionTree::Property { .. } => {}
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RenderError {
    #[error("metric '{0}' is not defined in the target account")]
    MetricUnavailable(String),

    #[error("name template references unresolvable placeholder '{0}'")]
    UnresolvedPlaceholder(String),
}

/// Fully rendered, account-specific segment ready to be sent to the ESP.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SegmentDefinition {
    pub segment_id: SegmentId,
    pub name: String,
    pub condition: ConditionTree,
}

/// Render a template for one account: substitute metric ids and threshold
/// values, then expand name placeholders. A `MetricUnavailable` error means
/// the template (and its fallback, if any) cannot be expressed in this
/// account and the segment should be recorded as failed.
pub fn render_template(
    template: &SegmentTemplate,
    metrics: &MetricLookup,
    params: &JobParameters,
) -> Result<SegmentDefinition, RenderError> {
    match render_with_condition(template, &template.condition, metrics, params) {
        Err(RenderError::MetricUnavailable(name)) => match &template.fallback {
            Fallback::Skip => Err(RenderError::MetricUnavailable(name)),
            Fallback::Substitute { condition } => {
                render_with_condition(template, condition, metrics, params)
            }
        },
        other => other,
    }
}

fn render_with_condition(
    template: &SegmentTemplate,
    condition: &ConditionTree,
    metrics: &MetricLookup,
    params: &JobParameters,
) -> Result<SegmentDefinition, RenderError> {
    let mut resolved_thresholds = BTreeMap::new();
    let condition = resolve_condition(condition, metrics, params, &mut resolved_thresholds)?;
    let name = render_name(&template.name_template, params, &resolved_thresholds)?;
    Ok(SegmentDefinition {
        segment_id: template.id.clone(),
        name,
        condition,
    })
}

fn resolve_condition(
    condition: &ConditionTree,
    metrics: &MetricLookup,
    params: &JobParameters,
    resolved_thresholds: &mut BTreeMap<String, f64>,
) -> Result<ConditionTree, RenderError> {
    match condition {
        ConditionTree::All { conditions } => Ok(ConditionTree::All {
            conditions: conditions
                .iter()
                .map(|c| resolve_condition(c, metrics, params, resolved_thresholds))
                .collect::<Result<_, _>>()?,
        }),
        ConditionTree::Any { conditions } => Ok(ConditionTree::Any {
            conditions: conditions
                .iter()
                .map(|c| resolve_condition(c, metrics, params, resolved_thresholds))
                .collect::<Result<_, _>>()?,
        }),
        ConditionTree::Metric {
            metric,
            measurement,
            comparator,
            value,
            window_days,
        } => {
            let metric_id = match metric {
                MetricRef::Name { name } => metrics
                    .id_for(name)
                    .ok_or_else(|| RenderError::MetricUnavailable(name.clone()))?
                    .to_string(),
                MetricRef::Id { id } => id.clone(),
            };
            let amount = match value {
                Amount::Literal(v) => *v,
                Amount::Threshold { threshold, default } => {
                    let v = params.threshold(threshold).unwrap_or(*default);
                    resolved_thresholds.insert(threshold.clone(), v);
                    v
                }
            };
            Ok(ConditionTree::Metric {
                metric: MetricRef::Id { id: metric_id },
                measurement: *measurement,
                comparator: *comparator,
                value: Amount::Literal(amount),
                window_days: *window_days,
            })
        }
        ConditionTree::Property { .. } => Ok(condition.clone()),
    }
}

fn render_name(
    name_template: &str,
    params: &JobParameters,
    resolved_thresholds: &BTreeMap<String, f64>,
) -> Result<String, RenderError> {
    let mut out = String::with_capacity(name_template.len());
    let mut rest = name_template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after_open = &rest[open + 1..];
        let Some(close) = after_open.find('}') else {
            // No closing brace, keep the tail verbatim.
            out.push_str(&rest[open..]);
            return Ok(out);
        };
        let token = &after_open[..close];
        if token == "currency" {
            out.push_str(&params.currency_symbol);
        } else if let Some(key) = token.strip_prefix("threshold:") {
            let value = params
                .threshold(key)
                .or_else(|| resolved_thresholds.get(key).copied())
                .ok_or_else(|| RenderError::UnresolvedPlaceholder(token.to_string()))?;
            out.push_str(&format_amount(value));
        } else {
            return Err(RenderError::UnresolvedPlaceholder(token.to_string()));
        }
        rest = &after_open[close + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

fn format_amount(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

/// Catalog of segment templates keyed by id. Pure data: operations are
/// lookups, never network or storage calls.
#[derive(Debug, Clone)]
pub struct SegmentCatalog {
    templates: BTreeMap<SegmentId, SegmentTemplate>,
}

impl SegmentCatalog {
    /// Later entries override earlier ones with the same id, so a site
    /// catalog file can replace individual builtin templates.
    pub fn from_templates(templates: Vec<SegmentTemplate>) -> Self {
        Self {
            templates: templates
                .into_iter()
                .map(|t| (t.id.clone(), t))
                .collect(),
        }
    }

    /// The catalog shipped with the engine.
    pub fn builtin() -> Self {
        Self::from_templates(builtin_templates())
    }

    /// Parse a JSON array of templates, e.g. a site-specific catalog file.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let templates: Vec<SegmentTemplate> = serde_json::from_str(json)?;
        Ok(Self::from_templates(templates))
    }

    /// Merge `extra` over this catalog, id collisions taking `extra`.
    pub fn extended_with(mut self, extra: SegmentCatalog) -> Self {
        self.templates.extend(extra.templates);
        self
    }

    pub fn template(&self, id: &str) -> Option<&SegmentTemplate> {
        self.templates.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.templates.contains_key(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.templates.keys().map(String::as_str)
    }

    pub fn templates(&self) -> impl Iterator<Item = &SegmentTemplate> {
        self.templates.values()
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

// Builtin template construction helpers. Metric names below are the
// conventional ESP event names; accounts missing one either fall back or
// record the segment as failed at render time.

fn by_name(name: &str) -> MetricRef {
    MetricRef::Name {
        name: name.to_string(),
    }
}

fn threshold(key: &str, default: f64) -> Amount {
    Amount::Threshold {
        threshold: key.to_string(),
        default,
    }
}

fn metric(
    name: &str,
    measurement: Measurement,
    comparator: Comparator,
    value: Amount,
    window_days: Option<i64>,
) -> ConditionTree {
    ConditionTree::Metric {
        metric: by_name(name),
        measurement,
        comparator,
        value,
        window_days,
    }
}

fn all(conditions: Vec<ConditionTree>) -> ConditionTree {
    ConditionTree::All { conditions }
}

fn template(
    id: &str,
    name_template: &str,
    condition: ConditionTree,
    fallback: Fallback,
) -> SegmentTemplate {
    SegmentTemplate {
        id: id.to_string(),
        name_template: name_template.to_string(),
        condition,
        fallback,
    }
}

fn builtin_templates() -> Vec<SegmentTemplate> {
    use Comparator::{Eq, Gte};
    use Measurement::{Count, Sum};

    vec![
        template(
            "engaged-30d",
            "Engaged (Last 30 Days)",
            metric(
                "Opened Email",
                Count,
                Gte,
                threshold("engaged_opens", 3.0),
                Some(30),
            ),
            Fallback::Substitute {
                condition: metric("Active on Site", Count, Gte, Amount::Literal(1.0), Some(30)),
            },
        ),
        template(
            "engaged-90d",
            "Engaged (Last 90 Days)",
            metric(
                "Opened Email",
                Count,
                Gte,
                threshold("engaged_opens", 3.0),
                Some(90),
            ),
            Fallback::Substitute {
                condition: metric("Active on Site", Count, Gte, Amount::Literal(1.0), Some(90)),
            },
        ),
        template(
            "recent-purchasers-30d",
            "Purchased (Last 30 Days)",
            metric("Placed Order", Count, Gte, Amount::Literal(1.0), Some(30)),
            Fallback::Skip,
        ),
        template(
            "repeat-buyers",
            "Repeat Buyers",
            metric(
                "Placed Order",
                Count,
                Gte,
                threshold("repeat_orders", 2.0),
                Some(365),
            ),
            Fallback::Skip,
        ),
        template(
            "first-time-buyers",
            "First-Time Buyers",
            metric("Placed Order", Count, Eq, Amount::Literal(1.0), None),
            Fallback::Skip,
        ),
        template(
            "high-value",
            "High-Value Customers ({currency}{threshold:high_value_spend}+)",
            metric(
                "Placed Order",
                Sum,
                Gte,
                threshold("high_value_spend", 500.0),
                Some(365),
            ),
            Fallback::Skip,
        ),
        template(
            "vip-spenders",
            "VIP Spenders ({currency}{threshold:vip_spend}+)",
            all(vec![
                metric(
                    "Placed Order",
                    Sum,
                    Gte,
                    threshold("vip_spend", 1000.0),
                    Some(365),
                ),
                metric("Placed Order", Count, Gte, Amount::Literal(3.0), Some(365)),
            ]),
            Fallback::Skip,
        ),
        template(
            "lapsed-120d",
            "Lapsed Customers (120+ Days)",
            all(vec![
                metric("Placed Order", Count, Eq, Amount::Literal(0.0), Some(120)),
                metric("Placed Order", Count, Gte, Amount::Literal(1.0), None),
            ]),
            Fallback::Skip,
        ),
        template(
            "cart-abandoners-7d",
            "Cart Abandoners (Last 7 Days)",
            all(vec![
                metric("Started Checkout", Count, Gte, Amount::Literal(1.0), Some(7)),
                metric("Placed Order", Count, Eq, Amount::Literal(0.0), Some(7)),
            ]),
            Fallback::Substitute {
                condition: all(vec![
                    metric("Active on Site", Count, Gte, Amount::Literal(1.0), Some(7)),
                    metric("Placed Order", Count, Eq, Amount::Literal(0.0), Some(7)),
                ]),
            },
        ),
        template(
            "never-purchased",
            "Never Purchased",
            metric("Placed Order", Count, Eq, Amount::Literal(0.0), None),
            Fallback::Skip,
        ),
        template(
            "sms-consented",
            "SMS Subscribers",
            ConditionTree::Property {
                field: "sms_consent".to_string(),
                comparator: Comparator::Eq,
                value: serde_json::Value::Bool(true),
            },
            Fallback::Skip,
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_metrics() -> MetricLookup {
        MetricLookup::from_pairs(vec![
            ("Placed Order".to_string(), "MET-order".to_string()),
            ("Opened Email".to_string(), "MET-open".to_string()),
            ("Active on Site".to_string(), "MET-site".to_string()),
            ("Started Checkout".to_string(), "MET-checkout".to_string()),
        ])
    }

    fn metric_id_of(condition: &ConditionTree) -> Option<&str> {
        match condition {
            ConditionTree::Metric {
                metric: MetricRef::Id { id },
                ..
            } => Some(id),
            _ => None,
        }
    }

    #[test]
    fn test_render_substitutes_metric_ids_and_thresholds() {
        let catalog = SegmentCatalog::builtin();
        let tpl = catalog.template("high-value").unwrap();
        let mut params = JobParameters::default();
        params
            .thresholds
            .insert("high_value_spend".to_string(), 750.0);

        let def = render_template(tpl, &sample_metrics(), &params).unwrap();

        assert_eq!(def.segment_id, "high-value");
        assert_eq!(def.name, "High-Value Customers ($750+)");
        assert_eq!(metric_id_of(&def.condition), Some("MET-order"));
        match &def.condition {
            ConditionTree::Metric { value, .. } => {
                assert_eq!(value, &Amount::Literal(750.0));
            }
            other => panic!("unexpected condition: {other:?}"),
        }
    }

    #[test]
    fn test_render_uses_template_default_when_no_override() {
        let catalog = SegmentCatalog::builtin();
        let tpl = catalog.template("high-value").unwrap();

        let def = render_template(tpl, &sample_metrics(), &JobParameters::default()).unwrap();
        assert_eq!(def.name, "High-Value Customers ($500+)");
    }

    #[test]
    fn test_render_currency_placeholder() {
        let catalog = SegmentCatalog::builtin();
        let tpl = catalog.template("vip-spenders").unwrap();
        let params = JobParameters {
            currency_symbol: "€".to_string(),
            thresholds: BTreeMap::new(),
        };

        let def = render_template(tpl, &sample_metrics(), &params).unwrap();
        assert_eq!(def.name, "VIP Spenders (€1000+)");
    }

    #[test]
    fn test_missing_metric_with_skip_fallback() {
        let metrics = MetricLookup::from_pairs(vec![(
            "Opened Email".to_string(),
            "MET-open".to_string(),
        )]);
        let catalog = SegmentCatalog::builtin();
        let tpl = catalog.template("repeat-buyers").unwrap();

        let err = render_template(tpl, &metrics, &JobParameters::default()).unwrap_err();
        assert_eq!(err, RenderError::MetricUnavailable("Placed Order".to_string()));
    }

    #[test]
    fn test_missing_metric_uses_substitute_condition() {
        // No "Opened Email" metric, so engaged-30d falls back to site activity.
        let metrics = MetricLookup::from_pairs(vec![
            ("Active on Site".to_string(), "MET-site".to_string()),
        ]);
        let catalog = SegmentCatalog::builtin();
        let tpl = catalog.template("engaged-30d").unwrap();

        let def = render_template(tpl, &metrics, &JobParameters::default()).unwrap();
        assert_eq!(metric_id_of(&def.condition), Some("MET-site"));
        assert_eq!(def.name, "Engaged (Last 30 Days)");
    }

    #[test]
    fn test_substitute_missing_too_degrades_to_skip() {
        let metrics = MetricLookup::from_pairs(vec![(
            "Placed Order".to_string(),
            "MET-order".to_string(),
        )]);
        let catalog = SegmentCatalog::builtin();
        let tpl = catalog.template("engaged-30d").unwrap();

        let err = render_template(tpl, &metrics, &JobParameters::default()).unwrap_err();
        assert_eq!(
            err,
            RenderError::MetricUnavailable("Active on Site".to_string())
        );
    }

    #[test]
    fn test_unknown_placeholder_is_an_error() {
        let tpl = template(
            "broken",
            "Broken {threshold:nonexistent}",
            metric("Placed Order", Measurement::Count, Comparator::Gte, Amount::Literal(1.0), None),
            Fallback::Skip,
        );

        let err = render_template(&tpl, &sample_metrics(), &JobParameters::default()).unwrap_err();
        assert_eq!(
            err,
            RenderError::UnresolvedPlaceholder("threshold:nonexistent".to_string())
        );
    }

    #[test]
    fn test_required_metrics_collects_tree_names() {
        let catalog = SegmentCatalog::builtin();
        let tpl = catalog.template("cart-abandoners-7d").unwrap();
        assert_eq!(
            tpl.required_metrics(),
            vec!["Started Checkout".to_string(), "Placed Order".to_string()]
        );

        let property_only = catalog.template("sms-consented").unwrap();
        assert!(property_only.required_metrics().is_empty());
    }

    #[test]
    fn test_catalog_override_takes_later_entry() {
        let custom = template(
            "engaged-30d",
            "Engaged Differently",
            metric("Active on Site", Measurement::Count, Comparator::Gte, Amount::Literal(2.0), Some(30)),
            Fallback::Skip,
        );
        let catalog =
            SegmentCatalog::builtin().extended_with(SegmentCatalog::from_templates(vec![custom]));

        let tpl = catalog.template("engaged-30d").unwrap();
        assert_eq!(tpl.name_template, "Engaged Differently");
    }

    #[test]
    fn test_catalog_parses_json_templates() {
        let json = r#"[
            {
                "id": "big-carts",
                "name_template": "Big Carts ({currency}{threshold:cart_value}+)",
                "condition": {
                    "type": "metric",
                    "metric": { "name": "Started Checkout" },
                    "measurement": "sum",
                    "comparator": "gte",
                    "value": { "threshold": "cart_value", "default": 200 },
                    "window_days": 14
                }
            }
        ]"#;

        let catalog = SegmentCatalog::from_json(json).unwrap();
        let tpl = catalog.template("big-carts").unwrap();
        assert_eq!(tpl.fallback, Fallback::Skip);

        let def = render_template(tpl, &sample_metrics(), &JobParameters::default()).unwrap();
        assert_eq!(def.name, "Big Carts ($200+)");
        assert_eq!(metric_id_of(&def.condition), Some("MET-checkout"));
    }

    #[test]
    fn test_builtin_catalog_renders_fully_against_complete_account() {
        let catalog = SegmentCatalog::builtin();
        let metrics = sample_metrics();
        for tpl in catalog.templates() {
            let rendered = render_template(tpl, &metrics, &JobParameters::default());
            assert!(rendered.is_ok(), "template {} failed: {rendered:?}", tpl.id);
        }
    }

    #[test]
    fn test_rendered_condition_serializes_with_ids() {
        let catalog = SegmentCatalog::builtin();
        let tpl = catalog.template("recent-purchasers-30d").unwrap();
        let def = render_template(tpl, &sample_metrics(), &JobParameters::default()).unwrap();

        let json = serde_json::to_value(&def.condition).unwrap();
        assert_eq!(json["type"], "metric");
        assert_eq!(json["metric"]["id"], "MET-order");
        assert_eq!(json["value"], 1.0);
        assert_eq!(json["window_days"], 30);
    }
}
