use std::collections::HashMap;

/// Name-to-platform-id index of the event metrics defined in one ESP
/// account. Built once per pass from the paginated metric listing and then
/// consulted for every template rendered in that pass.
///
/// Metric names are matched exactly apart from surrounding whitespace;
/// the ESP treats "Placed Order" and "placed order" as different metrics.
#[derive(Debug, Clone, Default)]
pub struct MetricLookup {
    by_name: HashMap<String, String>,
}

impl MetricLookup {
    pub fn from_pairs(pairs: impl IntoIterator<Item = (String, String)>) -> Self {
        let by_name = pairs
            .into_iter()
            .map(|(name, id)| (name.trim().to_string(), id))
            .collect();
        Self { by_name }
    }

    pub fn id_for(&self, name: &str) -> Option<&str> {
        self.by_name.get(name.trim()).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name.trim())
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}
