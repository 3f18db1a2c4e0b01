use anyhow::{Context, Result};
use std::collections::HashMap;

/// Display name used for codes missing from the table.
pub const UNKNOWN_OPERATOR: &str = "Unknown";

/// Maps operator codes to display names.
///
/// Stored as a plain JSON object on disk, keyed by the code as a string:
/// ```json
/// {
///   "12": "Helsingin Bussiliikenne Oy",
///   "22": "Nobina Finland Oy"
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct OperatorTable {
    entries: HashMap<i64, String>,
}

impl OperatorTable {
    /// Loads the table from a JSON file at `path`.
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read operator table '{path}'"))?;
        Self::from_json(&content).with_context(|| format!("invalid operator table '{path}'"))
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let raw: HashMap<String, String> = serde_json::from_str(content)?;
        let entries = raw
            .into_iter()
            .map(|(code, name)| {
                let code = code
                    .trim()
                    .parse::<i64>()
                    .with_context(|| format!("operator code '{code}' is not numeric"))?;
                Ok((code, name))
            })
            .collect::<Result<_>>()?;
        Ok(Self { entries })
    }

    pub fn from_entries(entries: impl IntoIterator<Item = (i64, String)>) -> Self {
        Self {
            entries: entries.into_iter().collect(),
        }
    }

    /// Returns the display name for `code`, or [`UNKNOWN_OPERATOR`].
    pub fn name(&self, code: i64) -> &str {
        self.entries
            .get(&code)
            .map(String::as_str)
            .unwrap_or(UNKNOWN_OPERATOR)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
