//! Access-control rule shapes carried on ACP resources' `pv`/`pvs`
//! attributes (spec §3, §4.3).

use cse_model::{Operation, Permission};
use serde::{Deserialize, Serialize};

/// One rule within a privilege set: a list of originators (or the `"all"`
/// wildcard) paired with a permission bitmask.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessControlRule {
    /// Originators this rule grants permissions to (`acor`).
    pub acor: Vec<String>,
    /// Permission bitmask this rule grants (`acop`).
    pub acop: Permission,
}

impl AccessControlRule {
    /// Whether this rule matches `(originator, operation)` (spec §4.3 step
    /// 4: "a rule matches when (originator ∈ rule.originators OR
    /// rule.originators contains `"all"`) AND (operation ∈
    /// rule.permissions)").
    pub fn matches(&self, originator: &str, operation: Operation) -> bool {
        let originator_matches =
            self.acor.iter().any(|o| o == originator || o == "all");
        originator_matches && (self.acop & operation.bit()) != 0
    }
}

/// A privilege set (`pv` or `pvs`): an OR of rules.
pub type PrivilegeSet = Vec<AccessControlRule>;

/// Whether any rule in `rules` grants `(originator, operation)`.
pub fn grants(rules: &PrivilegeSet, originator: &str, operation: Operation) -> bool {
    rules.iter().any(|rule| rule.matches(originator, operation))
}

/// Parse a privilege set out of a resource's raw `pv`/`pvs` attribute
/// value. Absent or malformed data is treated as an empty set rather than
/// an error — an ACP with no parseable rules simply grants nothing.
pub fn parse_privilege_set(value: Option<&serde_json::Value>) -> PrivilegeSet {
    value
        .and_then(|v| serde_json::from_value(v.clone()).ok())
        .unwrap_or_default()
}
