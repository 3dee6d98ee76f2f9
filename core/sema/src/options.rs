use serde::Deserialize;

use crate::cast::Weight;

/// Tunables of one analysis run. Every field has a default, so partial
/// documents deserialize.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnalyzerOptions {
    /// Conversion budget of each expression statement, return value, call
    /// argument list and condition.
    pub max_expression_weight: Weight,
    /// Budget of variable initializers. `None` leaves them unlimited.
    pub initializer_weight_limit: Option<Weight>,
}

impl Default for AnalyzerOptions {
    fn default() -> Self {
        Self {
            max_expression_weight: 1000,
            initializer_weight_limit: None,
        }
    }
}
