//! Persistence-provider capabilities the generator depends on.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::QueryError;

/// What the query generator needs to know about the persistence provider that
/// will parse the rendered query.
pub trait JpaProvider: Send + Sync {
    /// Opening of a registered custom function call, up to and including the
    /// token after which the arguments follow.
    fn custom_function_invocation(&self, function_name: &str, argument_count: usize) -> String;

    /// Whether `FUNCTION('name', ...)` is understood.
    fn supports_dynamic_function(&self) -> bool;

    /// Function that unwraps the value of an indexed/keyed collection element.
    fn collection_value_function(&self) -> Option<&str>;

    /// Whether multi-valued list parameters must be parenthesised.
    fn needs_brackets_for_list_parameter(&self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Hibernate,
    EclipseLink,
    DataNucleus,
    Standard,
}

impl FromStr for ProviderKind {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hibernate" => Ok(ProviderKind::Hibernate),
            "eclipselink" => Ok(ProviderKind::EclipseLink),
            "datanucleus" => Ok(ProviderKind::DataNucleus),
            "standard" => Ok(ProviderKind::Standard),
            other => Err(QueryError::Configuration(format!(
                "unknown persistence provider `{other}`"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CustomFunctionStyle {
    /// `name(arg,...)`
    Direct,
    /// `OPERATOR('name',arg,...)`
    Operator,
}

/// Data-driven [`JpaProvider`] built from a preset and optional overrides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderProfile {
    pub kind: ProviderKind,
    pub custom_function_style: CustomFunctionStyle,
    pub supports_dynamic_function: bool,
    pub collection_value_function: Option<String>,
    pub list_parameter_brackets: bool,
}

impl ProviderProfile {
    pub fn preset(kind: ProviderKind) -> Self {
        match kind {
            ProviderKind::Hibernate => Self {
                kind,
                custom_function_style: CustomFunctionStyle::Direct,
                supports_dynamic_function: true,
                collection_value_function: None,
                list_parameter_brackets: true,
            },
            ProviderKind::EclipseLink => Self {
                kind,
                custom_function_style: CustomFunctionStyle::Operator,
                supports_dynamic_function: true,
                collection_value_function: Some("VALUE".to_string()),
                list_parameter_brackets: false,
            },
            ProviderKind::DataNucleus | ProviderKind::Standard => Self {
                kind,
                custom_function_style: CustomFunctionStyle::Direct,
                supports_dynamic_function: true,
                collection_value_function: Some("VALUE".to_string()),
                list_parameter_brackets: false,
            },
        }
    }

    pub fn hibernate() -> Self {
        Self::preset(ProviderKind::Hibernate)
    }

    pub fn standard() -> Self {
        Self::preset(ProviderKind::Standard)
    }

    pub fn with_dynamic_function(mut self, supported: bool) -> Self {
        self.supports_dynamic_function = supported;
        self
    }

    pub fn with_collection_value_function(mut self, function: Option<&str>) -> Self {
        self.collection_value_function = function.map(str::to_string);
        self
    }

    pub fn with_list_parameter_brackets(mut self, brackets: bool) -> Self {
        self.list_parameter_brackets = brackets;
        self
    }
}

impl JpaProvider for ProviderProfile {
    fn custom_function_invocation(&self, function_name: &str, argument_count: usize) -> String {
        match self.custom_function_style {
            CustomFunctionStyle::Direct => format!("{function_name}("),
            CustomFunctionStyle::Operator => {
                // the first argument is the name literal itself
                if argument_count > 1 {
                    format!("OPERATOR('{function_name}',")
                } else {
                    format!("OPERATOR('{function_name}'")
                }
            }
        }
    }

    fn supports_dynamic_function(&self) -> bool {
        self.supports_dynamic_function
    }

    fn collection_value_function(&self) -> Option<&str> {
        self.collection_value_function.as_deref()
    }

    fn needs_brackets_for_list_parameter(&self) -> bool {
        self.list_parameter_brackets
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets() {
        let h = ProviderProfile::hibernate();
        assert!(h.needs_brackets_for_list_parameter());
        assert_eq!(h.collection_value_function(), None);
        assert_eq!(h.custom_function_invocation("my_fn", 3), "my_fn(");

        let e = ProviderProfile::preset(ProviderKind::EclipseLink);
        assert_eq!(e.collection_value_function(), Some("VALUE"));
        assert_eq!(e.custom_function_invocation("my_fn", 2), "OPERATOR('my_fn',");
        assert_eq!(e.custom_function_invocation("my_fn", 1), "OPERATOR('my_fn'");
    }

    #[test]
    fn parses_kinds() {
        assert_eq!("Hibernate".parse::<ProviderKind>().unwrap(), ProviderKind::Hibernate);
        assert!("toplink".parse::<ProviderKind>().is_err());
    }
}
