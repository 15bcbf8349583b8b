use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One declarative rule copying (and optionally transforming) a native field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMapping {
    /// Dotted path into the native record, e.g. `email_addresses.0.value`.
    pub source_field: String,
    /// Canonical field name, or `custom_fields.<key>`.
    pub target_field: String,
    #[serde(default)]
    pub transform: Transform,
}

impl FieldMapping {
    pub fn copy(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source_field: source.into(),
            target_field: target.into(),
            transform: Transform::None,
        }
    }

    pub fn phone(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source_field: source.into(),
            target_field: target.into(),
            transform: Transform::FormatPhone { country_code: None },
        }
    }

    pub fn concat(
        first: impl Into<String>,
        second: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        Self {
            source_field: first.into(),
            target_field: target.into(),
            transform: Transform::ConcatNameParts {
                second_field: second.into(),
                separator: None,
            },
        }
    }

    pub fn status<'a>(
        source: impl Into<String>,
        target: impl Into<String>,
        table: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Self {
        Self {
            source_field: source.into(),
            target_field: target.into(),
            transform: Transform::MapStatus {
                table: table
                    .into_iter()
                    .map(|(native, canonical)| (native.to_string(), canonical.to_string()))
                    .collect(),
            },
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Transform {
    #[default]
    None,
    FormatPhone {
        #[serde(default)]
        country_code: Option<String>,
    },
    ConcatNameParts {
        second_field: String,
        #[serde(default)]
        separator: Option<String>,
    },
    MapStatus {
        /// Provider status -> canonical status label.
        table: BTreeMap<String, String>,
    },
}

/// Mapping lists stored on an integration, one per record kind.
///
/// Empty lists fall back to the provider's default table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingSet {
    #[serde(default)]
    pub candidates: Vec<FieldMapping>,
    #[serde(default)]
    pub jobs: Vec<FieldMapping>,
}
