//! Declarative translation of provider-native records into canonical records.
//!
//! Rules run in list order against a native JSON record and fill a set of canonical
//! fields. A record that ends up without its required fields is rejected with a typed
//! reason instead of being dropped, so the sync run can count it.

mod defaults;
mod normalizer;
mod rules;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use super::domain::{
    CandidateStatus, CanonicalCandidate, CanonicalJob, Integration, JobStatus, NativeRecord,
};
use normalizer::{
    lookup, normalize_status_key, parse_timestamp, scalar_text, NotScalar, DEFAULT_COUNTRY_CODE,
};

pub use normalizer::format_phone;
pub use rules::{FieldMapping, MappingSet, Transform};

const CUSTOM_PREFIX: &str = "custom_fields.";

/// Why a native record could not become a canonical one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum MappingRejection {
    #[error("required field '{field}' missing after mapping")]
    MissingField { field: String },
    #[error("field '{field}' has an invalid value: {detail}")]
    InvalidValue { field: String, detail: String },
    #[error("mapping targets unknown field '{field}'")]
    UnknownTarget { field: String },
}

impl MappingRejection {
    fn missing(field: &str) -> Self {
        Self::MissingField {
            field: field.to_string(),
        }
    }

    fn invalid(field: &str, detail: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.to_string(),
            detail: detail.into(),
        }
    }
}

/// Canonical fields produced by the rules for one record.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct MappedFields {
    values: BTreeMap<String, String>,
    custom: BTreeMap<String, Value>,
}

impl MappedFields {
    fn is_set(&self, target: &str) -> bool {
        match target.strip_prefix(CUSTOM_PREFIX) {
            Some(key) => self.custom.contains_key(key),
            None => self.values.contains_key(target),
        }
    }

    fn take(&mut self, field: &str) -> Option<String> {
        self.values.remove(field)
    }

    fn require(&mut self, field: &str) -> Result<String, MappingRejection> {
        self.take(field).ok_or_else(|| MappingRejection::missing(field))
    }

    fn timestamp(&mut self, field: &str) -> Result<Option<DateTime<Utc>>, MappingRejection> {
        match self.take(field) {
            None => Ok(None),
            Some(raw) => parse_timestamp(&raw)
                .map(Some)
                .ok_or_else(|| MappingRejection::invalid(field, "unrecognised timestamp")),
        }
    }

    fn into_custom(self) -> BTreeMap<String, Value> {
        self.custom
    }
}

/// A canonical shape the engine can build from mapped fields.
pub trait CanonicalRecord: Sized {
    /// Canonical field names rules may target (besides `custom_fields.*`).
    const TARGET_FIELDS: &'static [&'static str];
    /// Status label written when `map_status` finds no table entry.
    const UNMAPPED_STATUS: &'static str;

    fn from_fields(fields: MappedFields) -> Result<Self, MappingRejection>;
}

impl CanonicalRecord for CanonicalCandidate {
    const TARGET_FIELDS: &'static [&'static str] = &[
        "external_id",
        "email",
        "name",
        "phone",
        "resume_url",
        "status",
        "job_ref",
        "created_at",
        "updated_at",
    ];
    const UNMAPPED_STATUS: &'static str = "applied";

    fn from_fields(mut fields: MappedFields) -> Result<Self, MappingRejection> {
        let email = fields.require("email")?;
        if !email.contains('@') {
            return Err(MappingRejection::invalid("email", "not an email address"));
        }
        let name = fields.require("name")?;
        let status = fields.require("status")?;
        let external_id = fields.require("external_id")?;
        let created_at = fields.timestamp("created_at")?;
        let updated_at = fields.timestamp("updated_at")?;

        Ok(Self {
            external_id,
            email,
            name,
            phone: fields.take("phone"),
            resume_url: fields.take("resume_url"),
            status: CandidateStatus::from_label(&status).unwrap_or(CandidateStatus::Applied),
            job_ref: fields.take("job_ref"),
            created_at,
            updated_at,
            custom_fields: fields.into_custom(),
        })
    }
}

impl CanonicalRecord for CanonicalJob {
    const TARGET_FIELDS: &'static [&'static str] = &[
        "external_id",
        "title",
        "status",
        "department",
        "location",
        "created_at",
        "updated_at",
    ];
    const UNMAPPED_STATUS: &'static str = "open";

    fn from_fields(mut fields: MappedFields) -> Result<Self, MappingRejection> {
        let title = fields.require("title")?;
        let status = fields.require("status")?;
        let external_id = fields.require("external_id")?;
        let created_at = fields.timestamp("created_at")?;
        let updated_at = fields.timestamp("updated_at")?;

        Ok(Self {
            external_id,
            title,
            status: JobStatus::from_label(&status).unwrap_or(JobStatus::Open),
            department: fields.take("department"),
            location: fields.take("location"),
            created_at,
            updated_at,
            custom_fields: fields.into_custom(),
        })
    }
}

/// Applies `mappings` in order to `record`. Pure: the same inputs always give the same output.
pub fn transform<R: CanonicalRecord>(
    record: &NativeRecord,
    mappings: &[FieldMapping],
) -> Result<R, MappingRejection> {
    let mut fields = MappedFields::default();
    for mapping in mappings {
        apply_rule::<R>(record, mapping, &mut fields)?;
    }
    R::from_fields(fields)
}

/// Candidate rules for an integration: tenant overrides, else the provider defaults.
pub fn candidate_rules(integration: &Integration) -> &[FieldMapping] {
    if integration.field_mappings.candidates.is_empty() {
        defaults::candidate_mappings(&integration.provider)
    } else {
        &integration.field_mappings.candidates
    }
}

pub fn job_rules(integration: &Integration) -> &[FieldMapping] {
    if integration.field_mappings.jobs.is_empty() {
        defaults::job_mappings(&integration.provider)
    } else {
        &integration.field_mappings.jobs
    }
}

/// Best-effort external id of a native record, used to label rejected records.
pub fn external_id_hint(record: &NativeRecord, mappings: &[FieldMapping]) -> Option<String> {
    mappings
        .iter()
        .filter(|mapping| mapping.target_field.trim() == "external_id")
        .find_map(|mapping| {
            lookup(record, &mapping.source_field)
                .and_then(|value| scalar_text(value).ok().flatten())
        })
}

fn apply_rule<R: CanonicalRecord>(
    record: &NativeRecord,
    mapping: &FieldMapping,
    fields: &mut MappedFields,
) -> Result<(), MappingRejection> {
    let target = mapping.target_field.trim();
    let custom_key = target.strip_prefix(CUSTOM_PREFIX);
    if custom_key.is_none() && !R::TARGET_FIELDS.contains(&target) {
        return Err(MappingRejection::UnknownTarget {
            field: target.to_string(),
        });
    }

    if let (Some(key), Transform::None) = (custom_key, &mapping.transform) {
        if let Some(value) = lookup(record, &mapping.source_field).filter(|v| !v.is_null()) {
            fields.custom.insert(key.to_string(), value.clone());
        }
        return Ok(());
    }

    // A concat rule never overwrites: "first+last" and "last+first" may both be listed.
    if matches!(mapping.transform, Transform::ConcatNameParts { .. }) && fields.is_set(target) {
        return Ok(());
    }

    let Some(text) = produce(record, mapping, target, R::UNMAPPED_STATUS)? else {
        return Ok(());
    };

    match custom_key {
        Some(key) => {
            fields.custom.insert(key.to_string(), Value::String(text));
        }
        None => {
            fields.values.insert(target.to_string(), text);
        }
    }
    Ok(())
}

fn produce(
    record: &NativeRecord,
    mapping: &FieldMapping,
    target: &str,
    unmapped_status: &str,
) -> Result<Option<String>, MappingRejection> {
    let primary = source_text(record, &mapping.source_field, target)?;

    match &mapping.transform {
        Transform::None => Ok(primary),
        Transform::FormatPhone { country_code } => {
            let code = country_code.as_deref().unwrap_or(DEFAULT_COUNTRY_CODE);
            Ok(primary
                .map(|raw| format_phone(&raw, code))
                .filter(|phone| !phone.is_empty()))
        }
        Transform::ConcatNameParts {
            second_field,
            separator,
        } => {
            let second = source_text(record, second_field, target)?;
            let separator = separator.as_deref().unwrap_or(" ");
            Ok(match (primary, second) {
                (Some(first), Some(second)) => Some(format!("{first}{separator}{second}")),
                (first, second) => first.or(second),
            })
        }
        Transform::MapStatus { table } => {
            let mapped = primary.and_then(|native| {
                let key = normalize_status_key(&native);
                table
                    .iter()
                    .find(|(candidate, _)| normalize_status_key(candidate) == key)
                    .map(|(_, canonical)| canonical.clone())
            });
            Ok(Some(mapped.unwrap_or_else(|| unmapped_status.to_string())))
        }
    }
}

fn source_text(
    record: &NativeRecord,
    path: &str,
    target: &str,
) -> Result<Option<String>, MappingRejection> {
    match lookup(record, path) {
        None => Ok(None),
        Some(value) => scalar_text(value).map_err(|NotScalar| {
            MappingRejection::invalid(target, format!("source '{path}' is not a scalar value"))
        }),
    }
}
