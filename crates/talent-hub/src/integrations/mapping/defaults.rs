use std::collections::HashMap;
use std::sync::OnceLock;

use super::rules::FieldMapping;

#[derive(Debug, Default)]
struct ProviderDefaults {
    candidates: Vec<FieldMapping>,
    jobs: Vec<FieldMapping>,
}

static PROVIDER_DEFAULTS: OnceLock<HashMap<&'static str, ProviderDefaults>> = OnceLock::new();

pub(crate) fn candidate_mappings(provider: &str) -> &'static [FieldMapping] {
    provider_defaults()
        .get(provider)
        .map(|defaults| defaults.candidates.as_slice())
        .unwrap_or(&[])
}

pub(crate) fn job_mappings(provider: &str) -> &'static [FieldMapping] {
    provider_defaults()
        .get(provider)
        .map(|defaults| defaults.jobs.as_slice())
        .unwrap_or(&[])
}

fn provider_defaults() -> &'static HashMap<&'static str, ProviderDefaults> {
    PROVIDER_DEFAULTS.get_or_init(|| {
        let mut map = HashMap::new();
        map.insert("greenhouse", greenhouse());
        map.insert("lever", lever());
        map.insert("csv_export", csv_export());
        map
    })
}

fn greenhouse() -> ProviderDefaults {
    ProviderDefaults {
        candidates: vec![
            FieldMapping::copy("id", "external_id"),
            FieldMapping::copy("email_addresses.0.value", "email"),
            FieldMapping::concat("first_name", "last_name", "name"),
            FieldMapping::phone("phone_numbers.0.value", "phone"),
            FieldMapping::copy("attachments.0.url", "resume_url"),
            FieldMapping::status(
                "applications.0.status",
                "status",
                [
                    ("active", "screening"),
                    ("converted", "interviewing"),
                    ("hired", "hired"),
                    ("rejected", "rejected"),
                ],
            ),
            FieldMapping::copy("applications.0.jobs.0.id", "job_ref"),
            FieldMapping::copy("created_at", "created_at"),
            FieldMapping::copy("updated_at", "updated_at"),
            FieldMapping::copy("company", "custom_fields.company"),
            FieldMapping::copy("title", "custom_fields.title"),
        ],
        jobs: vec![
            FieldMapping::copy("id", "external_id"),
            FieldMapping::copy("name", "title"),
            FieldMapping::status(
                "status",
                "status",
                [("open", "open"), ("draft", "draft"), ("closed", "closed")],
            ),
            FieldMapping::copy("departments.0.name", "department"),
            FieldMapping::copy("offices.0.name", "location"),
            FieldMapping::copy("created_at", "created_at"),
            FieldMapping::copy("updated_at", "updated_at"),
            FieldMapping::copy("requisition_id", "custom_fields.requisition_id"),
        ],
    }
}

fn lever() -> ProviderDefaults {
    ProviderDefaults {
        candidates: vec![
            FieldMapping::copy("id", "external_id"),
            FieldMapping::copy("emails.0", "email"),
            FieldMapping::copy("name", "name"),
            FieldMapping::phone("phones.0.value", "phone"),
            FieldMapping::copy("resume_url", "resume_url"),
            FieldMapping::status(
                "stage",
                "status",
                [
                    ("lead-new", "applied"),
                    ("applicant-new", "applied"),
                    ("recruiter-screen", "screening"),
                    ("phone-screen", "screening"),
                    ("on-site-interview", "interviewing"),
                    ("offer", "offered"),
                    ("hired", "hired"),
                    ("archived", "rejected"),
                ],
            ),
            FieldMapping::copy("applications.0", "job_ref"),
            FieldMapping::copy("createdAt", "created_at"),
            FieldMapping::copy("updatedAt", "updated_at"),
            FieldMapping::copy("origin", "custom_fields.origin"),
            FieldMapping::copy("tags", "custom_fields.tags"),
        ],
        jobs: vec![
            FieldMapping::copy("id", "external_id"),
            FieldMapping::copy("text", "title"),
            FieldMapping::status(
                "state",
                "status",
                [
                    ("published", "open"),
                    ("internal", "open"),
                    ("pending", "draft"),
                    ("draft", "draft"),
                    ("closed", "closed"),
                ],
            ),
            FieldMapping::copy("categories.team", "department"),
            FieldMapping::copy("categories.location", "location"),
            FieldMapping::copy("createdAt", "created_at"),
            FieldMapping::copy("updatedAt", "updated_at"),
            FieldMapping::copy("categories.commitment", "custom_fields.commitment"),
        ],
    }
}

fn csv_export() -> ProviderDefaults {
    ProviderDefaults {
        candidates: vec![
            FieldMapping::copy("Candidate ID", "external_id"),
            FieldMapping::copy("Email", "email"),
            FieldMapping::concat("First Name", "Last Name", "name"),
            FieldMapping::phone("Phone", "phone"),
            FieldMapping::copy("Resume URL", "resume_url"),
            FieldMapping::status(
                "Stage",
                "status",
                [
                    ("new", "applied"),
                    ("applied", "applied"),
                    ("phone screen", "screening"),
                    ("screening", "screening"),
                    ("interview", "interviewing"),
                    ("onsite", "interviewing"),
                    ("offer", "offered"),
                    ("hired", "hired"),
                    ("rejected", "rejected"),
                    ("withdrawn", "withdrawn"),
                ],
            ),
            FieldMapping::copy("Job ID", "job_ref"),
            FieldMapping::copy("Created At", "created_at"),
            FieldMapping::copy("Updated At", "updated_at"),
            FieldMapping::copy("Source", "custom_fields.source"),
        ],
        jobs: vec![
            FieldMapping::copy("Job ID", "external_id"),
            FieldMapping::copy("Title", "title"),
            FieldMapping::status(
                "Status",
                "status",
                [
                    ("open", "open"),
                    ("draft", "draft"),
                    ("on hold", "on_hold"),
                    ("closed", "closed"),
                ],
            ),
            FieldMapping::copy("Department", "department"),
            FieldMapping::copy("Location", "location"),
            FieldMapping::copy("Created At", "created_at"),
            FieldMapping::copy("Updated At", "updated_at"),
        ],
    }
}
