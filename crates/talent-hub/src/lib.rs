//! Integration & automation hub for the recruiting platform.
//!
//! The hub talks to applicant-tracking systems, calendars, and messaging providers
//! through one set of capability traits, maps provider payloads onto canonical
//! records, and composes remote calls into sync, campaign, and scheduling runs.

pub mod config;
pub mod error;
pub mod integrations;
pub mod telemetry;
