pub mod admin;
pub mod auth;
pub mod files;
pub mod inspections;
pub mod jobs;
pub mod notifications;
pub mod plans;
pub mod uploads;
pub mod verification;
