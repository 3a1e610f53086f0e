pub mod analytics;
pub mod analyzer;
pub mod deadline;
pub mod lifecycle;
pub mod notification;
pub mod plan;
pub mod processor;
pub mod tracker;
pub mod whatsapp;
