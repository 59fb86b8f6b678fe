// Application layer - Capability traits and the workflow service
pub mod bi_client;
pub mod dashboard_service;
pub mod document_store;
pub mod errors;
