// Infrastructure layer - External dependencies and adapters
pub mod bi_http_client;
pub mod config;
pub mod document_writer;
