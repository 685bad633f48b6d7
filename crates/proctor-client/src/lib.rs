//! proctor-client: HTTP implementations of the proctor service traits.
//!
//! Implements `SubmissionService` and `ContentService` against the exam
//! REST API, plus the configuration loader that wires them up.

pub mod config;
pub mod content;
mod error;
pub mod http;
pub mod submission;

pub use config::{create_services, load_config, load_config_from, ProctorConfig};
pub use content::HttpContentService;
pub use http::ApiClient;
pub use submission::HttpSubmissionService;
