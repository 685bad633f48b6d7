//! proctor-core: Exam session engine, authoring session, and service traits.
//!
//! This crate defines the data model, the service traits the engine talks
//! to, and the state machines that drive a student's timed attempt and an
//! author's question editor.

pub mod answers;
pub mod autosave;
pub mod clock;
pub mod config;
pub mod editor;
pub mod error;
pub mod mock;
pub mod model;
pub mod navigator;
pub mod review;
pub mod schedule;
pub mod session;
pub mod traits;
pub mod wire;

pub use config::SessionConfig;
pub use editor::{EditorSession, EditorState, QuestionPatch};
pub use error::{EditorError, PatchError, ServiceError, SessionError, ValidationError};
pub use session::{ExamSession, SessionEvent, SessionObserver, SessionState};
