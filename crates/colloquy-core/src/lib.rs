pub mod config;
pub mod error;
pub mod event;
pub mod state;
pub mod traits;
pub mod types;

pub use config::AppConfig;
pub use error::{ColloquyError, Disposition, Result};
pub use event::{EventBus, WorkflowEvent};
pub use state::{SessionSnapshot, SessionState, StageId, StageUpdate, WorkflowNode};
pub use types::*;
