mod model;
mod repository;
mod state;
mod store;

pub use model::{Job, JobId, JobInput, JobStatus, MAX_NAME_LEN, NewJob, ValidationError};
pub use repository::{JobRepository, PersistenceError};
pub use state::{StateMachine, StatusUpdate, TransitionPayload};
pub use store::{InMemoryJobStore, JobStore, StoreError};
