//! The query session: query window, result cache, authorization gate and the
//! controller that ties them to the store.

pub mod cache;
pub mod controller;
pub mod error;
pub mod gate;
pub mod state;

pub use cache::{CachedPage, ResultCache};
pub use controller::{
    QueryEvent, QueryListener, QuerySession, SessionOptions, SessionSnapshot,
    DEFAULT_EXECUTE_TIMEOUT,
};
pub use error::SessionError;
pub use gate::{AlwaysGranted, Authorization, Authorizer, Gate, StorageAccess};
pub use state::{EmptyPagePolicy, QueryState, SessionStatus};
