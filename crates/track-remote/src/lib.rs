//! Remote persistence of stage moves.

mod http;
#[cfg(feature = "test-util")]
pub mod mock;

pub use http::{HttpStagePersister, RemoteConfig, RemoteConfigError};
pub use track_types::{PersistenceFailure, StagePersister};

#[cfg(feature = "test-util")]
pub use mock::MockPersister;
