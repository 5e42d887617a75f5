pub mod error;
pub mod hierarchy;
pub mod id;
pub mod repository;
pub mod retry;
pub mod store;
pub mod wrapper;

pub use error::{IamError, StoreError};
pub use hierarchy::ScopeResolver;
pub use id::{IdAllocator, RandomIdAllocator, SequenceAllocator};
pub use repository::Repository;
pub use retry::{retry_on_collision, RetryConfig};
pub use store::{MemoryStore, PgStore, Reader, WriteTx, Writer};
pub use wrapper::{AeadWrapper, SecretWrapper, WrappedSecret};
