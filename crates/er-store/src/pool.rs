use async_trait::async_trait;
use error_stack::Result;

use crate::Store;

/// Managed pool to keep track of [`Store`]s, mirroring the teacher's
/// `StorePool` trait (`apps/hash-graph/lib/graph/src/store/pool.rs`).
#[async_trait]
pub trait StorePool: Sync {
    type Error;
    type Store<'pool>: Store + Send
    where
        Self: 'pool;

    async fn acquire(&self) -> Result<Self::Store<'_>, Self::Error>;
}
