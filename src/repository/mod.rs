//! Persistence collaborators. The engine owns validation and the in-memory
//! view; a repository only makes accepted mutations durable and hands the
//! live set back at startup.

mod memory;
mod wal;

pub use memory::MemoryRepository;
pub use wal::WalRepository;

use async_trait::async_trait;
use thiserror::Error;
use ulid::Ulid;

use crate::model::{Booking, ResourceScope};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("encode error: {0}")]
    Encode(#[from] bincode::Error),

    #[error("log writer shut down")]
    WriterClosed,

    #[error("booking not found: {0}")]
    NotFound(Ulid),
}

#[async_trait]
pub trait BookingRepository: Send + Sync {
    /// All live bookings in scope, ordered by start then id.
    async fn list(&self, scope: &ResourceScope) -> Result<Vec<Booking>, RepositoryError>;

    async fn insert(&self, booking: &Booking) -> Result<Booking, RepositoryError>;

    async fn update(&self, id: Ulid, booking: &Booking) -> Result<Booking, RepositoryError>;

    async fn delete(&self, id: Ulid) -> Result<(), RepositoryError>;
}

pub(crate) fn sort_bookings(bookings: &mut [Booking]) {
    bookings.sort_by_key(|b| (b.span.start, b.id));
}
