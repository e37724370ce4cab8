use async_trait::async_trait;
use dashmap::DashMap;
use ulid::Ulid;

use crate::model::{Booking, ResourceScope};

use super::{sort_bookings, BookingRepository, RepositoryError};

/// Volatile repository: state lives only as long as the process.
#[derive(Default)]
pub struct MemoryRepository {
    bookings: DashMap<Ulid, Booking>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.bookings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bookings.is_empty()
    }
}

#[async_trait]
impl BookingRepository for MemoryRepository {
    async fn list(&self, scope: &ResourceScope) -> Result<Vec<Booking>, RepositoryError> {
        let mut out: Vec<Booking> = self
            .bookings
            .iter()
            .filter(|e| scope.matches(&e.value().resource_id))
            .map(|e| e.value().clone())
            .collect();
        sort_bookings(&mut out);
        Ok(out)
    }

    async fn insert(&self, booking: &Booking) -> Result<Booking, RepositoryError> {
        self.bookings.insert(booking.id, booking.clone());
        Ok(booking.clone())
    }

    async fn update(&self, id: Ulid, booking: &Booking) -> Result<Booking, RepositoryError> {
        let mut entry = self
            .bookings
            .get_mut(&id)
            .ok_or(RepositoryError::NotFound(id))?;
        *entry.value_mut() = booking.clone();
        Ok(booking.clone())
    }

    async fn delete(&self, id: Ulid) -> Result<(), RepositoryError> {
        self.bookings
            .remove(&id)
            .map(|_| ())
            .ok_or(RepositoryError::NotFound(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Span;

    fn booking(resource: &str, start: i64) -> Booking {
        Booking {
            id: Ulid::new(),
            resource_id: resource.into(),
            span: Span::new(start, start + 100),
            title: "Lesson".into(),
            details: None,
            owner_id: "pilot".into(),
            created_at: 0,
        }
    }

    #[tokio::test]
    async fn list_filters_by_scope_and_orders_by_start() {
        let repo = MemoryRepository::new();
        let late = booking("aircraft1", 500);
        let early = booking("aircraft1", 100);
        let other = booking("aircraft2", 0);
        for b in [&late, &early, &other] {
            repo.insert(b).await.unwrap();
        }

        let scoped = repo
            .list(&ResourceScope::Resource("aircraft1".into()))
            .await
            .unwrap();
        assert_eq!(scoped, vec![early.clone(), late.clone()]);

        let all = repo.list(&ResourceScope::All).await.unwrap();
        assert_eq!(all, vec![other, early, late]);
    }

    #[tokio::test]
    async fn update_and_delete_missing_are_not_found() {
        let repo = MemoryRepository::new();
        let b = booking("aircraft1", 100);
        assert!(matches!(
            repo.update(b.id, &b).await,
            Err(RepositoryError::NotFound(id)) if id == b.id
        ));
        assert!(matches!(
            repo.delete(b.id).await,
            Err(RepositoryError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn update_replaces_and_delete_removes() {
        let repo = MemoryRepository::new();
        let b = booking("aircraft1", 100);
        repo.insert(&b).await.unwrap();

        let renamed = Booking {
            title: "Checkride".into(),
            ..b.clone()
        };
        repo.update(b.id, &renamed).await.unwrap();
        assert_eq!(repo.list(&ResourceScope::All).await.unwrap(), vec![renamed]);

        repo.delete(b.id).await.unwrap();
        assert!(repo.is_empty());
    }
}
