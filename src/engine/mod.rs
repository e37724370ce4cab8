mod availability;
mod conflict;
mod error;
mod mutations;
mod queries;

pub use availability::{merge_overlapping, subtract_intervals};
pub use error::EngineError;

use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use tokio::sync::{OwnedRwLockWriteGuard, RwLock};
use tracing::info;
use ulid::{Generator, Ulid};

use crate::model::*;
use crate::notify::NotifyHub;
use crate::repository::BookingRepository;

pub type SharedResourceState = Arc<RwLock<ResourceState>>;

/// The reservation engine: per-resource booking sets behind their own locks,
/// validated on every mutation and persisted through the injected repository.
pub struct Engine {
    pub(super) state: DashMap<ResourceId, SharedResourceState>,
    /// Reverse lookup: booking id → resource id
    pub(super) entity_to_resource: DashMap<Ulid, ResourceId>,
    pub(super) repo: Arc<dyn BookingRepository>,
    pub notify: Arc<NotifyHub>,
    ids: Mutex<Generator>,
}

impl Engine {
    /// Build an engine, loading the live set from the repository.
    pub async fn open(
        repo: Arc<dyn BookingRepository>,
        notify: Arc<NotifyHub>,
    ) -> Result<Self, EngineError> {
        let bookings = repo.list(&ResourceScope::All).await?;

        let engine = Self {
            state: DashMap::new(),
            entity_to_resource: DashMap::new(),
            repo,
            notify,
            ids: Mutex::new(Generator::new()),
        };

        // We are the sole owner of these Arcs, so try_write always succeeds.
        // Never use blocking_write here: this runs inside the async runtime.
        let count = bookings.len();
        for booking in bookings {
            let rs = engine.resource_entry(&booking.resource_id);
            let mut guard = rs
                .try_write()
                .map_err(|_| EngineError::Storage("startup: resource state contended".into()))?;
            engine
                .entity_to_resource
                .insert(booking.id, booking.resource_id.clone());
            guard.insert_booking(booking);
        }
        metrics::gauge!(crate::observability::BOOKINGS_ACTIVE).set(count as f64);
        info!("engine loaded {count} bookings across {} resources", engine.state.len());

        Ok(engine)
    }

    pub fn get_resource(&self, id: &str) -> Option<SharedResourceState> {
        self.state.get(id).map(|e| e.value().clone())
    }

    pub fn get_resource_for_entity(&self, entity_id: &Ulid) -> Option<ResourceId> {
        self.entity_to_resource.get(entity_id).map(|e| e.value().clone())
    }

    pub fn booking_count(&self) -> usize {
        self.entity_to_resource.len()
    }

    /// Get or lazily create the state for a resource.
    pub(super) fn resource_entry(&self, resource_id: &str) -> SharedResourceState {
        if let Some(rs) = self.get_resource(resource_id) {
            return rs;
        }
        self.state
            .entry(resource_id.to_string())
            .or_insert_with(|| Arc::new(RwLock::new(ResourceState::new(resource_id.to_string()))))
            .value()
            .clone()
    }

    /// Fresh booking id. Monotonic within the process, so ids are never reused.
    pub(super) fn next_id(&self) -> Ulid {
        let mut ids = self.ids.lock().unwrap_or_else(|e| e.into_inner());
        loop {
            let id = ids.generate().unwrap_or_else(|_| Ulid::new());
            if !self.entity_to_resource.contains_key(&id) {
                return id;
            }
        }
    }

    /// Apply a committed event to the in-memory view and publish it.
    /// Caller holds the resource's write lock.
    pub(super) fn apply_and_notify(&self, rs: &mut ResourceState, event: Event) {
        match &event {
            Event::BookingCreated { booking } => {
                self.entity_to_resource
                    .insert(booking.id, booking.resource_id.clone());
                rs.insert_booking(booking.clone());
                metrics::gauge!(crate::observability::BOOKINGS_ACTIVE).increment(1.0);
            }
            Event::BookingAmended { booking } => {
                rs.remove_booking(booking.id);
                rs.insert_booking(booking.clone());
            }
            Event::BookingRetracted { id, .. } => {
                rs.remove_booking(*id);
                self.entity_to_resource.remove(id);
                metrics::gauge!(crate::observability::BOOKINGS_ACTIVE).decrement(1.0);
            }
        }
        self.notify.send(&event);
    }

    /// Lookup booking → resource, acquire the resource's write lock, and
    /// confirm the booking is still there once the lock is held.
    pub(super) async fn resolve_entity_write(
        &self,
        entity_id: &Ulid,
    ) -> Result<OwnedRwLockWriteGuard<ResourceState>, EngineError> {
        let resource_id = self
            .get_resource_for_entity(entity_id)
            .ok_or(EngineError::NotFound(*entity_id))?;
        let rs = self
            .get_resource(&resource_id)
            .ok_or(EngineError::NotFound(*entity_id))?;
        let guard = rs.write_owned().await;
        if guard.get(*entity_id).is_none() {
            return Err(EngineError::NotFound(*entity_id));
        }
        Ok(guard)
    }
}
