//! Infrastructure layer: stores, the inventory service, expiry scheduling, config.

pub mod config;
pub mod expiry;
pub mod service;
pub mod store;


pub use config::{AppConfig, ConfigError};
pub use expiry::{
    ExpiryScheduler, ExpirySchedulerConfig, ExpirySchedulerHandle, ExpirySweep, SchedulerStats,
    SweepReport,
};
pub use service::{Committed, InventoryService, ReservationReceipt, ServiceConfig, ServiceError};
pub use store::{
    ExpiredReservations, InMemoryInventoryStore, InMemoryOrderStore, OrderStore, PostgresStore,
    ReservationStore, SettledReservation, StockLedger, StoreError,
};
