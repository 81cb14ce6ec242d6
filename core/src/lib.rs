//! dispatch-core: field-technician dispatch and scheduling.
//!
//! Layering, leaf first:
//!   types, error, clock, config, event
//!   technician, incident, work_item       records and the state machine
//!   store                                 the only module that speaks SQL
//!   classifier, scoring, slot_finder      pure decision functions
//!   dispatch, emergency, optimizer        orchestration over the store
//!   scheduler                             time-driven pass triggering
//!   desk, command                         the external operation surface

pub mod classifier;
pub mod clock;
pub mod command;
pub mod config;
pub mod desk;
pub mod dispatch;
pub mod emergency;
pub mod error;
pub mod event;
pub mod incident;
pub mod notifier;
pub mod optimizer;
pub mod rng;
pub mod scheduler;
pub mod scoring;
pub mod slot_finder;
pub mod store;
pub mod technician;
pub mod types;
pub mod work_item;
pub mod workload;
