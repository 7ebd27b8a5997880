//! patrolsim-core: a city-wide police patrol dispatch simulation.
//!
//! The world (clock, road network, districts, entity registry) is shared
//! between independently running subsystems: the tick scheduler, the
//! incident ager, the incident generator and the exporter. Route
//! computation runs on short-lived background threads.

pub mod clock;
pub mod config;
pub mod district;
pub mod engine;
pub mod entity;
pub mod error;
pub mod event;
pub mod exporter;
pub mod geometry;
pub mod headquarters;
pub mod import;
pub mod incident;
pub mod incident_factory;
pub mod incident_generator;
pub mod path_worker;
pub mod patrol;
pub mod rng;
pub mod road_network;
pub mod scheduler;
pub mod snapshot;
pub mod store;
pub mod subsystem;
pub mod types;
pub mod world;
