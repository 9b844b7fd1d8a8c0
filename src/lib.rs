pub mod catalog;
pub mod compactor;
pub mod config;
pub mod identity;
pub mod limits;
pub mod model;
pub mod notify;
pub mod observability;
pub mod schedule;
pub mod service;
pub mod storage;
