pub mod billing;
pub mod config;
pub mod crm;
pub mod jobs;
pub mod shared;
pub mod store;
