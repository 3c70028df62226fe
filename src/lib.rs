pub mod donation;
pub mod eligibility;
pub mod error;
pub mod inventory;
pub mod request;
pub mod service;
pub mod types;
pub mod user;
pub mod utils;
