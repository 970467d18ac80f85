pub mod catalog;
pub mod clock;
pub mod coordinator;
pub mod image_api;
pub mod job_builder;
pub mod locks;
pub mod persona;
pub mod rate_limit;
pub mod retry;
pub mod scheduler;
