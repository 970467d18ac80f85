pub mod batch;
pub mod event;
pub mod job;
pub mod lock;
pub mod persona;
pub mod product;
