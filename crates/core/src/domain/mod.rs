pub mod actor;
pub mod entity;
