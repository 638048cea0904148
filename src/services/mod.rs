pub mod deduction;
pub mod lifecycle;
pub mod memory_store;
pub mod report;
pub mod repository;
pub mod sqlite_store;
pub mod validation;
