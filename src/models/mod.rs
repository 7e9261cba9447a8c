pub mod account;
pub mod program;
pub mod rbac;
pub mod report;
