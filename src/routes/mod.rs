pub mod accounts;
pub mod auth;
pub mod dashboard;
pub mod health;
pub mod programs;
pub mod rbac;
pub mod reports;
