//! `SeaORM` entity definitions.

pub mod artifacts;
pub mod organization_users;
pub mod organizations;
pub mod service_accounts;
