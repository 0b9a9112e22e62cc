pub mod delivery;
pub mod eligibility;
pub mod generic_retry;
pub mod lease;
pub mod notification_log;
pub mod orders;
pub mod payment;
pub mod render;
pub mod retry;
