//! Pure business rules for the sale lifecycle. No I/O here; the handlers
//! call into this module and own the transactions.

pub mod access;
pub mod money;
pub mod sale;
pub mod stage;
