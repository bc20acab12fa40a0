//! Embedded schema migrations, applied in order.

/// `(name, statement)` pairs. Each statement is idempotent.
pub const MIGRATIONS: &[(&str, &str)] = &[(
    "001_create_accounts",
    include_str!("../migrations/001_create_accounts.sql"),
)];
