//! Backend dispatch macro.
//!
//! Expands one body per driver so code written against the generic sqlx
//! API is monomorphised for each concrete connection type.

/// Macro for generating backend dispatch match arms.
///
/// The body is expanded once per `Backend` variant with `$c` bound to the
/// concrete sqlx connection.
///
/// # Example
///
/// ```ignore
/// with_backend!(&mut self.backend, c => c.ping().await)
/// ```
#[macro_export]
macro_rules! with_backend {
    ($backend:expr, $c:ident => $body:expr) => {
        match $backend {
            $crate::db::connection::Backend::MySql($c) => $body,
            $crate::db::connection::Backend::SQLite($c) => $body,
        }
    };
}
