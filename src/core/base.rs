//! Base types shared across the crate.

/// Internal result type for fallible helper code that is not part of the typed public error
/// surface (file I/O, parsing glue). Anything crossing the public API boundary is converted
/// into a [`crate::error::WoodshedError`] instead.
pub(crate) type Res<T> = anyhow::Result<T>;
