//! Units shipped with the framework and hosted by the `aioli` dev server.

pub mod whoami;

use crate::error::BootstrapError;
use crate::unit::Unit;

/// Every built-in unit, freshly declared.
pub fn builtin() -> Result<Vec<Unit>, BootstrapError> {
    Ok(vec![whoami::unit()?])
}
