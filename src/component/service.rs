//! Services: non-HTTP components.

use crate::component::{Component, ComponentContext};
use crate::error::BootstrapError;

/// A business-logic component.
///
/// One instance exists per owning unit. Other units obtain their own
/// instance with [`ComponentContext::integrate`] or share this one with
/// [`ComponentContext::connect`].
///
/// ```ignore
/// struct InvoiceService {
///     currency: String,
/// }
///
/// impl Component for InvoiceService {}
///
/// impl Service for InvoiceService {
///     fn build(ctx: &mut ComponentContext<'_>) -> Result<Self, BootstrapError> {
///         let currency = ctx.config().get_str("currency").unwrap_or("EUR").to_string();
///         Ok(Self { currency })
///     }
/// }
/// ```
pub trait Service: Component + Sized {
    /// Construct the instance. Must not block.
    fn build(ctx: &mut ComponentContext<'_>) -> Result<Self, BootstrapError>;
}
