//! Business context for span enrichment
//!
//! - [`attributes`]: typed attribute storage and projection
//! - [`keys`]: the stable attribute key schema
//! - [`builder`]: the fluent [`BusinessContext`] builder
//!
//! The [`Traceable`] trait lets entities and repository results describe
//! themselves as span attributes without any runtime reflection.

pub mod attributes;
pub mod builder;
pub mod keys;

pub use attributes::{Attribute, AttributeBag, AttributeValue, Projection};
pub use builder::BusinessContext;

use crate::telemetry::ambient;
use crate::telemetry::correlation::CorrelationId;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

/// Per-operation context, built fresh and discarded once its span closes
#[derive(Debug, Clone)]
pub struct OperationContext {
    pub correlation_id: Option<CorrelationId>,
    pub operation: String,
    pub attributes: BusinessContext,
}

impl OperationContext {
    /// Context for `operation`, bound to the ambient correlation id if any
    pub fn current(operation: impl Into<String>, attributes: BusinessContext) -> Self {
        Self {
            correlation_id: ambient::current_correlation_id(),
            operation: operation.into(),
            attributes,
        }
    }

    /// Flatten into a single context carrying operation name and correlation id
    pub fn into_business_context(self) -> BusinessContext {
        let ctx = BusinessContext::new().operation(self.operation);
        let ctx = match &self.correlation_id {
            Some(id) => ctx.correlation_id(id),
            None => ctx,
        };
        ctx.merge(&self.attributes)
    }
}

/// A value that can describe itself as business attributes
///
/// Implement this for domain entities so repository results are recorded on
/// persistence spans:
///
/// ```rust
/// use bizctx::context::{BusinessContext, Traceable};
///
/// struct Card {
///     number: String,
///     status: String,
/// }
///
/// impl Traceable for Card {
///     fn describe(&self, ctx: BusinessContext) -> BusinessContext {
///         ctx.card_number(&self.number).card_status(&*self.status)
///     }
/// }
/// ```
pub trait Traceable {
    /// Add this value's attributes to `ctx`
    fn describe(&self, ctx: BusinessContext) -> BusinessContext {
        ctx
    }

    /// Collection size, or the value itself for numeric results
    fn batch_size(&self) -> Option<i64> {
        None
    }
}

impl<T> Traceable for Vec<T> {
    fn batch_size(&self) -> Option<i64> {
        Some(i64::try_from(self.len()).unwrap_or(i64::MAX))
    }
}

impl<T> Traceable for [T] {
    fn batch_size(&self) -> Option<i64> {
        Some(i64::try_from(self.len()).unwrap_or(i64::MAX))
    }
}

impl<K, V, S> Traceable for HashMap<K, V, S> {
    fn batch_size(&self) -> Option<i64> {
        Some(i64::try_from(self.len()).unwrap_or(i64::MAX))
    }
}

impl<T, S> Traceable for HashSet<T, S> {
    fn batch_size(&self) -> Option<i64> {
        Some(i64::try_from(self.len()).unwrap_or(i64::MAX))
    }
}

impl<K, V> Traceable for BTreeMap<K, V> {
    fn batch_size(&self) -> Option<i64> {
        Some(i64::try_from(self.len()).unwrap_or(i64::MAX))
    }
}

impl<T: Traceable> Traceable for Option<T> {
    fn describe(&self, ctx: BusinessContext) -> BusinessContext {
        match self {
            Some(inner) => inner.describe(ctx),
            None => ctx,
        }
    }

    fn batch_size(&self) -> Option<i64> {
        self.as_ref().and_then(Traceable::batch_size)
    }
}

macro_rules! numeric_traceable {
    ($($ty:ty),*) => {
        $(
            impl Traceable for $ty {
                fn batch_size(&self) -> Option<i64> {
                    i64::try_from(*self).ok()
                }
            }
        )*
    };
}

numeric_traceable!(i8, i16, i32, i64, u8, u16, u32, u64, usize, isize);

impl Traceable for bool {}
impl Traceable for () {}
impl Traceable for String {}
impl Traceable for str {}

impl<T: Traceable + ?Sized> Traceable for &T {
    fn describe(&self, ctx: BusinessContext) -> BusinessContext {
        (**self).describe(ctx)
    }

    fn batch_size(&self) -> Option<i64> {
        (**self).batch_size()
    }
}

impl<T: Traceable + ?Sized> Traceable for Box<T> {
    fn describe(&self, ctx: BusinessContext) -> BusinessContext {
        (**self).describe(ctx)
    }

    fn batch_size(&self) -> Option<i64> {
        (**self).batch_size()
    }
}

impl<T: Traceable + ?Sized> Traceable for Arc<T> {
    fn describe(&self, ctx: BusinessContext) -> BusinessContext {
        (**self).describe(ctx)
    }

    fn batch_size(&self) -> Option<i64> {
        (**self).batch_size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Loan {
        number: &'static str,
    }

    impl Traceable for Loan {
        fn describe(&self, ctx: BusinessContext) -> BusinessContext {
            ctx.loan_number(self.number)
        }
    }

    #[test]
    fn test_collection_batch_sizes() {
        assert_eq!(vec![1, 2, 3].batch_size(), Some(3));
        assert_eq!(Vec::<u8>::new().batch_size(), Some(0));

        let mut map = HashMap::new();
        map.insert("a", 1);
        assert_eq!(map.batch_size(), Some(1));
    }

    #[test]
    fn test_numeric_results_use_value() {
        assert_eq!(7u64.batch_size(), Some(7));
        assert_eq!((-2i32).batch_size(), Some(-2));
        assert_eq!(u64::MAX.batch_size(), None);
        assert_eq!(true.batch_size(), None);
        assert_eq!(().batch_size(), None);
    }

    #[test]
    fn test_option_delegates() {
        let found = Some(Loan { number: "L-1" });
        let ctx = BusinessContext::new().describe(&found);
        assert_eq!(
            ctx.bag().get(keys::LOAN_NUMBER).and_then(|v| v.as_str()),
            Some("L-1")
        );

        let missing: Option<Loan> = None;
        assert!(BusinessContext::new().describe(&missing).is_empty());
        assert_eq!(Some(vec![1, 2]).batch_size(), Some(2));
    }

    #[test]
    fn test_operation_context_without_ambient_scope() {
        let op = OperationContext::current("LoanService.findLoan", BusinessContext::new());
        assert!(op.correlation_id.is_none());

        let ctx = op.into_business_context();
        assert_eq!(
            ctx.bag().get(keys::OPERATION_NAME).and_then(|v| v.as_str()),
            Some("LoanService.findLoan")
        );
        assert!(ctx.bag().get(keys::CORRELATION_ID).is_none());
    }
}
