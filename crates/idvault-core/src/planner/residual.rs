//! In-process re-evaluation of residual products.
//!
//! The store-side filter expression for a merged query is the OR of every
//! contributing product's residual, which over-approximates: an item can
//! leak through on a product it does not actually satisfy. Result
//! sequences are therefore fed back through [`filter_with`] to restore
//! exact semantics. Evaluation matches the store's filter rules: a missing
//! attribute fails every comparison except `<>`, numbers compare
//! numerically, strings by bytes.

use std::cmp::Ordering;

use idvault_model::{Item, NativeValue};

use super::{Product, Term, TermCondition};

/// Whether any residual product holds for the item. An empty product list
/// means "no residual" and accepts everything; an empty product holds
/// trivially.
#[must_use]
pub fn any_product_holds(products: &[Product], item: &Item) -> bool {
    products.is_empty() || products.iter().any(|p| product_holds(p, item))
}

/// Whether all terms of a product hold for the item.
#[must_use]
pub fn product_holds(product: &Product, item: &Item) -> bool {
    product.terms.iter().all(|t| term_holds(t, item))
}

/// Retains exactly the items the residual accepts, preserving order.
#[must_use]
pub fn filter_with(products: &[Product], items: Vec<Item>) -> Vec<Item> {
    items
        .into_iter()
        .filter(|item| any_product_holds(products, item))
        .collect()
}

/// Whether a single term holds for the item.
#[must_use]
pub fn term_holds(term: &Term, item: &Item) -> bool {
    let value = item.get(term.attr.name()).filter(|v| !v.is_null());

    match (&term.condition, value) {
        (TermCondition::Present, v) => v.is_some(),
        (TermCondition::NotPresent, v) => v.is_none(),
        // A missing attribute is "not equal" to anything; every other
        // comparison on a missing attribute fails.
        (TermCondition::Ne(_), None) => true,
        (_, None) => false,
        (TermCondition::Eq(expected), Some(v)) => values_equal(v, expected),
        (TermCondition::Ne(expected), Some(v)) => !values_equal(v, expected),
        (TermCondition::Lt(bound), Some(v)) => ordered(v, bound).is_some_and(Ordering::is_lt),
        (TermCondition::Le(bound), Some(v)) => ordered(v, bound).is_some_and(Ordering::is_le),
        (TermCondition::Gt(bound), Some(v)) => ordered(v, bound).is_some_and(Ordering::is_gt),
        (TermCondition::Ge(bound), Some(v)) => ordered(v, bound).is_some_and(Ordering::is_ge),
        (TermCondition::Between(low, high), Some(v)) => {
            ordered(v, low).is_some_and(Ordering::is_ge)
                && ordered(v, high).is_some_and(Ordering::is_le)
        }
        (TermCondition::StartsWith(prefix), Some(v)) => {
            v.as_s().is_some_and(|s| s.starts_with(prefix))
        }
    }
}

fn values_equal(a: &NativeValue, b: &NativeValue) -> bool {
    match (a, b) {
        // Numbers compare numerically, so "1.0" equals "1".
        (NativeValue::N(_), NativeValue::N(_)) => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => x.partial_cmp(&y) == Some(Ordering::Equal),
            _ => a == b,
        },
        _ => a == b,
    }
}

/// Store comparison order: defined only for same-kind scalar pairs.
fn ordered(a: &NativeValue, b: &NativeValue) -> Option<Ordering> {
    match (a, b) {
        (NativeValue::S(x), NativeValue::S(y)) => Some(x.as_bytes().cmp(y.as_bytes())),
        (NativeValue::N(_), NativeValue::N(_)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (NativeValue::Bool(x), NativeValue::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}
