//! Resolution and DNF normalization of parsed filters.

use crate::error::{DapError, DapResult};
use crate::schema::attribute::PhysicalType;
use crate::schema::table::TableDescriptor;
use crate::scim::filter::{CompareOp, Filter, FilterValue};

use super::{Product, Term, TermCondition};

/// A resolved filter tree with negations already pushed to the leaves.
enum Node {
    And(Box<Node>, Box<Node>),
    Or(Box<Node>, Box<Node>),
    Leaf(Term),
}

/// Resolves a filter against a table and normalizes it to a list of
/// products: negations pushed down by de Morgan, `ne` terms split into
/// `lt`/`gt` product pairs, contradictions collapsed, duplicates removed.
pub(super) fn to_products(
    filter: &Filter,
    table: &'static TableDescriptor,
) -> DapResult<Vec<Product>> {
    let node = resolve(filter, table, false)?;
    let mut products = distribute(&node);
    products = split_not_equal(products);
    products.retain(|p| !is_contradiction(p));
    for product in &mut products {
        dedup_terms(product);
    }
    dedup_products(&mut products);
    Ok(products)
}

/// Maps paths through the table's attribute map, validates literals, and
/// pushes negation into the leaves.
fn resolve(filter: &Filter, table: &'static TableDescriptor, negated: bool) -> DapResult<Node> {
    match filter {
        Filter::Not(inner) => resolve(inner, table, !negated),
        Filter::And(left, right) => {
            let l = Box::new(resolve(left, table, negated)?);
            let r = Box::new(resolve(right, table, negated)?);
            // NOT (a AND b) == NOT a OR NOT b
            Ok(if negated { Node::Or(l, r) } else { Node::And(l, r) })
        }
        Filter::Or(left, right) => {
            let l = Box::new(resolve(left, table, negated)?);
            let r = Box::new(resolve(right, table, negated)?);
            Ok(if negated { Node::And(l, r) } else { Node::Or(l, r) })
        }
        Filter::Present(path) => {
            let attr = resolve_path(table, path)?;
            let condition = if negated {
                TermCondition::NotPresent
            } else {
                TermCondition::Present
            };
            Ok(Node::Leaf(Term { attr, condition }))
        }
        Filter::Compare { path, op, value } => {
            let attr = resolve_path(table, path)?;
            let condition = match (op, negated) {
                (CompareOp::Eq, false) | (CompareOp::Ne, true) => {
                    TermCondition::Eq(attr.encode(value)?)
                }
                (CompareOp::Eq, true) | (CompareOp::Ne, false) => {
                    TermCondition::Ne(attr.encode(value)?)
                }
                (CompareOp::Lt, false) | (CompareOp::Ge, true) => {
                    TermCondition::Lt(attr.encode(value)?)
                }
                (CompareOp::Le, false) | (CompareOp::Gt, true) => {
                    TermCondition::Le(attr.encode(value)?)
                }
                (CompareOp::Gt, false) | (CompareOp::Le, true) => {
                    TermCondition::Gt(attr.encode(value)?)
                }
                (CompareOp::Ge, false) | (CompareOp::Lt, true) => {
                    TermCondition::Ge(attr.encode(value)?)
                }
                (CompareOp::Sw, false) => {
                    if attr.physical_type() != PhysicalType::String {
                        return Err(DapError::UnsupportedQuery(format!(
                            "'sw' requires a string attribute, '{}' is not one",
                            attr.name()
                        )));
                    }
                    let FilterValue::Str(prefix) = value else {
                        return Err(DapError::UnsupportedQuery(
                            "'sw' requires a string literal".to_owned(),
                        ));
                    };
                    TermCondition::StartsWith(prefix.clone())
                }
                (CompareOp::Sw, true) => {
                    return Err(DapError::UnsupportedQuery(
                        "negated 'sw' cannot be expressed against the store".to_owned(),
                    ));
                }
                (CompareOp::Co | CompareOp::Ew, _) => {
                    return Err(DapError::UnsupportedQuery(format!(
                        "operator '{op}' cannot be expressed against the store"
                    )));
                }
            };
            Ok(Node::Leaf(Term { attr, condition }))
        }
    }
}

fn resolve_path(
    table: &'static TableDescriptor,
    path: &str,
) -> DapResult<&'static crate::schema::attribute::AttributeDescriptor> {
    table.attribute(path).ok_or_else(|| {
        DapError::UnsupportedQuery(format!(
            "unknown attribute path '{path}' for table '{}'",
            table.physical_name()
        ))
    })
}

/// Distributes AND over OR, producing the product list.
fn distribute(node: &Node) -> Vec<Product> {
    match node {
        Node::Leaf(term) => vec![Product {
            terms: vec![term.clone()],
        }],
        Node::Or(left, right) => {
            let mut products = distribute(left);
            products.extend(distribute(right));
            products
        }
        Node::And(left, right) => {
            let left_products = distribute(left);
            let right_products = distribute(right);
            let mut products = Vec::with_capacity(left_products.len() * right_products.len());
            for l in &left_products {
                for r in &right_products {
                    let mut terms = l.terms.clone();
                    terms.extend(r.terms.iter().cloned());
                    products.push(Product { terms });
                }
            }
            products
        }
    }
}

/// Replaces every product containing `a <> v` with the pair of products
/// `... AND a < v` and `... AND a > v`. Products with several `ne` terms
/// split repeatedly.
fn split_not_equal(products: Vec<Product>) -> Vec<Product> {
    let mut out = Vec::with_capacity(products.len());
    for product in products {
        expand_not_equal(product, &mut out);
    }
    out
}

/// Depth-first expansion that keeps the original product order stable so
/// callers see deterministic pagination.
fn expand_not_equal(product: Product, out: &mut Vec<Product>) {
    let ne_position = product
        .terms
        .iter()
        .position(|t| matches!(t.condition, TermCondition::Ne(_)));

    let Some(position) = ne_position else {
        out.push(product);
        return;
    };

    let TermCondition::Ne(value) = product.terms[position].condition.clone() else {
        return;
    };
    let attr = product.terms[position].attr;

    let mut below = product.clone();
    below.terms[position] = Term {
        attr,
        condition: TermCondition::Lt(value.clone()),
    };
    let mut above = product;
    above.terms[position] = Term {
        attr,
        condition: TermCondition::Gt(value),
    };
    expand_not_equal(below, out);
    expand_not_equal(above, out);
}

/// A product requiring two different equalities on the same attribute can
/// never hold.
fn is_contradiction(product: &Product) -> bool {
    for (i, term) in product.terms.iter().enumerate() {
        let TermCondition::Eq(value) = &term.condition else {
            continue;
        };
        for other in &product.terms[i + 1..] {
            if other.attr == term.attr {
                if let TermCondition::Eq(other_value) = &other.condition {
                    if other_value != value {
                        return true;
                    }
                }
            }
        }
    }
    false
}

/// Removes repeated identical terms within a product.
fn dedup_terms(product: &mut Product) {
    let mut seen: Vec<Term> = Vec::with_capacity(product.terms.len());
    product.terms.retain(|term| {
        if seen.contains(term) {
            false
        } else {
            seen.push(term.clone());
            true
        }
    });
}

/// Removes products whose term set equals an earlier product's. The
/// equality requirement is deliberately conservative; broader absorption
/// would risk dropping products that are not actually subsumed.
fn dedup_products(products: &mut Vec<Product>) {
    let mut kept: Vec<Product> = Vec::with_capacity(products.len());
    for product in products.drain(..) {
        let duplicate = kept.iter().any(|k| same_term_set(k, &product));
        if !duplicate {
            kept.push(product);
        }
    }
    *products = kept;
}

fn same_term_set(a: &Product, b: &Product) -> bool {
    a.terms.len() == b.terms.len() && a.terms.iter().all(|t| b.terms.contains(t))
}

#[cfg(test)]
mod tests {
    use idvault_model::NativeValue;

    use super::*;
    use crate::schema::delegations;
    use crate::scim::filter::Filter;

    fn products(input: &str) -> Vec<Product> {
        to_products(&Filter::parse(input).unwrap(), &delegations::TABLE).unwrap()
    }

    #[test]
    fn test_should_distribute_and_over_or() {
        let result = products(r#"owner eq "u1" and (status eq "a" or status eq "b")"#);
        assert_eq!(result.len(), 2);
        assert!(result.iter().all(|p| p.terms.len() == 2));
    }

    #[test]
    fn test_should_push_negation_with_de_morgan() {
        // not (a or b) == not a and not b; not (status eq) == status ne,
        // which then splits into lt/gt products.
        let result = products(r#"not (status eq "x" or owner eq "u1")"#);
        // One product {status ne x, owner ne u1} -> ne-splitting squares it.
        assert_eq!(result.len(), 4);
        for product in &result {
            assert_eq!(product.terms.len(), 2);
            assert!(product.terms.iter().all(|t| matches!(
                t.condition,
                TermCondition::Lt(_) | TermCondition::Gt(_)
            )));
        }
    }

    #[test]
    fn test_should_flip_comparisons_under_negation() {
        let result = products(r#"not (expires gt 10)"#);
        assert_eq!(result.len(), 1);
        assert_eq!(
            result[0].terms[0].condition,
            TermCondition::Le(NativeValue::number(10))
        );
    }

    #[test]
    fn test_should_split_not_equal_into_range_pair() {
        let result = products(r#"status ne "issued""#);
        assert_eq!(result.len(), 2);
        let conditions: Vec<_> = result.iter().map(|p| &p.terms[0].condition).collect();
        assert!(conditions.contains(&&TermCondition::Lt(NativeValue::string("issued"))));
        assert!(conditions.contains(&&TermCondition::Gt(NativeValue::string("issued"))));
    }

    #[test]
    fn test_should_drop_contradictory_product() {
        let result = products(r#"status eq "a" and status eq "b""#);
        assert!(result.is_empty());
    }

    #[test]
    fn test_should_keep_repeated_equality_once() {
        let result = products(r#"status eq "a" and status eq "a""#);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].terms.len(), 1);
    }

    #[test]
    fn test_should_dedup_equal_products() {
        let result = products(r#"owner eq "u1" or owner eq "u1""#);
        assert_eq!(result.len(), 1);
    }

    #[test]
    fn test_should_reject_contains_operator() {
        let err = to_products(
            &Filter::parse(r#"owner co "u""#).unwrap(),
            &delegations::TABLE,
        );
        assert!(matches!(err, Err(DapError::UnsupportedQuery(_))));
    }

    #[test]
    fn test_should_reject_negated_starts_with() {
        let err = to_products(
            &Filter::parse(r#"not (owner sw "u")"#).unwrap(),
            &delegations::TABLE,
        );
        assert!(matches!(err, Err(DapError::UnsupportedQuery(_))));
    }

    #[test]
    fn test_should_reject_type_mismatched_literal() {
        let err = to_products(
            &Filter::parse(r#"expires eq "soon""#).unwrap(),
            &delegations::TABLE,
        );
        assert!(matches!(err, Err(DapError::UnsupportedQuery(_))));
    }
}
