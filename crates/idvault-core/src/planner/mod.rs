//! The filter-to-query planner.
//!
//! A SCIM filter is compiled into the minimum-cost plan executable against
//! the store: either a set of index-backed partition queries, each with an
//! optional sort-key range and a residual post-filter, or a single full
//! scan. The pipeline:
//!
//! 1. resolve attribute paths and literals against the table descriptor;
//! 2. normalize to disjunctive normal form, pushing negations down and
//!    splitting `a <> v` into `a < v` / `a > v` products;
//! 3. collapse contradictory products and deduplicate equal ones;
//! 4. pick an index per product (partition equality required, sort-capable
//!    indexes preferred, declaration order breaks ties);
//! 5. merge products resolving to the same key condition, OR-ing their
//!    residuals;
//! 6. cap the number of distinct key conditions at [`MAX_QUERIES`].
//!
//! The store charges and paginates per query, so duplicating partition
//! lookups is strictly worse than one filtered query over the same
//! partition; a full scan is worse than any indexed path, so queries are
//! preferred even when they multiply.

pub mod emit;
mod normalize;
pub mod residual;

use idvault_model::{Item, NativeValue};

use crate::error::{DapError, DapResult};
use crate::schema::attribute::AttributeDescriptor;
use crate::schema::table::{Index, TableDescriptor};
use crate::scim::filter::Filter;

/// Upper bound on distinct key conditions in one plan.
pub const MAX_QUERIES: usize = 8;

/// An atomic comparison against one attribute.
#[derive(Debug, Clone, PartialEq)]
pub struct Term {
    /// The attribute compared.
    pub attr: &'static AttributeDescriptor,
    /// The comparison.
    pub condition: TermCondition,
}

/// The comparison carried by a term.
#[derive(Debug, Clone, PartialEq)]
pub enum TermCondition {
    /// Equal.
    Eq(NativeValue),
    /// Not equal. Eliminated during normalization; only ever reaches the
    /// store inside a filter expression, never a key condition.
    Ne(NativeValue),
    /// Less than.
    Lt(NativeValue),
    /// Less than or equal.
    Le(NativeValue),
    /// Greater than.
    Gt(NativeValue),
    /// Greater than or equal.
    Ge(NativeValue),
    /// Inclusive range.
    Between(NativeValue, NativeValue),
    /// String prefix match.
    StartsWith(String),
    /// The attribute exists.
    Present,
    /// The attribute does not exist.
    NotPresent,
}

/// One conjunction in DNF: a set of terms that must all hold.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Product {
    /// The terms, in resolution order.
    pub terms: Vec<Term>,
}

/// A disjunction of products.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Dnf {
    /// The products, in normalization order.
    pub products: Vec<Product>,
}

impl Dnf {
    /// Whether an item satisfies this expression: any product holds,
    /// where a product holds when all of its terms hold. The empty
    /// disjunction accepts everything (it arises only from "no filter").
    #[must_use]
    pub fn matches(&self, item: &Item) -> bool {
        self.products.is_empty() || residual::any_product_holds(&self.products, item)
    }
}

/// A sort-key range condition, the indexable subset of [`TermCondition`].
#[derive(Debug, Clone, PartialEq)]
pub enum SortCondition {
    /// Equal.
    Eq(NativeValue),
    /// Less than.
    Lt(NativeValue),
    /// Less than or equal.
    Le(NativeValue),
    /// Greater than.
    Gt(NativeValue),
    /// Greater than or equal.
    Ge(NativeValue),
    /// Inclusive range.
    Between(NativeValue, NativeValue),
    /// String prefix match.
    StartsWith(String),
}

impl SortCondition {
    /// The sort-key form of a term condition, when one exists.
    #[must_use]
    pub fn from_term(condition: &TermCondition) -> Option<Self> {
        match condition {
            TermCondition::Eq(v) => Some(Self::Eq(v.clone())),
            TermCondition::Lt(v) => Some(Self::Lt(v.clone())),
            TermCondition::Le(v) => Some(Self::Le(v.clone())),
            TermCondition::Gt(v) => Some(Self::Gt(v.clone())),
            TermCondition::Ge(v) => Some(Self::Ge(v.clone())),
            TermCondition::Between(l, h) => Some(Self::Between(l.clone(), h.clone())),
            TermCondition::StartsWith(p) => Some(Self::StartsWith(p.clone())),
            TermCondition::Ne(_) | TermCondition::Present | TermCondition::NotPresent => None,
        }
    }

    fn term_condition(&self) -> TermCondition {
        match self {
            Self::Eq(v) => TermCondition::Eq(v.clone()),
            Self::Lt(v) => TermCondition::Lt(v.clone()),
            Self::Le(v) => TermCondition::Le(v.clone()),
            Self::Gt(v) => TermCondition::Gt(v.clone()),
            Self::Ge(v) => TermCondition::Ge(v.clone()),
            Self::Between(l, h) => TermCondition::Between(l.clone(), h.clone()),
            Self::StartsWith(p) => TermCondition::StartsWith(p.clone()),
        }
    }
}

/// The index-handled portion of a planned query: a partition equality and
/// an optional sort range. The partition value is the logical term value;
/// prefix tagging for primary-key indexes happens at emission.
#[derive(Debug, Clone)]
pub struct KeyCondition {
    index: &'static Index,
    partition_value: NativeValue,
    sort: Option<(&'static AttributeDescriptor, SortCondition)>,
}

impl KeyCondition {
    /// The index this condition targets.
    #[must_use]
    pub fn index(&self) -> &'static Index {
        self.index
    }

    /// The logical partition equality value.
    #[must_use]
    pub fn partition_value(&self) -> &NativeValue {
        &self.partition_value
    }

    /// The sort range, if one was extracted.
    #[must_use]
    pub fn sort(&self) -> Option<&(&'static AttributeDescriptor, SortCondition)> {
        self.sort.as_ref()
    }

    /// Whether an item's logical attributes satisfy this key condition.
    #[must_use]
    pub fn matches(&self, item: &Item) -> bool {
        let partition_attr = self.index.partition_term_attribute();
        let partition_term = Term {
            attr: partition_attr,
            condition: TermCondition::Eq(self.partition_value.clone()),
        };
        if !residual::term_holds(&partition_term, item) {
            return false;
        }
        match &self.sort {
            None => true,
            Some((attr, condition)) => residual::term_holds(
                &Term {
                    attr: *attr,
                    condition: condition.term_condition(),
                },
                item,
            ),
        }
    }
}

impl PartialEq for KeyCondition {
    fn eq(&self, other: &Self) -> bool {
        // Indexes are static declarations; identity comparison is exact.
        std::ptr::eq(self.index, other.index)
            && self.partition_value == other.partition_value
            && self.sort == other.sort
    }
}

/// One store-side query plus the residual products its results must be
/// re-filtered with. When several products merged into this query, the
/// residuals are OR-ed.
#[derive(Debug, Clone)]
pub struct PlannedQuery {
    /// The index-handled portion.
    pub key: KeyCondition,
    /// The leftover terms of each merged product.
    pub residuals: Vec<Product>,
}

/// The output of planning.
#[derive(Debug, Clone)]
pub enum QueryPlan {
    /// Execute these partition queries, in order, and union the results.
    UsingQueries(Vec<PlannedQuery>),
    /// No product is indexable; scan the table with the full expression.
    UsingScan(Dnf),
}

impl QueryPlan {
    /// Exact acceptance semantics of the plan: the store-side
    /// over-approximation tightened by the residual filter.
    #[must_use]
    pub fn accepts(&self, item: &Item) -> bool {
        match self {
            Self::UsingQueries(queries) => queries.iter().any(|q| {
                q.key.matches(item) && residual::any_product_holds(&q.residuals, item)
            }),
            Self::UsingScan(dnf) => dnf.matches(item),
        }
    }
}

/// Compiles a filter into a plan against the given table.
///
/// # Errors
///
/// - [`DapError::UnsupportedQuery`] for unknown attribute paths, literal
///   type mismatches, or operators the store cannot express (`co`, `ew`,
///   negated `sw`).
/// - [`DapError::QueryRequiresTooManyOperations`] when the plan would need
///   more than [`MAX_QUERIES`] distinct key conditions.
pub fn plan(filter: &Filter, table: &'static TableDescriptor) -> DapResult<QueryPlan> {
    let products = normalize::to_products(filter, table)?;

    // A contradictory filter (a = x AND a = y) normalizes to nothing:
    // an empty query set that accepts no items.
    if products.is_empty() {
        return Ok(QueryPlan::UsingQueries(Vec::new()));
    }

    let mut selections = Vec::with_capacity(products.len());
    let mut all_indexable = true;
    for product in &products {
        match select_index(table, product) {
            Some(selection) => selections.push(selection),
            None => {
                all_indexable = false;
                break;
            }
        }
    }
    // One unindexable product forces the whole union through a scan;
    // folding the indexable products into the same scan is strictly
    // cheaper than a scan plus redundant queries.
    if !all_indexable {
        return Ok(QueryPlan::UsingScan(Dnf { products }));
    }

    let mut queries: Vec<PlannedQuery> = Vec::new();
    for (key, residual) in selections {
        if let Some(existing) = queries.iter_mut().find(|q| q.key == key) {
            existing.residuals.push(residual);
        } else {
            queries.push(PlannedQuery {
                key,
                residuals: vec![residual],
            });
        }
    }

    if queries.len() > MAX_QUERIES {
        return Err(DapError::QueryRequiresTooManyOperations);
    }

    Ok(QueryPlan::UsingQueries(queries))
}

/// Picks the best index for a product: some term must equal the index's
/// partition attribute; among such indexes, ones whose sort attribute also
/// appears with an indexable comparator win; declaration order breaks
/// ties. Returns the key condition and the residual product.
fn select_index(
    table: &TableDescriptor,
    product: &Product,
) -> Option<(KeyCondition, Product)> {
    let mut best: Option<(&'static Index, usize, Option<usize>)> = None;

    for index in table.indexes() {
        let partition_attr = index.partition_term_attribute();
        let Some(partition_idx) = product
            .terms
            .iter()
            .position(|t| t.attr == partition_attr && matches!(t.condition, TermCondition::Eq(_)))
        else {
            continue;
        };

        let sort_idx = index.sort_attribute().and_then(|sort_attr| {
            product.terms.iter().position(|t| {
                t.attr == sort_attr
                    && t.attr != partition_attr
                    && SortCondition::from_term(&t.condition).is_some()
            })
        });

        match (&best, sort_idx) {
            (None, _) => best = Some((index, partition_idx, sort_idx)),
            (Some((_, _, None)), Some(_)) => best = Some((index, partition_idx, sort_idx)),
            _ => {}
        }
    }

    let (index, partition_idx, sort_idx) = best?;

    let TermCondition::Eq(partition_value) = &product.terms[partition_idx].condition else {
        return None;
    };

    let sort = sort_idx.map(|i| {
        let term = &product.terms[i];
        // from_term succeeded during selection.
        let condition = SortCondition::from_term(&term.condition).unwrap_or_else(|| {
            unreachable!("sort selection only admits indexable conditions")
        });
        (term.attr, condition)
    });

    let residual = Product {
        terms: product
            .terms
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != partition_idx && Some(*i) != sort_idx)
            .map(|(_, t)| t.clone())
            .collect(),
    };

    let key = KeyCondition {
        index,
        partition_value: partition_value.clone(),
        sort,
    };

    Some((key, residual))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{accounts, delegations};
    use crate::scim::filter::Filter;

    fn plan_delegations(input: &str) -> DapResult<QueryPlan> {
        plan(&Filter::parse(input).unwrap(), &delegations::TABLE)
    }

    #[test]
    fn test_should_plan_partition_and_sort_equality_on_one_index() {
        // owner is the partition and status the sort key of
        // owner-status-index; both collapse into the key condition.
        let plan = plan_delegations(r#"status eq "issued" and owner eq "u1""#).unwrap();
        let QueryPlan::UsingQueries(queries) = plan else {
            panic!("expected queries");
        };
        assert_eq!(queries.len(), 1);

        let query = &queries[0];
        assert_eq!(query.key.index().name(), Some("owner-status-index"));
        assert_eq!(query.key.partition_value(), &NativeValue::string("u1"));
        assert_eq!(
            query.key.sort(),
            Some(&(
                &delegations::STATUS,
                SortCondition::Eq(NativeValue::string("issued"))
            ))
        );
        assert_eq!(query.residuals, vec![Product::default()]);
    }

    #[test]
    fn test_should_expand_not_equal_into_two_key_conditions() {
        let plan = plan_delegations(
            r#"status ne "issued" and expires gt 1234 and client_id eq "c1""#,
        )
        .unwrap();
        let QueryPlan::UsingQueries(queries) = plan else {
            panic!("expected queries");
        };
        assert_eq!(queries.len(), 2);

        for query in &queries {
            assert_eq!(query.key.index().name(), Some("clientId-status-index"));
            assert_eq!(query.key.partition_value(), &NativeValue::string("c1"));
            assert_eq!(
                query.residuals,
                vec![Product {
                    terms: vec![Term {
                        attr: &delegations::EXPIRES,
                        condition: TermCondition::Gt(NativeValue::number(1234)),
                    }]
                }]
            );
        }

        let sorts: Vec<_> = queries.iter().filter_map(|q| q.key.sort()).collect();
        assert!(sorts.contains(&&(
            &delegations::STATUS,
            SortCondition::Lt(NativeValue::string("issued"))
        )));
        assert!(sorts.contains(&&(
            &delegations::STATUS,
            SortCondition::Gt(NativeValue::string("issued"))
        )));
    }

    #[test]
    fn test_should_fall_back_to_scan_for_unindexed_attribute() {
        let plan = plan_delegations(r#"redirect_uri eq "https://example.com""#).unwrap();
        let QueryPlan::UsingScan(dnf) = plan else {
            panic!("expected scan");
        };
        assert_eq!(dnf.products.len(), 1);
        assert_eq!(dnf.products[0].terms.len(), 1);
    }

    #[test]
    fn test_should_scan_when_any_disjunct_is_unindexable() {
        let plan =
            plan_delegations(r#"owner eq "u1" or redirect_uri eq "https://x""#).unwrap();
        assert!(matches!(plan, QueryPlan::UsingScan(_)));
    }

    #[test]
    fn test_should_merge_products_sharing_a_key_condition() {
        let plan = plan_delegations(
            r#"(owner eq "u1" and expires gt 5) or (owner eq "u1" and expires lt 2)"#,
        )
        .unwrap();
        let QueryPlan::UsingQueries(queries) = plan else {
            panic!("expected queries");
        };
        // owner-status-index has no usable sort term, so both products
        // share the identical key condition and merge their residuals.
        assert_eq!(queries.len(), 1);
        assert_eq!(queries[0].residuals.len(), 2);
    }

    #[test]
    fn test_should_prefer_sort_capable_index() {
        // Both owner-status-index and clientId-status-index can take the
        // status term as a sort condition; owner-status-index is declared
        // first but only clientId appears with equality here.
        let plan = plan_delegations(r#"client_id eq "c1" and status eq "issued""#).unwrap();
        let QueryPlan::UsingQueries(queries) = plan else {
            panic!("expected queries");
        };
        assert_eq!(queries[0].key.index().name(), Some("clientId-status-index"));
        assert!(queries[0].key.sort().is_some());
    }

    #[test]
    fn test_should_treat_unique_attribute_equality_as_indexable() {
        let filter = Filter::parse(r#"userName eq "alice""#).unwrap();
        let plan = plan(&filter, &accounts::TABLE).unwrap();
        let QueryPlan::UsingQueries(queries) = plan else {
            panic!("expected queries");
        };
        assert_eq!(queries.len(), 1);
        assert!(queries[0].key.index().is_primary());
        assert_eq!(
            queries[0].key.partition_value(),
            &NativeValue::string("alice")
        );
    }

    #[test]
    fn test_should_reject_unknown_path() {
        let err = plan_delegations(r#"nonexistent eq "x""#);
        assert!(matches!(err, Err(DapError::UnsupportedQuery(_))));
    }

    #[test]
    fn test_should_cap_distinct_key_conditions() {
        // Nine distinct owners, nine distinct key conditions.
        let input = (1..=9)
            .map(|i| format!(r#"owner eq "u{i}""#))
            .collect::<Vec<_>>()
            .join(" or ");
        let err = plan_delegations(&input);
        assert!(matches!(
            err,
            Err(DapError::QueryRequiresTooManyOperations)
        ));
    }

    #[test]
    fn test_should_collapse_contradictory_products_to_empty_plan() {
        let plan = plan_delegations(r#"owner eq "u1" and owner eq "u2""#).unwrap();
        let QueryPlan::UsingQueries(queries) = plan else {
            panic!("expected queries");
        };
        assert!(queries.is_empty());
    }

    #[test]
    fn test_should_accept_exactly_what_the_filter_accepts() {
        use idvault_model::Item;

        let plan = plan_delegations(
            r#"status ne "issued" and expires gt 1234 and client_id eq "c1""#,
        )
        .unwrap();

        let item = |status: &str, expires: i64, client: &str| -> Item {
            let mut item = Item::new();
            item.insert("status".to_owned(), NativeValue::string(status));
            item.insert("expires".to_owned(), NativeValue::number(expires));
            item.insert("clientId".to_owned(), NativeValue::string(client));
            item
        };

        assert!(plan.accepts(&item("revoked", 2000, "c1")));
        assert!(!plan.accepts(&item("issued", 2000, "c1")));
        assert!(!plan.accepts(&item("revoked", 1000, "c1")));
        assert!(!plan.accepts(&item("revoked", 2000, "c2")));
    }

    #[test]
    fn test_should_accept_identically_for_distributed_filters() {
        let factored = plan_delegations(
            r#"owner eq "u1" and (status eq "issued" or status eq "revoked")"#,
        )
        .unwrap();
        let distributed = plan_delegations(
            r#"(owner eq "u1" and status eq "issued") or (owner eq "u1" and status eq "revoked")"#,
        )
        .unwrap();

        for (owner, status) in [
            ("u1", "issued"),
            ("u1", "revoked"),
            ("u1", "expired"),
            ("u2", "issued"),
        ] {
            let mut item = idvault_model::Item::new();
            item.insert("owner".to_owned(), NativeValue::string(owner));
            item.insert("status".to_owned(), NativeValue::string(status));
            assert_eq!(factored.accepts(&item), distributed.accepts(&item));
        }
    }

    #[test]
    fn test_should_plan_double_negation_like_the_plain_filter() {
        let plain = plan_delegations(r#"owner eq "u1""#).unwrap();
        let doubled = plan_delegations(r#"not (not (owner eq "u1"))"#).unwrap();

        let mut item = idvault_model::Item::new();
        item.insert("owner".to_owned(), NativeValue::string("u1"));
        assert_eq!(plain.accepts(&item), doubled.accepts(&item));

        let mut other = idvault_model::Item::new();
        other.insert("owner".to_owned(), NativeValue::string("u2"));
        assert_eq!(plain.accepts(&other), doubled.accepts(&other));
    }
}
