//! Rendering of store-native expression strings.
//!
//! One `ExpressionBuilder` accumulates the `#name` and `:value` placeholder
//! maps for a single emitted request. Attribute names always go through
//! `#name` substitution to bypass reserved-word restrictions; value
//! placeholders are numbered per attribute within the emission
//! (`:status_1`, `:status_2`, ...) so distinct occurrences of the same
//! attribute get distinct slots deterministically.

use std::collections::HashMap;

use idvault_model::NativeValue;

use crate::planner::{KeyCondition, Product, SortCondition, Term, TermCondition};
use crate::schema::attribute::AttributeDescriptor;
use crate::schema::table::TableDescriptor;

/// Accumulates placeholder maps while rendering expression strings.
#[derive(Debug, Default)]
pub struct ExpressionBuilder {
    names: HashMap<String, String>,
    values: HashMap<String, NativeValue>,
    counters: HashMap<&'static str, usize>,
}

impl ExpressionBuilder {
    /// Fresh builder for one emission.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the attribute and returns its `#name` placeholder.
    pub fn name_ref(&mut self, attr: &'static AttributeDescriptor) -> String {
        let hash = attr.hash_name();
        self.names.insert(hash.clone(), attr.name().to_owned());
        hash
    }

    /// Registers a value occurrence and returns its `:name_n` placeholder.
    pub fn value_ref(&mut self, attr: &'static AttributeDescriptor, value: NativeValue) -> String {
        let counter = self.counters.entry(attr.name()).or_insert(0);
        *counter += 1;
        let placeholder = format!("{}_{}", attr.colon_name(), counter);
        self.values.insert(placeholder.clone(), value);
        placeholder
    }

    /// Renders one term in filter context.
    pub fn term(&mut self, term: &Term) -> String {
        let name = self.name_ref(term.attr);
        match &term.condition {
            TermCondition::Eq(v) => {
                format!("{name} = {}", self.value_ref(term.attr, v.clone()))
            }
            TermCondition::Ne(v) => {
                format!("{name} <> {}", self.value_ref(term.attr, v.clone()))
            }
            TermCondition::Lt(v) => {
                format!("{name} < {}", self.value_ref(term.attr, v.clone()))
            }
            TermCondition::Le(v) => {
                format!("{name} <= {}", self.value_ref(term.attr, v.clone()))
            }
            TermCondition::Gt(v) => {
                format!("{name} > {}", self.value_ref(term.attr, v.clone()))
            }
            TermCondition::Ge(v) => {
                format!("{name} >= {}", self.value_ref(term.attr, v.clone()))
            }
            TermCondition::Between(low, high) => {
                let low_ref = self.value_ref(term.attr, low.clone());
                let high_ref = self.value_ref(term.attr, high.clone());
                format!("{name} BETWEEN {low_ref} AND {high_ref}")
            }
            TermCondition::StartsWith(prefix) => {
                let value = self.value_ref(term.attr, NativeValue::S(prefix.clone()));
                format!("begins_with({name}, {value})")
            }
            TermCondition::Present => format!("attribute_exists({name})"),
            TermCondition::NotPresent => format!("attribute_not_exists({name})"),
        }
    }

    /// Renders a product as an AND of its terms. Empty products render to
    /// an empty string; callers treat that as "no filter".
    pub fn product(&mut self, product: &Product) -> String {
        let terms: Vec<String> = product.terms.iter().map(|t| self.term(t)).collect();
        terms.join(" AND ")
    }

    /// Renders a disjunction of products as the store-side filter string.
    ///
    /// Returns `None` when any product is empty: an always-true disjunct
    /// means no store-side filtering can narrow the result.
    pub fn disjunction(&mut self, products: &[Product]) -> Option<String> {
        if products.is_empty() || products.iter().any(|p| p.terms.is_empty()) {
            return None;
        }
        let rendered: Vec<String> = products.iter().map(|p| self.product(p)).collect();
        if rendered.len() == 1 {
            return rendered.into_iter().next();
        }
        let joined: Vec<String> = rendered.into_iter().map(|p| format!("({p})")).collect();
        Some(joined.join(" OR "))
    }

    /// Renders the key condition expression for a planned query.
    pub fn key_condition(&mut self, table: &TableDescriptor, key: &KeyCondition) -> String {
        let attr = table.partition_key_attribute(key.index());
        let value = table.partition_key_value(key.index(), key.partition_value());
        let name = self.name_ref(attr);
        let value_ref = self.value_ref(attr, value);
        let mut expr = format!("{name} = {value_ref}");

        if let Some((sort_attr, condition)) = key.sort() {
            let sort_name = self.name_ref(sort_attr);
            let clause = match condition {
                SortCondition::Eq(v) => {
                    format!("{sort_name} = {}", self.value_ref(sort_attr, v.clone()))
                }
                SortCondition::Lt(v) => {
                    format!("{sort_name} < {}", self.value_ref(sort_attr, v.clone()))
                }
                SortCondition::Le(v) => {
                    format!("{sort_name} <= {}", self.value_ref(sort_attr, v.clone()))
                }
                SortCondition::Gt(v) => {
                    format!("{sort_name} > {}", self.value_ref(sort_attr, v.clone()))
                }
                SortCondition::Ge(v) => {
                    format!("{sort_name} >= {}", self.value_ref(sort_attr, v.clone()))
                }
                SortCondition::Between(low, high) => {
                    let low_ref = self.value_ref(sort_attr, low.clone());
                    let high_ref = self.value_ref(sort_attr, high.clone());
                    format!("{sort_name} BETWEEN {low_ref} AND {high_ref}")
                }
                SortCondition::StartsWith(prefix) => {
                    let value = self.value_ref(sort_attr, NativeValue::S(prefix.clone()));
                    format!("begins_with({sort_name}, {value})")
                }
            };
            expr.push_str(" AND ");
            expr.push_str(&clause);
        }

        expr
    }

    /// Renders `attribute_not_exists(#attr)`.
    pub fn not_exists(&mut self, attr: &'static AttributeDescriptor) -> String {
        let name = self.name_ref(attr);
        format!("attribute_not_exists({name})")
    }

    /// Renders `begins_with(#attr, :attr_n)`.
    pub fn begins_with(&mut self, attr: &'static AttributeDescriptor, prefix: &str) -> String {
        let name = self.name_ref(attr);
        let value = self.value_ref(attr, NativeValue::string(prefix));
        format!("begins_with({name}, {value})")
    }

    /// Consumes the builder, yielding the name and value maps.
    #[must_use]
    pub fn into_parts(self) -> (HashMap<String, String>, HashMap<String, NativeValue>) {
        (self.names, self.values)
    }
}
