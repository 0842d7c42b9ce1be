//! Predicate / projection / order rendering into PostgreSQL statements
//!
//! Parameters are numbered strictly in emission order across the whole
//! statement because the store binds them by position.

use crate::core::{Scalar, Statement};
use crate::naming::CaseTranslator;
use crate::schema::MatchingRules;

use super::descriptor::OrderBy;
use super::predicate::Predicate;

/// Positional parameter accumulator
#[derive(Debug, Default)]
pub struct ParamList {
    values: Vec<Scalar>,
}

impl ParamList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a value and return its placeholder (`$1`, `$2`, ...)
    pub fn push(&mut self, value: Scalar) -> String {
        self.values.push(value);
        format!("${}", self.values.len())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn into_values(self) -> Vec<Scalar> {
        self.values
    }
}

/// Keyset pagination anchor.
///
/// Precondition: `field` is the primary key, it is monotonically comparable,
/// and the caller orders by it; otherwise pages may skip or repeat rows.
#[derive(Debug, Clone, PartialEq)]
pub struct Cursor {
    pub field: String,
    pub after: Scalar,
}

/// A descriptor after validation, ready to render
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SelectQuery {
    pub predicate: Option<Predicate>,
    pub projection: Option<Vec<String>>,
    pub order_by: Vec<OrderBy>,
    pub cursor: Option<Cursor>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

struct Fragment {
    sql: String,
    /// An AND of two or more terms; needs parentheses inside an OR
    conjunctive: bool,
}

impl Fragment {
    fn leaf(sql: String) -> Self {
        Self {
            sql,
            conjunctive: false,
        }
    }
}

/// Renders predicates, projections and orderings for one entity
pub struct StatementBuilder<'a> {
    translator: &'a CaseTranslator,
    matching: &'a MatchingRules,
}

impl<'a> StatementBuilder<'a> {
    pub fn new(translator: &'a CaseTranslator, matching: &'a MatchingRules) -> Self {
        Self {
            translator,
            matching,
        }
    }

    /// Quoted column for an API field name
    pub fn column(&self, field: &str) -> String {
        quote_ident(&self.translator.to_column(field))
    }

    fn case_insensitive(&self, field: &str) -> bool {
        self.matching
            .is_case_insensitive(&self.translator.to_column(field))
    }

    /// Render a predicate; `None` means the predicate matches every row
    pub fn where_clause(&self, predicate: &Predicate, params: &mut ParamList) -> Option<String> {
        self.render(predicate, params).map(|f| f.sql)
    }

    fn render(&self, predicate: &Predicate, params: &mut ParamList) -> Option<Fragment> {
        match predicate {
            Predicate::Eq { field, value } => {
                let column = self.column(field);
                let sql = if self.case_insensitive(field) && matches!(value, Scalar::Text(_)) {
                    format!("lower({}) = lower({})", column, params.push(value.clone()))
                } else {
                    format!("{} = {}", column, params.push(value.clone()))
                };
                Some(Fragment::leaf(sql))
            }
            Predicate::EqInsensitive { field, value } => Some(Fragment::leaf(format!(
                "lower({}) = lower({})",
                self.column(field),
                params.push(value.clone())
            ))),
            Predicate::IsNull { field } => {
                Some(Fragment::leaf(format!("{} IS NULL", self.column(field))))
            }
            Predicate::Contains {
                field,
                pattern,
                case_insensitive,
            } => {
                let operator = if *case_insensitive { "ILIKE" } else { "LIKE" };
                let placeholder = params.push(Scalar::Text(format!("%{}%", escape_like(pattern))));
                Some(Fragment::leaf(format!(
                    "{} {} {}",
                    self.column(field),
                    operator,
                    placeholder
                )))
            }
            Predicate::In { field, values } => {
                if values.is_empty() {
                    return Some(Fragment::leaf("FALSE".to_string()));
                }
                let lower = self.case_insensitive(field)
                    && values.iter().all(|v| matches!(v, Scalar::Text(_)));
                let placeholders: Vec<String> = values
                    .iter()
                    .map(|v| {
                        let placeholder = params.push(v.clone());
                        if lower {
                            format!("lower({})", placeholder)
                        } else {
                            placeholder
                        }
                    })
                    .collect();
                let column = if lower {
                    format!("lower({})", self.column(field))
                } else {
                    self.column(field)
                };
                Some(Fragment::leaf(format!(
                    "{} IN ({})",
                    column,
                    placeholders.join(", ")
                )))
            }
            Predicate::Compare { field, op, value } => Some(Fragment::leaf(format!(
                "{} {} {}",
                self.column(field),
                op,
                params.push(value.clone())
            ))),
            Predicate::And(children) => {
                let parts: Vec<String> = children
                    .iter()
                    .filter_map(|child| self.render(child, params))
                    .map(|f| f.sql)
                    .collect();
                match parts.len() {
                    0 => None,
                    n => Some(Fragment {
                        sql: parts.join(" AND "),
                        conjunctive: n > 1,
                    }),
                }
            }
            Predicate::Or(branches) => {
                if branches.is_empty() {
                    return Some(Fragment::leaf("FALSE".to_string()));
                }
                let parts: Vec<String> = branches
                    .iter()
                    .map(|branch| match self.render(branch, params) {
                        None => "TRUE".to_string(),
                        Some(f) if f.conjunctive => format!("({})", f.sql),
                        Some(f) => f.sql,
                    })
                    .collect();
                Some(Fragment::leaf(format!("({})", parts.join(" OR "))))
            }
        }
    }

    /// Column list for a projection; `None` (or empty) selects every column
    pub fn projection(&self, fields: Option<&[String]>) -> String {
        match fields {
            Some(fields) if !fields.is_empty() => fields
                .iter()
                .map(|f| self.column(f))
                .collect::<Vec<_>>()
                .join(", "),
            _ => "*".to_string(),
        }
    }

    /// `ORDER BY` body; nulls always sort last
    pub fn order_clause(&self, order: &[OrderBy]) -> Option<String> {
        if order.is_empty() {
            return None;
        }
        Some(
            order
                .iter()
                .map(|o| format!("{} {} NULLS LAST", self.column(&o.field), o.direction))
                .collect::<Vec<_>>()
                .join(", "),
        )
    }

    /// Full `SELECT` statement for a table
    pub fn select(&self, table: &str, query: &SelectQuery) -> Statement {
        let mut params = ParamList::new();
        let mut sql = format!(
            "SELECT {} FROM {}",
            self.projection(query.projection.as_deref()),
            quote_ident(table)
        );

        // The cursor goes last so its parameter takes the final slot
        let mut predicate = query.predicate.clone().unwrap_or_else(Predicate::all);
        if let Some(cursor) = &query.cursor {
            predicate = predicate.and(Predicate::Compare {
                field: cursor.field.clone(),
                op: super::predicate::CompareOp::Gt,
                value: cursor.after.clone(),
            });
        }
        if let Some(clause) = self.where_clause(&predicate, &mut params) {
            sql.push_str(" WHERE ");
            sql.push_str(&clause);
        }
        if let Some(order) = self.order_clause(&query.order_by) {
            sql.push_str(" ORDER BY ");
            sql.push_str(&order);
        }
        if let Some(limit) = query.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }
        if let Some(offset) = query.offset.filter(|o| *o > 0) {
            sql.push_str(&format!(" OFFSET {}", offset));
        }

        Statement::new(sql, params.into_values())
    }

    /// `SELECT COUNT(*)` over the rows matching `predicate`
    pub fn count(&self, table: &str, predicate: &Predicate) -> Statement {
        let mut params = ParamList::new();
        let mut sql = format!("SELECT COUNT(*) AS \"count\" FROM {}", quote_ident(table));
        if let Some(clause) = self.where_clause(predicate, &mut params) {
            sql.push_str(" WHERE ");
            sql.push_str(&clause);
        }
        Statement::new(sql, params.into_values())
    }
}

/// Double-quote an identifier, doubling embedded quotes
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Escape LIKE wildcards so the pattern matches literally
pub fn escape_like(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len());
    for c in pattern.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
