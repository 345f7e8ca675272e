use std::fmt;
use std::ops::Bound;
use serde::{Deserialize, Serialize};
use crate::index::inverted::Term;

/// Main query enum representing all query types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Query {
    Term(TermQuery),         // Single term search
    Phrase(PhraseQuery),     // Exact phrase match
    Range(RangeQuery),       // Numeric range
    And(Vec<Query>),         // Every clause matches
    Or(Vec<Query>),          // At least one clause matches; empty matches nothing
    Not(Box<Query>),         // Live documents the clause does not match
    MatchAll,                // Match all documents
}

/// Single term query; `value` is already analyzed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TermQuery {
    pub field: String,
    pub value: String,
}

impl TermQuery {
    pub fn term(&self) -> Term {
        Term::new(&self.field, &self.value)
    }
}

/// Phrase query for exact phrase matching
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhraseQuery {
    pub field: String,
    pub terms: Vec<String>,
    pub offsets: Vec<u32>,   // position of each term relative to the first
}

impl PhraseQuery {
    pub fn terms(&self) -> impl Iterator<Item = Term> + '_ {
        self.terms.iter().map(move |t| Term::new(&self.field, t))
    }
}

/// Range query for numeric fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangeQuery {
    pub field: String,
    pub lower: Bound<f64>,
    pub upper: Bound<f64>,
}

impl RangeQuery {
    pub fn contains(&self, value: f64) -> bool {
        let above = match self.lower {
            Bound::Included(lo) => value >= lo,
            Bound::Excluded(lo) => value > lo,
            Bound::Unbounded => true,
        };
        let below = match self.upper {
            Bound::Included(hi) => value <= hi,
            Bound::Excluded(hi) => value < hi,
            Bound::Unbounded => true,
        };
        above && below
    }
}

impl Query {
    /// Nesting depth; a leaf has depth 1
    pub fn depth(&self) -> usize {
        match self {
            Query::And(clauses) | Query::Or(clauses) => {
                1 + clauses.iter().map(Query::depth).max().unwrap_or(0)
            }
            Query::Not(inner) => 1 + inner.depth(),
            _ => 1,
        }
    }

    /// Number of nodes in the tree
    pub fn clause_count(&self) -> usize {
        match self {
            Query::And(clauses) | Query::Or(clauses) => {
                1 + clauses.iter().map(Query::clause_count).sum::<usize>()
            }
            Query::Not(inner) => 1 + inner.clause_count(),
            _ => 1,
        }
    }

    /// Every term whose postings evaluation reads, negated ones included
    pub fn collect_terms(&self, out: &mut Vec<Term>) {
        match self {
            Query::Term(q) => out.push(q.term()),
            Query::Phrase(q) => out.extend(q.terms()),
            Query::And(clauses) | Query::Or(clauses) => {
                for clause in clauses {
                    clause.collect_terms(out);
                }
            }
            Query::Not(inner) => inner.collect_terms(out),
            Query::Range(_) | Query::MatchAll => {}
        }
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Query::Term(q) => write!(f, "{}:{}", q.field, q.value),
            Query::Phrase(q) => write!(f, "{}:\"{}\"", q.field, q.terms.join(" ")),
            Query::Range(q) => {
                let (open, lo) = match q.lower {
                    Bound::Included(v) => ('[', v.to_string()),
                    Bound::Excluded(v) => ('{', v.to_string()),
                    Bound::Unbounded => ('[', "*".to_string()),
                };
                let (close, hi) = match q.upper {
                    Bound::Included(v) => (']', v.to_string()),
                    Bound::Excluded(v) => ('}', v.to_string()),
                    Bound::Unbounded => (']', "*".to_string()),
                };
                write!(f, "{}:{}{} TO {}{}", q.field, open, lo, hi, close)
            }
            Query::And(clauses) => write_group(f, "AND", clauses),
            Query::Or(clauses) => write_group(f, "OR", clauses),
            Query::Not(inner) => write!(f, "NOT {}", inner),
            Query::MatchAll => write!(f, "*"),
        }
    }
}

fn write_group(f: &mut fmt::Formatter<'_>, op: &str, clauses: &[Query]) -> fmt::Result {
    write!(f, "(")?;
    for (i, clause) in clauses.iter().enumerate() {
        if i > 0 {
            write!(f, " {} ", op)?;
        }
        write!(f, "{}", clause)?;
    }
    write!(f, ")")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn term(field: &str, value: &str) -> Query {
        Query::Term(TermQuery {
            field: field.into(),
            value: value.into(),
        })
    }

    #[test]
    fn test_shape_metrics() {
        let q = Query::And(vec![
            term("body", "fox"),
            Query::Not(Box::new(Query::Or(vec![term("body", "dog"), term("body", "cat")]))),
        ]);
        assert_eq!(q.depth(), 4);
        assert_eq!(q.clause_count(), 6);

        let mut terms = Vec::new();
        q.collect_terms(&mut terms);
        assert_eq!(
            terms,
            vec![Term::new("body", "fox"), Term::new("body", "dog"), Term::new("body", "cat")]
        );
        assert_eq!(q.to_string(), "(body:fox AND NOT (body:dog OR body:cat))");
    }

    #[test]
    fn test_range_bounds() {
        let range = RangeQuery {
            field: "price".into(),
            lower: Bound::Included(10.0),
            upper: Bound::Excluded(20.0),
        };
        assert!(range.contains(10.0));
        assert!(range.contains(19.9));
        assert!(!range.contains(20.0));

        let open = RangeQuery {
            field: "price".into(),
            lower: Bound::Unbounded,
            upper: Bound::Included(0.0),
        };
        assert!(open.contains(-1e9));
        assert_eq!(Query::Range(open).to_string(), "price:[* TO 0]");
    }
}
