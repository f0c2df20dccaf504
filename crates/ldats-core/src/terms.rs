//! Predictor term sets resolved against dataset columns.

use serde::{Deserialize, Serialize};

use crate::errors::{ErrorInfo, LdatsError};

/// Display name used for the intercept column of the design matrix.
pub const INTERCEPT_NAME: &str = "(Intercept)";

/// Ordered set of named predictor terms plus an intercept flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermSet {
    intercept: bool,
    terms: Vec<String>,
}

impl TermSet {
    /// Intercept-only model (`~ 1`).
    pub fn intercept_only() -> Self {
        Self {
            intercept: true,
            terms: Vec::new(),
        }
    }

    /// Builds a term set, rejecting duplicate or empty names.
    pub fn new(intercept: bool, terms: Vec<String>) -> Result<Self, LdatsError> {
        for (idx, term) in terms.iter().enumerate() {
            if term.trim().is_empty() {
                return Err(LdatsError::Config(
                    ErrorInfo::new("empty-term", "predictor term names must be non-empty")
                        .with_context("position", idx),
                ));
            }
            if terms[..idx].contains(term) {
                return Err(LdatsError::Config(
                    ErrorInfo::new("duplicate-term", "predictor term listed twice")
                        .with_context("term", term),
                ));
            }
        }
        let set = Self { intercept, terms };
        if set.len() == 0 {
            return Err(LdatsError::config(
                "empty-design",
                "a model needs an intercept or at least one predictor term",
            ));
        }
        Ok(set)
    }

    /// Parses a compact formula such as `"gamma ~ 1 + x"`, `"~ x - 1"` or `"~ 1"`.
    ///
    /// Only additive main effects are understood; anything else is a
    /// configuration error.
    pub fn parse(formula: &str) -> Result<Self, LdatsError> {
        let rhs = match formula.split_once('~') {
            Some((_, rhs)) => rhs,
            None => formula,
        };
        let mut intercept = true;
        let mut terms = Vec::new();
        let normalized = rhs.replace('-', "+-");
        for raw in normalized.split('+') {
            let token: String = raw.split_whitespace().collect();
            match token.as_str() {
                "" | "1" => {}
                "0" | "-1" => intercept = false,
                other if other.starts_with('-') => {
                    return Err(LdatsError::Config(
                        ErrorInfo::new("unsupported-term", "only the intercept may be removed")
                            .with_context("term", other)
                            .with_context("formula", formula),
                    ));
                }
                name => {
                    if !name
                        .chars()
                        .all(|ch| ch.is_alphanumeric() || ch == '_' || ch == '.')
                    {
                        return Err(LdatsError::Config(
                            ErrorInfo::new("unsupported-term", "term is not a plain column name")
                                .with_context("term", name)
                                .with_context("formula", formula)
                                .with_hint("interactions and transforms must be precomputed"),
                        ));
                    }
                    terms.push(name.to_string());
                }
            }
        }
        Self::new(intercept, terms)
    }

    /// Whether the design includes an intercept column.
    pub fn has_intercept(&self) -> bool {
        self.intercept
    }

    /// Named (non-intercept) terms in order.
    pub fn terms(&self) -> &[String] {
        &self.terms
    }

    /// Number of design-matrix columns.
    pub fn len(&self) -> usize {
        self.terms.len() + usize::from(self.intercept)
    }

    /// True when the design has no columns at all.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Design column names, intercept first.
    pub fn column_names(&self) -> Vec<String> {
        let mut names = Vec::with_capacity(self.len());
        if self.intercept {
            names.push(INTERCEPT_NAME.to_string());
        }
        names.extend(self.terms.iter().cloned());
        names
    }

    /// Resolves each named term to its index within `columns`.
    pub fn resolve(&self, columns: &[String]) -> Result<Vec<usize>, LdatsError> {
        self.terms
            .iter()
            .map(|term| {
                columns.iter().position(|name| name == term).ok_or_else(|| {
                    LdatsError::Config(
                        ErrorInfo::new("unknown-term", "predictor term not found in dataset")
                            .with_context("term", term)
                            .with_context("columns", columns.join(",")),
                    )
                })
            })
            .collect()
    }
}

impl Default for TermSet {
    fn default() -> Self {
        Self::intercept_only()
    }
}
