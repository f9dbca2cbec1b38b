//! Witness policy configuration and its textual form.
//!
//! A policy is a single line of whitespace-separated clauses:
//!
//! ```text
//! MinPercent(N,batch|system)   minimum percentage of the class, over the
//!                              whole fleet of that class
//! MinNumber(N,batch|system)    minimum count of the class
//! OutOf(N,batch|system)        alias of MinNumber
//! LogRequired                  only witnesses with a transparency log count
//! AND | OR                     how the two class conditions combine
//! ```
//!
//! The operator defaults to `AND`; at most one operator clause may appear.
//! The empty policy parses to "no requirements" and is always satisfied.

use std::fmt;

use anchor_core::WitnessType;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const MAX_PERCENT: usize = 100;

/// Errors raised while parsing a policy expression.
///
/// A parse failure is fatal to the current call only; nothing is cached, so
/// a corrected policy takes effect on the next read.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PolicyParseError {
    #[error("unknown policy clause: {0}")]
    UnknownClause(String),

    #[error("invalid count in {clause} clause: {value}")]
    InvalidNumber { clause: String, value: String },

    #[error("percent must be between 0 and 100, got {0}")]
    PercentOutOfRange(usize),

    #[error("policy may specify at most one operator")]
    DuplicateOperator,

    #[error("unknown witness class: {0}")]
    UnknownClass(String),
}

/// How the batch and system class conditions combine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Operator {
    #[default]
    And,
    Or,
}

/// Parsed form of a witness policy expression.
///
/// A class with `min_number == 0` and no percent constraint is trivially
/// satisfied. Percent constraints are evaluated over the whole fleet of a
/// class, not over the currently eligible survivors.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyConfig {
    pub min_number_batch: usize,
    pub min_percent_batch: Option<u8>,
    pub min_number_system: usize,
    pub min_percent_system: Option<u8>,
    pub log_required: bool,
    pub operator: Operator,
}

impl PolicyConfig {
    /// Parse a policy expression.
    pub fn parse(policy: &str) -> Result<Self, PolicyParseError> {
        let mut config = Self::default();
        let mut operator_seen = false;

        for token in policy.split_whitespace() {
            match token {
                "LogRequired" => config.log_required = true,
                "AND" | "OR" => {
                    if operator_seen {
                        return Err(PolicyParseError::DuplicateOperator);
                    }
                    operator_seen = true;
                    config.operator = if token == "AND" {
                        Operator::And
                    } else {
                        Operator::Or
                    };
                }
                _ => config.apply_clause(token)?,
            }
        }

        Ok(config)
    }

    fn apply_clause(&mut self, token: &str) -> Result<(), PolicyParseError> {
        let unknown = || PolicyParseError::UnknownClause(token.to_string());

        let (keyword, rest) = token.split_once('(').ok_or_else(unknown)?;
        let args = rest.strip_suffix(')').ok_or_else(unknown)?;
        let (count, class) = args.split_once(',').ok_or_else(unknown)?;

        let count: usize =
            count
                .parse()
                .map_err(|_| PolicyParseError::InvalidNumber {
                    clause: keyword.to_string(),
                    value: count.to_string(),
                })?;

        let class = match class {
            "batch" => WitnessType::Batch,
            "system" => WitnessType::System,
            other => return Err(PolicyParseError::UnknownClass(other.to_string())),
        };

        match keyword {
            "MinPercent" => {
                if count > MAX_PERCENT {
                    return Err(PolicyParseError::PercentOutOfRange(count));
                }
                match class {
                    WitnessType::Batch => self.min_percent_batch = Some(count as u8),
                    WitnessType::System => self.min_percent_system = Some(count as u8),
                }
            }
            "MinNumber" | "OutOf" => match class {
                WitnessType::Batch => self.min_number_batch = count,
                WitnessType::System => self.min_number_system = count,
            },
            _ => return Err(unknown()),
        }

        Ok(())
    }

    /// Minimum count configured for a class.
    pub fn min_number(&self, class: WitnessType) -> usize {
        match class {
            WitnessType::Batch => self.min_number_batch,
            WitnessType::System => self.min_number_system,
        }
    }

    /// Percent constraint configured for a class, if any.
    pub fn min_percent(&self, class: WitnessType) -> Option<u8> {
        match class {
            WitnessType::Batch => self.min_percent_batch,
            WitnessType::System => self.min_percent_system,
        }
    }
}

impl fmt::Display for PolicyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut clauses = Vec::new();

        if self.min_number_batch > 0 {
            clauses.push(format!("MinNumber({},batch)", self.min_number_batch));
        }
        if let Some(p) = self.min_percent_batch {
            clauses.push(format!("MinPercent({p},batch)"));
        }
        if self.min_number_system > 0 {
            clauses.push(format!("MinNumber({},system)", self.min_number_system));
        }
        if let Some(p) = self.min_percent_system {
            clauses.push(format!("MinPercent({p},system)"));
        }
        if self.log_required {
            clauses.push("LogRequired".to_string());
        }
        if self.operator == Operator::Or {
            clauses.push("OR".to_string());
        }

        f.write_str(&clauses.join(" "))
    }
}
