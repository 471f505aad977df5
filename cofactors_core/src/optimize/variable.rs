//! Module providing representation of optimization problem variables
use std::fmt::{Display, Formatter};

/// A continuous variable of an optimization problem
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    /// Identifier of the variable, unique within a problem
    pub id: String,
    /// Lowest value the variable can take, may be `f64::NEG_INFINITY`
    pub lower_bound: f64,
    /// Highest value the variable can take, may be `f64::INFINITY`
    pub upper_bound: f64,
    /// Position of the variable in the problem
    pub(crate) index: usize,
}

impl Variable {
    pub(crate) fn new(id: &str, lower_bound: f64, upper_bound: f64, index: usize) -> Variable {
        Variable {
            id: id.to_string(),
            lower_bound,
            upper_bound,
            index,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }
}

impl Display for Variable {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} <= {} <= {}", self.lower_bound, self.id, self.upper_bound)
    }
}
