//! Matrix data sources
//!
//! Cartesian product of per-parameter value sets minus declared exclusions.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::DataError;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MatrixParameter {
    pub name: String,
    pub values: Vec<Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MatrixSpec {
    pub parameters: Vec<MatrixParameter>,
    /// Positional tuples removed from the product
    pub exclusions: Vec<Vec<Value>>,
}

impl MatrixSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn param<I, V>(mut self, name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.parameters.push(MatrixParameter {
            name: name.into(),
            values: values.into_iter().map(Into::into).collect(),
        });
        self
    }

    pub fn exclude<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.exclusions
            .push(values.into_iter().map(Into::into).collect());
        self
    }

    /// Static checks: exclusion arity and non-empty parameters
    pub fn validate(&self) -> Result<(), DataError> {
        if let Some(param) = self.parameters.iter().find(|p| p.values.is_empty()) {
            return Err(DataError::EmptyMatrixParameter(param.name.clone()));
        }

        let expected = self.parameters.len();
        if let Some(bad) = self.exclusions.iter().find(|e| e.len() != expected) {
            return Err(DataError::ExclusionArity {
                expected,
                found: bad.len(),
            });
        }
        Ok(())
    }

    /// All surviving combinations, first parameter varying slowest
    pub fn combinations(&self) -> Result<Vec<Vec<Value>>, DataError> {
        self.validate()?;

        let sets: Vec<Vec<Value>> = self.parameters.iter().map(|p| p.values.clone()).collect();
        Ok(cartesian(&sets)
            .into_iter()
            .filter(|combo| !self.exclusions.iter().any(|ex| ex == combo))
            .collect())
    }
}

/// Cartesian product of `sets`, first set varying slowest
pub fn cartesian<T: Clone>(sets: &[Vec<T>]) -> Vec<Vec<T>> {
    if sets.is_empty() {
        return Vec::new();
    }

    sets.iter().fold(vec![Vec::new()], |acc, set| {
        acc.iter()
            .flat_map(|prefix| {
                set.iter().map(move |item| {
                    let mut combo = prefix.clone();
                    combo.push(item.clone());
                    combo
                })
            })
            .collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_full_product() {
        let matrix = MatrixSpec::new().param("a", [1, 2, 3]).param("b", [10, 20]);
        let combos = matrix.combinations().unwrap();

        assert_eq!(combos.len(), 6);
        assert_eq!(combos[0], vec![json!(1), json!(10)]);
        assert_eq!(combos[5], vec![json!(3), json!(20)]);
    }

    #[test]
    fn test_exclusion_removes_exact_tuple() {
        let matrix = MatrixSpec::new()
            .param("a", [1, 2, 3])
            .param("b", [10, 20])
            .exclude([1, 10]);
        let combos = matrix.combinations().unwrap();

        assert_eq!(combos.len(), 5);
        assert!(!combos.contains(&vec![json!(1), json!(10)]));
        assert!(combos.contains(&vec![json!(1), json!(20)]));
        assert!(combos.contains(&vec![json!(2), json!(10)]));
    }

    #[test]
    fn test_exclusion_with_array_values() {
        let matrix = MatrixSpec::new()
            .param("xs", [json!([1, 2]), json!([3])])
            .param("flag", [true, false])
            .exclude([json!([1, 2]), json!(false)]);
        let combos = matrix.combinations().unwrap();

        assert_eq!(combos.len(), 3);
        assert!(!combos.contains(&vec![json!([1, 2]), json!(false)]));
    }

    #[test]
    fn test_exclusion_arity_mismatch() {
        let matrix = MatrixSpec::new()
            .param("a", [1, 2])
            .param("b", [3])
            .exclude([1]);
        assert_eq!(
            matrix.combinations().unwrap_err(),
            DataError::ExclusionArity {
                expected: 2,
                found: 1
            }
        );
    }

    #[test]
    fn test_empty_parameter_rejected() {
        let matrix = MatrixSpec::new().param("a", Vec::<i32>::new());
        assert!(matches!(
            matrix.validate(),
            Err(DataError::EmptyMatrixParameter(_))
        ));
    }

    #[test]
    fn test_cartesian_of_nothing() {
        assert!(cartesian::<i32>(&[]).is_empty());
        assert_eq!(cartesian(&[vec![1, 2]]), vec![vec![1], vec![2]]);
    }
}
