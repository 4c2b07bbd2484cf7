//! Named environment objects.

use std::collections::BTreeMap;
use std::fmt;

use gaitplan_types::{PlanError, Pose2};

use crate::document::ObjectSpec;

/// World poses of the objects a plan refers to by name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Environment {
    objects: BTreeMap<String, Pose2>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from decoded object specs, rejecting duplicate names.
    pub fn from_specs(specs: &[ObjectSpec]) -> Result<Self, PlanError> {
        let mut env = Self::new();
        for spec in specs {
            let [x, y, theta] = spec.position;
            env.add(&spec.name, Pose2::new(x, y, theta))?;
        }
        Ok(env)
    }

    pub fn add(&mut self, name: &str, pose: Pose2) -> Result<(), PlanError> {
        if self.objects.contains_key(name) {
            return Err(PlanError::DuplicateObject(name.to_string()));
        }
        self.objects.insert(name.to_string(), pose);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<Pose2, PlanError> {
        self.objects
            .get(name)
            .copied()
            .ok_or_else(|| PlanError::UnknownObject(name.to_string()))
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, pose) in &self.objects {
            writeln!(f, "  {name} at {pose}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn object(name: &str, x: f64) -> ObjectSpec {
        ObjectSpec {
            name: name.into(),
            position: [x, 0.0, 0.0],
        }
    }

    #[test]
    fn lookup_by_name() {
        let env = Environment::from_specs(&[object("door", 3.0), object("table", 1.0)]).unwrap();
        assert_eq!(env.len(), 2);
        assert_eq!(env.get("door").unwrap(), Pose2::new(3.0, 0.0, 0.0));
        assert_eq!(
            env.get("window").unwrap_err(),
            PlanError::UnknownObject("window".into())
        );
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let err = Environment::from_specs(&[object("door", 3.0), object("door", 1.0)]).unwrap_err();
        assert_eq!(err, PlanError::DuplicateObject("door".into()));
    }
}
