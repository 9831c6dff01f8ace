// roster.rs — The active roster of employees.

use serde::{Deserialize, Serialize};

use crate::shift::EmployeeId;

/// An employee who can be scheduled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Employee {
    pub id: EmployeeId,
    pub name: String,
    #[serde(default)]
    pub role: String,
    #[serde(default = "default_skill_level")]
    pub skill_level: u8,
}

fn default_skill_level() -> u8 {
    1
}

impl Employee {
    pub fn new(id: EmployeeId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            role: String::new(),
            skill_level: default_skill_level(),
        }
    }
}

/// The set of employees rules and requests may reference.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Roster {
    employees: Vec<Employee>,
}

/// Outcome of looking an employee up by display name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameMatch {
    Found(EmployeeId),
    Ambiguous(Vec<String>),
    Missing,
}

impl Roster {
    pub fn new(employees: Vec<Employee>) -> Self {
        Self { employees }
    }

    pub fn employees(&self) -> &[Employee] {
        &self.employees
    }

    pub fn contains(&self, id: EmployeeId) -> bool {
        self.employees.iter().any(|e| e.id == id)
    }

    pub fn get(&self, id: EmployeeId) -> Option<&Employee> {
        self.employees.iter().find(|e| e.id == id)
    }

    pub fn is_empty(&self) -> bool {
        self.employees.is_empty()
    }

    pub fn len(&self) -> usize {
        self.employees.len()
    }

    /// Resolve a display name: a unique exact match wins, otherwise a unique
    /// substring match.
    pub fn match_name(&self, name: &str) -> NameMatch {
        let name = name.trim();
        if name.is_empty() {
            return NameMatch::Missing;
        }
        let exact: Vec<&Employee> = self.employees.iter().filter(|e| e.name == name).collect();
        if exact.len() == 1 {
            return NameMatch::Found(exact[0].id);
        }
        let partial: Vec<&Employee> = self
            .employees
            .iter()
            .filter(|e| e.name.contains(name))
            .collect();
        match partial.len() {
            0 => NameMatch::Missing,
            1 => NameMatch::Found(partial[0].id),
            _ => NameMatch::Ambiguous(partial.iter().map(|e| e.name.clone()).collect()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roster() -> Roster {
        Roster::new(vec![
            Employee::new(1, "Sato Hana"),
            Employee::new(2, "Sato Ken"),
            Employee::new(3, "Suzuki Aoi"),
        ])
    }

    #[test]
    fn exact_name_wins() {
        assert_eq!(roster().match_name("Sato Ken"), NameMatch::Found(2));
    }

    #[test]
    fn unique_partial_name_resolves() {
        assert_eq!(roster().match_name("Suzuki"), NameMatch::Found(3));
    }

    #[test]
    fn shared_partial_name_is_ambiguous() {
        match roster().match_name("Sato") {
            NameMatch::Ambiguous(names) => assert_eq!(names.len(), 2),
            other => panic!("expected ambiguity, got {:?}", other),
        }
        assert_eq!(roster().match_name("Tanaka"), NameMatch::Missing);
    }

    #[test]
    fn roster_serializes_as_plain_list() {
        let json = serde_json::to_string(&roster()).unwrap();
        assert!(json.starts_with('['));
        let restored: Roster = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.len(), 3);
        assert!(restored.contains(3));
    }
}
