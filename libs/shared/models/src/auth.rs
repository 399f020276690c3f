use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Category of the acting party, used for authorization gating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequesterRole {
    Patient,
    Doctor,
    Admin,
    System,
}

impl RequesterRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequesterRole::Patient => "PATIENT",
            RequesterRole::Doctor => "DOCTOR",
            RequesterRole::Admin => "ADMIN",
            RequesterRole::System => "SYSTEM",
        }
    }

    /// Admin and system actors bypass ownership and time-window policies.
    pub fn is_privileged(&self) -> bool {
        matches!(self, RequesterRole::Admin | RequesterRole::System)
    }
}

impl fmt::Display for RequesterRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequesterRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PATIENT" => Ok(RequesterRole::Patient),
            "DOCTOR" => Ok(RequesterRole::Doctor),
            "ADMIN" => Ok(RequesterRole::Admin),
            "SYSTEM" => Ok(RequesterRole::System),
            other => Err(format!("Unknown requester role: {}", other)),
        }
    }
}

/// The verified principal behind a request. Authentication happens upstream;
/// by the time a `Requester` exists its identity is trusted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requester {
    pub id: String,
    pub role: RequesterRole,
}

impl Requester {
    pub const SYSTEM_ID: &'static str = "auto";

    pub fn new(id: impl Into<String>, role: RequesterRole) -> Self {
        Self { id: id.into(), role }
    }

    pub fn patient(id: impl ToString) -> Self {
        Self::new(id.to_string(), RequesterRole::Patient)
    }

    pub fn doctor(id: impl ToString) -> Self {
        Self::new(id.to_string(), RequesterRole::Doctor)
    }

    pub fn admin(id: impl ToString) -> Self {
        Self::new(id.to_string(), RequesterRole::Admin)
    }

    pub fn system() -> Self {
        Self::new(Self::SYSTEM_ID, RequesterRole::System)
    }

    /// Compares as UUIDs, so letter case in the header does not matter.
    /// An id that is not a UUID matches nothing.
    pub fn has_id(&self, id: Uuid) -> bool {
        Uuid::parse_str(self.id.trim()).map_or(false, |own| own == id)
    }

    /// Composite tag recorded in audit rows, e.g. `PATIENT_42`.
    pub fn audit_tag(&self) -> String {
        format!("{}_{}", self.role, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_parsing_is_case_insensitive() {
        assert_eq!("patient".parse::<RequesterRole>(), Ok(RequesterRole::Patient));
        assert_eq!(" Admin ".parse::<RequesterRole>(), Ok(RequesterRole::Admin));
        assert!("nurse".parse::<RequesterRole>().is_err());
    }

    #[test]
    fn test_audit_tag() {
        assert_eq!(Requester::patient(42).audit_tag(), "PATIENT_42");
        assert_eq!(Requester::system().audit_tag(), "SYSTEM_auto");
    }

    #[test]
    fn test_has_id_ignores_case() {
        let id = Uuid::new_v4();

        assert!(Requester::patient(id).has_id(id));
        assert!(Requester::patient(id.to_string().to_uppercase()).has_id(id));
        assert!(!Requester::patient(Uuid::new_v4()).has_id(id));
        assert!(!Requester::system().has_id(id));
    }
}
