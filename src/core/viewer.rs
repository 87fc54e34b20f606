//! # Viewer Context
//!
//! Identity and role of whoever is observing a patient's schedule. Passed
//! explicitly into every evaluation instead of being read from a global store.
//!
//! - **Version**: 1.0.0
//! - **Since**: 1.0.0
//! - **Toggleable**: false

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Patient,
    Caretaker,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Patient => "patient",
            Role::Caretaker => "caretaker",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "patient" => Ok(Role::Patient),
            "caretaker" => Ok(Role::Caretaker),
            other => Err(anyhow::anyhow!("Unknown role: {}", other)),
        }
    }
}

/// The observing identity plus the patient whose schedule it watches
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewer {
    pub user_id: String,
    pub role: Role,
    /// Patient whose medications and taken-status are consulted
    pub patient_id: String,
}

impl Viewer {
    pub fn new(user_id: impl Into<String>, role: Role, patient_id: impl Into<String>) -> Self {
        Viewer {
            user_id: user_id.into(),
            role,
            patient_id: patient_id.into(),
        }
    }

    /// A caretaker watching a patient
    pub fn caretaker(user_id: impl Into<String>, patient_id: impl Into<String>) -> Self {
        Self::new(user_id, Role::Caretaker, patient_id)
    }

    /// A patient looking at their own schedule
    pub fn patient(user_id: impl Into<String>) -> Self {
        let user_id = user_id.into();
        Self::new(user_id.clone(), Role::Patient, user_id)
    }

    pub fn is_caretaker(&self) -> bool {
        self.role == Role::Caretaker
    }

    /// Monitoring needs a non-empty identity holding the caretaker role
    pub fn can_monitor(&self) -> bool {
        !self.user_id.trim().is_empty() && self.is_caretaker()
    }
}
