//! Department-scoped status-code table.
//!
//! Radio codes resolve to exactly one canonical unit status per department.
//! The table is built once at configuration-load time; resolution never falls
//! back to string inference, and unknown codes are rejected outright.

use anyhow::Context;
use serde::Deserialize;
use std::collections::HashMap;

use crate::error::DispatchError;
use crate::types::{Department, UnitStatus};

/// A resolved code: the normalized form plus the canonical status it maps to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeResolution {
    pub code: String,
    pub status: UnitStatus,
}

#[derive(Debug, Deserialize)]
struct CodeEntry {
    code: String,
    status: UnitStatus,
}

#[derive(Debug, Deserialize)]
struct CodeFile {
    #[serde(default)]
    police: Vec<CodeEntry>,
    #[serde(default)]
    fire: Vec<CodeEntry>,
    #[serde(default)]
    ems: Vec<CodeEntry>,
}

/// The built-in table, used when no `STATUS_CODE_FILE` is configured.
const DEFAULT_CODES: &str = r#"
{
  "police": [
    { "code": "10-8",  "status": "available" },
    { "code": "10-7",  "status": "out_of_service" },
    { "code": "10-76", "status": "enroute" },
    { "code": "10-97", "status": "on_scene" },
    { "code": "10-6",  "status": "busy" },
    { "code": "10-33", "status": "panic" }
  ],
  "fire": [
    { "code": "10-8",      "status": "available" },
    { "code": "10-7",      "status": "out_of_service" },
    { "code": "RESPONDING", "status": "enroute" },
    { "code": "ON-SCENE",  "status": "on_scene" },
    { "code": "WORKING",   "status": "busy" },
    { "code": "MAYDAY",    "status": "panic" }
  ],
  "ems": [
    { "code": "10-8",         "status": "available" },
    { "code": "10-7",         "status": "out_of_service" },
    { "code": "10-76",        "status": "enroute" },
    { "code": "10-97",        "status": "on_scene" },
    { "code": "TRANSPORTING", "status": "busy" },
    { "code": "10-33",        "status": "panic" }
  ]
}
"#;

/// Lookup table mapping `(department, code)` to a canonical status.
#[derive(Debug, Clone)]
pub struct StatusCodeRegistry {
    codes: HashMap<(Department, String), UnitStatus>,
}

impl StatusCodeRegistry {
    /// Build the registry from a JSON document. Duplicate codes within a
    /// department are a configuration error, not a last-entry-wins surprise.
    pub fn from_json(json: &str) -> crate::error::Result<Self> {
        let file: CodeFile = serde_json::from_str(json)
            .map_err(|e| DispatchError::Validation(format!("invalid status code table: {e}")))?;

        let mut codes = HashMap::new();
        let departments = [
            (Department::Police, file.police),
            (Department::Fire, file.fire),
            (Department::Ems, file.ems),
        ];
        for (department, entries) in departments {
            for entry in entries {
                let key = (department, normalize(&entry.code));
                if codes.insert(key, entry.status).is_some() {
                    return Err(DispatchError::Validation(format!(
                        "duplicate status code \"{}\" for {department}",
                        entry.code
                    )));
                }
            }
        }

        Ok(Self { codes })
    }

    /// Build the registry from a JSON file on disk.
    pub fn from_file(path: &str) -> crate::error::Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read status code file {path}"))?;
        Self::from_json(&json)
    }

    /// File if configured, built-in table otherwise.
    pub fn load(path: Option<&str>) -> crate::error::Result<Self> {
        match path {
            Some(p) => Self::from_file(p),
            None => Ok(Self::default_table()),
        }
    }

    /// The compiled-in default table.
    pub fn default_table() -> Self {
        Self::from_json(DEFAULT_CODES).expect("built-in status code table must parse")
    }

    /// Resolve a raw broadcast code for a department. Matching is trimmed and
    /// case-insensitive; a code unknown to the department is rejected, never
    /// mapped to a default state.
    pub fn resolve(
        &self,
        department: Department,
        code: &str,
    ) -> crate::error::Result<CodeResolution> {
        let normalized = normalize(code);
        match self.codes.get(&(department, normalized.clone())) {
            Some(status) => Ok(CodeResolution {
                code: normalized,
                status: *status,
            }),
            None => Err(DispatchError::UnknownStatusCode {
                department,
                code: code.trim().to_string(),
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }
}

fn normalize(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}
