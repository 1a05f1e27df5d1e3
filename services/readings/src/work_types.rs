use serde::Serialize;

/// Inspection category partitioning the bucket namespace
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkType {
    /// Four-character code, also the bucket segment for non-primary types
    pub code: &'static str,
    pub name: &'static str,
    /// Condition codes an inspector may attach to a session of this type
    pub condition_codes: &'static [&'static str],
}

const WORK_TYPES: &[WorkType] = &[
    WorkType {
        code: "INTR",
        name: "Intrusive Inspection",
        condition_codes: &["CORROSION", "STRUCTURAL_DAMAGE", "COATING_FAILURE"],
    },
    WorkType {
        code: "GO95",
        name: "GO95 Electrical Pole Inspection",
        condition_codes: &[
            "NEST_ON_POLE",
            "BROKEN_INSULATOR",
            "DAMAGED_CROSSARM",
            "LEANING_POLE",
            "WOODPECKER_DAMAGE",
        ],
    },
    WorkType {
        code: "RISR",
        name: "Riser Inspection",
        condition_codes: &[
            "RISER_TOO_LOW",
            "NIPPLE_DAMAGED",
            "CORROSION_AT_BASE",
            "IMPROPER_SUPPORT",
        ],
    },
    WorkType {
        code: "LEAK",
        name: "Leak Inspection",
        condition_codes: &[
            "GAS_LEAK_DETECTED",
            "PIPE_CORROSION",
            "JOINT_FAILURE",
            "VALVE_LEAK",
        ],
    },
    WorkType {
        code: "METR",
        name: "Meter Reading",
        condition_codes: &["CORRECT", "INCORRECT", "NOT_SURE", "NO_DIALS"],
    },
];

/// Known work types plus the one used when a request names none
#[derive(Debug, Clone)]
pub struct WorkTypeCatalog {
    primary: String,
}

impl WorkTypeCatalog {
    pub fn new(primary: impl Into<String>) -> Self {
        Self {
            primary: primary.into(),
        }
    }

    pub fn all(&self) -> &'static [WorkType] {
        WORK_TYPES
    }

    pub fn get(&self, code: &str) -> Option<&'static WorkType> {
        WORK_TYPES.iter().find(|w| w.code == code)
    }

    pub fn contains(&self, code: &str) -> bool {
        self.get(code).is_some()
    }

    pub fn primary(&self) -> &str {
        &self.primary
    }

    /// Resolve an optional requested code: absent means the primary type,
    /// an unknown code is rejected
    pub fn resolve(&self, requested: Option<&str>) -> Result<String, String> {
        match requested {
            None | Some("") => Ok(self.primary.clone()),
            Some(code) if self.contains(code) => Ok(code.to_string()),
            Some(code) => Err(format!("Unknown work type '{}'", code)),
        }
    }

    pub fn name_of(&self, code: &str) -> Option<&'static str> {
        self.get(code).map(|w| w.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_lookup() {
        let catalog = WorkTypeCatalog::new("METR");
        assert_eq!(catalog.all().len(), 5);
        assert_eq!(catalog.name_of("GO95"), Some("GO95 Electrical Pole Inspection"));
        assert!(catalog.get("XXXX").is_none());
    }

    #[test]
    fn test_resolve() {
        let catalog = WorkTypeCatalog::new("METR");
        assert_eq!(catalog.resolve(None).unwrap(), "METR");
        assert_eq!(catalog.resolve(Some("")).unwrap(), "METR");
        assert_eq!(catalog.resolve(Some("LEAK")).unwrap(), "LEAK");
        assert!(catalog.resolve(Some("../etc")).is_err());
    }

    #[test]
    fn test_serialize_camel_case() {
        let catalog = WorkTypeCatalog::new("METR");
        let json = serde_json::to_value(catalog.get("METR").unwrap()).unwrap();
        assert_eq!(json["code"], "METR");
        assert_eq!(json["conditionCodes"][3], "NO_DIALS");
    }
}
