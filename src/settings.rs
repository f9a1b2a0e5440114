use crate::db;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const INSTITUTION_KEY: &str = "institution";

/// Institution-wide values stamped onto records and report headers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InstitutionSettings {
    pub school_name: String,
    pub administration: String,
    pub directorate: String,
    pub admin_code: String,
    pub school_serial: String,
    pub school_manager: String,
    pub student_affairs_deputy: String,
}

impl Default for InstitutionSettings {
    fn default() -> Self {
        Self {
            school_name: "المدرسة".into(),
            administration: "الإدارة التعليمية".into(),
            directorate: String::new(),
            admin_code: String::new(),
            school_serial: String::new(),
            school_manager: String::new(),
            student_affairs_deputy: String::new(),
        }
    }
}

fn parse_string_max(v: &Value, key: &str, max: usize) -> Result<String, String> {
    let Some(s) = v.as_str() else {
        return Err(format!("{} must be a string", key));
    };
    let s = s.trim();
    if s.chars().count() > max {
        return Err(format!("{} must be at most {} characters", key, max));
    }
    Ok(s.to_string())
}

impl InstitutionSettings {
    pub fn merge_patch(&mut self, patch: &Map<String, Value>) -> Result<(), String> {
        for (k, v) in patch {
            match k.as_str() {
                "schoolName" => self.school_name = parse_string_max(v, k, 200)?,
                "administration" => self.administration = parse_string_max(v, k, 200)?,
                "directorate" => self.directorate = parse_string_max(v, k, 200)?,
                "adminCode" => self.admin_code = parse_string_max(v, k, 50)?,
                "schoolSerial" => self.school_serial = parse_string_max(v, k, 50)?,
                "schoolManager" => self.school_manager = parse_string_max(v, k, 200)?,
                "studentAffairsDeputy" => {
                    self.student_affairs_deputy = parse_string_max(v, k, 200)?
                }
                _ => return Err(format!("unknown settings field: {}", k)),
            }
        }
        Ok(())
    }

    pub fn admin_code(&self) -> Option<&str> {
        Some(self.admin_code.as_str()).filter(|s| !s.is_empty())
    }

    pub fn school_serial(&self) -> Option<&str> {
        Some(self.school_serial.as_str()).filter(|s| !s.is_empty())
    }
}

/// Loads the saved institution settings over the defaults.
pub fn load(conn: &Connection) -> anyhow::Result<InstitutionSettings> {
    match db::settings_get_json(conn, INSTITUTION_KEY)? {
        Some(saved) => match serde_json::from_value(saved) {
            Ok(v) => Ok(v),
            Err(e) => {
                // A malformed saved row must not block the settings page.
                log::warn!("ignoring malformed institution settings: {}", e);
                Ok(InstitutionSettings::default())
            }
        },
        None => Ok(InstitutionSettings::default()),
    }
}

pub fn save(conn: &Connection, settings: &InstitutionSettings) -> anyhow::Result<()> {
    db::settings_set_json(conn, INSTITUTION_KEY, &serde_json::to_value(settings)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn patch_updates_known_fields() {
        let mut s = InstitutionSettings::default();
        let patch = json!({ "schoolName": "  مدرسة التجارة ", "adminCode": "077" });
        s.merge_patch(patch.as_object().unwrap()).expect("merge");
        assert_eq!(s.school_name, "مدرسة التجارة");
        assert_eq!(s.admin_code(), Some("077"));
        assert_eq!(s.school_serial(), None);
    }

    #[test]
    fn patch_rejects_unknown_and_non_string() {
        let mut s = InstitutionSettings::default();
        let bad = json!({ "logo": "x" });
        assert!(s.merge_patch(bad.as_object().unwrap()).is_err());
        let bad = json!({ "schoolName": 3 });
        assert!(s.merge_patch(bad.as_object().unwrap()).is_err());
    }

    #[test]
    fn partial_saved_json_fills_defaults() {
        let v: InstitutionSettings =
            serde_json::from_value(json!({ "directorate": "القاهرة" })).expect("parse");
        assert_eq!(v.directorate, "القاهرة");
        assert_eq!(v.administration, "الإدارة التعليمية");
    }
}
