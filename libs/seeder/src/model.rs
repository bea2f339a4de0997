use serde::{Deserialize, Serialize};

use crate::error::RowError;

/// One validated row of the `user_data` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct UserRecord {
    pub user_id: String,
    pub name: String,
    pub email: String,
    pub age: i32,
}

/// A CSV row as read, before validation. Fields are matched by header
/// name, so column order in the file does not matter; absent columns and
/// empty cells both come through as `None`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawRow {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub age: Option<String>,
}

impl RawRow {
    /// Promote to a `UserRecord`, checking field presence and the age format.
    pub fn validate(self) -> Result<UserRecord, RowError> {
        let user_id = required(self.user_id, "user_id")?;
        let name = required(self.name, "name")?;
        let email = required(self.email, "email")?;
        let age_raw = required(self.age, "age")?;

        let age = age_raw
            .trim()
            .parse::<i32>()
            .map_err(|_| RowError::invalid_age(age_raw))?;

        Ok(UserRecord {
            user_id,
            name,
            email,
            age,
        })
    }
}

fn required(value: Option<String>, field: &'static str) -> Result<String, RowError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(RowError::missing_field(field)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_row() -> RawRow {
        RawRow {
            user_id: Some("00234e50-34eb-4ce2-94ec-26e3fa8fe33a".into()),
            name: Some("Dan Altenwerth Jr.".into()),
            email: Some("Molly59@gmail.com".into()),
            age: Some("67".into()),
        }
    }

    #[test]
    fn test_valid_row_promotes() {
        let rec = full_row().validate().unwrap();
        assert_eq!(rec.user_id, "00234e50-34eb-4ce2-94ec-26e3fa8fe33a");
        assert_eq!(rec.name, "Dan Altenwerth Jr.");
        assert_eq!(rec.email, "Molly59@gmail.com");
        assert_eq!(rec.age, 67);
    }

    #[test]
    fn test_age_is_trimmed_before_parsing() {
        let mut row = full_row();
        row.age = Some(" 42 ".into());
        assert_eq!(row.validate().unwrap().age, 42);
    }

    #[test]
    fn test_missing_age_is_rejected() {
        let mut row = full_row();
        row.age = None;
        assert_eq!(
            row.validate().unwrap_err(),
            RowError::missing_field("age")
        );
    }

    #[test]
    fn test_empty_field_counts_as_missing() {
        let mut row = full_row();
        row.email = Some("   ".into());
        assert_eq!(
            row.validate().unwrap_err(),
            RowError::missing_field("email")
        );
    }

    #[test]
    fn test_non_numeric_age_is_rejected() {
        let mut row = full_row();
        row.age = Some("sixty-seven".into());
        assert_eq!(
            row.validate().unwrap_err(),
            RowError::invalid_age("sixty-seven")
        );
    }
}
