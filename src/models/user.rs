use serde::{Deserialize, Serialize};

use super::enums::UserRole;
use crate::db::{CsvRecord, DatabaseError, RowReader, RowWriter, Schema};

/// A staff (or patient) account.
///
/// The password is kept as entered; it is never serialized to JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: u32,
    pub username: String,
    #[serde(skip_serializing, default)]
    pub password: String,
    pub full_name: String,
    pub email: String,
    pub license: String,
    pub department: String,
    pub role: UserRole,
}

impl User {
    pub fn new(
        username: &str,
        password: &str,
        full_name: &str,
        email: &str,
        license: &str,
        department: &str,
        role: UserRole,
    ) -> Self {
        Self {
            id: 0,
            username: username.into(),
            password: password.into(),
            full_name: full_name.into(),
            email: email.into(),
            license: license.into(),
            department: department.into(),
            role,
        }
    }
}

impl CsvRecord for User {
    const SCHEMA: Schema = Schema {
        entity: "User",
        file_name: "users.csv",
        columns: &[
            "UserID",
            "Username",
            "Password",
            "FullName",
            "Email",
            "License",
            "Department",
            "Role",
        ],
    };

    fn write_row(&self, row: &mut RowWriter) {
        row.value(self.id)
            .text(&self.username)
            .text(&self.password)
            .text(&self.full_name)
            .text(&self.email)
            .text(&self.license)
            .text(&self.department)
            .text(self.role.as_str());
    }

    fn read_row(row: &mut RowReader<'_>) -> Result<Self, DatabaseError> {
        Ok(Self {
            id: row.parse()?,
            username: row.text()?,
            password: row.text()?,
            full_name: row.text()?,
            email: row.text()?,
            license: row.text()?,
            department: row.text()?,
            role: row.parse()?,
        })
    }
}
