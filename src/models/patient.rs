use serde::{Deserialize, Serialize};

use crate::db::{CsvRecord, DatabaseError, RowReader, RowWriter, Schema};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Patient {
    pub id: u32,
    pub name: String,
    pub mrn: String,
    pub ward: String,
    pub bed: String,
    pub date_of_birth: String,
    /// Login account for the patient, when one exists.
    pub user_id: Option<u32>,
}

impl Patient {
    pub fn new(name: &str, mrn: &str, ward: &str, bed: &str, date_of_birth: &str) -> Self {
        Self {
            id: 0,
            name: name.into(),
            mrn: mrn.into(),
            ward: ward.into(),
            bed: bed.into(),
            date_of_birth: date_of_birth.into(),
            user_id: None,
        }
    }
}

impl CsvRecord for Patient {
    const SCHEMA: Schema = Schema {
        entity: "Patient",
        file_name: "patients.csv",
        columns: &["PatientID", "Name", "MRN", "Ward", "Bed", "DateOfBirth", "UserID"],
    };

    fn write_row(&self, row: &mut RowWriter) {
        row.value(self.id)
            .text(&self.name)
            .text(&self.mrn)
            .text(&self.ward)
            .text(&self.bed)
            .text(&self.date_of_birth)
            .opt_id(self.user_id);
    }

    fn read_row(row: &mut RowReader<'_>) -> Result<Self, DatabaseError> {
        Ok(Self {
            id: row.parse()?,
            name: row.text()?,
            mrn: row.text()?,
            ward: row.text()?,
            bed: row.text()?,
            date_of_birth: row.text()?,
            user_id: row.opt_id()?,
        })
    }
}
