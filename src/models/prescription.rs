use serde::{Deserialize, Serialize};

use super::enums::PrescriptionStatus;
use crate::db::{CsvRecord, DatabaseError, RowReader, RowWriter, Schema};

/// Separator between medication entries inside the Medications column.
const ENTRY_SEPARATOR: &str = " | ";
/// Separator between the parts of one medication entry.
const PART_SEPARATOR: char = ':';

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Medication {
    #[serde(alias = "medicationName")]
    pub name: String,
    pub strength: String,
    pub dosage_form: String,
    pub frequency: String,
    #[serde(default)]
    pub quantity: Option<u32>,
}

impl Medication {
    pub fn new(name: &str, strength: &str, dosage_form: &str, frequency: &str) -> Self {
        Self {
            name: name.into(),
            strength: strength.into(),
            dosage_form: dosage_form.into(),
            frequency: frequency.into(),
            quantity: None,
        }
    }

    pub fn with_quantity(mut self, quantity: u32) -> Self {
        self.quantity = Some(quantity);
        self
    }

    /// Text parts of the entry, in on-disk order.
    pub fn parts(&self) -> [&str; 4] {
        [&self.name, &self.strength, &self.dosage_form, &self.frequency]
    }

    /// Parts may not carry the list separators or edge whitespace, which the
    /// Medications column cannot represent.
    pub fn check(&self) -> Result<(), DatabaseError> {
        for part in self.parts() {
            if part.contains([PART_SEPARATOR, '|']) {
                return Err(DatabaseError::MalformedInput(format!(
                    "medication '{}': '{part}' may not contain ':' or '|'",
                    self.name
                )));
            }
            if part.trim() != part {
                return Err(DatabaseError::MalformedInput(format!(
                    "medication '{}': '{part}' has leading or trailing whitespace",
                    self.name
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prescription {
    pub id: u32,
    /// Human-facing code, e.g. `RX-2024-001`.
    pub code: String,
    pub patient_id: Option<u32>,
    pub patient_name: String,
    #[serde(rename = "patientMRN")]
    pub patient_mrn: String,
    /// Username of the prescribing user.
    pub prescribed_by: String,
    pub medications: Vec<Medication>,
    pub status: PrescriptionStatus,
    pub date_created: String,
    pub date_dispensed: Option<String>,
    pub notes: String,
}

impl CsvRecord for Prescription {
    const SCHEMA: Schema = Schema {
        entity: "Prescription",
        file_name: "prescriptions.csv",
        columns: &[
            "PrescriptionID",
            "Code",
            "PatientID",
            "PatientName",
            "PatientMRN",
            "PrescribedBy",
            "Medications",
            "Status",
            "DateCreated",
            "DateDispensed",
            "Notes",
        ],
    };

    fn write_row(&self, row: &mut RowWriter) {
        row.value(self.id)
            .text(&self.code)
            .opt_id(self.patient_id)
            .text(&self.patient_name)
            .text(&self.patient_mrn)
            .text(&self.prescribed_by)
            .text(&encode_medications(&self.medications))
            .text(self.status.as_str())
            .text(&self.date_created)
            .opt_text(self.date_dispensed.as_deref())
            .text(&self.notes);
    }

    fn read_row(row: &mut RowReader<'_>) -> Result<Self, DatabaseError> {
        Ok(Self {
            id: row.parse()?,
            code: row.text()?,
            patient_id: row.opt_id()?,
            patient_name: row.text()?,
            patient_mrn: row.text()?,
            prescribed_by: row.text()?,
            medications: decode_medications(&row.text()?)?,
            status: row.parse()?,
            date_created: row.text()?,
            date_dispensed: row.opt_text()?,
            notes: row.text()?,
        })
    }

    fn check(&self) -> Result<(), DatabaseError> {
        self.medications.iter().try_for_each(Medication::check)
    }
}

/// `name:strength:form:frequency[:quantity]` entries joined by ` | `.
pub fn encode_medications(medications: &[Medication]) -> String {
    medications
        .iter()
        .map(|m| {
            let mut entry = m.parts().join(":");
            if let Some(q) = m.quantity {
                entry.push(PART_SEPARATOR);
                entry.push_str(&q.to_string());
            }
            entry
        })
        .collect::<Vec<_>>()
        .join(ENTRY_SEPARATOR)
}

/// Inverse of [`encode_medications`]. Parts are trimmed; empty entries skipped.
pub fn decode_medications(field: &str) -> Result<Vec<Medication>, DatabaseError> {
    let mut medications = Vec::new();
    for entry in field.split('|').map(str::trim).filter(|e| !e.is_empty()) {
        let parts: Vec<&str> = entry.split(PART_SEPARATOR).map(str::trim).collect();
        let quantity = match parts.len() {
            4 => None,
            5 => Some(parts[4].parse::<u32>().map_err(|e| {
                DatabaseError::MalformedInput(format!("medication '{entry}': bad quantity: {e}"))
            })?),
            n => {
                return Err(DatabaseError::MalformedInput(format!(
                    "medication '{entry}': expected 4 or 5 parts, found {n}"
                )))
            }
        };
        medications.push(Medication {
            name: parts[0].to_string(),
            strength: parts[1].to_string(),
            dosage_form: parts[2].to_string(),
            frequency: parts[3].to_string(),
            quantity,
        });
    }
    Ok(medications)
}
