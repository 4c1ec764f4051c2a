use serde::{Deserialize, Serialize};

use super::enums::NotificationKind;
use crate::db::{CsvRecord, DatabaseError, RowReader, RowWriter, Schema};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: u32,
    /// Human-facing code, e.g. `NOTIF-001`.
    pub code: String,
    pub title: String,
    pub content: String,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    /// Free-form display timestamp ("30 minutes ago", RFC 3339, ...).
    pub time: String,
    pub read: bool,
    pub action_required: bool,
    pub related_prescription_id: Option<u32>,
    /// Username of the recipient.
    pub assigned_to: String,
}

impl CsvRecord for Notification {
    const SCHEMA: Schema = Schema {
        entity: "Notification",
        file_name: "notifications.csv",
        columns: &[
            "NotificationID",
            "Code",
            "Title",
            "Content",
            "Type",
            "DateTime",
            "Read",
            "ActionRequired",
            "RelatedPrescriptionID",
            "AssignedTo",
        ],
    };

    fn write_row(&self, row: &mut RowWriter) {
        row.value(self.id)
            .text(&self.code)
            .text(&self.title)
            .text(&self.content)
            .text(self.kind.as_str())
            .text(&self.time)
            .flag(self.read)
            .flag(self.action_required)
            .opt_id(self.related_prescription_id)
            .text(&self.assigned_to);
    }

    fn read_row(row: &mut RowReader<'_>) -> Result<Self, DatabaseError> {
        Ok(Self {
            id: row.parse()?,
            code: row.text()?,
            title: row.text()?,
            content: row.text()?,
            kind: row.parse()?,
            time: row.text()?,
            read: row.flag()?,
            action_required: row.flag()?,
            related_prescription_id: row.opt_id()?,
            assigned_to: row.text()?,
        })
    }
}
