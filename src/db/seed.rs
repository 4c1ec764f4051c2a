//! Demo accounts and records loaded into an empty store.

use super::{DatabaseError, RecordStore};
use crate::models::{
    Medication, Notification, NotificationKind, Patient, Prescription, PrescriptionStatus, User,
    UserRole,
};

/// Populate `store` with the demo data set. Intended for an empty store.
pub fn load_demo_data(store: &mut RecordStore) -> Result<(), DatabaseError> {
    let users = [
        User::new(
            "admin",
            "admin123",
            "Dr. John Smith",
            "j.smith@hospital.com",
            "MD-12345",
            "Internal Medicine",
            UserRole::Admin,
        ),
        User::new(
            "doctor1",
            "pass123",
            "Dr. Sarah Johnson",
            "s.johnson@hospital.com",
            "MD-23456",
            "Cardiology",
            UserRole::Doctor,
        ),
        User::new(
            "doctor2",
            "med456",
            "Dr. Michael Chen",
            "m.chen@hospital.com",
            "MD-34567",
            "Emergency Medicine",
            UserRole::Doctor,
        ),
        User::new(
            "nurse1",
            "nurse123",
            "Nurse Emily Davis",
            "e.davis@hospital.com",
            "RN-11111",
            "General Ward",
            UserRole::Nurse,
        ),
        User::new(
            "nurse2",
            "nurse456",
            "Nurse Robert Wilson",
            "r.wilson@hospital.com",
            "RN-22222",
            "Emergency",
            UserRole::Nurse,
        ),
    ];
    for user in users {
        store.create(user)?;
    }

    let wilson = store.create(Patient::new(
        "Sarah Wilson",
        "MRN-78901234",
        "cardiology",
        "Ward-A-12",
        "1985-05-15",
    ))?;
    let rodriguez = store.create(Patient::new(
        "Michael Rodriguez",
        "MRN-56789012",
        "internal",
        "Ward-B-08",
        "1978-11-22",
    ))?;
    store.create(Patient::new(
        "Emma Thompson",
        "MRN-34567890",
        "emergency",
        "ER-03",
        "1992-03-08",
    ))?;
    store.create(Patient::new(
        "Robert Chen",
        "MRN-23456789",
        "outpatient",
        "",
        "1960-07-19",
    ))?;

    let rx1 = store.create(Prescription {
        id: 0,
        code: "RX-2024-001".into(),
        patient_id: Some(wilson),
        patient_name: "Sarah Wilson".into(),
        patient_mrn: "MRN-78901234".into(),
        prescribed_by: "admin".into(),
        medications: vec![
            Medication::new("Medicine 2", "10mg", "tablet", "tid").with_quantity(30),
        ],
        status: PrescriptionStatus::Dispensing,
        date_created: "2024-01-16".into(),
        date_dispensed: None,
        notes: String::new(),
    })?;
    let rx2 = store.create(Prescription {
        id: 0,
        code: "RX-2024-002".into(),
        patient_id: Some(rodriguez),
        patient_name: "Michael Rodriguez".into(),
        patient_mrn: "MRN-56789012".into(),
        prescribed_by: "doctor1".into(),
        medications: vec![
            Medication::new("Medicine 5", "100IU/ml", "injection", "bid").with_quantity(10),
        ],
        status: PrescriptionStatus::Pending,
        date_created: "2024-01-16".into(),
        date_dispensed: None,
        notes: String::new(),
    })?;

    store.create(Notification {
        id: 0,
        code: "NOTIF-001".into(),
        title: "Stock Alert: Medicine 5".into(),
        content: "Limited stock remaining. Prescription RX-2024-002 may experience delays.".into(),
        kind: NotificationKind::Warning,
        time: "30 minutes ago".into(),
        read: false,
        action_required: true,
        related_prescription_id: Some(rx2),
        assigned_to: "admin".into(),
    })?;
    store.create(Notification {
        id: 0,
        code: "NOTIF-002".into(),
        title: "Prescription Ready".into(),
        content: "Medicine 2 for Sarah Wilson is ready for collection.".into(),
        kind: NotificationKind::Success,
        time: "1 hour ago".into(),
        read: false,
        action_required: true,
        related_prescription_id: Some(rx1),
        assigned_to: "nurse1".into(),
    })?;

    tracing::info!("Demo data loaded");
    Ok(())
}
