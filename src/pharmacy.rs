//! Pharmacy operations: registration, prescription workflow, notifications.
//!
//! Plain functions over the [`RecordStore`] (and the [`SessionManager`] where
//! a session is opened). Ownership is by username: a prescriber only sees and
//! acts on their own prescriptions, a user only on notifications assigned to
//! them. Records owned by someone else report as not found.

use serde::Deserialize;

use crate::config;
use crate::db::{DatabaseError, Record, RecordStore};
use crate::models::{
    Medication, Notification, NotificationKind, Patient, Prescription, PrescriptionStatus, User,
    UserRole,
};
use crate::session_manager::{AuthError, LoginGrant, SessionIdentity, SessionManager};

#[derive(Debug, thiserror::Error)]
pub enum PharmacyError {
    #[error("Malformed input: {0}")]
    MalformedInput(String),
    #[error("Prescription {code} cannot move from {from} to {to}")]
    InvalidTransition {
        code: String,
        from: PrescriptionStatus,
        to: PrescriptionStatus,
    },
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Database(#[from] DatabaseError),
}

fn today() -> String {
    chrono::Local::now().format("%Y-%m-%d").to_string()
}

fn timestamp() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M").to_string()
}

fn owned_by(owner: &str, username: &str) -> bool {
    owner.eq_ignore_ascii_case(username.trim())
}

/// First generated code, counting up from the next id, that no record holds.
fn free_code<T: Record>(
    store: &RecordStore,
    format: impl Fn(u32) -> String,
) -> Result<String, DatabaseError> {
    (store.next_id::<T>()..u32::MAX)
        .map(format)
        .find(|code| store.find_by_key::<T>(code).is_none())
        .ok_or_else(|| DatabaseError::CapacityExceeded {
            entity_type: T::entity().to_string(),
            capacity: T::CAPACITY,
        })
}

// ═══════════════════════════════════════════════════════════
// Registration
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

/// Create a doctor account from an email and password, then log it in.
///
/// The username is the part of the email before `@`.
pub fn register(
    store: &mut RecordStore,
    sessions: &mut SessionManager,
    request: &RegisterRequest,
) -> Result<LoginGrant, PharmacyError> {
    let email = request.email.trim();
    if email.is_empty() || request.password.is_empty() {
        return Err(PharmacyError::MalformedInput(
            "Missing email or password".into(),
        ));
    }

    let username = match email.split_once('@') {
        Some((local, _)) if !local.is_empty() => local,
        _ => email,
    };
    if store.find_by_key::<User>(username).is_some() || user_by_email(store, email).is_some() {
        return Err(AuthError::UserExists(username.to_string()).into());
    }

    let user = User::new(
        username,
        &request.password,
        username,
        email,
        config::REGISTERED_LICENSE,
        config::REGISTERED_DEPARTMENT,
        UserRole::Doctor,
    );
    let id = store.create(user)?;
    tracing::info!(%username, id, "User registered");

    let user = store.get::<User>(id)?;
    Ok(sessions.open_session(user))
}

// ═══════════════════════════════════════════════════════════
// Prescriptions
// ═══════════════════════════════════════════════════════════

/// A prescription as submitted by a client.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrescriptionDraft {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub patient_id: Option<u32>,
    #[serde(default)]
    pub patient_name: String,
    #[serde(rename = "patientMRN", default)]
    pub patient_mrn: String,
    #[serde(default)]
    pub medications: Vec<Medication>,
    #[serde(default)]
    pub status: PrescriptionStatus,
    #[serde(default)]
    pub notes: String,
}

impl PrescriptionDraft {
    pub fn from_json(body: &str) -> Result<Self, PharmacyError> {
        serde_json::from_str(body)
            .map_err(|e| PharmacyError::MalformedInput(format!("Invalid prescription JSON: {e}")))
    }

    fn check(&self) -> Result<(), PharmacyError> {
        if self.medications.is_empty() {
            return Err(PharmacyError::MalformedInput(
                "At least one medication is required".into(),
            ));
        }
        for med in &self.medications {
            if med.name.trim().is_empty() {
                return Err(PharmacyError::MalformedInput(
                    "Medication name is required".into(),
                ));
            }
            med.check()
                .map_err(|e| PharmacyError::MalformedInput(e.to_string()))?;
        }
        if self.status.is_terminal() {
            return Err(PharmacyError::MalformedInput(format!(
                "A new prescription cannot start as {}",
                self.status
            )));
        }
        Ok(())
    }
}

/// Store a submitted prescription for the caller and notify them.
pub fn submit_prescription(
    store: &mut RecordStore,
    prescriber: &SessionIdentity,
    draft: PrescriptionDraft,
) -> Result<Prescription, PharmacyError> {
    draft.check()?;

    let patient = match draft.patient_id {
        Some(id) => Some(store.get::<Patient>(id)?.clone()),
        None => store.find_by_key::<Patient>(&draft.patient_mrn).cloned(),
    };
    let (patient_id, patient_name, patient_mrn) = match patient {
        Some(p) => (Some(p.id), p.name, p.mrn),
        None => (None, draft.patient_name.trim().to_string(), draft.patient_mrn.trim().to_string()),
    };
    if patient_name.is_empty() || patient_mrn.is_empty() {
        return Err(PharmacyError::MalformedInput(
            "Patient name and MRN are required".into(),
        ));
    }

    let code = match draft.code.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
        Some(code) => {
            if store.find_by_key::<Prescription>(code).is_some() {
                return Err(PharmacyError::MalformedInput(format!(
                    "Prescription code {code} is already in use"
                )));
            }
            code.to_string()
        }
        None => {
            let year = chrono::Local::now().format("%Y").to_string();
            free_code::<Prescription>(store, |n| format!("RX-{year}-{n:03}"))?
        }
    };

    let id = store.create(Prescription {
        id: 0,
        code: code.clone(),
        patient_id,
        patient_name,
        patient_mrn,
        prescribed_by: prescriber.username.clone(),
        medications: draft.medications,
        status: draft.status,
        date_created: today(),
        date_dispensed: None,
        notes: draft.notes,
    })?;
    let prescription = store.get::<Prescription>(id)?.clone();
    tracing::info!(%code, prescriber = %prescriber.username, "Prescription submitted");

    let receipt = NotificationDraft {
        title: "Prescription Submitted".into(),
        content: format!(
            "{code} for {} has been sent to the pharmacy.",
            prescription.patient_name
        ),
        kind: NotificationKind::Info,
        action_required: false,
        related_prescription_id: Some(id),
        assigned_to: prescriber.username.clone(),
    };
    if let Err(e) = notify(store, receipt) {
        tracing::warn!(%code, error = %e, "Withdrawing prescription; receipt not delivered");
        store.delete::<Prescription>(id)?;
        return Err(e);
    }

    Ok(prescription)
}

/// Prescriptions written by `username`, oldest first.
pub fn prescriptions_for(store: &RecordStore, username: &str) -> Vec<Prescription> {
    store.list::<Prescription>(|rx| owned_by(&rx.prescribed_by, username))
}

/// Mark one of the caller's prescriptions as collected.
pub fn collect(
    store: &mut RecordStore,
    username: &str,
    code: &str,
) -> Result<Prescription, PharmacyError> {
    transition(store, username, code, PrescriptionStatus::Dispensed)
}

/// Cancel one of the caller's prescriptions.
pub fn cancel(
    store: &mut RecordStore,
    username: &str,
    code: &str,
) -> Result<Prescription, PharmacyError> {
    transition(store, username, code, PrescriptionStatus::Cancelled)
}

fn transition(
    store: &mut RecordStore,
    username: &str,
    code: &str,
    next: PrescriptionStatus,
) -> Result<Prescription, PharmacyError> {
    let rx = store
        .find_by_key::<Prescription>(code)
        .filter(|rx| owned_by(&rx.prescribed_by, username))
        .ok_or_else(|| DatabaseError::not_found("Prescription", format_args!("code '{code}'")))?;

    if !rx.status.can_transition_to(next) {
        return Err(PharmacyError::InvalidTransition {
            code: rx.code.clone(),
            from: rx.status,
            to: next,
        });
    }

    let id = rx.id;
    let updated = store.modify::<Prescription>(id, |rx| {
        rx.status = next;
        if next == PrescriptionStatus::Dispensed {
            rx.date_dispensed = Some(today());
        }
    })?;
    tracing::info!(code = %updated.code, %username, status = %next, "Prescription status changed");
    Ok(updated)
}

// ═══════════════════════════════════════════════════════════
// Notifications
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationDraft {
    pub title: String,
    pub content: String,
    #[serde(rename = "type", default)]
    pub kind: NotificationKind,
    #[serde(default)]
    pub action_required: bool,
    #[serde(default)]
    pub related_prescription_id: Option<u32>,
    pub assigned_to: String,
}

/// Deliver a notification to an existing user. Returns its id.
pub fn notify(store: &mut RecordStore, draft: NotificationDraft) -> Result<u32, PharmacyError> {
    let recipient = store.get_by_key::<User>(&draft.assigned_to)?.username.clone();
    if let Some(rx) = draft.related_prescription_id {
        store.get::<Prescription>(rx)?;
    }

    let code = free_code::<Notification>(store, |n| format!("NOTIF-{n:03}"))?;
    let id = store.create(Notification {
        id: 0,
        code,
        title: draft.title,
        content: draft.content,
        kind: draft.kind,
        time: timestamp(),
        read: false,
        action_required: draft.action_required,
        related_prescription_id: draft.related_prescription_id,
        assigned_to: recipient,
    })?;
    tracing::debug!(id, "Notification created");
    Ok(id)
}

pub fn notifications_for(store: &RecordStore, username: &str) -> Vec<Notification> {
    store.list::<Notification>(|n| owned_by(&n.assigned_to, username))
}

pub fn unread_for(store: &RecordStore, username: &str) -> Vec<Notification> {
    store.list::<Notification>(|n| !n.read && owned_by(&n.assigned_to, username))
}

pub fn mark_read(
    store: &mut RecordStore,
    username: &str,
    id: u32,
) -> Result<Notification, PharmacyError> {
    let owned = store
        .find::<Notification>(id)
        .is_some_and(|n| owned_by(&n.assigned_to, username));
    if !owned {
        return Err(DatabaseError::not_found("Notification", format_args!("id {id}")).into());
    }
    Ok(store.modify::<Notification>(id, |n| n.read = true)?)
}

/// Mark every unread notification of `username` as read. Returns how many changed.
pub fn mark_all_read(store: &mut RecordStore, username: &str) -> Result<usize, PharmacyError> {
    let ids: Vec<u32> = unread_for(store, username).iter().map(|n| n.id).collect();
    for &id in &ids {
        store.modify::<Notification>(id, |n| n.read = true)?;
    }
    Ok(ids.len())
}

// ═══════════════════════════════════════════════════════════
// Patients and users
// ═══════════════════════════════════════════════════════════

pub fn patients(store: &RecordStore) -> Vec<Patient> {
    store.list::<Patient>(|_| true)
}

pub fn users_by_role(store: &RecordStore, role: UserRole) -> Vec<User> {
    store.list::<User>(|u| u.role == role)
}

pub fn user_by_email<'a>(store: &'a RecordStore, email: &str) -> Option<&'a User> {
    let email = email.trim();
    store.find_first::<User>(|u| u.email.eq_ignore_ascii_case(email))
}
