//! Line-oriented diagnostics console.
//!
//! Each input line parses into a [`Command`]; [`run`] turns it into a text
//! report over the shared state. Keywords are case-insensitive, arguments
//! keep their case. Passwords are never shown and tokens only by prefix.

use std::str::FromStr;

use serde::Serialize;

use crate::config;
use crate::core_state::{CoreError, CoreState};
use crate::db::RecordStore;
use crate::models::{Notification, Patient, Prescription, User};
use crate::pharmacy;
use crate::session_manager::{token_prefix, Session, SessionManager};

const RULE: &str = "========================================";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Status,
    Users,
    Sessions,
    Prescriptions,
    Patients,
    Notifications,
    Storage,
    Cleanup,
    Dump,
    /// `rx <id|code>`
    Prescription(String),
    /// `user <username>`
    User(String),
    /// `session <token or prefix>`
    Session(String),
    /// `notif <username>`
    NotificationsFor(String),
}

impl FromStr for Command {
    type Err = String;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let (keyword, arg) = match line.split_once(char::is_whitespace) {
            Some((keyword, rest)) => (keyword, rest.trim()),
            None => (line, ""),
        };
        let keyword = keyword.to_ascii_lowercase();

        let command = match (keyword.as_str(), arg.is_empty()) {
            ("help" | "h", true) => Command::Help,
            ("status" | "s", true) => Command::Status,
            ("users" | "u", true) => Command::Users,
            ("sessions" | "sess", true) => Command::Sessions,
            ("prescriptions" | "rx" | "p", true) => Command::Prescriptions,
            ("patients" | "pat", true) => Command::Patients,
            ("notifications" | "notif" | "n", true) => Command::Notifications,
            ("storage" | "stor", true) => Command::Storage,
            ("cleanup", true) => Command::Cleanup,
            ("all" | "dump", true) => Command::Dump,
            ("rx", false) => Command::Prescription(arg.to_string()),
            ("user", false) => Command::User(arg.to_string()),
            ("session", false) => Command::Session(arg.to_string()),
            ("notif", false) => Command::NotificationsFor(arg.to_string()),
            _ => {
                return Err(format!(
                    "Unknown command '{line}'. Type 'help' for available commands."
                ))
            }
        };
        Ok(command)
    }
}

/// Produce the report for one command.
pub fn run(core: &CoreState, command: &Command) -> Result<String, CoreError> {
    if let Command::Cleanup = command {
        let removed = core.sweep_expired()?;
        return Ok(format!("Session cleanup completed ({removed} removed)."));
    }

    let store = core.read_store()?;
    let sessions = core.lock_sessions()?;
    let lines = match command {
        Command::Help => help(),
        Command::Status => status(&store, &sessions),
        Command::Users => users(&store),
        Command::Sessions => session_list(&sessions),
        Command::Prescriptions => prescriptions(store.all::<Prescription>()),
        Command::Patients => patients(&store),
        Command::Notifications => notifications("NOTIFICATIONS", store.all::<Notification>()),
        Command::Storage => storage(&store),
        Command::Dump => return Ok(dump(&store, &sessions)),
        Command::Prescription(key) => prescription_detail(&store, key),
        Command::User(username) => user_detail(&store, &sessions, username),
        Command::Session(token) => session_detail(&sessions, token),
        Command::NotificationsFor(username) => notifications(
            &format!("NOTIFICATIONS FOR USER: {username}"),
            &pharmacy::notifications_for(&store, username),
        ),
        Command::Cleanup => Vec::new(),
    };
    Ok(lines.join("\n"))
}

fn help() -> Vec<String> {
    [
        "Available commands:",
        "  help, h                  - Show this help",
        "  status, s                - System status",
        "  users, u                 - List users",
        "  sessions, sess           - List active sessions",
        "  prescriptions, rx, p     - List prescriptions",
        "  patients, pat            - List patients",
        "  notifications, notif, n  - List notifications",
        "  storage, stor            - Storage backend and files",
        "  rx <id|code>             - Prescription details",
        "  user <username>          - User details",
        "  session <token>          - Session details (prefix accepted)",
        "  notif <username>         - Notifications for a user",
        "  cleanup                  - Remove expired sessions",
        "  all, dump                - Dump all data as JSON",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn status(store: &RecordStore, sessions: &SessionManager) -> Vec<String> {
    vec![
        "=== SYSTEM STATUS ===".into(),
        format!("{} v{}", config::APP_NAME, config::APP_VERSION),
        format!("Users: {}/{}", store.count::<User>(), config::MAX_USERS),
        format!("Patients: {}/{}", store.count::<Patient>(), config::MAX_PATIENTS),
        format!(
            "Prescriptions: {}/{}",
            store.count::<Prescription>(),
            config::MAX_PRESCRIPTIONS
        ),
        format!(
            "Notifications: {}/{}",
            store.count::<Notification>(),
            config::MAX_NOTIFICATIONS
        ),
        format!(
            "Active sessions: {} (timeout {}s)",
            sessions.len(),
            sessions.timeout().as_secs()
        ),
        format!(
            "Storage: {} at {}{}",
            store.storage().kind(),
            store.storage().location(),
            if store.is_synced() { "" } else { " (UNSYNCED)" }
        ),
    ]
}

fn users(store: &RecordStore) -> Vec<String> {
    let mut lines = vec![format!("=== USERS ({}) ===", store.count::<User>())];
    for u in store.all::<User>() {
        lines.push(format!(
            "{:>3}  {:<12} {:<24} {:<8} {}",
            u.id,
            u.username,
            u.full_name,
            u.role.label(),
            u.department
        ));
    }
    lines
}

fn session_line(session: &Session, sessions: &SessionManager) -> String {
    let now = sessions.now_ms();
    let timeout_ms = u64::try_from(sessions.timeout().as_millis()).unwrap_or(u64::MAX);
    format!(
        "{}…  {:<12} created {}s ago, idle {}s, expires in {}s",
        token_prefix(&session.token),
        session.username,
        now.saturating_sub(session.created_at_ms) / 1000,
        session.idle_ms(now) / 1000,
        timeout_ms.saturating_sub(session.idle_ms(now)) / 1000
    )
}

fn session_list(sessions: &SessionManager) -> Vec<String> {
    let mut lines = vec![format!("=== ACTIVE SESSIONS ({}) ===", sessions.len())];
    if sessions.is_empty() {
        lines.push("No active sessions".into());
    }
    for session in sessions.sessions() {
        lines.push(session_line(session, sessions));
    }
    lines
}

fn prescriptions(list: &[Prescription]) -> Vec<String> {
    let mut lines = vec![format!("=== PRESCRIPTIONS ({}) ===", list.len())];
    for rx in list {
        lines.push(format!(
            "{:>3}  {:<12} {:<20} {:<20} {:<10} by {}",
            rx.id,
            rx.code,
            rx.patient_name,
            rx.status.as_str(),
            rx.date_created,
            rx.prescribed_by
        ));
    }
    lines
}

fn patients(store: &RecordStore) -> Vec<String> {
    let mut lines = vec![format!("=== PATIENTS ({}) ===", store.count::<Patient>())];
    for p in store.all::<Patient>() {
        let bed = if p.bed.is_empty() { "-" } else { p.bed.as_str() };
        lines.push(format!(
            "{:>3}  {:<20} {:<14} {:<12} {:<10} DOB {}",
            p.id, p.name, p.mrn, p.ward, bed, p.date_of_birth
        ));
    }
    lines
}

fn notifications(title: &str, list: &[Notification]) -> Vec<String> {
    let unread = list.iter().filter(|n| !n.read).count();
    let action = list.iter().filter(|n| n.action_required).count();
    let mut lines = vec![
        format!("=== {title} ==="),
        format!("Total: {}, Unread: {unread}, Action Required: {action}", list.len()),
    ];
    for n in list {
        lines.push(format!(
            "{} [{}] {:<8} {} → {} ({})",
            n.code,
            if n.read { "READ" } else { "UNREAD" },
            n.kind.as_str(),
            n.title,
            n.assigned_to,
            n.time
        ));
    }
    lines
}

fn storage(store: &RecordStore) -> Vec<String> {
    let backend = store.storage();
    let mut lines = vec![
        "=== STORAGE ===".into(),
        format!("Backend: {}", backend.kind()),
        format!("Location: {}", backend.location()),
    ];
    match backend.list() {
        Ok(files) if files.is_empty() => lines.push("No files".into()),
        Ok(files) => {
            for name in files {
                let size = backend
                    .read(&name)
                    .ok()
                    .flatten()
                    .map(|text| text.len())
                    .unwrap_or(0);
                lines.push(format!("  {name:<20} {size} bytes"));
            }
        }
        Err(e) => lines.push(format!("Listing failed: {e}")),
    }
    let unsynced = store.unsynced();
    if unsynced.is_empty() {
        lines.push("All collections synced".into());
    } else {
        lines.push(format!("Unsynced: {}", unsynced.join(", ")));
    }
    lines
}

fn prescription_detail(store: &RecordStore, key: &str) -> Vec<String> {
    let found = key
        .parse::<u32>()
        .ok()
        .and_then(|id| store.find::<Prescription>(id))
        .or_else(|| store.find_by_key::<Prescription>(key));
    let Some(rx) = found else {
        return vec![format!("Prescription with ID '{key}' not found.")];
    };

    let mut lines = vec![
        format!("=== PRESCRIPTION DETAILS: {} ===", rx.code),
        format!("ID: {}", rx.id),
        format!("Patient: {} ({})", rx.patient_name, rx.patient_mrn),
        format!("Prescribed by: {}", rx.prescribed_by),
        format!("Status: {}", rx.status),
        format!("Created: {}", rx.date_created),
        format!("Dispensed: {}", rx.date_dispensed.as_deref().unwrap_or("-")),
        format!("Medications ({}):", rx.medications.len()),
    ];
    for (i, m) in rx.medications.iter().enumerate() {
        let quantity = m.quantity.map(|q| format!(", qty {q}")).unwrap_or_default();
        lines.push(format!(
            "  {}. {} {} {} {}{quantity}",
            i + 1,
            m.name,
            m.strength,
            m.dosage_form,
            m.frequency
        ));
    }
    if !rx.notes.is_empty() {
        lines.push(format!("Notes: {}", rx.notes));
    }
    lines
}

fn user_detail(store: &RecordStore, sessions: &SessionManager, username: &str) -> Vec<String> {
    let Some(user) = store.find_by_key::<User>(username) else {
        return vec![format!("User '{username}' not found.")];
    };

    let prescriptions = pharmacy::prescriptions_for(store, &user.username).len();
    let notes = pharmacy::notifications_for(store, &user.username);
    let unread = notes.iter().filter(|n| !n.read).count();

    let mut lines = vec![
        format!("=== USER DETAILS: {} ===", user.username),
        format!("User ID: {}", user.id),
        format!("Full Name: {}", user.full_name),
        format!("Email: {}", user.email),
        format!("License: {}", user.license),
        format!("Department: {}", user.department),
        format!("Role: {}", user.role.label()),
        format!("Prescriptions: {prescriptions}"),
        format!("Notifications: {} ({unread} unread)", notes.len()),
        String::new(),
        "Active Sessions:".into(),
    ];
    let mine: Vec<&Session> = sessions
        .sessions()
        .into_iter()
        .filter(|s| s.username.eq_ignore_ascii_case(&user.username))
        .collect();
    if mine.is_empty() {
        lines.push("  No active sessions".into());
    }
    for session in mine {
        lines.push(format!("  {}", session_line(session, sessions)));
    }
    lines
}

fn session_detail(sessions: &SessionManager, token: &str) -> Vec<String> {
    let exact = sessions.get(token);
    let matches: Vec<&Session> = match exact {
        Some(session) => vec![session],
        None if token.len() >= 4 => sessions
            .sessions()
            .into_iter()
            .filter(|s| s.token.starts_with(token))
            .collect(),
        None => Vec::new(),
    };

    match matches.as_slice() {
        [session] => vec![
            format!("=== SESSION DETAILS: {}… ===", token_prefix(&session.token)),
            format!("Username: {}", session.username),
            format!("Display Name: {}", session.display_name),
            session_line(session, sessions),
        ],
        [] => vec![format!("Session '{}' not found.", token_prefix(token))],
        many => vec![format!(
            "Prefix '{}' matches {} sessions; give more characters.",
            token_prefix(token),
            many.len()
        )],
    }
}

#[derive(Serialize)]
struct Dump<'a> {
    users: &'a [User],
    patients: &'a [Patient],
    prescriptions: &'a [Prescription],
    notifications: &'a [Notification],
    active_sessions: usize,
}

fn dump(store: &RecordStore, sessions: &SessionManager) -> String {
    let dump = Dump {
        users: store.all::<User>(),
        patients: store.all::<Patient>(),
        prescriptions: store.all::<Prescription>(),
        notifications: store.all::<Notification>(),
        active_sessions: sessions.len(),
    };
    let json = serde_json::to_string_pretty(&dump)
        .unwrap_or_else(|e| format!("{{\"error\": \"{e}\"}}"));
    format!("{RULE}\n{json}\n{RULE}")
}
