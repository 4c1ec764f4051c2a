use crate::db::DatabaseError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern.
/// Parsing is case-insensitive; `as_str` is the canonical on-disk form.
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $s)] $variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = DatabaseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                $(
                    if s.trim().eq_ignore_ascii_case($s) {
                        return Ok(Self::$variant);
                    }
                )+
                Err(DatabaseError::InvalidEnum {
                    field: stringify!($name).into(),
                    value: s.into(),
                })
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

str_enum!(UserRole {
    Admin => "admin",
    Doctor => "doctor",
    Nurse => "nurse",
    Patient => "patient",
});

str_enum!(PrescriptionStatus {
    Pending => "pending",
    Dispensing => "dispensing",
    Ready => "ready",
    PartiallyDispensed => "partially-dispensed",
    Dispensed => "dispensed",
    Cancelled => "cancelled",
});

str_enum!(NotificationKind {
    Info => "info",
    Warning => "warning",
    Success => "success",
    Error => "error",
});

impl UserRole {
    /// Human-facing label used by the diagnostics console.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Admin => "Admin",
            Self::Doctor => "Doctor",
            Self::Nurse => "Nurse",
            Self::Patient => "Patient",
        }
    }
}

impl PrescriptionStatus {
    /// Position in the forward-only lifecycle. Terminal states share the top rank.
    fn rank(&self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Dispensing => 1,
            Self::Ready => 2,
            Self::PartiallyDispensed => 3,
            Self::Dispensed | Self::Cancelled => 4,
        }
    }

    /// `dispensed` and `cancelled` accept no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Dispensed | Self::Cancelled)
    }

    /// Whether moving from `self` to `next` keeps the lifecycle moving forward.
    pub fn can_transition_to(&self, next: PrescriptionStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        // Cancellation is allowed from any open state.
        next == Self::Cancelled || next.rank() > self.rank()
    }
}

impl Default for PrescriptionStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl Default for NotificationKind {
    fn default() -> Self {
        Self::Info
    }
}
