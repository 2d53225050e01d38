//! Phase table and transition rules for the licensing workflow.
//!
//! This module provides:
//! - `Phase` — the closed, totally ordered set of approval phases
//! - `Role` — the reviewing roles, each owning exactly one phase
//! - `next_status` — the pure transition function used by the advance service
//!
//! The table is fixed for the process lifetime; there is no runtime
//! configuration of phases or role ownership.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// One stage in the fixed linear approval sequence.
///
/// `Phase::ALL` defines the total order. `MojReview` is the entry phase for
/// newly created applications; `OperatorReview` is terminal and admits no
/// further transitions.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    MojReview,
    ClubReview,
    PoliceReview,
    ProvinceReview,
    IntelligenceReview,
    CfrReview,
    OperatorReview,
}

impl Phase {
    /// The ordered phase table. Index 0 is the entry phase, the last index
    /// is terminal.
    pub const ALL: [Phase; 7] = [
        Phase::MojReview,
        Phase::ClubReview,
        Phase::PoliceReview,
        Phase::ProvinceReview,
        Phase::IntelligenceReview,
        Phase::CfrReview,
        Phase::OperatorReview,
    ];

    /// The phase assigned to newly created applications.
    pub fn entry() -> Phase {
        Phase::ALL[0]
    }

    /// Position of this phase in the ordered table.
    pub fn index(&self) -> usize {
        Phase::ALL
            .iter()
            .position(|p| p == self)
            .expect("phase present in table")
    }

    /// The single successor phase, or `None` at the terminal phase.
    pub fn next(&self) -> Option<Phase> {
        Phase::ALL.get(self.index() + 1).copied()
    }

    pub fn is_terminal(&self) -> bool {
        self.next().is_none()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MojReview => "moj_review",
            Self::ClubReview => "club_review",
            Self::PoliceReview => "police_review",
            Self::ProvinceReview => "province_review",
            Self::IntelligenceReview => "intelligence_review",
            Self::CfrReview => "cfr_review",
            Self::OperatorReview => "operator_review",
        }
    }
}

impl FromStr for Phase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "moj_review" => Ok(Self::MojReview),
            "club_review" => Ok(Self::ClubReview),
            "police_review" => Ok(Self::PoliceReview),
            "province_review" => Ok(Self::ProvinceReview),
            "intelligence_review" => Ok(Self::IntelligenceReview),
            "cfr_review" => Ok(Self::CfrReview),
            "operator_review" => Ok(Self::OperatorReview),
            _ => Err(format!("Invalid phase: {}", s)),
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An approval role. Each role is authorized to act on applications sitting
/// at exactly one phase — the phase returned by [`Role::phase`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Moj,
    Club,
    Police,
    Province,
    Intelligence,
    Cfr,
    Operator,
}

impl Role {
    pub const ALL: [Role; 7] = [
        Role::Moj,
        Role::Club,
        Role::Police,
        Role::Province,
        Role::Intelligence,
        Role::Cfr,
        Role::Operator,
    ];

    /// The single phase this role owns and may act on.
    pub fn phase(&self) -> Phase {
        match self {
            Self::Moj => Phase::MojReview,
            Self::Club => Phase::ClubReview,
            Self::Police => Phase::PoliceReview,
            Self::Province => Phase::ProvinceReview,
            Self::Intelligence => Phase::IntelligenceReview,
            Self::Cfr => Phase::CfrReview,
            Self::Operator => Phase::OperatorReview,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Moj => "moj",
            Self::Club => "club",
            Self::Police => "police",
            Self::Province => "province",
            Self::Intelligence => "intelligence",
            Self::Cfr => "cfr",
            Self::Operator => "operator",
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "moj" => Ok(Self::Moj),
            "club" => Ok(Self::Club),
            "police" => Ok(Self::Police),
            "province" => Ok(Self::Province),
            "intelligence" => Ok(Self::Intelligence),
            "cfr" => Ok(Self::Cfr),
            "operator" => Ok(Self::Operator),
            _ => Err(format!("Invalid role: {}", s)),
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Compute the phase an application would move to if `role` acted on it now.
///
/// - `None` current status (application not yet created) → the entry phase.
/// - Terminal current status → `None`; the application is frozen.
/// - Otherwise the single successor, but only when `role` owns the current
///   phase. Any other role gets `None` (unauthorized transition request).
///
/// Pure and referentially transparent: same inputs always yield the same
/// output.
pub fn next_status(current: Option<Phase>, role: Role) -> Option<Phase> {
    let current = match current {
        Some(phase) => phase,
        None => return Some(Phase::entry()),
    };
    if role.phase() != current {
        return None;
    }
    current.next()
}

/// Verify that no two roles own the same phase. Run once at startup to
/// catch future misconfiguration of the role table.
pub fn assert_role_phase_injective() {
    for (i, a) in Role::ALL.iter().enumerate() {
        for b in Role::ALL.iter().skip(i + 1) {
            assert!(
                a.phase() != b.phase(),
                "roles {} and {} both own phase {}",
                a,
                b,
                a.phase()
            );
        }
    }
}
