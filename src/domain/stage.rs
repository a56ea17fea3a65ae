use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The four verification stages a request moves through.
///
/// `BrasilRisk` is the authorization gate; the other three only run once the
/// gate has decided "Apto".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    BrasilRisk,
    RlogCielo,
    RlogGeral,
    Bringg,
}

impl Stage {
    pub const ALL: [Stage; 4] = [
        Stage::BrasilRisk,
        Stage::RlogCielo,
        Stage::RlogGeral,
        Stage::Bringg,
    ];

    pub const DOWNSTREAM: [Stage; 3] = [Stage::RlogCielo, Stage::RlogGeral, Stage::Bringg];

    pub fn is_gate(self) -> bool {
        matches!(self, Stage::BrasilRisk)
    }

    /// Name of the external system, used as the event origin.
    pub fn system_name(self) -> &'static str {
        match self {
            Stage::BrasilRisk => "Brasil Risk",
            Stage::RlogCielo => "Rlog Cielo",
            Stage::RlogGeral => "Rlog Geral",
            Stage::Bringg => "Bringg",
        }
    }

    pub fn slug(self) -> &'static str {
        match self {
            Stage::BrasilRisk => "brasil_risk",
            Stage::RlogCielo => "rlog_cielo",
            Stage::RlogGeral => "rlog_geral",
            Stage::Bringg => "bringg",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.system_name())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown stage '{0}' (expected one of: gate, brasil-risk, rlog-cielo, rlog-geral, bringg)")]
pub struct UnknownStage(pub String);

impl FromStr for Stage {
    type Err = UnknownStage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        match key.as_str() {
            "gate" | "brasil_risk" | "brasilrisk" => Ok(Stage::BrasilRisk),
            "a" | "downstream_a" | "rlog_cielo" => Ok(Stage::RlogCielo),
            "b" | "downstream_b" | "rlog_geral" => Ok(Stage::RlogGeral),
            "c" | "downstream_c" | "bringg" => Ok(Stage::Bringg),
            _ => Err(UnknownStage(s.to_string())),
        }
    }
}
