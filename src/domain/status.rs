use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Status of a single stage.
///
/// Persisted as the literal Portuguese label returned by [`StageStatus::as_str`].
/// Parsing also accepts the normalized legacy forms ("done", "concluido",
/// "running", ...) so old rows read back as the canonical variant; writes only
/// ever emit the canonical label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum StageStatus {
    Awaiting,
    Running,
    PendingHuman,
    BlockedDocument,
    Apto,
    NaoApto,
    Completed,
    Error,
}

impl StageStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            StageStatus::Awaiting => "Aguardando",
            StageStatus::Running => "Em processo",
            StageStatus::PendingHuman => "Aguardando Humano",
            StageStatus::BlockedDocument => "Bloqueado (CNH)",
            StageStatus::Apto => "Apto",
            StageStatus::NaoApto => "Não Apto",
            StageStatus::Completed => "Concluído",
            StageStatus::Error => "Erro",
        }
    }

    /// Statuses after which the stage must not run again.
    pub fn is_finished(self) -> bool {
        matches!(
            self,
            StageStatus::Apto | StageStatus::NaoApto | StageStatus::Completed
        )
    }
}

/// Overall status of a request, always produced by [`derive_overall`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum OverallStatus {
    Awaiting,
    BlockedDocument,
    ClosedNotApto,
    Error,
    Completed,
    InProgress,
}

impl OverallStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            OverallStatus::Awaiting => "Aguardando",
            OverallStatus::BlockedDocument => "Bloqueado (CNH)",
            OverallStatus::ClosedNotApto => "Encerrado (Não Apto)",
            OverallStatus::Error => "Erro",
            OverallStatus::Completed => "Concluído",
            OverallStatus::InProgress => "Em Andamento",
        }
    }
}

/// Derive the overall status from the four stage statuses.
///
/// Rules are evaluated in order; the first match wins, which also resolves
/// inconsistent combinations deterministically.
pub fn derive_overall(
    gate: StageStatus,
    downstream: [StageStatus; 3],
    document_received: bool,
) -> OverallStatus {
    if !document_received && gate == StageStatus::Awaiting {
        return OverallStatus::Awaiting;
    }
    if gate == StageStatus::BlockedDocument {
        return OverallStatus::BlockedDocument;
    }
    if gate == StageStatus::NaoApto {
        return OverallStatus::ClosedNotApto;
    }
    if gate == StageStatus::Error || downstream.contains(&StageStatus::Error) {
        return OverallStatus::Error;
    }
    if gate == StageStatus::Apto {
        if downstream.iter().all(|s| *s == StageStatus::Completed) {
            return OverallStatus::Completed;
        }
        return OverallStatus::InProgress;
    }
    OverallStatus::Awaiting
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown status label '{0}'")]
pub struct UnknownStatus(pub String);

/// Lower-case, strip Portuguese diacritics and unify separators.
fn fold(label: &str) -> String {
    let folded: String = label
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| match c {
            'á' | 'à' | 'â' | 'ã' => 'a',
            'é' | 'ê' => 'e',
            'í' => 'i',
            'ó' | 'ô' | 'õ' => 'o',
            'ú' | 'ü' => 'u',
            'ç' => 'c',
            '_' | '-' => ' ',
            other => other,
        })
        .collect();
    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

impl FromStr for StageStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let status = match fold(s).as_str() {
            "" | "aguardando" | "awaiting" | "pending" | "pendente" => StageStatus::Awaiting,
            "em processo" | "running" | "processing" | "in progress" => StageStatus::Running,
            "aguardando humano" | "pending human" | "need human" | "human required" => {
                StageStatus::PendingHuman
            }
            "bloqueado (cnh)" | "bloqueado" | "blocked" | "blocked (document)" => {
                StageStatus::BlockedDocument
            }
            "apto" => StageStatus::Apto,
            "nao apto" | "not apto" => StageStatus::NaoApto,
            "concluido" | "done" | "completed" => StageStatus::Completed,
            "erro" | "error" | "failed" => StageStatus::Error,
            _ => return Err(UnknownStatus(s.to_string())),
        };
        Ok(status)
    }
}

impl FromStr for OverallStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let folded = fold(s);
        let status = match folded.as_str() {
            "" | "aguardando" | "awaiting" => OverallStatus::Awaiting,
            "bloqueado (cnh)" | "blocked (document)" => OverallStatus::BlockedDocument,
            "encerrado (nao apto)" | "closed" => OverallStatus::ClosedNotApto,
            "erro" | "error" => OverallStatus::Error,
            "concluido" | "done" | "completed" => OverallStatus::Completed,
            "em andamento" | "em processo" | "in progress" => OverallStatus::InProgress,
            // Legacy intermediate labels written by older versions.
            other if other.starts_with("aguardando (") => OverallStatus::InProgress,
            _ => return Err(UnknownStatus(s.to_string())),
        };
        Ok(status)
    }
}

macro_rules! label_conversions {
    ($ty:ty) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl From<$ty> for String {
            fn from(value: $ty) -> Self {
                value.as_str().to_string()
            }
        }

        impl TryFrom<String> for $ty {
            type Error = UnknownStatus;

            fn try_from(value: String) -> Result<Self, UnknownStatus> {
                value.parse()
            }
        }
    };
}

label_conversions!(StageStatus);
label_conversions!(OverallStatus);
