//! Declarative page-filling plan.
//!
//! A [`FieldPlan`] is tenant data loaded from TOML: an ordered list of field
//! operations (logical name, page locator, operation, value source) plus the
//! markers that reveal the gate's decision after submission. Resolving a plan
//! against one request produces a [`FieldDraft`] scoped to that submission.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::domain::RequestSnapshot;

#[derive(Debug, Error)]
pub enum FieldPlanError {
    #[error("cannot read field plan {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed field plan: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("field '{field}' is misconfigured: {reason}")]
    Invalid { field: String, reason: String },

    #[error("required field '{field}' has no value")]
    MissingValue { field: String },

    #[error("field '{field}' has no option mapped for its value")]
    Unmapped { field: String },

    #[error("file for field '{field}' does not exist")]
    MissingFile { field: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldOp {
    Text,
    SelectValue,
    SelectLabel,
    Attach,
    Press,
    Click,
    Pause,
}

impl FieldOp {
    fn takes_value(self) -> bool {
        matches!(
            self,
            FieldOp::Text | FieldOp::SelectValue | FieldOp::SelectLabel | FieldOp::Attach
        )
    }
}

/// One entry of `[[fields]]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    /// Logical name; the only part of a field that is ever logged.
    pub name: String,
    pub op: FieldOp,
    #[serde(default)]
    pub selector: Option<String>,
    /// Dotted path into the request snapshot, e.g. `payload.driver.cpf`.
    #[serde(default)]
    pub source: Option<String>,
    /// Used when the source is absent or blank.
    #[serde(default)]
    pub default: Option<String>,
    /// Source value -> page option (e.g. gender label -> option value).
    #[serde(default)]
    pub value_map: BTreeMap<String, String>,
    #[serde(default)]
    pub optional: bool,
    /// `select_label`: fall back to a partial, case-insensitive label match.
    #[serde(default)]
    pub partial_label: bool,
    /// `attach`: control clicked first to reveal the file input.
    #[serde(default)]
    pub trigger: Option<String>,
    /// `press`: key name understood by the driver.
    #[serde(default)]
    pub key: Option<String>,
    /// `pause`: settle time in milliseconds.
    #[serde(default)]
    pub millis: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Decision {
    Apto,
    #[serde(rename = "NaoApto", alias = "nao_apto")]
    NaoApto,
}

/// Result-page marker: `selector` present (and containing `contains`, if set).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionMarker {
    pub selector: String,
    #[serde(default)]
    pub contains: Option<String>,
    pub decision: Decision,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldPlan {
    #[serde(default)]
    pub fields: Vec<FieldSpec>,
    /// Evaluated in order; the first marker that matches decides.
    #[serde(default)]
    pub decisions: Vec<DecisionMarker>,
    /// Control that saves the form.
    #[serde(default)]
    pub submit_selector: Option<String>,
}

/// Concrete page action for one field of one submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DraftAction {
    Fill { selector: String, value: String },
    SelectValue { selector: String, value: String },
    SelectLabel { selector: String, label: String, partial: bool },
    Attach { trigger: Option<String>, selector: String, path: PathBuf },
    Press { selector: String, key: String },
    Click { selector: String },
    Pause(Duration),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldStep {
    pub name: String,
    pub action: DraftAction,
    pub optional: bool,
}

/// A plan resolved against one request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldDraft {
    pub steps: Vec<FieldStep>,
    /// Optional fields left out because they had no value.
    pub skipped: Vec<String>,
}

impl FieldPlan {
    pub fn from_toml_str(raw: &str) -> Result<Self, FieldPlanError> {
        let plan: FieldPlan = toml::from_str(raw)?;
        plan.validate()?;
        Ok(plan)
    }

    pub fn load(path: &Path) -> Result<Self, FieldPlanError> {
        let raw = std::fs::read_to_string(path).map_err(|source| FieldPlanError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    /// Structural checks that do not depend on any request.
    pub fn validate(&self) -> Result<(), FieldPlanError> {
        for spec in &self.fields {
            let invalid = |reason: &str| FieldPlanError::Invalid {
                field: spec.name.clone(),
                reason: reason.to_string(),
            };
            if spec.op != FieldOp::Pause && spec.selector.as_deref().map_or(true, str::is_empty) {
                return Err(invalid("selector is required"));
            }
            if spec.op.takes_value() && spec.source.is_none() && spec.default.is_none() {
                return Err(invalid("needs a source or a default"));
            }
            if spec.op == FieldOp::Press && spec.key.is_none() {
                return Err(invalid("press needs a key"));
            }
            if spec.op == FieldOp::Pause && spec.millis.is_none() {
                return Err(invalid("pause needs millis"));
            }
        }
        Ok(())
    }

    /// Resolve every field against `snapshot`.
    ///
    /// Required fields without a value fail the whole draft; optional ones are
    /// recorded in [`FieldDraft::skipped`].
    pub fn resolve(&self, snapshot: &RequestSnapshot) -> Result<FieldDraft, FieldPlanError> {
        let context = serde_json::to_value(snapshot).map_err(|e| FieldPlanError::Invalid {
            field: "<snapshot>".to_string(),
            reason: e.to_string(),
        })?;

        let mut draft = FieldDraft::default();
        for spec in &self.fields {
            match resolve_step(spec, &context)? {
                Some(action) => draft.steps.push(FieldStep {
                    name: spec.name.clone(),
                    action,
                    optional: spec.optional,
                }),
                None => draft.skipped.push(spec.name.clone()),
            }
        }
        Ok(draft)
    }
}

fn lookup<'a>(context: &'a serde_json::Value, path: &str) -> Option<&'a serde_json::Value> {
    path.split('.')
        .filter(|segment| !segment.is_empty())
        .try_fold(context, |value, segment| value.get(segment))
}

fn scalar_text(value: &serde_json::Value) -> Option<String> {
    let text = match value {
        serde_json::Value::String(s) => s.trim().to_string(),
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

fn resolve_step(
    spec: &FieldSpec,
    context: &serde_json::Value,
) -> Result<Option<DraftAction>, FieldPlanError> {
    let selector = spec.selector.clone().unwrap_or_default();

    match spec.op {
        FieldOp::Press => {
            return Ok(Some(DraftAction::Press {
                selector,
                key: spec.key.clone().unwrap_or_default(),
            }))
        }
        FieldOp::Click => return Ok(Some(DraftAction::Click { selector })),
        FieldOp::Pause => {
            return Ok(Some(DraftAction::Pause(Duration::from_millis(
                spec.millis.unwrap_or_default(),
            ))))
        }
        _ => {}
    }

    let raw = spec
        .source
        .as_deref()
        .and_then(|path| lookup(context, path))
        .and_then(scalar_text)
        .or_else(|| spec.default.clone());

    let Some(raw) = raw else {
        if spec.optional {
            return Ok(None);
        }
        return Err(FieldPlanError::MissingValue {
            field: spec.name.clone(),
        });
    };

    let value = if spec.value_map.is_empty() {
        raw
    } else {
        let mapped = spec.value_map.get(&raw).cloned().or_else(|| {
            spec.value_map
                .iter()
                .find(|(k, _)| k.to_lowercase() == raw.to_lowercase())
                .map(|(_, v)| v.clone())
        });
        match mapped {
            Some(v) => v,
            None if spec.optional => return Ok(None),
            None => {
                return Err(FieldPlanError::Unmapped {
                    field: spec.name.clone(),
                })
            }
        }
    };

    let action = match spec.op {
        FieldOp::Text => DraftAction::Fill { selector, value },
        FieldOp::SelectValue => DraftAction::SelectValue { selector, value },
        FieldOp::SelectLabel => DraftAction::SelectLabel {
            selector,
            label: value,
            partial: spec.partial_label,
        },
        FieldOp::Attach => {
            let path = PathBuf::from(value);
            if !path.is_file() {
                if spec.optional {
                    return Ok(None);
                }
                return Err(FieldPlanError::MissingFile {
                    field: spec.name.clone(),
                });
            }
            DraftAction::Attach {
                trigger: spec.trigger.clone(),
                selector,
                path,
            }
        }
        op => {
            return Err(FieldPlanError::Invalid {
                field: spec.name.clone(),
                reason: format!("{op:?} does not take a value"),
            })
        }
    };
    Ok(Some(action))
}
