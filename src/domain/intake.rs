//! Intake document: what the form layer hands over when a request is created.
//!
//! Validation normalizes every field in place and produces a [`NewRequest`]
//! whose payload is the normalized document, so field plans resolve against
//! clean values.

use serde::{Deserialize, Serialize};

use super::request::{Applicant, CourierRole, NewRequest, RequestKind, Vehicle};
use crate::validators::{
    make_canonical_name, normalize_name, only_digits, require, validate_date_ddmmyyyy,
    validate_exact_digits, validate_phone, ValidationError,
};

fn default_profile() -> String {
    "Agregado".to_string()
}

fn default_cost_center() -> String {
    "FEDEX".to_string()
}

fn default_billing_company() -> String {
    "FEDEX BRASIL".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverData {
    pub name: String,
    pub gender: String,
    /// dd/mm/yyyy
    pub birth_date: String,
    pub cpf: String,
    pub rg: String,
    pub rg_issue_date: String,
    pub rg_issuer: String,
    #[serde(default)]
    pub father_name: Option<String>,
    pub mother_name: String,
    #[serde(default = "default_profile")]
    pub profile: String,
    #[serde(default = "default_cost_center")]
    pub cost_center: String,
    #[serde(default = "default_billing_company")]
    pub billing_company: String,

    pub cep: String,
    /// State label as shown by the target page ("São Paulo").
    pub state: String,
    pub city: String,
    pub district: String,
    pub street: String,
    pub number: String,
    #[serde(default)]
    pub complement: Option<String>,

    #[serde(default)]
    pub phone: Option<String>,
    pub mobile: String,
    #[serde(default)]
    pub business_phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,

    pub cnh_registration: String,
    pub cnh_number: String,
    pub cnh_category: String,
    pub cnh_expiry: String,
    pub cnh_state: String,
    /// Local path of the scanned license, attached when present.
    #[serde(default)]
    pub cnh_path: Option<String>,
}

impl DriverData {
    fn normalize(mut self) -> Result<Self, ValidationError> {
        self.name = normalize_name(&require("Nome", &self.name)?);
        self.mother_name = normalize_name(&require("Nome da mãe", &self.mother_name)?);
        self.father_name = self
            .father_name
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(normalize_name);
        self.gender = require("Gênero", &self.gender)?;
        self.cpf = validate_exact_digits("CPF", &self.cpf, 11)?;
        self.cep = validate_exact_digits("CEP", &self.cep, 8)?;
        self.birth_date = validate_date_ddmmyyyy("Data de nascimento", &self.birth_date)?;
        self.rg_issue_date = validate_date_ddmmyyyy("Data de emissão", &self.rg_issue_date)?;
        self.cnh_expiry = validate_date_ddmmyyyy("Validade da CNH", &self.cnh_expiry)?;
        self.mobile = validate_phone("Celular", &self.mobile)?;
        self.phone = optional_phone("Telefone", self.phone)?;
        self.business_phone = optional_phone("Telefone comercial", self.business_phone)?;

        for (label, value) in [
            ("RG", &mut self.rg),
            ("Número", &mut self.number),
            ("Registro da CNH", &mut self.cnh_registration),
            ("Número da CNH", &mut self.cnh_number),
        ] {
            let digits = only_digits(value);
            if digits.is_empty() {
                return Err(ValidationError::Required {
                    label: label.to_string(),
                });
            }
            *value = digits;
        }

        self.rg_issuer = require("Órgão expedidor", &self.rg_issuer)?;
        self.state = require("UF", &self.state)?;
        self.city = require("Cidade", &self.city)?;
        self.district = require("Bairro", &self.district)?;
        self.street = require("Logradouro", &self.street)?;
        self.cnh_category = require("Categoria da CNH", &self.cnh_category)?.to_uppercase();
        self.cnh_state = require("UF da CNH", &self.cnh_state)?;
        self.email = self.email.map(|e| e.trim().to_string()).filter(|e| !e.is_empty());
        self.complement = self
            .complement
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());
        Ok(self)
    }
}

fn optional_phone(label: &str, value: Option<String>) -> Result<Option<String>, ValidationError> {
    match value.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(v) => validate_phone(label, v).map(Some),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntakeDocument {
    pub kind: RequestKind,
    pub role: CourierRole,
    #[serde(default)]
    pub requester_name: Option<String>,
    #[serde(default)]
    pub requester_org: Option<String>,
    /// Operating base abbreviation used in the canonical name.
    #[serde(default)]
    pub base: Option<String>,
    #[serde(default)]
    pub modality: Option<String>,
    #[serde(default)]
    pub document_received: bool,
    pub driver: DriverData,
    /// Free-form vehicle data; must carry a `plate`.
    #[serde(default)]
    pub vehicle: Option<serde_json::Value>,
}

impl IntakeDocument {
    pub fn from_json(raw: &str) -> Result<Self, ValidationError> {
        serde_json::from_str(raw)
            .map_err(|e| ValidationError::Inconsistent(format!("malformed intake document: {e}")))
    }

    /// Normalize every field and build the request to persist.
    pub fn validate(mut self) -> Result<NewRequest, ValidationError> {
        self.driver = self.driver.normalize()?;

        let vehicle = match (self.kind.requires_vehicle(), self.vehicle.take()) {
            (true, None) => {
                return Err(ValidationError::Inconsistent(
                    "vehicle data is required for a registration with vehicle".to_string(),
                ))
            }
            (_, Some(payload)) => Some(vehicle_from(payload)?),
            (false, None) => None,
        };

        let canonical_name = match (&self.base, &self.modality) {
            (Some(base), Some(modality)) => make_canonical_name(base, &self.driver.name, modality),
            _ => None,
        };

        let applicant = Applicant {
            document_number: self.driver.cpf.clone(),
            display_name: self.driver.name.clone(),
            canonical_name,
        };

        let payload = serde_json::to_value(&self)
            .map_err(|e| ValidationError::Inconsistent(format!("payload encoding failed: {e}")))?;

        Ok(NewRequest {
            kind: self.kind,
            role: self.role,
            applicant,
            requester_name: self.requester_name,
            requester_org: self.requester_org,
            document_received: self.document_received,
            payload,
            vehicle,
        })
    }
}

fn vehicle_from(payload: serde_json::Value) -> Result<Vehicle, ValidationError> {
    let plate = payload
        .get("plate")
        .and_then(|v| v.as_str())
        .map(|p| p.trim().to_uppercase())
        .unwrap_or_default();
    if plate.len() < 6 {
        return Err(ValidationError::Inconsistent(format!(
            "invalid vehicle plate '{plate}'"
        )));
    }
    Ok(Vehicle { plate, payload })
}
