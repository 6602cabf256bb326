//! Owner KYC records and the review rules applied to them
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{LifecycleError, TransitionDenial};
use crate::utils::{all_digits, is_blank};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KycStatus {
    Pending,
    Approved,
    Rejected,
}

impl fmt::Display for KycStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            KycStatus::Pending => "pending",
            KycStatus::Approved => "approved",
            KycStatus::Rejected => "rejected",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KycDecision {
    Approved,
    Rejected,
}

impl KycDecision {
    pub fn status(&self) -> KycStatus {
        match self {
            KycDecision::Approved => KycStatus::Approved,
            KycDecision::Rejected => KycStatus::Rejected,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KycFilter {
    All,
    Pending,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KycRecord {
    pub id: String,
    pub owner_id: String,
    pub status: KycStatus,
    #[serde(default)]
    pub rejected_reason: Option<String>,
    // identity
    pub name: String,
    pub mobile: String,
    pub email: String,
    // business
    pub company_name: String,
    pub address: String,
    pub city: String,
    pub state: String,
    pub pincode: String,
    pub pan_number: String,
    #[serde(default)]
    pub gst_number: Option<String>,
    // bank
    pub account_number: String,
    pub bank_name: String,
    pub ifsc_code: String,
}

/// Owner edits; `None` leaves a field as it is.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KycPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mobile: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pincode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pan_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gst_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bank_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ifsc_code: Option<String>,
}

fn check_required(field: &'static str, value: &str) -> Result<(), LifecycleError> {
    if is_blank(value) {
        return Err(LifecycleError::malformed(field, "is required"));
    }
    Ok(())
}

fn check_mobile(value: &str) -> Result<(), LifecycleError> {
    if !all_digits(value.trim(), 10) {
        return Err(LifecycleError::malformed("mobile", "must be 10 digits"));
    }
    Ok(())
}

fn check_email(value: &str) -> Result<(), LifecycleError> {
    let value = value.trim();
    match value.split_once('@') {
        Some((user, domain)) if !user.is_empty() && domain.contains('.') => Ok(()),
        _ => Err(LifecycleError::malformed("email", "not a valid email address")),
    }
}

fn check_pincode(value: &str) -> Result<(), LifecycleError> {
    if !all_digits(value.trim(), 6) {
        return Err(LifecycleError::malformed("pincode", "must be 6 digits"));
    }
    Ok(())
}

// AAAAA9999A
fn check_pan(value: &str) -> Result<(), LifecycleError> {
    let pan = value.trim().as_bytes();
    let valid = pan.len() == 10
        && pan[..5].iter().all(u8::is_ascii_uppercase)
        && pan[5..9].iter().all(u8::is_ascii_digit)
        && pan[9].is_ascii_uppercase();
    if !valid {
        return Err(LifecycleError::malformed("pan_number", "expected format AAAAA9999A"));
    }
    Ok(())
}

// AAAA0XXXXXX
fn check_ifsc(value: &str) -> Result<(), LifecycleError> {
    let ifsc = value.trim().as_bytes();
    let valid = ifsc.len() == 11
        && ifsc[..4].iter().all(u8::is_ascii_uppercase)
        && ifsc[4] == b'0'
        && ifsc[5..].iter().all(|b| b.is_ascii_uppercase() || b.is_ascii_digit());
    if !valid {
        return Err(LifecycleError::malformed("ifsc_code", "expected format AAAA0XXXXXX"));
    }
    Ok(())
}

fn check_gst(value: &str) -> Result<(), LifecycleError> {
    let gst = value.trim();
    if !gst.is_empty()
        && (gst.len() != 15 || !gst.bytes().all(|b| b.is_ascii_uppercase() || b.is_ascii_digit()))
    {
        return Err(LifecycleError::malformed("gst_number", "must be 15 characters"));
    }
    Ok(())
}

fn check_account(value: &str) -> Result<(), LifecycleError> {
    let account = value.trim();
    if account.len() < 9 || account.len() > 18 || !account.bytes().all(|b| b.is_ascii_digit()) {
        return Err(LifecycleError::malformed("account_number", "must be 9 to 18 digits"));
    }
    Ok(())
}

impl KycRecord {
    /// Owners may edit until an admin approves the record.
    pub fn is_editable_by_owner(&self) -> bool {
        self.status != KycStatus::Approved
    }

    pub fn validate(&self) -> Result<(), LifecycleError> {
        check_required("name", &self.name)?;
        check_mobile(&self.mobile)?;
        check_email(&self.email)?;
        check_required("company_name", &self.company_name)?;
        check_required("address", &self.address)?;
        check_required("city", &self.city)?;
        check_required("state", &self.state)?;
        check_pincode(&self.pincode)?;
        check_pan(&self.pan_number)?;
        if let Some(gst) = &self.gst_number {
            check_gst(gst)?;
        }
        check_account(&self.account_number)?;
        check_required("bank_name", &self.bank_name)?;
        check_ifsc(&self.ifsc_code)
    }

    /// Applies owner edits. A rejected record goes back to pending for another
    /// review cycle.
    pub fn apply_patch(&mut self, patch: &KycPatch) -> Result<(), LifecycleError> {
        if !self.is_editable_by_owner() {
            return Err(LifecycleError::IllegalTransition {
                subject: format!("kyc {}", self.id),
                from: self.status.to_string(),
                to: "edited".into(),
                reason: TransitionDenial::Terminal,
            });
        }
        patch.validate()?;

        let mut next = self.clone();
        let fields: [(&mut String, &Option<String>); 12] = [
            (&mut next.name, &patch.name),
            (&mut next.mobile, &patch.mobile),
            (&mut next.email, &patch.email),
            (&mut next.company_name, &patch.company_name),
            (&mut next.address, &patch.address),
            (&mut next.city, &patch.city),
            (&mut next.state, &patch.state),
            (&mut next.pincode, &patch.pincode),
            (&mut next.pan_number, &patch.pan_number),
            (&mut next.account_number, &patch.account_number),
            (&mut next.bank_name, &patch.bank_name),
            (&mut next.ifsc_code, &patch.ifsc_code),
        ];
        for (slot, value) in fields {
            if let Some(value) = value {
                *slot = value.trim().to_string();
            }
        }
        if let Some(gst) = &patch.gst_number {
            next.gst_number = Some(gst.trim().to_string()).filter(|g| !g.is_empty());
        }
        if next.status == KycStatus::Rejected {
            next.status = KycStatus::Pending;
            next.rejected_reason = None;
        }

        *self = next;
        Ok(())
    }
}

impl KycPatch {
    pub fn is_empty(&self) -> bool {
        *self == KycPatch::default()
    }

    pub fn validate(&self) -> Result<(), LifecycleError> {
        if self.is_empty() {
            return Err(LifecycleError::malformed("patch", "nothing to update"));
        }
        for (field, value) in [
            ("name", &self.name),
            ("company_name", &self.company_name),
            ("address", &self.address),
            ("city", &self.city),
            ("state", &self.state),
            ("bank_name", &self.bank_name),
        ] {
            if let Some(value) = value {
                check_required(field, value)?;
            }
        }
        if let Some(v) = &self.mobile {
            check_mobile(v)?;
        }
        if let Some(v) = &self.email {
            check_email(v)?;
        }
        if let Some(v) = &self.pincode {
            check_pincode(v)?;
        }
        if let Some(v) = &self.pan_number {
            check_pan(v)?;
        }
        if let Some(v) = &self.gst_number {
            check_gst(v)?;
        }
        if let Some(v) = &self.account_number {
            check_account(v)?;
        }
        if let Some(v) = &self.ifsc_code {
            check_ifsc(v)?;
        }
        Ok(())
    }
}

/// Review rule: only pending records are decided, and a rejection must say why.
pub fn check_review(
    record: &KycRecord,
    decision: KycDecision,
    reason: Option<&str>,
) -> Result<(), LifecycleError> {
    if decision == KycDecision::Rejected && reason.is_none_or(is_blank) {
        return Err(LifecycleError::malformed(
            "rejected_reason",
            "a reason is required to reject KYC",
        ));
    }
    if record.status != KycStatus::Pending {
        return Err(LifecycleError::IllegalTransition {
            subject: format!("kyc {}", record.id),
            from: record.status.to_string(),
            to: decision.status().to_string(),
            reason: TransitionDenial::NotInTable,
        });
    }
    Ok(())
}
