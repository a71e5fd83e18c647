//! Entity labels, token-prefix aliases, and resolution priority.
//!
//! Labels are an open set: built-in recognizers emit the constants below,
//! and custom recognizers may introduce their own. The alias table maps a
//! raw label to the prefix used inside emitted tokens (`PERSON` entities
//! surface as `[PATIENT_A]`, not `[PERSON_A]`).

/// A person's name.
pub const PERSON: &str = "PERSON";
/// An email address.
pub const EMAIL_ADDRESS: &str = "EMAIL_ADDRESS";
/// A phone number.
pub const PHONE_NUMBER: &str = "PHONE_NUMBER";
/// An IPv4 address.
pub const IP_ADDRESS: &str = "IP_ADDRESS";
/// A date or time expression.
pub const DATE_TIME: &str = "DATE_TIME";
/// A URL.
pub const URL: &str = "URL";
/// A payment card number.
pub const CREDIT_CARD: &str = "CREDIT_CARD";
/// A US social security number.
pub const US_SSN: &str = "US_SSN";
/// A medical record number.
pub const MRN: &str = "MRN";
/// A clinical protocol identifier.
pub const PROTOCOL_ID: &str = "PROTOCOL_ID";
/// A manufacturing lot number.
pub const LOT_NUMBER: &str = "LOT_NUMBER";
/// A DNA base sequence.
pub const GENE_SEQUENCE: &str = "GENE_SEQUENCE";
/// A CAS chemical registry number.
pub const CHEMICAL_CAS: &str = "CHEMICAL_CAS";
/// An API key, JWT, or similar credential.
pub const SECRET_KEY: &str = "SECRET_KEY";

/// Returns the prefix used when building tokens for `label`.
///
/// Well-known labels are shortened to their domain aliases; any other
/// label is used verbatim.
#[must_use]
pub fn token_prefix(label: &str) -> &str {
    match label {
        PERSON => "PATIENT",
        DATE_TIME => "DATE",
        EMAIL_ADDRESS => "EMAIL",
        PHONE_NUMBER => "PHONE",
        IP_ADDRESS => "IP",
        other => other,
    }
}

/// Resolution rank for overlap tie-breaks; lower rank wins.
///
/// Labels outside the table share the weakest rank and fall back to
/// alphabetical comparison in the resolver.
#[must_use]
pub(crate) fn priority_rank(label: &str) -> u8 {
    match label {
        SECRET_KEY => 0,
        US_SSN => 1,
        MRN => 2,
        CREDIT_CARD => 3,
        EMAIL_ADDRESS => 4,
        PHONE_NUMBER => 5,
        IP_ADDRESS => 6,
        PERSON => 7,
        DATE_TIME => 8,
        URL => 9,
        _ => 10,
    }
}
