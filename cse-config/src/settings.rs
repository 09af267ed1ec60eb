//! Typed view over the CSE's configuration surface (spec §6,
//! "Configuration surface").

use crate::{CseConfig, ConfigError};
use cse_model::{CseType, Permission, PERM_ALL};

/// The CSE's strongly-typed configuration, built from raw [`CseConfig`]
/// values by [`CseConfig::with_settings`].
#[derive(Debug, Clone)]
pub struct CseSettings {
    /// `cseOriginator` — the CSE's own originator, exempt from
    /// access-control checks (spec §4.3, rule 1).
    pub cse_originator: String,
    /// `cseRn` — the CSEBase resource name.
    pub cse_rn: String,
    /// `cseType` — IN / MN / ASN (spec §4.2, §6).
    pub cse_type: CseType,
    /// `cse.registration.allowedAEOriginators` — originator patterns
    /// permitted to register as an AE; empty means unrestricted.
    pub allowed_ae_originators: Vec<String>,
    /// `cse.registration.allowedCSROriginators`.
    pub allowed_csr_originators: Vec<String>,
    /// `cse.checkExpirationsInterval`, seconds between expiration sweeps
    /// (spec §4.2, "expiration monitor").
    pub check_expirations_interval_secs: u64,
    /// `cse.acp.pvs.acop` — default self-permission mask granted to the
    /// creator on an internally created ACP.
    pub default_acp_pvs_acop: Permission,
}

impl CseSettings {
    pub fn from_config(config: &CseConfig) -> Result<Self, ConfigError> {
        Ok(CseSettings {
            cse_originator: config.get("cseOriginator")?,
            cse_rn: config.get_or("cseRn", "cse-in".to_string()),
            cse_type: parse_cse_type(&config.get_or("cseType", "IN".to_string()))?,
            allowed_ae_originators: config.get_or("cse.registration.allowedAEOriginators", Vec::new()),
            allowed_csr_originators: config.get_or("cse.registration.allowedCSROriginators", Vec::new()),
            check_expirations_interval_secs: config.get_or("cse.checkExpirationsInterval", 60),
            default_acp_pvs_acop: config.get_or::<i64>("cse.acp.pvs.acop", PERM_ALL as i64) as Permission,
        })
    }
}

fn parse_cse_type(raw: &str) -> Result<CseType, ConfigError> {
    match raw.to_uppercase().as_str() {
        "IN" => Ok(CseType::In),
        "MN" => Ok(CseType::Mn),
        "ASN" => Ok(CseType::Asn),
        _ => Err(ConfigError::TypeMismatch { key: "cseType".to_string(), expected: "IN | MN | ASN" }),
    }
}
