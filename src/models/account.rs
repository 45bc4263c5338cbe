use serde::{ Deserialize, Serialize };

pub const DEFAULT_QUOTA_BYTES: u64 = 100 * 1024 * 1024;
pub const QUOTA_WARNING_THRESHOLD: f64 = 0.8;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: Option<String>,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub role: Option<String>,
    pub organization_id: Option<String>,
}

impl UserProfile {
    pub fn is_admin(&self) -> bool {
        self.role
            .as_deref()
            .map(|r| r.eq_ignore_ascii_case("admin"))
            .unwrap_or(false)
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct QuotaInfo {
    pub limit_bytes: Option<u64>,
    pub used_conv_bytes: Option<u64>,
    pub used_doc_bytes: Option<u64>,
    pub used_total_bytes: Option<u64>,
    pub used_ratio: Option<f64>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct QuotaUsage {
    pub used_bytes: u64,
    pub limit_bytes: u64,
    pub used_conversation_bytes: u64,
    pub used_document_bytes: u64,
    pub warn: bool,
}

impl From<QuotaInfo> for QuotaUsage {
    fn from(info: QuotaInfo) -> Self {
        let limit_bytes = info.limit_bytes.unwrap_or(DEFAULT_QUOTA_BYTES);
        let used_bytes = info.used_total_bytes.unwrap_or(0);
        let used_ratio = info.used_ratio.unwrap_or_else(|| {
            if limit_bytes > 0 { (used_bytes as f64) / (limit_bytes as f64) } else { 0.0 }
        });
        Self {
            used_bytes,
            limit_bytes,
            used_conversation_bytes: info.used_conv_bytes.unwrap_or(0),
            used_document_bytes: info.used_doc_bytes.unwrap_or(0),
            warn: used_ratio >= QUOTA_WARNING_THRESHOLD,
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct SummaryMetrics {
    pub total_messages: u64,
    pub tokens_used: u64,
    pub avg_latency_ms: f64,
    pub success_rate: f64,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct TelemetrySummary {
    pub range: String,
    pub current: SummaryMetrics,
    pub previous: SummaryMetrics,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_role_is_case_insensitive() {
        let profile = UserProfile { role: Some("Admin".into()), ..Default::default() };
        assert!(profile.is_admin());
        assert!(!UserProfile::default().is_admin());
    }

    #[test]
    fn quota_falls_back_to_default_limit_and_computes_ratio() {
        let usage = QuotaUsage::from(QuotaInfo {
            used_total_bytes: Some(90 * 1024 * 1024),
            ..Default::default()
        });
        assert_eq!(usage.limit_bytes, DEFAULT_QUOTA_BYTES);
        assert!(usage.warn);

        let low = QuotaUsage::from(QuotaInfo {
            limit_bytes: Some(1000),
            used_total_bytes: Some(10),
            used_ratio: Some(0.01),
            ..Default::default()
        });
        assert!(!low.warn);
    }
}
