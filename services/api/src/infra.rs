use citizenship_workflow::workflows::citizenship::{ApplicationCategory, Role};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

pub(crate) fn parse_role(raw: &str) -> Result<Role, String> {
    Role::from_code(raw).ok_or_else(|| {
        let known: Vec<_> = Role::ALL.iter().map(|role| role.label()).collect();
        format!("unknown role '{raw}' (expected one of {})", known.join(", "))
    })
}

pub(crate) fn parse_category(raw: &str) -> Result<ApplicationCategory, String> {
    match raw.trim().to_ascii_uppercase().replace('-', "_").as_str() {
        "BORANG_H" | "BH" => Ok(ApplicationCategory::BorangH),
        "BORANG_G" | "BG" => Ok(ApplicationCategory::BorangG),
        "TADBIR_SUMPAH" | "TS" => Ok(ApplicationCategory::TadbirSumpah),
        _ => Err(format!(
            "unknown category '{raw}' (expected BORANG_H, BORANG_G or TADBIR_SUMPAH)"
        )),
    }
}
