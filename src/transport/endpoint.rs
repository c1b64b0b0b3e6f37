use crate::config::{DashboardConfig, DashboardView};

pub const DASHBOARD_PATH: &str = "/ws/dashboard";
pub const EXERCISE_PATH_PREFIX: &str = "/ws/exercise";

/// `/ws/exercise/{key}?modes=a,b`
pub fn exercise_path(exercise_key: &str, detection_modes: &[String]) -> String {
    let mut path = format!("{EXERCISE_PATH_PREFIX}/{}", encode_component(exercise_key));
    if !detection_modes.is_empty() {
        let modes: Vec<String> = detection_modes.iter().map(|m| encode_component(m)).collect();
        path.push_str("?modes=");
        path.push_str(&modes.join(","));
    }
    path
}

pub fn consumer_path(config: &DashboardConfig) -> String {
    match config.view {
        DashboardView::Dashboard => DASHBOARD_PATH.to_string(),
        DashboardView::Exercise => exercise_path(&config.exercise_key, &config.detection_modes),
    }
}

/// Connection candidates in priority order: same-origin port, then the direct port.
pub fn candidate_urls(config: &DashboardConfig) -> Vec<String> {
    let path = consumer_path(config);
    let mut urls = vec![format!("ws://{}:{}{}", config.host, config.port, path)];
    if config.fallback_port != config.port {
        urls.push(format!("ws://{}:{}{}", config.host, config.fallback_port, path));
    }
    urls
}

/// Percent-encode everything outside the RFC 3986 unreserved set
fn encode_component(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exercise_path() {
        let modes = vec!["pose".to_string(), "depth".to_string()];
        assert_eq!(
            exercise_path("standing_knee_flexion", &modes),
            "/ws/exercise/standing_knee_flexion?modes=pose,depth"
        );
        assert_eq!(exercise_path("squat", &[]), "/ws/exercise/squat");
    }

    #[test]
    fn test_exercise_key_is_encoded() {
        assert_eq!(exercise_path("arm raise/left", &[]), "/ws/exercise/arm%20raise%2Fleft");
    }

    #[test]
    fn test_candidates_same_origin_first() {
        let config = DashboardConfig::default();
        assert_eq!(
            candidate_urls(&config),
            vec![
                "ws://127.0.0.1:8080/ws/dashboard".to_string(),
                "ws://127.0.0.1:8765/ws/dashboard".to_string(),
            ]
        );
    }

    #[test]
    fn test_candidates_collapse_equal_ports() {
        let config = DashboardConfig {
            fallback_port: 8080,
            view: DashboardView::Exercise,
            ..DashboardConfig::default()
        };
        let urls = candidate_urls(&config);
        assert_eq!(urls.len(), 1);
        assert!(urls[0].starts_with("ws://127.0.0.1:8080/ws/exercise/"));
    }
}
