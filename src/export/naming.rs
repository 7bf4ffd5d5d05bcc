//! File and folder naming for session output

use chrono::{DateTime, Local};
use templog_types::Session;

/// Keep alphanumerics, space, `-` and `_`; trim the rest
pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '-' | '_'))
        .collect::<String>()
        .trim()
        .to_string()
}

fn stamp(at: &DateTime<Local>) -> String {
    at.format("%Y-%m-%d|%H:%M:%S").to_string()
}

/// `{name}[AT:{counter:03}][{timestamp}][UUID:{6 chars}]`
fn tagged(base: &str, counter: u32, at: &DateTime<Local>, session: &Session) -> String {
    let base = match sanitize_filename(base) {
        name if name.is_empty() => "session".to_string(),
        name => name,
    };
    format!("{}[AT:{:03}][{}][UUID:{}]", base, counter, stamp(at), session.id.short())
}

/// Folder of one session inside the measurement folder
pub fn session_folder_name(session: &Session, counter: u32) -> String {
    tagged(&session.name, counter, &session.started_at, session)
}

/// Name of an output file inside the session folder
pub fn session_file_name(base: &str, extension: &str, session: &Session, counter: u32) -> String {
    format!("{}.{}", tagged(base, counter, &session.started_at, session), extension)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use templog_types::ThresholdConfig;

    fn session(name: &str) -> Session {
        let started = Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        Session::new(name, ThresholdConfig::none(), None, Vec::new(), started)
    }

    #[test]
    fn test_sanitize_keeps_allowed_characters() {
        assert_eq!(sanitize_filename("  Oven run #3 / ä-test_1 "), "Oven run 3  ä-test_1");
        assert_eq!(sanitize_filename("../../etc"), "etc");
        assert_eq!(sanitize_filename("***"), "");
    }

    #[test]
    fn test_folder_name_layout() {
        let session = session("oven/run");
        let name = session_folder_name(&session, 7);
        let expected = format!("ovenrun[AT:007][2024-03-09|14:05:07][UUID:{}]", session.id.short());
        assert_eq!(name, expected);
        assert_eq!(session.id.short().len(), 6);
    }

    #[test]
    fn test_empty_name_gets_placeholder() {
        let session = session("%%%");
        assert!(session_folder_name(&session, 1).starts_with("session[AT:001]"));
        assert!(session_file_name("temp_data", "csv", &session, 1).ends_with(".csv"));
    }
}
