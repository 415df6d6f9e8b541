use anyhow::{anyhow, Result};

use facesweep_core::Routine;

/// Environment variable naming the routine this deployment runs.
pub const ROUTINE_VAR: &str = "FACESWEEP_ROUTINE";

/// Each deployment runs exactly one routine, fixed at cold start.
pub fn resolve_routine(lookup: impl Fn(&str) -> Option<String>) -> Result<Routine> {
    let name = lookup(ROUTINE_VAR)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| anyhow!("{ROUTINE_VAR} is not set (one of: {})", routine_names()))?;
    name.trim()
        .parse()
        .map_err(|err| anyhow!("{err} in {ROUTINE_VAR} (one of: {})", routine_names()))
}

fn routine_names() -> String {
    Routine::ALL.map(|r| r.name()).join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolves_known_routine() {
        let routine = resolve_routine(|_| Some("purge-folder-faces".to_string())).unwrap();
        assert_eq!(routine, Routine::PurgeFolderFaces);
    }

    #[test]
    fn test_missing_routine_lists_choices() {
        let err = resolve_routine(|_| None).unwrap_err().to_string();
        assert!(err.contains("FACESWEEP_ROUTINE"));
        assert!(err.contains("backfill-thumbnails"));
    }

    #[test]
    fn test_unknown_routine_rejected() {
        let err = resolve_routine(|_| Some("drop-tables".to_string())).unwrap_err().to_string();
        assert!(err.contains("drop-tables"));
    }
}
