//! Lock file management: load, save (atomic), path derivation.
//!
//! One lock per environment records the per-resource digests of the last
//! description that was handed to the convergence engine.

use super::types::StackLock;
use std::path::{Path, PathBuf};

/// Derive the lock file path for an environment within the state directory.
pub fn lock_file_path(state_dir: &Path, environment: &str) -> PathBuf {
    state_dir.join(environment).join("stack.lock.yaml")
}

/// Load the lock for an environment. Returns None if the file doesn't exist.
pub fn load_lock(state_dir: &Path, environment: &str) -> Result<Option<StackLock>, String> {
    let path = lock_file_path(state_dir, environment);
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(&path)
        .map_err(|e| format!("cannot read {}: {}", path.display(), e))?;
    let lock: StackLock = serde_yaml_ng::from_str(&content)
        .map_err(|e| format!("invalid lock file {}: {}", path.display(), e))?;
    Ok(Some(lock))
}

/// Save a lock atomically (write to temp, then rename).
pub fn save_lock(state_dir: &Path, lock: &StackLock) -> Result<PathBuf, String> {
    let path = lock_file_path(state_dir, &lock.environment);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| format!("cannot create dir {}: {}", parent.display(), e))?;
    }

    let yaml = serde_yaml_ng::to_string(lock).map_err(|e| format!("serialize error: {}", e))?;

    let tmp_path = path.with_extension("yaml.tmp");
    std::fs::write(&tmp_path, &yaml)
        .map_err(|e| format!("cannot write {}: {}", tmp_path.display(), e))?;
    std::fs::rename(&tmp_path, &path).map_err(|e| {
        format!(
            "cannot rename {} → {}: {}",
            tmp_path.display(),
            path.display(),
            e
        )
    })?;

    tracing::debug!(path = %path.display(), resources = lock.resources.len(), "lock saved");
    Ok(path)
}

/// Create an empty lock for a stack.
pub fn new_lock(stack_id: &str, environment: &str) -> StackLock {
    StackLock {
        schema: "1.0".to_string(),
        stack_id: stack_id.to_string(),
        environment: environment.to_string(),
        generated_at: now_iso8601(),
        generator: format!("wcs-infra {}", env!("CARGO_PKG_VERSION")),
        resources: indexmap::IndexMap::new(),
    }
}

/// Current UTC time as `YYYY-MM-DDTHH:MM:SSZ`.
pub fn now_iso8601() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    format_utc(secs)
}

fn format_utc(secs: u64) -> String {
    let days = (secs / 86_400) as i64;
    let rem = secs % 86_400;
    let (y, m, d) = civil_from_days(days);
    format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}Z",
        y,
        m,
        d,
        rem / 3600,
        (rem % 3600) / 60,
        rem % 60
    )
}

/// Days since 1970-01-01 → (year, month, day), proleptic Gregorian.
fn civil_from_days(days: i64) -> (i64, u32, u32) {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let m = (if mp < 10 { mp + 3 } else { mp - 9 }) as u32;
    let y = yoe + era * 400 + i64::from(m <= 2);
    (y, m, d)
}
