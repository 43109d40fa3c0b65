//! Collision-free destination naming for save operations.
//!
//! Pure computation over a supplied view of the names already present in the
//! destination; nothing here touches the filesystem. The repository layer
//! still re-checks existence at write time (`create_new` semantics) so that
//! concurrent saves cannot slip past a stale snapshot.

use std::collections::HashSet;

use chrono::{Local, TimeZone};

use crate::snapkeep::status::StatusType;

/// Synthesizes the default save name for a status of the given type,
/// e.g. `Status_20240131_093005.jpg`.
pub fn default_save_name(status_type: StatusType, time_millis: i64, delta: u32) -> String {
    let stamp = Local
        .timestamp_millis_opt(time_millis)
        .single()
        .map(|t| t.format("%Y%m%d_%H%M%S").to_string())
        .unwrap_or_else(|| time_millis.to_string());
    with_delta(
        &format!("Status_{}{}", stamp, status_type.format()),
        status_type,
        delta,
    )
}

/// Sanitizes a user-supplied base name: leading dots are stripped (they
/// would hide the file) and the type's suffix is enforced.
pub fn sanitized_name(status_type: StatusType, base: &str) -> String {
    let trimmed = base.trim_start_matches('.');
    if trimmed
        .to_ascii_lowercase()
        .ends_with(status_type.format())
    {
        trimmed.to_string()
    } else {
        format!("{}{}", trimmed, status_type.format())
    }
}

/// The candidate name for a given disambiguation counter. Distinct `delta`
/// values always yield distinct names for the same base.
pub fn candidate_name(
    status_type: StatusType,
    base: Option<&str>,
    time_millis: i64,
    delta: u32,
) -> String {
    match base {
        Some(base) if !base.trim().is_empty() => {
            with_delta(&sanitized_name(status_type, base), status_type, delta)
        }
        _ => default_save_name(status_type, time_millis, delta),
    }
}

/// Picks the first candidate name not present in `existing`. Terminates for
/// any finite existing set because `delta` strictly increases and names are
/// distinct per `delta`.
pub fn unique_name(
    status_type: StatusType,
    base: Option<&str>,
    time_millis: i64,
    existing: &HashSet<String>,
) -> String {
    let mut delta = 0;
    loop {
        let name = candidate_name(status_type, base, time_millis, delta);
        if !existing.contains(&name) {
            return name;
        }
        delta += 1;
    }
}

/// Encodes `delta` as a ` (n)` suffix ahead of the extension.
fn with_delta(name: &str, status_type: StatusType, delta: u32) -> String {
    if delta == 0 {
        return name.to_string();
    }
    match name
        .len()
        .checked_sub(status_type.format().len())
        .filter(|_| {
            name.to_ascii_lowercase()
                .ends_with(status_type.format())
        }) {
        Some(split) => format!("{} ({}){}", &name[..split], delta, &name[split..]),
        None => format!("{} ({})", name, delta),
    }
}
