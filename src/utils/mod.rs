use std::time::{SystemTime, UNIX_EPOCH};

/// `policy.name` → `policyname`
pub fn join_policy_id(unit: &str) -> String {
    unit.replace('.', "")
}

/// `policyname` → `policy.name`. Units shorter than a policy id are returned as is.
pub fn split_policy_id(unit: &str) -> String {
    if unit.len() > 56 {
        format!("{}.{}", &unit[..56], &unit[56..])
    } else {
        unit.to_string()
    }
}

/// Current unix time in seconds.
pub fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

pub fn remove_trailing_slash(url: &str) -> String {
    url.strip_suffix('/').unwrap_or(url).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIN: &str = "29d222ce763455e3d7a09a665ce554f00ac89d2e99a1a83d267170c64d494e";

    #[test]
    fn test_policy_id_split_and_join() {
        let split = split_policy_id(MIN);
        assert_eq!(split, "29d222ce763455e3d7a09a665ce554f00ac89d2e99a1a83d267170c6.4d494e");
        assert_eq!(join_policy_id(&split), MIN);
        assert_eq!(split_policy_id("lovelace"), "lovelace");
    }

    #[test]
    fn test_remove_trailing_slash() {
        assert_eq!(remove_trailing_slash("https://a.io/api/v0/"), "https://a.io/api/v0");
        assert_eq!(remove_trailing_slash("https://a.io/api/v0"), "https://a.io/api/v0");
    }
}
