// Channel naming
//
// One logical pub/sub channel per project. The broker and the realtime
// gateway only ever meet through these names.

use uuid::Uuid;

const CHANNEL_PREFIX: &str = "project:";
const CHANNEL_SUFFIX: &str = ":events";

/// Channel carrying the live event feed of a project: `project:<id>:events`.
pub fn project_channel(project_id: Uuid) -> String {
    format!("{CHANNEL_PREFIX}{project_id}{CHANNEL_SUFFIX}")
}

/// Inverse of [`project_channel`]. Returns `None` for names that do not
/// follow the convention.
pub fn project_id_from_channel(channel: &str) -> Option<Uuid> {
    channel
        .strip_prefix(CHANNEL_PREFIX)?
        .strip_suffix(CHANNEL_SUFFIX)
        .and_then(|id| Uuid::parse_str(id).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_channel_format() {
        let id = Uuid::parse_str("0190b6c2-7a3e-7c41-9b1e-3f7a2d9c4e10").unwrap();
        assert_eq!(
            project_channel(id),
            "project:0190b6c2-7a3e-7c41-9b1e-3f7a2d9c4e10:events"
        );
    }

    #[test]
    fn test_channel_is_deterministic_and_distinct() {
        let a = Uuid::now_v7();
        let b = Uuid::now_v7();
        assert_eq!(project_channel(a), project_channel(a));
        assert_ne!(project_channel(a), project_channel(b));
    }

    #[test]
    fn test_project_id_from_channel() {
        let id = Uuid::now_v7();
        assert_eq!(project_id_from_channel(&project_channel(id)), Some(id));
        assert_eq!(project_id_from_channel("project:not-a-uuid:events"), None);
        assert_eq!(project_id_from_channel("other:channel"), None);
    }
}
