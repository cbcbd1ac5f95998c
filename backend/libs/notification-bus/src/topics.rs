//! Topic construction and parsing.
//!
//! Publishers and subscribers build every topic string through this module so
//! both sides agree on a single layout:
//!
//! ```text
//! notify:user:<type>:<user_id>
//! notify:group:<type>:<group_id>
//! notify:broadcast:<type>
//! ```

use crate::{BusError, NotificationType, Result};
use uuid::Uuid;

pub const TOPIC_PREFIX: &str = "notify";

/// Addressing class of a topic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetClass {
    User,
    Group,
    Broadcast,
}

impl TargetClass {
    pub const ALL: [TargetClass; 3] = [TargetClass::User, TargetClass::Group, TargetClass::Broadcast];

    pub fn as_str(&self) -> &'static str {
        match self {
            TargetClass::User => "user",
            TargetClass::Group => "group",
            TargetClass::Broadcast => "broadcast",
        }
    }
}

/// Recipient of exactly one published envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Target {
    User(Uuid),
    Group(Uuid),
    Broadcast,
}

impl Target {
    pub fn class(&self) -> TargetClass {
        match self {
            Target::User(_) => TargetClass::User,
            Target::Group(_) => TargetClass::Group,
            Target::Broadcast => TargetClass::Broadcast,
        }
    }
}

/// Build the topic an envelope of `notification_type` is published on.
///
/// ```
/// use notification_bus::{topics::topic_for, NotificationType, Target};
/// use uuid::Uuid;
///
/// let user = Uuid::nil();
/// assert_eq!(
///     topic_for(&NotificationType::MessageNew, &Target::User(user)),
///     format!("notify:user:message.new:{}", user)
/// );
/// assert_eq!(
///     topic_for(&NotificationType::SyncCompleted, &Target::Broadcast),
///     "notify:broadcast:sync.completed"
/// );
/// ```
pub fn topic_for(notification_type: &NotificationType, target: &Target) -> String {
    match target {
        Target::User(id) | Target::Group(id) => format!(
            "{}:{}:{}:{}",
            TOPIC_PREFIX,
            target.class().as_str(),
            notification_type,
            id
        ),
        Target::Broadcast => format!(
            "{}:{}:{}",
            TOPIC_PREFIX,
            TargetClass::Broadcast.as_str(),
            notification_type
        ),
    }
}

/// Split a topic back into its notification type and target.
pub fn parse_topic(topic: &str) -> Result<(NotificationType, Target)> {
    let invalid = || BusError::InvalidTopic(topic.to_string());

    let rest = topic
        .strip_prefix(TOPIC_PREFIX)
        .and_then(|r| r.strip_prefix(':'))
        .ok_or_else(invalid)?;
    let parts: Vec<&str> = rest.split(':').collect();

    match parts.as_slice() {
        ["user", kind, id] if !kind.is_empty() => {
            let id = Uuid::parse_str(id).map_err(|_| invalid())?;
            Ok((NotificationType::from(*kind), Target::User(id)))
        }
        ["group", kind, id] if !kind.is_empty() => {
            let id = Uuid::parse_str(id).map_err(|_| invalid())?;
            Ok((NotificationType::from(*kind), Target::Group(id)))
        }
        ["broadcast", kind] if !kind.is_empty() => {
            Ok((NotificationType::from(*kind), Target::Broadcast))
        }
        _ => Err(invalid()),
    }
}

/// Pattern matching every topic of one class, e.g. `notify:group:*`.
pub fn class_pattern(class: TargetClass) -> String {
    format!("{}:{}:*", TOPIC_PREFIX, class.as_str())
}

/// Pattern matching every notification type addressed to one user.
pub fn user_binding(user_id: Uuid) -> String {
    format!("{}:{}:*:{}", TOPIC_PREFIX, TargetClass::User.as_str(), user_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_user_topic() {
        let user = Uuid::new_v4();
        let topic = topic_for(&NotificationType::ConversationRead, &Target::User(user));

        let (kind, target) = parse_topic(&topic).unwrap();
        assert_eq!(kind, NotificationType::ConversationRead);
        assert_eq!(target, Target::User(user));
    }

    #[test]
    fn test_parse_group_topic_with_custom_type() {
        let group = Uuid::new_v4();
        let topic = format!("notify:group:typing.start:{}", group);

        let (kind, target) = parse_topic(&topic).unwrap();
        assert_eq!(kind, NotificationType::Custom("typing.start".into()));
        assert_eq!(target, Target::Group(group));
    }

    #[test]
    fn test_parse_rejects_malformed_topics() {
        let user = Uuid::new_v4();
        for topic in [
            "notify:user".to_string(),
            format!("notify:user:{}", user),
            format!("notify:user:message.new:chat:{}", user),
            "notify:user:message.new:not-a-uuid".to_string(),
            "notify:broadcast:".to_string(),
            format!("cache:user:message.new:{}", user),
            "notify:channel:message.new".to_string(),
        ] {
            assert!(parse_topic(&topic).is_err(), "accepted {}", topic);
        }
    }

    #[test]
    fn test_user_binding_covers_published_topics() {
        let user = Uuid::new_v4();
        let binding = user_binding(user);
        let topic = topic_for(&NotificationType::MessageNew, &Target::User(user));

        let (prefix, suffix) = binding.split_once('*').unwrap();
        assert!(topic.starts_with(prefix));
        assert!(topic.ends_with(suffix));
    }

    #[test]
    fn test_class_patterns() {
        assert_eq!(class_pattern(TargetClass::User), "notify:user:*");
        assert_eq!(class_pattern(TargetClass::Broadcast), "notify:broadcast:*");
    }
}
