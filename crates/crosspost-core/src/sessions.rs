//! Grouping of channels by the account session that owns them.
//!
//! Every job run opens exactly one messaging connection per distinct
//! session, so channels are always bucketed before any remote call.

use crate::posts::TargetChannel;

/// Serialized credentials of one bound messaging account.
///
/// The inner string is a secret; `Debug` never prints it.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct SessionKey(String);

impl SessionKey {
    #[must_use]
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionKey([redacted])")
    }
}

/// Channels sharing one session. Built fresh for every job run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelGroup {
    pub session: SessionKey,
    pub channels: Vec<TargetChannel>,
}

/// Buckets channels by session key.
///
/// Groups appear in the order their session was first seen, and channels
/// keep their input order inside a group, so sends within one session stay
/// strictly sequential and deterministic.
#[must_use]
pub fn group_by_session(channels: impl IntoIterator<Item = TargetChannel>) -> Vec<ChannelGroup> {
    let mut groups: Vec<ChannelGroup> = Vec::new();
    for channel in channels {
        match groups.iter_mut().find(|g| g.session == channel.session) {
            Some(group) => group.channels.push(channel),
            None => groups.push(ChannelGroup {
                session: channel.session.clone(),
                channels: vec![channel],
            }),
        }
    }
    groups
}
