//! In-memory collaborators for driving the scheduler and its jobs without
//! Postgres or a messaging gateway.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use crosspost_core::{
    MetricSample, Post, PostSchedule, PublicationRecord, SessionKey, TargetChannel,
    WatchedPublication,
};
use crosspost_db::DbError;
use crosspost_scheduler::{PipelineStore, PollScope, SchedulerSettings};
use crosspost_telegram::{Engagement, Messenger, MessengerSession, TelegramError};
use tokio::sync::Semaphore;

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct StoreState {
    pub posts: BTreeMap<i64, Post>,
    pub targets: HashMap<i64, Vec<TargetChannel>>,
    /// project id -> participant user ids
    pub participants: HashMap<i64, Vec<i64>>,
    pub publications: Vec<PublicationRecord>,
    /// (post id, created at)
    pub watches: Vec<(i64, DateTime<Utc>)>,
    pub samples: Vec<MetricSample>,
    /// (user id, text)
    pub notifications: Vec<(i64, String)>,
    pub jobs: BTreeMap<i64, DateTime<Utc>>,
    /// Makes every `save_job` fail.
    pub fail_saves: bool,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<StoreState>,
    /// When set, `delete_job` waits for a permit before touching the table.
    delete_gate: Mutex<Option<Arc<Semaphore>>>,
    waiting_deletes: AtomicUsize,
}

impl MemoryStore {
    pub fn state(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().expect("store lock poisoned")
    }

    pub fn add_post(
        &self,
        id: i64,
        schedule_time: Option<DateTime<Utc>>,
        targets: Vec<TargetChannel>,
    ) {
        let mut state = self.state();
        state.posts.insert(
            id,
            Post {
                id,
                project_id: 1,
                name: format!("Post {id}"),
                text: format!("text of post {id}"),
                schedule_time,
                is_sent: false,
            },
        );
        state.targets.insert(id, targets);
    }

    pub fn add_publication(&self, post_id: i64, channel_id: i64, message_id: i64) {
        self.state().publications.push(PublicationRecord {
            post_id,
            channel_id,
            message_id,
        });
    }

    pub fn add_watch(&self, post_id: i64, created_at: DateTime<Utc>) {
        self.state().watches.push((post_id, created_at));
    }

    pub fn is_sent(&self, post_id: i64) -> bool {
        self.state().posts.get(&post_id).is_some_and(|p| p.is_sent)
    }

    /// Holds every later `delete_job` until the returned semaphore gets a
    /// permit for it.
    pub fn gate_deletes(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.delete_gate.lock().expect("gate lock poisoned") = Some(Arc::clone(&gate));
        gate
    }

    /// Number of `delete_job` calls that reached the gate.
    pub fn waiting_deletes(&self) -> usize {
        self.waiting_deletes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PipelineStore for MemoryStore {
    async fn get_post(&self, post_id: i64) -> Result<Post, DbError> {
        self.state()
            .posts
            .get(&post_id)
            .cloned()
            .ok_or(DbError::NotFound)
    }

    async fn post_targets(&self, post_id: i64) -> Result<Vec<TargetChannel>, DbError> {
        Ok(self.state().targets.get(&post_id).cloned().unwrap_or_default())
    }

    async fn mark_sent(&self, post_id: i64) -> Result<(), DbError> {
        let mut state = self.state();
        let post = state.posts.get_mut(&post_id).ok_or(DbError::NotFound)?;
        post.is_sent = true;
        Ok(())
    }

    async fn record_publication(&self, record: &PublicationRecord) -> Result<(), DbError> {
        self.state().publications.push(record.clone());
        Ok(())
    }

    async fn add_watch(&self, post_id: i64) -> Result<(), DbError> {
        self.state().watches.push((post_id, Utc::now()));
        Ok(())
    }

    async fn purge_watches_before(&self, cutoff: DateTime<Utc>) -> Result<u64, DbError> {
        let mut state = self.state();
        let before = state.watches.len();
        state.watches.retain(|(_, created_at)| *created_at >= cutoff);
        Ok(u64::try_from(before - state.watches.len()).expect("count fits u64"))
    }

    async fn poll_channels(&self, scope: PollScope) -> Result<Vec<TargetChannel>, DbError> {
        let state = self.state();
        let posts: Vec<i64> = match scope {
            PollScope::Watched => {
                let watched: HashSet<i64> = state.watches.iter().map(|(id, _)| *id).collect();
                state.posts.keys().copied().filter(|id| watched.contains(id)).collect()
            }
            PollScope::Post(post_id) => vec![post_id],
        };

        let mut channels: BTreeMap<i64, TargetChannel> = BTreeMap::new();
        for post_id in posts {
            for channel in state.targets.get(&post_id).into_iter().flatten() {
                channels.entry(channel.id).or_insert_with(|| channel.clone());
            }
        }
        Ok(channels.into_values().collect())
    }

    async fn channel_publications(
        &self,
        channel_id: i64,
    ) -> Result<Vec<WatchedPublication>, DbError> {
        let state = self.state();
        Ok(state
            .publications
            .iter()
            .filter(|p| p.channel_id == channel_id)
            .map(|p| WatchedPublication {
                post_id: p.post_id,
                post_name: state
                    .posts
                    .get(&p.post_id)
                    .map(|post| post.name.clone())
                    .unwrap_or_default(),
                message_id: p.message_id,
            })
            .collect())
    }

    async fn latest_views(&self, post_id: i64, channel_id: i64) -> Result<Option<i64>, DbError> {
        Ok(self
            .state()
            .samples
            .iter()
            .rev()
            .find(|s| s.post_id == post_id && s.channel_id == channel_id)
            .map(|s| s.views))
    }

    async fn insert_measurement(&self, sample: &MetricSample) -> Result<(), DbError> {
        self.state().samples.push(sample.clone());
        Ok(())
    }

    async fn notify_participants(&self, post_id: i64, text: &str) -> Result<u64, DbError> {
        let mut state = self.state();
        let Some(project_id) = state.posts.get(&post_id).map(|p| p.project_id) else {
            return Ok(0);
        };
        let users = state.participants.get(&project_id).cloned().unwrap_or_default();
        for user in &users {
            state.notifications.push((*user, text.to_owned()));
        }
        Ok(u64::try_from(users.len()).expect("count fits u64"))
    }

    async fn channel_schedules(&self, post_id: i64) -> Result<Vec<PostSchedule>, DbError> {
        let state = self.state();
        let wanted: HashSet<i64> = state
            .targets
            .get(&post_id)
            .into_iter()
            .flatten()
            .map(|c| c.id)
            .collect();

        Ok(state
            .posts
            .values()
            .filter_map(|post| {
                let channel_ids: Vec<i64> = state
                    .targets
                    .get(&post.id)
                    .into_iter()
                    .flatten()
                    .map(|c| c.id)
                    .filter(|id| wanted.contains(id))
                    .collect();
                (!channel_ids.is_empty()).then(|| PostSchedule {
                    post_id: post.id,
                    schedule_time: post.schedule_time,
                    channel_ids,
                })
            })
            .collect())
    }

    async fn save_job(&self, post_id: i64, run_at: DateTime<Utc>) -> Result<(), DbError> {
        let mut state = self.state();
        if state.fail_saves {
            return Err(DbError::Sqlx(sqlx::Error::PoolTimedOut));
        }
        state.jobs.insert(post_id, run_at);
        Ok(())
    }

    async fn delete_job(&self, post_id: i64) -> Result<bool, DbError> {
        let gate = self.delete_gate.lock().expect("gate lock poisoned").clone();
        if let Some(gate) = gate {
            self.waiting_deletes.fetch_add(1, Ordering::SeqCst);
            gate.acquire().await.expect("delete gate closed").forget();
        }
        Ok(self.state().jobs.remove(&post_id).is_some())
    }

    async fn saved_jobs(&self) -> Result<Vec<(i64, DateTime<Utc>)>, DbError> {
        Ok(self.state().jobs.iter().map(|(id, at)| (*id, *at)).collect())
    }
}

// ---------------------------------------------------------------------------
// Messenger
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Open(String),
    Send(String),
    Poll(String),
    Close(String),
}

#[derive(Debug, Default)]
pub struct Script {
    /// Sessions whose `open` fails.
    pub failing_sessions: HashSet<String>,
    /// Channels whose `send` fails.
    pub failing_channels: HashSet<String>,
    /// Message id -> views; unknown ids report 0.
    pub views: HashMap<i64, Option<i64>>,
    pub next_message_id: i64,
    pub events: Vec<Event>,
}

/// [`Messenger`] that follows a [`Script`] and records every call.
#[derive(Debug, Clone, Default)]
pub struct ScriptedMessenger {
    script: Arc<Mutex<Script>>,
    /// When set, every metrics fetch waits for a permit.
    poll_gate: Option<Arc<Semaphore>>,
}

impl ScriptedMessenger {
    /// A messenger whose polls block until the returned semaphore gets a
    /// permit for each of them.
    pub fn gated() -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        let messenger = Self {
            poll_gate: Some(Arc::clone(&gate)),
            ..Self::default()
        };
        (messenger, gate)
    }

    pub fn script(&self) -> MutexGuard<'_, Script> {
        self.script.lock().expect("script lock poisoned")
    }

    pub fn events(&self) -> Vec<Event> {
        self.script().events.clone()
    }

    pub fn count(&self, matches: impl Fn(&Event) -> bool) -> usize {
        self.script().events.iter().filter(|e| matches(e)).count()
    }
}

#[async_trait]
impl Messenger for ScriptedMessenger {
    async fn open(&self, session: &SessionKey) -> Result<Box<dyn MessengerSession>, TelegramError> {
        let mut script = self.script();
        let key = session.expose().to_owned();
        script.events.push(Event::Open(key.clone()));
        if script.failing_sessions.contains(&key) {
            return Err(TelegramError::Rpc {
                status: 401,
                message: "AUTH_KEY_UNREGISTERED".to_owned(),
            });
        }
        Ok(Box::new(ScriptedSession {
            key,
            script: Arc::clone(&self.script),
            poll_gate: self.poll_gate.clone(),
        }))
    }
}

struct ScriptedSession {
    key: String,
    script: Arc<Mutex<Script>>,
    poll_gate: Option<Arc<Semaphore>>,
}

impl ScriptedSession {
    fn script(&self) -> MutexGuard<'_, Script> {
        self.script.lock().expect("script lock poisoned")
    }
}

#[async_trait]
impl MessengerSession for ScriptedSession {
    async fn send(&mut self, channel_id: &str, _post: &Post) -> Result<i64, TelegramError> {
        let mut script = self.script();
        script.events.push(Event::Send(channel_id.to_owned()));
        if script.failing_channels.contains(channel_id) {
            return Err(TelegramError::Rpc {
                status: 403,
                message: "CHAT_WRITE_FORBIDDEN".to_owned(),
            });
        }
        script.next_message_id += 1;
        Ok(script.next_message_id)
    }

    async fn get_views(
        &mut self,
        channel_id: &str,
        message_ids: &[i64],
    ) -> Result<HashMap<i64, Option<i64>>, TelegramError> {
        let mut script = self.script();
        script.events.push(Event::Poll(channel_id.to_owned()));
        Ok(message_ids
            .iter()
            .map(|id| (*id, script.views.get(id).copied().unwrap_or(Some(0))))
            .collect())
    }

    async fn get_engagement(
        &mut self,
        _channel_id: &str,
        message_ids: &[i64],
    ) -> Result<Engagement, TelegramError> {
        if let Some(gate) = &self.poll_gate {
            gate.acquire().await.expect("poll gate closed").forget();
        }
        let mut engagement = Engagement::default();
        for id in message_ids {
            engagement.rates.insert(*id, 0.0);
            engagement.reactions.insert(*id, 0);
        }
        Ok(engagement)
    }

    async fn get_subscriber_count(&mut self, _channel_id: &str) -> Result<i64, TelegramError> {
        Ok(100)
    }

    async fn close(self: Box<Self>) -> Result<(), TelegramError> {
        let key = self.key.clone();
        self.script().events.push(Event::Close(key));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub fn channel(id: i64, session: &str) -> TargetChannel {
    TargetChannel {
        id,
        channel_id: format!("@chan{id}"),
        name: format!("Channel {id}"),
        session: SessionKey::new(session),
    }
}

/// Default settings with fast pacing and a Watch Job that never fires on
/// its own during a test.
pub fn test_settings() -> SchedulerSettings {
    SchedulerSettings {
        send_pacing: Duration::from_millis(1),
        watch_cron: "0 0 0 1 1 *".to_owned(),
        ..SchedulerSettings::default()
    }
}
