use std::collections::HashMap;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use nanoid::nanoid;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::debug;
use tracing::error;
use tracing::info;

use crate::ChangeEvent;
use crate::Result;
use crate::Topic;
use crate::OBSERVER_GAUGE;
use crate::TOPIC_GAUGE;

/// One blocked long-poll request. The caller keeps the receiving half of
/// the delivery channel and owns the wait timeout; the registry delivers
/// at most one event and then forgets the observer.
#[derive(Debug)]
pub struct Observer {
    pub id: String,
    pub remote_ip: String,
    pub user_agent: String,
    pub(crate) created_at: Instant,
    pub(crate) sender: mpsc::Sender<ChangeEvent>,
}

impl Observer {
    pub fn new(remote_ip: &str, user_agent: &str) -> (Self, mpsc::Receiver<ChangeEvent>) {
        let (sender, receiver) = mpsc::channel(1);
        (
            Self {
                id: nanoid!(),
                remote_ip: remote_ip.to_string(),
                user_agent: user_agent.to_string(),
                created_at: Instant::now(),
                sender,
            },
            receiver,
        )
    }
}

/// Registry of live subscriptions: canonical topic string -> observers.
/// Observer-set mutation is serialized per topic by the map's entry guard,
/// which is what makes one-shot delivery race-free.
#[derive(Debug, Default)]
pub struct TopicRegistry {
    topics: DashMap<String, HashMap<String, Observer>>,
}

impl TopicRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an observer for one delivery under the topic; returns the
    /// canonical topic string.
    pub fn observe_once(&self, observer: Observer, topic: &Topic) -> Result<String> {
        let t = topic.encode()?;
        match self.topics.entry(t.clone()) {
            Entry::Occupied(mut e) => {
                e.get_mut().insert(observer.id.clone(), observer);
                debug!("add new observer for topic:{}", t);
            }
            Entry::Vacant(e) => {
                info!("new topic:{}", t);
                TOPIC_GAUGE.inc();
                e.insert(HashMap::from([(observer.id.clone(), observer)]));
            }
        }
        OBSERVER_GAUGE.inc();
        Ok(t)
    }

    /// Deregister an observer whose long-poll wait ended without an event.
    pub fn remove_observer(&self, id: &str, topic: &Topic) -> Result<()> {
        let t = topic.encode()?;
        if let Some(mut observers) = self.topics.get_mut(&t) {
            if observers.remove(id).is_some() {
                OBSERVER_GAUGE.dec();
            }
        }
        Ok(())
    }

    /// Match an event against every registered topic and wake the
    /// observers of each matching one.
    pub(crate) fn find_topic_and_fire(&self, event: &ChangeEvent) {
        let matching: Vec<String> = self
            .topics
            .iter()
            .filter_map(|entry| {
                let t = match Topic::parse(entry.key()) {
                    Ok(t) => t,
                    Err(e) => {
                        error!("can not parse topic {}: {}", entry.key(), e);
                        return None;
                    }
                };
                t.matches(event).then(|| entry.key().clone())
            })
            .collect();

        for topic_str in matching {
            self.notify_and_remove_observers(&topic_str, event);
        }
    }

    fn notify_and_remove_observers(&self, topic_str: &str, event: &ChangeEvent) {
        if let Some(mut observers) = self.topics.get_mut(topic_str) {
            for (id, observer) in observers.drain() {
                OBSERVER_GAUGE.dec();
                if let Err(e) = observer.sender.try_send(event.clone()) {
                    // the poller gave up; nothing to wake
                    debug!("observer {} is no longer listening: {}", id, e);
                }
            }
        }
    }

    /// Drop observers whose long-poll request must long since have timed
    /// out; bounds registry growth from abandoned waits.
    pub(crate) fn expire_observers(&self, ttl: Duration) {
        for mut entry in self.topics.iter_mut() {
            let topic = entry.key().clone();
            entry.value_mut().retain(|id, observer| {
                if observer.created_at.elapsed() >= ttl {
                    debug!("dropping expired observer {} on topic {}", id, topic);
                    OBSERVER_GAUGE.dec();
                    return false;
                }
                true
            });
        }
    }

    #[cfg(test)]
    pub(crate) fn observer_count(&self, topic: &Topic) -> usize {
        let t = topic.encode().unwrap();
        self.topics.get(&t).map(|o| o.len()).unwrap_or(0)
    }

    #[cfg(test)]
    pub(crate) fn insert_raw_topic(&self, topic_str: &str, observer: Observer) {
        self.topics
            .entry(topic_str.to_string())
            .or_default()
            .insert(observer.id.clone(), observer);
    }
}
