use std::collections::HashMap;
use std::sync::Arc;

use crate::stream::TopicQueue;

/// Fixed set of topic queues, created once at startup
#[derive(Debug, Default)]
pub struct TopicRegistry {
    /// Configuration order, used for listings
    names: Vec<String>,
    queues: HashMap<String, Arc<TopicQueue>>,
}

impl TopicRegistry {
    /// Create one queue of `capacity` per topic name; duplicates are ignored
    pub fn new<I, S>(names: I, capacity: usize) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut registry = Self::default();
        for name in names {
            let name = name.into();
            if registry.queues.contains_key(&name) {
                continue;
            }
            registry
                .queues
                .insert(name.clone(), Arc::new(TopicQueue::new(name.clone(), capacity)));
            registry.names.push(name);
        }
        registry
    }

    pub fn get(&self, topic: &str) -> Option<Arc<TopicQueue>> {
        self.queues.get(topic).cloned()
    }

    pub fn contains(&self, topic: &str) -> bool {
        self.queues.contains_key(topic)
    }

    /// Topic names in configuration order
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
