use crate::topic::filter_matches;

/// A message as received from the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusMessage {
    /// Wire-level topic the message arrived on.
    pub topic: String,
    pub payload: Vec<u8>,
    /// Set when the broker replays a stored retained value.
    pub retained: bool,
}

/// A message paired with the registration it matched.
#[derive(Debug, Clone)]
pub struct BusEvent<T> {
    pub message: BusMessage,
    pub target: T,
}

/// One subscription as known to a connection.
#[derive(Debug, Clone)]
pub struct Registration<T> {
    /// Stable identifier used to replace or remove the registration.
    pub id: i64,
    pub filter: String,
    pub qos: u8,
    pub target: T,
}

/// Filter routing table of one connection.
///
/// Registrations keep insertion order so that a message matching several
/// of them is delivered in the order they were subscribed.
#[derive(Debug)]
pub struct Router<T> {
    entries: Vec<Registration<T>>,
    /// Restores started with [`Router::begin_restore`] and not finished yet.
    pending_restores: usize,
    /// Ids removed while a restore is pending. A snapshot taken before the
    /// removal must not bring them back.
    removed: Vec<i64>,
}

impl<T> Default for Router<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            pending_restores: 0,
            removed: Vec::new(),
        }
    }
}

impl<T: Clone> Router<T> {
    /// Add or replace a registration. Returns true when the broker does not
    /// know the filter yet.
    pub fn insert(&mut self, registration: Registration<T>) -> bool {
        let known = self.has_filter(&registration.filter);
        match self.entries.iter_mut().find(|e| e.id == registration.id) {
            Some(existing) => *existing = registration,
            None => self.entries.push(registration),
        }
        !known
    }

    /// Remove a registration. Returns true when nothing else uses the
    /// filter anymore and the broker side can be unsubscribed.
    pub fn remove(&mut self, id: i64, filter: &str) -> bool {
        self.entries.retain(|e| e.id != id);
        if self.pending_restores > 0 {
            self.removed.push(id);
        }
        !self.has_filter(filter)
    }

    /// Targets of every registration matching `topic`.
    pub fn route(&self, topic: &str) -> Vec<T> {
        self.entries
            .iter()
            .filter(|e| filter_matches(&e.filter, topic))
            .map(|e| e.target.clone())
            .collect()
    }

    /// Must be called before taking the snapshot handed to
    /// [`Router::restore`].
    pub fn begin_restore(&mut self) {
        self.pending_restores += 1;
    }

    /// Merge a registration snapshot taken after a reconnect and return the
    /// distinct `(filter, qos)` pairs to subscribe on the broker, in
    /// snapshot order. Registrations removed since the matching
    /// [`Router::begin_restore`] are skipped.
    pub fn restore(&mut self, snapshot: Vec<Registration<T>>) -> Vec<(String, u8)> {
        let mut filters: Vec<(String, u8)> = Vec::new();
        for registration in snapshot {
            if self.removed.contains(&registration.id) {
                continue;
            }
            match filters.iter_mut().find(|(f, _)| *f == registration.filter) {
                Some((_, qos)) => *qos = (*qos).max(registration.qos),
                None => filters.push((registration.filter.clone(), registration.qos)),
            }
            self.insert(registration);
        }
        self.pending_restores = self.pending_restores.saturating_sub(1);
        if self.pending_restores == 0 {
            self.removed.clear();
        }
        filters
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn has_filter(&self, filter: &str) -> bool {
        self.entries.iter().any(|e| e.filter == filter)
    }
}
