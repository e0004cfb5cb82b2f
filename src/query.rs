use std::collections::{BTreeMap, HashMap};

use crate::{feature::Location, tracker::CycleId};

/// What an area query reports while its matches change.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryEvent {
    /// The key has a point within the radius and didn't before.
    KeyEntered { key: String, location: Location },
    /// None of the key's points are within the radius anymore.
    KeyExited { key: String },
    /// The key is still within the radius but its closest point changed.
    KeyMoved { key: String, location: Location },
    /// Every match for the center set at `cycle` has been reported.
    Ready { cycle: CycleId },
}

/// A live area query. It remembers what it matched last time so a new center or
/// new data only produces the difference.
#[derive(Debug, Clone)]
pub struct GeoQuery {
    center: Location,
    /// In meters
    radius: f64,
    /// The cycle the current center belongs to.
    cycle: CycleId,
    inside: HashMap<String, Location>,
}

impl GeoQuery {
    pub fn new(center: Location, radius: f64, cycle: CycleId) -> Self {
        Self {
            center,
            radius,
            cycle,
            inside: HashMap::new(),
        }
    }

    pub fn center(&self) -> Location {
        self.center
    }

    pub fn radius(&self) -> f64 {
        self.radius
    }

    pub fn cycle(&self) -> CycleId {
        self.cycle
    }

    pub fn set_center(&mut self, center: Location, cycle: CycleId) {
        self.center = center;
        self.cycle = cycle;
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.inside.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.inside.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inside.is_empty()
    }

    /// Replace the matches and return the events describing the change, exits first.
    /// The list always ends with [`QueryEvent::Ready`] tagged with the query's cycle.
    pub fn refresh(&mut self, matches: BTreeMap<String, Location>) -> Vec<QueryEvent> {
        let mut exited: Vec<_> = self
            .inside
            .keys()
            .filter(|key| !matches.contains_key(*key))
            .cloned()
            .collect();
        exited.sort_unstable();

        let mut events: Vec<QueryEvent> = exited
            .into_iter()
            .map(|key| {
                self.inside.remove(&key);
                QueryEvent::KeyExited { key }
            })
            .collect();

        for (key, location) in matches {
            match self.inside.insert(key.clone(), location) {
                None => events.push(QueryEvent::KeyEntered { key, location }),
                Some(previous) if previous != location => {
                    events.push(QueryEvent::KeyMoved { key, location })
                }
                Some(_) => (),
            }
        }

        events.push(QueryEvent::Ready { cycle: self.cycle });
        events
    }

    /// Merge the matches of a single key without touching the others.
    /// Used when new points are written while the query is live.
    pub fn update_key(&mut self, key: &str, location: Option<Location>) -> Option<QueryEvent> {
        match (self.inside.get(key).copied(), location) {
            (None, Some(location)) => {
                self.inside.insert(key.to_string(), location);
                Some(QueryEvent::KeyEntered {
                    key: key.to_string(),
                    location,
                })
            }
            (Some(previous), Some(location)) if previous != location => {
                self.inside.insert(key.to_string(), location);
                Some(QueryEvent::KeyMoved {
                    key: key.to_string(),
                    location,
                })
            }
            (Some(_), None) => {
                self.inside.remove(key);
                Some(QueryEvent::KeyExited {
                    key: key.to_string(),
                })
            }
            _ => None,
        }
    }
}
