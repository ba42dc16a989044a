use serde::{Deserialize, Serialize};

/// One discrete per-tick action. Application order is the declaration order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    #[serde(alias = "left")]
    MoveLeft,
    #[serde(alias = "right")]
    MoveRight,
    /// Jump held. Its absence on a tick releases a jump in progress.
    #[serde(alias = "up")]
    Jump,
    Interact,
    #[serde(alias = "enter")]
    Exit,
}

impl Intent {
    pub const ALL: [Intent; 5] = [
        Intent::MoveLeft,
        Intent::MoveRight,
        Intent::Jump,
        Intent::Interact,
        Intent::Exit,
    ];

    const fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

/// The intents active on a single tick.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Vec<Intent>", into = "Vec<Intent>")]
pub struct IntentSet(u8);

impl IntentSet {
    pub const EMPTY: IntentSet = IntentSet(0);

    pub fn contains(self, intent: Intent) -> bool {
        self.0 & intent.bit() != 0
    }

    pub fn insert(&mut self, intent: Intent) {
        self.0 |= intent.bit();
    }

    pub fn remove(&mut self, intent: Intent) {
        self.0 &= !intent.bit();
    }

    pub fn with(mut self, intent: Intent) -> Self {
        self.insert(intent);
        self
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Active intents in application order.
    pub fn iter(self) -> impl Iterator<Item = Intent> {
        Intent::ALL.into_iter().filter(move |i| self.contains(*i))
    }

    /// -1, 0 or 1. Opposite directions cancel.
    pub fn horizontal(self) -> f32 {
        let mut dir = 0.0;
        if self.contains(Intent::MoveLeft) {
            dir -= 1.0;
        }
        if self.contains(Intent::MoveRight) {
            dir += 1.0;
        }
        dir
    }
}

impl FromIterator<Intent> for IntentSet {
    fn from_iter<T: IntoIterator<Item = Intent>>(iter: T) -> Self {
        iter.into_iter().fold(IntentSet::EMPTY, IntentSet::with)
    }
}

impl From<Vec<Intent>> for IntentSet {
    fn from(intents: Vec<Intent>) -> Self {
        intents.into_iter().collect()
    }
}

impl From<IntentSet> for Vec<Intent> {
    fn from(set: IntentSet) -> Self {
        set.iter().collect()
    }
}

/// Per-tick record of a life: entry `n` holds the intents of tick `n`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IntentLog(Vec<IntentSet>);

impl IntentLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, intents: IntentSet) {
        self.0.push(intents);
    }

    pub fn get(&self, tick: u32) -> Option<IntentSet> {
        self.0.get(tick as usize).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn entries(&self) -> &[IntentSet] {
        &self.0
    }
}

impl From<Vec<IntentSet>> for IntentLog {
    fn from(entries: Vec<IntentSet>) -> Self {
        Self(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_serializes_as_names_in_order() {
        let set = IntentSet::EMPTY.with(Intent::Interact).with(Intent::MoveLeft);
        assert_eq!(
            serde_json::to_string(&set).unwrap(),
            r#"["move_left","interact"]"#
        );
        let parsed: IntentSet = serde_json::from_str(r#"["right", "up", "enter"]"#).unwrap();
        assert!(parsed.contains(Intent::MoveRight));
        assert!(parsed.contains(Intent::Jump));
        assert!(parsed.contains(Intent::Exit));
        assert!(!parsed.contains(Intent::Interact));
    }

    #[test]
    fn opposite_directions_cancel() {
        let both = IntentSet::EMPTY.with(Intent::MoveLeft).with(Intent::MoveRight);
        assert_eq!(both.horizontal(), 0.0);
        assert_eq!(IntentSet::EMPTY.with(Intent::MoveLeft).horizontal(), -1.0);
    }

    #[test]
    fn log_clone_is_independent() {
        let mut log = IntentLog::new();
        log.push(IntentSet::EMPTY);
        log.push(IntentSet::EMPTY.with(Intent::Jump));
        let copy = log.clone();
        log.push(IntentSet::EMPTY.with(Intent::Exit));
        assert_eq!(copy.len(), 2);
        assert_eq!(copy.get(1), Some(IntentSet::EMPTY.with(Intent::Jump)));
        assert_eq!(copy.get(2), None);
    }
}
