use crate::intent::{IntentLog, IntentSet};

/// How an actor gets its intents for the current life.
#[derive(Clone, Debug, PartialEq)]
pub enum Life {
    /// Live input, appended to the log every tick.
    Recording(IntentLog),
    /// A previous life played back entry by entry.
    Replaying(IntentLog),
}

/// The replay ran out of entries before its life ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Paradox {
    pub tick: u32,
    pub log_len: usize,
}

impl Life {
    pub fn is_recording(&self) -> bool {
        matches!(self, Life::Recording(_))
    }

    pub fn log(&self) -> &IntentLog {
        match self {
            Life::Recording(log) | Life::Replaying(log) => log,
        }
    }

    /// Intents for `tick`. A recording life stores `live` and returns it unchanged;
    /// a replaying life ignores `live` and reads its log.
    pub fn intents_for(&mut self, tick: u32, live: IntentSet) -> Result<IntentSet, Paradox> {
        match self {
            Life::Recording(log) => {
                log.push(live);
                Ok(live)
            }
            Life::Replaying(log) => log.get(tick).ok_or(Paradox {
                tick,
                log_len: log.len(),
            }),
        }
    }

    /// Deep copy of the recording so far, for a new replicate.
    pub fn fork(&self) -> IntentLog {
        self.log().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intent::Intent;

    #[test]
    fn recording_appends_every_tick_even_empty() {
        let mut life = Life::Recording(IntentLog::new());
        let jump = IntentSet::EMPTY.with(Intent::Jump);
        assert_eq!(life.intents_for(0, IntentSet::EMPTY), Ok(IntentSet::EMPTY));
        assert_eq!(life.intents_for(1, jump), Ok(jump));
        assert_eq!(life.log().len(), 2);
        assert_eq!(life.log().get(1), Some(jump));
    }

    #[test]
    fn replay_reads_log_and_reports_exhaustion() {
        let log: IntentLog = vec![IntentSet::EMPTY.with(Intent::MoveLeft); 3].into();
        let mut life = Life::Replaying(log);
        for tick in 0..3 {
            let got = life.intents_for(tick, IntentSet::EMPTY.with(Intent::Jump));
            assert_eq!(got, Ok(IntentSet::EMPTY.with(Intent::MoveLeft)));
        }
        assert_eq!(
            life.intents_for(3, IntentSet::EMPTY),
            Err(Paradox { tick: 3, log_len: 3 })
        );
    }

    #[test]
    fn fork_does_not_share_entries() {
        let mut life = Life::Recording(IntentLog::new());
        life.intents_for(0, IntentSet::EMPTY).unwrap();
        let copy = life.fork();
        life.intents_for(1, IntentSet::EMPTY).unwrap();
        assert_eq!(copy.len(), 1);
        assert_eq!(life.log().len(), 2);
    }
}
