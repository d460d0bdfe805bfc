//! Session plans.
//!
//! A plan is the ordered list of slots a cycle walks through, together with
//! the session type (duration and label) of every kind it references. Plans
//! are built once from settings and replaced wholesale when settings change.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, TimerError};

/// Duration of the single slot used before any settings have loaded.
pub const FALLBACK_WORK_SECS: u64 = 25 * 60;

/// Upper bound on the work-session count of a synthesized sequence.
pub const MAX_WORK_SESSIONS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionKind {
    Work,
    Break,
    LongBreak,
}

impl SessionKind {
    pub const ALL: [SessionKind; 3] = [SessionKind::Work, SessionKind::Break, SessionKind::LongBreak];

    /// Wire name used in stored sequences.
    pub fn as_str(self) -> &'static str {
        match self {
            SessionKind::Work => "work",
            SessionKind::Break => "break",
            SessionKind::LongBreak => "longBreak",
        }
    }

    pub fn default_label(self) -> &'static str {
        match self {
            SessionKind::Work => "WORK",
            SessionKind::Break => "BREAK",
            SessionKind::LongBreak => "LONG BREAK",
        }
    }

    pub fn is_break(self) -> bool {
        !matches!(self, SessionKind::Work)
    }
}

impl fmt::Display for SessionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "work" => Ok(SessionKind::Work),
            "break" => Ok(SessionKind::Break),
            "longBreak" => Ok(SessionKind::LongBreak),
            other => Err(ConfigError::UnknownSessionKind(other.to_string())),
        }
    }
}

/// Duration and display label of one kind of session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionType {
    pub kind: SessionKind,
    pub duration_secs: u64,
    pub label: String,
}

impl SessionType {
    pub fn new(kind: SessionKind, duration_secs: u64) -> Self {
        Self {
            kind,
            duration_secs,
            label: kind.default_label().to_string(),
        }
    }
}

/// Raw durations in seconds as they appear in stored settings.
///
/// Signed so that out-of-range values survive decoding and are rejected by
/// plan construction with a proper [`ConfigError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PresetDurations {
    pub work: i64,
    #[serde(rename = "break")]
    pub short_break: i64,
    pub long_break: i64,
}

impl PresetDurations {
    pub const fn from_minutes(work: i64, short_break: i64, long_break: i64) -> Self {
        Self {
            work: work * 60,
            short_break: short_break * 60,
            long_break: long_break * 60,
        }
    }

    fn session_types(&self) -> Result<BTreeMap<SessionKind, SessionType>, ConfigError> {
        [
            (SessionKind::Work, self.work),
            (SessionKind::Break, self.short_break),
            (SessionKind::LongBreak, self.long_break),
        ]
        .into_iter()
        .map(|(kind, secs)| {
            let secs = u64::try_from(secs).map_err(|_| ConfigError::NegativeDuration {
                kind: kind.as_str().to_string(),
                secs,
            })?;
            Ok((kind, SessionType::new(kind, secs)))
        })
        .collect()
    }
}

impl Default for PresetDurations {
    fn default() -> Self {
        Self::from_minutes(25, 5, 15)
    }
}

/// Synthesize `work, break, ..., work, longBreak` for `work_sessions` work slots.
///
/// The result has `2 * work_sessions` entries. Zero work sessions yields an
/// empty sequence; callers validate the count first.
pub fn build_sequence(work_sessions: usize) -> Vec<SessionKind> {
    let mut sequence = Vec::with_capacity(work_sessions * 2);
    for i in 0..work_sessions {
        sequence.push(SessionKind::Work);
        if i + 1 < work_sessions {
            sequence.push(SessionKind::Break);
        }
    }
    if work_sessions > 0 {
        sequence.push(SessionKind::LongBreak);
    }
    sequence
}

/// Immutable ordered sequence of slots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionPlan {
    types: BTreeMap<SessionKind, SessionType>,
    sequence: Vec<SessionKind>,
}

impl SessionPlan {
    /// Build a plan from three durations and a work-session count.
    pub fn from_preset(durations: PresetDurations, work_sessions: i64) -> Result<Self, ConfigError> {
        let count = usize::try_from(work_sessions)
            .ok()
            .filter(|n| (1..=MAX_WORK_SESSIONS).contains(n))
            .ok_or(ConfigError::InvalidWorkSessionCount(work_sessions))?;
        let types = durations.session_types()?;
        Ok(Self {
            types,
            sequence: build_sequence(count),
        })
    }

    /// Build a plan from a stored sequence of kind names.
    ///
    /// Every entry must name a kind and that kind must be present in `types`.
    pub fn from_explicit_sequence<S: AsRef<str>>(
        types: BTreeMap<SessionKind, SessionType>,
        sequence: &[S],
    ) -> Result<Self, ConfigError> {
        if sequence.is_empty() {
            return Err(ConfigError::EmptySequence);
        }
        let sequence = sequence
            .iter()
            .enumerate()
            .map(|(position, name)| {
                let kind: SessionKind = name.as_ref().parse()?;
                if types.contains_key(&kind) {
                    Ok(kind)
                } else {
                    Err(ConfigError::DanglingSessionKind {
                        kind: kind.as_str().to_string(),
                        position,
                    })
                }
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { types, sequence })
    }

    /// Explicit sequence over the three preset durations.
    pub fn from_durations_and_sequence<S: AsRef<str>>(
        durations: PresetDurations,
        sequence: &[S],
    ) -> Result<Self, ConfigError> {
        Self::from_explicit_sequence(durations.session_types()?, sequence)
    }

    /// A single work slot, used until persisted settings are available.
    pub fn fallback() -> Self {
        let work = SessionType::new(SessionKind::Work, FALLBACK_WORK_SECS);
        Self {
            types: BTreeMap::from([(SessionKind::Work, work)]),
            sequence: vec![SessionKind::Work],
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn len(&self) -> usize {
        self.sequence.len()
    }

    /// Always false for a constructed plan.
    pub fn is_empty(&self) -> bool {
        self.sequence.is_empty()
    }

    pub fn sequence(&self) -> &[SessionKind] {
        &self.sequence
    }

    pub fn session_type(&self, kind: SessionKind) -> Option<&SessionType> {
        self.types.get(&kind)
    }

    pub fn kind_of(&self, index: usize) -> Result<SessionKind, TimerError> {
        self.sequence
            .get(index)
            .copied()
            .ok_or(TimerError::IndexOutOfBounds {
                index,
                len: self.len(),
            })
    }

    pub fn duration_of(&self, index: usize) -> Result<u64, TimerError> {
        Ok(self.slot(index)?.duration_secs)
    }

    pub fn label_of(&self, index: usize) -> Result<&str, TimerError> {
        Ok(self.slot(index)?.label.as_str())
    }

    /// Sum of every slot's duration.
    pub fn total_secs(&self) -> u64 {
        self.sequence
            .iter()
            .filter_map(|kind| self.types.get(kind))
            .map(|t| t.duration_secs)
            .sum()
    }

    pub fn work_count(&self) -> usize {
        self.sequence
            .iter()
            .filter(|k| **k == SessionKind::Work)
            .count()
    }

    fn slot(&self, index: usize) -> Result<&SessionType, TimerError> {
        let kind = self.kind_of(index)?;
        // Construction guarantees every referenced kind resolves.
        self.types.get(&kind).ok_or(TimerError::IndexOutOfBounds {
            index,
            len: self.len(),
        })
    }
}

impl Default for SessionPlan {
    /// Classic plan: four 25-minute work slots, 5-minute breaks, 15-minute long break.
    fn default() -> Self {
        let types = BTreeMap::from([
            (SessionKind::Work, SessionType::new(SessionKind::Work, 25 * 60)),
            (SessionKind::Break, SessionType::new(SessionKind::Break, 5 * 60)),
            (
                SessionKind::LongBreak,
                SessionType::new(SessionKind::LongBreak, 15 * 60),
            ),
        ]);
        Self {
            types,
            sequence: build_sequence(4),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn classic() -> SessionPlan {
        SessionPlan::from_preset(PresetDurations::from_minutes(25, 5, 15), 4).unwrap()
    }

    #[test]
    fn four_work_sessions_build_eight_slots() {
        use SessionKind::*;
        assert_eq!(
            build_sequence(4),
            vec![Work, Break, Work, Break, Work, Break, Work, LongBreak]
        );
    }

    #[test]
    fn single_work_session_is_work_then_long_break() {
        assert_eq!(
            build_sequence(1),
            vec![SessionKind::Work, SessionKind::LongBreak]
        );
    }

    #[test]
    fn preset_plan_matches_default() {
        assert_eq!(classic(), SessionPlan::default());
        assert_eq!(classic().len(), 8);
        assert_eq!(classic().work_count(), 4);
    }

    #[test]
    fn preset_rejects_zero_work_sessions() {
        let err = SessionPlan::from_preset(PresetDurations::default(), 0).unwrap_err();
        assert_eq!(err, ConfigError::InvalidWorkSessionCount(0));
    }

    #[test]
    fn preset_rejects_oversized_work_session_counts() {
        let max = MAX_WORK_SESSIONS as i64;
        assert_eq!(SessionPlan::from_preset(PresetDurations::default(), max).unwrap().len(), 200);
        for count in [max + 1, i64::MAX] {
            let err = SessionPlan::from_preset(PresetDurations::default(), count).unwrap_err();
            assert_eq!(err, ConfigError::InvalidWorkSessionCount(count));
        }
    }

    #[test]
    fn preset_rejects_negative_duration() {
        let durations = PresetDurations {
            work: 1500,
            short_break: -1,
            long_break: 900,
        };
        let err = SessionPlan::from_preset(durations, 4).unwrap_err();
        assert!(matches!(err, ConfigError::NegativeDuration { ref kind, secs: -1 } if kind == "break"));
    }

    #[test]
    fn zero_durations_are_allowed() {
        let plan = SessionPlan::from_preset(PresetDurations::from_minutes(0, 0, 0), 2).unwrap();
        assert_eq!(plan.duration_of(0).unwrap(), 0);
    }

    #[test]
    fn lookups_by_index() {
        let plan = classic();
        assert_eq!(plan.duration_of(0).unwrap(), 1500);
        assert_eq!(plan.duration_of(1).unwrap(), 300);
        assert_eq!(plan.duration_of(7).unwrap(), 900);
        assert_eq!(plan.label_of(7).unwrap(), "LONG BREAK");
        assert_eq!(plan.kind_of(3).unwrap(), SessionKind::Break);
    }

    #[test]
    fn out_of_range_lookup_is_index_error() {
        let err = classic().duration_of(8).unwrap_err();
        assert_eq!(err, TimerError::IndexOutOfBounds { index: 8, len: 8 });
        assert!(classic().label_of(100).is_err());
    }

    #[test]
    fn explicit_sequence_keeps_custom_order() {
        let plan = SessionPlan::from_durations_and_sequence(
            PresetDurations::default(),
            &["work", "work", "longBreak"],
        )
        .unwrap();
        assert_eq!(
            plan.sequence(),
            &[SessionKind::Work, SessionKind::Work, SessionKind::LongBreak]
        );
        assert_eq!(plan.total_secs(), 1500 + 1500 + 900);
    }

    #[test]
    fn explicit_sequence_rejects_unknown_names() {
        let err = SessionPlan::from_durations_and_sequence(PresetDurations::default(), &["work", "nap"])
            .unwrap_err();
        assert_eq!(err, ConfigError::UnknownSessionKind("nap".into()));
    }

    #[test]
    fn explicit_sequence_rejects_dangling_kinds() {
        let types = BTreeMap::from([(SessionKind::Work, SessionType::new(SessionKind::Work, 60))]);
        let err = SessionPlan::from_explicit_sequence(types, &["work", "break"]).unwrap_err();
        assert_eq!(
            err,
            ConfigError::DanglingSessionKind {
                kind: "break".into(),
                position: 1
            }
        );
    }

    #[test]
    fn explicit_sequence_rejects_empty() {
        let empty: [&str; 0] = [];
        let err = SessionPlan::from_durations_and_sequence(PresetDurations::default(), &empty)
            .unwrap_err();
        assert_eq!(err, ConfigError::EmptySequence);
    }

    #[test]
    fn fallback_is_single_work_slot() {
        let plan = SessionPlan::fallback();
        assert_eq!(plan.len(), 1);
        assert_eq!(plan.duration_of(0).unwrap(), FALLBACK_WORK_SECS);
        assert_eq!(plan.label_of(0).unwrap(), "WORK");
    }

    #[test]
    fn kind_wire_names() {
        let json = serde_json::to_string(&build_sequence(2)).unwrap();
        assert_eq!(json, r#"["work","break","work","longBreak"]"#);
        assert_eq!("longBreak".parse::<SessionKind>().unwrap(), SessionKind::LongBreak);
    }

    proptest! {
        #[test]
        fn sequence_shape_holds_for_any_count(n in 1usize..200) {
            let seq = build_sequence(n);
            prop_assert_eq!(seq.len(), 2 * n);
            prop_assert_eq!(seq.last().copied(), Some(SessionKind::LongBreak));
            for (i, kind) in seq.iter().take(2 * n - 2).enumerate() {
                let expected = if i % 2 == 0 { SessionKind::Work } else { SessionKind::Break };
                prop_assert_eq!(*kind, expected);
            }
            prop_assert_eq!(seq[2 * n - 2], SessionKind::Work);
        }

        #[test]
        fn preset_plan_total_matches_durations(
            n in 1i64..20,
            work in 0i64..4000,
            short in 0i64..2000,
            long in 0i64..3000,
        ) {
            let durations = PresetDurations { work, short_break: short, long_break: long };
            let plan = SessionPlan::from_preset(durations, n).unwrap();
            let expected = (n * work + (n - 1) * short + long) as u64;
            prop_assert_eq!(plan.total_secs(), expected);
        }
    }
}
