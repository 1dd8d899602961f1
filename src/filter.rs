//! Read-only query descriptors for selecting remote events.

use crate::remote::RemoteEvent;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// What to match against when picking events for a bulk mutation. Produced
/// either by direct user input or by the language model interpreting a
/// natural-language query; the model's output is validated by shape only
/// (it decodes to this struct or it doesn't).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FilterCriteria {
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    /// Substring over summary and description.
    pub text: Option<String>,
    /// Substring over location.
    pub location: Option<String>,
    /// Substring over the `HH:MM` start clock; all-day events never match.
    pub time_of_day: Option<String>,
}

impl FilterCriteria {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    pub fn matches(&self, event: &RemoteEvent) -> bool {
        if self.date_from.is_some() || self.date_to.is_some() {
            let Some(day) = event.start.day() else { return false };
            if self.date_from.is_some_and(|from| day < from) {
                return false;
            }
            if self.date_to.is_some_and(|to| day > to) {
                return false;
            }
        }
        if let Some(text) = non_blank(&self.text) {
            let haystack = format!(
                "{} {}",
                event.summary,
                event.description.as_deref().unwrap_or_default()
            );
            if !contains_ci(&haystack, text) {
                return false;
            }
        }
        if let Some(location) = non_blank(&self.location) {
            match event.location.as_deref() {
                Some(loc) if contains_ci(loc, location) => {}
                _ => return false,
            }
        }
        if let Some(clock_fragment) = non_blank(&self.time_of_day) {
            match event.start.clock() {
                Some(clock) if clock.contains(clock_fragment) => {}
                _ => return false,
            }
        }
        true
    }

    /// Ids of the cached remote events this filter selects.
    pub fn select<'a>(&self, events: &'a [RemoteEvent]) -> Vec<&'a RemoteEvent> {
        events.iter().filter(|e| self.matches(e)).collect()
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::EventTime;
    use chrono::{DateTime, FixedOffset};

    fn event(summary: &str, start: &str, location: Option<&str>) -> RemoteEvent {
        RemoteEvent {
            id: format!("id-{summary}"),
            summary: summary.to_string(),
            start: EventTime::timestamp(start.parse::<DateTime<FixedOffset>>().unwrap()),
            end: EventTime::default(),
            location: location.map(str::to_string),
            ..RemoteEvent::default()
        }
    }

    #[test]
    fn empty_filter_matches_everything() {
        let filter = FilterCriteria::default();
        assert!(filter.is_empty());
        assert!(filter.matches(&event("Anything", "2024-06-01T09:00:00+02:00", None)));
    }

    #[test]
    fn date_bounds_are_inclusive() {
        let filter = FilterCriteria {
            date_from: Some("2024-06-01".parse().unwrap()),
            date_to: Some("2024-06-30".parse().unwrap()),
            ..Default::default()
        };
        assert!(filter.matches(&event("June", "2024-06-01T09:00:00+02:00", None)));
        assert!(filter.matches(&event("June", "2024-06-30T09:00:00+02:00", None)));
        assert!(!filter.matches(&event("July", "2024-07-01T09:00:00+02:00", None)));
    }

    #[test]
    fn text_matches_summary_case_insensitively() {
        let filter = FilterCriteria { text: Some("standup".to_string()), ..Default::default() };
        assert!(filter.matches(&event("Daily Standup", "2024-06-01T09:00:00+02:00", None)));
        assert!(!filter.matches(&event("Retro", "2024-06-01T09:00:00+02:00", None)));
    }

    #[test]
    fn location_filter_requires_a_location() {
        let filter = FilterCriteria { location: Some("room 4".to_string()), ..Default::default() };
        assert!(filter.matches(&event("A", "2024-06-01T09:00:00+02:00", Some("Room 4, HQ"))));
        assert!(!filter.matches(&event("B", "2024-06-01T09:00:00+02:00", None)));
    }

    #[test]
    fn time_of_day_never_matches_all_day_events() {
        let filter = FilterCriteria { time_of_day: Some("09:".to_string()), ..Default::default() };
        let all_day = RemoteEvent {
            id: "x".to_string(),
            start: EventTime::all_day("2024-06-01".parse().unwrap()),
            ..RemoteEvent::default()
        };
        assert!(!filter.matches(&all_day));
        assert!(filter.matches(&event("A", "2024-06-01T09:30:00+02:00", None)));
    }

    #[test]
    fn decodes_from_model_output_by_shape_alone() {
        let json = r#"{"dateFrom": "2024-06-01", "text": "standup", "timeOfDay": "09:00"}"#;
        let filter: FilterCriteria = serde_json::from_str(json).unwrap();
        assert_eq!(filter.date_from, Some("2024-06-01".parse().unwrap()));
        assert_eq!(filter.time_of_day.as_deref(), Some("09:00"));
    }
}
