use chrono::{NaiveDate, NaiveDateTime};
use std::collections::BTreeMap;

/// Time spent on a project or sub-activity during one calendar day
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeRecord {
    pub date: NaiveDate,
    pub total_seconds: u64,
    pub sub_activity_seconds: BTreeMap<String, u64>,
    last_started: Option<NaiveDateTime>,
}

impl TimeRecord {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            total_seconds: 0,
            sub_activity_seconds: BTreeMap::new(),
            last_started: None,
        }
    }

    /// Rebuild a record from persisted values. A record is running exactly
    /// when `last_started` is set.
    pub fn restore(
        date: NaiveDate,
        total_seconds: u64,
        last_started: Option<NaiveDateTime>,
        sub_activity_seconds: BTreeMap<String, u64>,
    ) -> Self {
        Self {
            date,
            total_seconds,
            sub_activity_seconds,
            last_started,
        }
    }

    pub fn is_running(&self) -> bool {
        self.last_started.is_some()
    }

    pub fn last_started(&self) -> Option<NaiveDateTime> {
        self.last_started
    }

    /// Add to the total, saturating at `u64::MAX`
    pub fn add_time(&mut self, seconds: u64) {
        self.total_seconds = self.total_seconds.saturating_add(seconds);
    }

    /// Start timing. Does nothing if the record is already running.
    pub fn start_timing(&mut self, now: NaiveDateTime) {
        if self.last_started.is_none() {
            self.last_started = Some(now);
        }
    }

    /// Stop timing and fold the elapsed time into the total.
    /// Returns the number of seconds added.
    pub fn stop_timing(&mut self, now: NaiveDateTime) -> u64 {
        match self.last_started.take() {
            Some(started) => {
                let elapsed = elapsed_seconds(started, now);
                self.add_time(elapsed);
                elapsed
            }
            None => 0,
        }
    }

    /// Total including the time elapsed since the timer was started
    pub fn get_current_total_seconds(&self, now: NaiveDateTime) -> u64 {
        match self.last_started {
            Some(started) => self.total_seconds.saturating_add(elapsed_seconds(started, now)),
            None => self.total_seconds,
        }
    }

    pub fn get_formatted_time(&self) -> String {
        format_time(self.total_seconds)
    }
}

/// Whole seconds between two wall-clock readings, rounded to the nearest
/// second. A clock that went backwards yields zero.
fn elapsed_seconds(started: NaiveDateTime, now: NaiveDateTime) -> u64 {
    let millis = (now - started).num_milliseconds();
    u64::try_from((millis + 500) / 1000).unwrap_or(0)
}

/// Format seconds as HH:MM:SS. Hours keep counting past 24.
pub fn format_time(total_seconds: u64) -> String {
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;
    format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
}

/// Shared behaviour of everything that owns a date -> record mapping
pub trait Tracked {
    fn time_records(&self) -> &BTreeMap<NaiveDate, TimeRecord>;

    fn time_records_mut(&mut self) -> &mut BTreeMap<NaiveDate, TimeRecord>;

    /// Get the record for `today`, creating an empty one if needed
    fn get_today_record(&mut self, today: NaiveDate) -> &mut TimeRecord {
        self.time_records_mut()
            .entry(today)
            .or_insert_with(|| TimeRecord::new(today))
    }

    fn is_running_today(&self, today: NaiveDate) -> bool {
        self.time_records()
            .get(&today)
            .is_some_and(TimeRecord::is_running)
    }

    fn get_total_time_today(&self, today: NaiveDate) -> String {
        format_time(self.total_seconds_on(today))
    }

    /// Accumulated (stopped) seconds for one day
    fn total_seconds_on(&self, date: NaiveDate) -> u64 {
        self.time_records()
            .get(&date)
            .map_or(0, |record| record.total_seconds)
    }

    /// Accumulated seconds over an inclusive date range
    fn total_seconds_between(&self, from: NaiveDate, to: NaiveDate) -> u64 {
        self.time_records()
            .range(from..=to)
            .fold(0u64, |sum, (_, record)| sum.saturating_add(record.total_seconds))
    }

    /// Stop every running record, whatever its date.
    /// Returns the number of records stopped.
    fn stop_running(&mut self, now: NaiveDateTime) -> usize {
        let mut stopped = 0;
        for record in self.time_records_mut().values_mut() {
            if record.is_running() {
                record.stop_timing(now);
                stopped += 1;
            }
        }
        stopped
    }
}

/// A named subdivision of a project's work
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubActivity {
    pub name: String,
    alias: String,
    pub time_records: BTreeMap<NaiveDate, TimeRecord>,
}

impl SubActivity {
    pub fn new(name: impl Into<String>, alias: impl Into<String>) -> Self {
        Self::with_records(name, alias, BTreeMap::new())
    }

    pub fn with_records(
        name: impl Into<String>,
        alias: impl Into<String>,
        time_records: BTreeMap<NaiveDate, TimeRecord>,
    ) -> Self {
        Self {
            name: name.into(),
            alias: alias.into(),
            time_records,
        }
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }
}

impl Tracked for SubActivity {
    fn time_records(&self) -> &BTreeMap<NaiveDate, TimeRecord> {
        &self.time_records
    }

    fn time_records_mut(&mut self) -> &mut BTreeMap<NaiveDate, TimeRecord> {
        &mut self.time_records
    }
}

/// A project with its own daily records and a list of sub-activities.
///
/// The project's records are independent of its sub-activities' records:
/// the project total for a day is tracked on its own, not summed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
    pub name: String,
    pub dz_number: String,
    alias: String,
    pub time_records: BTreeMap<NaiveDate, TimeRecord>,
    sub_activities: Vec<SubActivity>,
}

impl Project {
    pub fn new(
        name: impl Into<String>,
        dz_number: impl Into<String>,
        alias: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            dz_number: dz_number.into(),
            alias: alias.into(),
            time_records: BTreeMap::new(),
            sub_activities: Vec::new(),
        }
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn sub_activities(&self) -> &[SubActivity] {
        &self.sub_activities
    }

    pub fn sub_activities_mut(&mut self) -> impl Iterator<Item = &mut SubActivity> {
        self.sub_activities.iter_mut()
    }

    /// Append a sub-activity. Returns `None` if the alias is already taken
    /// within this project.
    pub fn add_sub_activity(
        &mut self,
        name: impl Into<String>,
        alias: impl Into<String>,
    ) -> Option<&mut SubActivity> {
        self.push_sub_activity(SubActivity::new(name, alias))
    }

    pub(crate) fn push_sub_activity(&mut self, sub: SubActivity) -> Option<&mut SubActivity> {
        if self.get_sub_activity(sub.alias()).is_some() {
            return None;
        }
        self.sub_activities.push(sub);
        self.sub_activities.last_mut()
    }

    pub fn remove_sub_activity(&mut self, alias: &str) -> bool {
        match self.sub_activities.iter().position(|s| s.alias == alias) {
            Some(index) => {
                self.sub_activities.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn get_sub_activity(&self, alias: &str) -> Option<&SubActivity> {
        self.sub_activities.iter().find(|s| s.alias == alias)
    }

    pub fn get_sub_activity_mut(&mut self, alias: &str) -> Option<&mut SubActivity> {
        self.sub_activities.iter_mut().find(|s| s.alias == alias)
    }

    pub fn sub_activity_aliases(&self) -> Vec<&str> {
        self.sub_activities.iter().map(SubActivity::alias).collect()
    }
}

impl Tracked for Project {
    fn time_records(&self) -> &BTreeMap<NaiveDate, TimeRecord> {
        &self.time_records
    }

    fn time_records_mut(&mut self) -> &mut BTreeMap<NaiveDate, TimeRecord> {
        &mut self.time_records
    }
}
