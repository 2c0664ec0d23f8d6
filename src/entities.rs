//! On-disk representation of the project tree.
//!
//! The typed model in [`crate::models`] never sees raw JSON. Everything read
//! from disk passes through the entity types here and is converted in one
//! place, so `to_mapping(from_mapping(d)) == d` holds for well-formed input.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use tracing::warn;

use crate::error::StoreError;
use crate::models::{Project, SubActivity, TimeRecord};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRecordEntity {
    /// Always written; on read the map key is authoritative
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub total_seconds: u64,
    #[serde(default)]
    pub last_started: Option<NaiveDateTime>,
    #[serde(default)]
    pub is_running: bool,
    #[serde(default)]
    pub sub_activity_seconds: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubActivityEntity {
    pub name: String,
    pub alias: String,
    #[serde(default)]
    pub time_records: BTreeMap<NaiveDate, TimeRecordEntity>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectEntity {
    pub name: String,
    #[serde(default)]
    pub dz_number: String,
    pub alias: String,
    #[serde(default)]
    pub sub_activities: Vec<SubActivityEntity>,
    #[serde(default)]
    pub time_records: BTreeMap<NaiveDate, TimeRecordEntity>,
}

/// The whole data file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectsFileEntity {
    #[serde(default)]
    pub projects: Vec<ProjectEntity>,
    #[serde(default)]
    pub current_project_alias: Option<String>,
    #[serde(default)]
    pub current_sub_activity_alias: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_saved: Option<NaiveDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
}

impl TimeRecordEntity {
    fn into_record(self, date: NaiveDate) -> TimeRecord {
        let last_started = match (self.is_running, self.last_started) {
            (true, Some(started)) => Some(started),
            (true, None) => {
                warn!(%date, "Record marked running without a start time, treating it as stopped");
                None
            }
            (false, Some(started)) => {
                warn!(%date, %started, "Stopped record carries a start time, dropping it");
                None
            }
            (false, None) => None,
        };

        TimeRecord::restore(
            date,
            self.total_seconds,
            last_started,
            self.sub_activity_seconds,
        )
    }
}

impl From<&TimeRecord> for TimeRecordEntity {
    fn from(record: &TimeRecord) -> Self {
        Self {
            date: Some(record.date),
            total_seconds: record.total_seconds,
            last_started: record.last_started(),
            is_running: record.is_running(),
            sub_activity_seconds: record.sub_activity_seconds.clone(),
        }
    }
}

fn records_from_entities(
    records: BTreeMap<NaiveDate, TimeRecordEntity>,
) -> BTreeMap<NaiveDate, TimeRecord> {
    records
        .into_iter()
        .map(|(date, entity)| (date, entity.into_record(date)))
        .collect()
}

fn records_to_entities(
    records: &BTreeMap<NaiveDate, TimeRecord>,
) -> BTreeMap<NaiveDate, TimeRecordEntity> {
    records
        .iter()
        .map(|(date, record)| (*date, TimeRecordEntity::from(record)))
        .collect()
}

impl From<SubActivityEntity> for SubActivity {
    fn from(entity: SubActivityEntity) -> Self {
        SubActivity::with_records(
            entity.name,
            entity.alias,
            records_from_entities(entity.time_records),
        )
    }
}

impl From<&SubActivity> for SubActivityEntity {
    fn from(sub: &SubActivity) -> Self {
        Self {
            name: sub.name.clone(),
            alias: sub.alias().to_string(),
            time_records: records_to_entities(&sub.time_records),
        }
    }
}

impl TryFrom<ProjectEntity> for Project {
    type Error = StoreError;

    fn try_from(entity: ProjectEntity) -> Result<Self, Self::Error> {
        let mut project = Project::new(entity.name, entity.dz_number, entity.alias);
        project.time_records = records_from_entities(entity.time_records);

        for sub in entity.sub_activities {
            let alias = sub.alias.clone();
            if project.push_sub_activity(sub.into()).is_none() {
                return Err(StoreError::Structure(format!(
                    "duplicate sub-activity alias '{}' in project '{}'",
                    alias,
                    project.alias()
                )));
            }
        }

        Ok(project)
    }
}

impl From<&Project> for ProjectEntity {
    fn from(project: &Project) -> Self {
        Self {
            name: project.name.clone(),
            dz_number: project.dz_number.clone(),
            alias: project.alias().to_string(),
            sub_activities: project
                .sub_activities()
                .iter()
                .map(SubActivityEntity::from)
                .collect(),
            time_records: records_to_entities(&project.time_records),
        }
    }
}

/// Convert a list of entities, rejecting the whole list if two projects
/// share an alias.
pub fn projects_from_entities(entities: Vec<ProjectEntity>) -> Result<Vec<Project>, StoreError> {
    let mut seen = HashSet::new();
    let mut projects = Vec::with_capacity(entities.len());

    for entity in entities {
        if !seen.insert(entity.alias.clone()) {
            return Err(StoreError::Structure(format!(
                "duplicate project alias '{}'",
                entity.alias
            )));
        }
        projects.push(Project::try_from(entity)?);
    }

    Ok(projects)
}

impl TimeRecord {
    /// Build a record from a plain JSON mapping stored under `date`
    pub fn from_mapping(date: NaiveDate, value: Value) -> Result<Self, StoreError> {
        let entity: TimeRecordEntity = serde_json::from_value(value)?;
        Ok(entity.into_record(date))
    }

    pub fn to_mapping(&self) -> Result<Value, StoreError> {
        Ok(serde_json::to_value(TimeRecordEntity::from(self))?)
    }
}

impl SubActivity {
    pub fn from_mapping(value: Value) -> Result<Self, StoreError> {
        let entity: SubActivityEntity = serde_json::from_value(value)?;
        Ok(entity.into())
    }

    pub fn to_mapping(&self) -> Result<Value, StoreError> {
        Ok(serde_json::to_value(SubActivityEntity::from(self))?)
    }
}

impl Project {
    /// Build a project tree from a plain JSON mapping, recursively
    /// normalizing sub-activities and daily records.
    pub fn from_mapping(value: Value) -> Result<Self, StoreError> {
        let entity: ProjectEntity = serde_json::from_value(value)?;
        Project::try_from(entity)
    }

    pub fn to_mapping(&self) -> Result<Value, StoreError> {
        Ok(serde_json::to_value(ProjectEntity::from(self))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Tracked;
    use serde_json::json;

    fn well_formed_project() -> Value {
        json!({
            "name": "Website",
            "dz_number": "DZ-2025-001",
            "alias": "web",
            "time_records": {
                "2025-03-13": {
                    "date": "2025-03-13",
                    "total_seconds": 3600,
                    "is_running": false,
                    "last_started": null,
                    "sub_activity_seconds": {}
                },
                "2025-03-14": {
                    "date": "2025-03-14",
                    "total_seconds": 120,
                    "is_running": true,
                    "last_started": "2025-03-14T09:15:30.123456",
                    "sub_activity_seconds": { "frontend": 60 }
                }
            },
            "sub_activities": [
                {
                    "name": "Frontend",
                    "alias": "frontend",
                    "time_records": {
                        "2025-03-14": {
                            "date": "2025-03-14",
                            "total_seconds": 60,
                            "is_running": false,
                            "last_started": null,
                            "sub_activity_seconds": {}
                        }
                    }
                },
                { "name": "Backend", "alias": "backend", "time_records": {} }
            ]
        })
    }

    #[test]
    fn test_project_from_mapping_builds_typed_tree() {
        let project = Project::from_mapping(well_formed_project()).unwrap();
        let day = NaiveDate::from_ymd_opt(2025, 3, 14).unwrap();

        assert_eq!(project.alias(), "web");
        assert_eq!(project.dz_number, "DZ-2025-001");
        assert_eq!(project.time_records.len(), 2);
        assert!(project.is_running_today(day));
        assert_eq!(project.time_records[&day].sub_activity_seconds["frontend"], 60);
        assert_eq!(project.sub_activity_aliases(), vec!["frontend", "backend"]);
        assert_eq!(project.get_sub_activity("frontend").unwrap().total_seconds_on(day), 60);
    }

    #[test]
    fn test_mapping_round_trip_is_exact() {
        let original = well_formed_project();
        let project = Project::from_mapping(original.clone()).unwrap();
        assert_eq!(project.to_mapping().unwrap(), original);
    }

    #[test]
    fn test_normalizing_typed_tree_is_noop() {
        let project = Project::from_mapping(well_formed_project()).unwrap();
        let again = Project::from_mapping(project.to_mapping().unwrap()).unwrap();
        assert_eq!(again, project);
    }

    #[test]
    fn test_record_date_comes_from_key() {
        let day = NaiveDate::from_ymd_opt(2025, 1, 2).unwrap();
        let record = TimeRecord::from_mapping(day, json!({ "total_seconds": 5 })).unwrap();
        assert_eq!(record.date, day);
        assert_eq!(record.total_seconds, 5);
        assert!(!record.is_running());

        let mismatched = TimeRecord::from_mapping(day, json!({ "date": "1999-12-31" })).unwrap();
        assert_eq!(mismatched.date, day);
    }

    #[test]
    fn test_inconsistent_running_state_is_normalized() {
        let day = NaiveDate::from_ymd_opt(2025, 1, 2).unwrap();

        let no_start = TimeRecord::from_mapping(day, json!({ "is_running": true })).unwrap();
        assert!(!no_start.is_running());

        let stale_start = TimeRecord::from_mapping(
            day,
            json!({ "is_running": false, "last_started": "2025-01-02T08:00:00" }),
        )
        .unwrap();
        assert!(!stale_start.is_running());
        assert_eq!(stale_start.last_started(), None);
    }

    #[test]
    fn test_sub_activity_mapping() {
        let sub = SubActivity::from_mapping(json!({
            "name": "Review",
            "alias": "rev",
            "time_records": { "2025-01-02": { "total_seconds": 30 } }
        }))
        .unwrap();

        assert_eq!(sub.alias(), "rev");
        let mapping = sub.to_mapping().unwrap();
        assert_eq!(mapping["time_records"]["2025-01-02"]["date"], "2025-01-02");
        assert_eq!(mapping["time_records"]["2025-01-02"]["is_running"], false);
    }

    #[test]
    fn test_structurally_invalid_mappings_are_rejected() {
        assert!(Project::from_mapping(json!({ "name": "No alias" })).is_err());
        assert!(Project::from_mapping(json!([1, 2, 3])).is_err());
        assert!(Project::from_mapping(json!({
            "name": "Web",
            "alias": "web",
            "time_records": { "not-a-date": {} }
        }))
        .is_err());
        assert!(Project::from_mapping(json!({
            "name": "Web",
            "alias": "web",
            "time_records": { "2025-01-02": { "total_seconds": -5 } }
        }))
        .is_err());
    }

    #[test]
    fn test_duplicate_sub_activity_alias_rejected() {
        let result = Project::from_mapping(json!({
            "name": "Web",
            "alias": "web",
            "sub_activities": [
                { "name": "A", "alias": "dup" },
                { "name": "B", "alias": "dup" }
            ]
        }));
        assert!(matches!(result, Err(StoreError::Structure(_))));
    }

    #[test]
    fn test_duplicate_project_alias_rejected() {
        let entity: ProjectEntity =
            serde_json::from_value(json!({ "name": "Web", "alias": "web" })).unwrap();
        let result = projects_from_entities(vec![entity.clone(), entity]);
        assert!(matches!(result, Err(StoreError::Structure(_))));
    }
}
