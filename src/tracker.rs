use chrono::{Duration, NaiveDate, NaiveDateTime};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::{Config, Environment};
use crate::entities::{projects_from_entities, ProjectEntity, ProjectsFileEntity};
use crate::models::{Project, SubActivity, Tracked};
use crate::store::{self, DataStore};

/// Owns the project list, the current selection and its persistence.
///
/// Failures never escape as errors: they are logged and reported as `false`
/// (or `None`), leaving the in-memory state as it was.
pub struct ProjectDataManager {
    config: Config,
    store: DataStore,
    clock: Arc<dyn Clock>,
    projects: Vec<Project>,
    current_project_alias: Option<String>,
    current_sub_activity_alias: Option<String>,
    auto_save_interval: Duration,
    last_save: Option<NaiveDateTime>,
}

impl ProjectDataManager {
    /// Manager for the data file of the configured environment
    pub fn new(config: Config) -> Self {
        let data_file = config.data_file();
        Self::with_data_file(config, data_file)
    }

    /// Manager for an explicit data file
    pub fn with_data_file(config: Config, data_file: impl Into<PathBuf>) -> Self {
        let auto_save_interval = seconds(config.auto_save_interval());
        let store = DataStore::new(data_file, config.backup_policy());
        Self {
            config,
            store,
            clock: Arc::new(SystemClock),
            projects: Vec::new(),
            current_project_alias: None,
            current_sub_activity_alias: None,
            auto_save_interval,
            last_save: None,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn data_file(&self) -> &Path {
        self.store.path()
    }

    pub fn now(&self) -> NaiveDateTime {
        self.clock.now()
    }

    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }

    pub fn auto_save_interval(&self) -> Duration {
        self.auto_save_interval
    }

    pub fn set_auto_save_interval(&mut self, interval: Duration) {
        self.auto_save_interval = interval;
    }

    // ==================== Persistence ====================

    /// Load projects and the current selection from the data file.
    ///
    /// Returns `false` when the file is missing or invalid; the in-memory
    /// state is then left untouched.
    pub fn load_projects(&mut self) -> bool {
        let path = self.store.path().display().to_string();

        let data = match self.store.read() {
            Ok(Some(data)) => data,
            Ok(None) => {
                info!(%path, "No existing data file found, starting fresh");
                return false;
            }
            Err(err) => {
                error!(%err, "Error loading projects");
                return false;
            }
        };

        let projects = match projects_from_entities(data.projects) {
            Ok(projects) => projects,
            Err(err) => {
                error!(%path, %err, "Error loading projects");
                return false;
            }
        };

        self.projects = projects;
        self.current_project_alias = data.current_project_alias;
        self.current_sub_activity_alias = data.current_sub_activity_alias;

        info!(%path, count = self.projects.len(), "Loaded projects");
        true
    }

    /// Persist projects and the current selection.
    ///
    /// Unless `force` is set, a save within `auto_save_interval` of the last
    /// successful one is skipped and returns `false`.
    pub fn save_projects(&mut self, force: bool) -> bool {
        let now = self.clock.now();

        if !force {
            if let Some(last) = self.last_save {
                if now - last < self.auto_save_interval {
                    debug!("Skipping save, auto-save interval not elapsed");
                    return false;
                }
            }
        }

        let data = ProjectsFileEntity {
            projects: self.projects.iter().map(ProjectEntity::from).collect(),
            current_project_alias: self.current_project_alias.clone(),
            current_sub_activity_alias: self.current_sub_activity_alias.clone(),
            last_saved: Some(now),
            environment: Some(self.config.environment().as_str().to_string()),
        };

        match self.store.write(&data, now) {
            Ok(()) => {
                self.last_save = Some(now);
                info!(path = %self.store.path().display(), "Projects saved");
                true
            }
            Err(err) => {
                error!(%err, "Error saving projects");
                false
            }
        }
    }

    pub fn current_environment(&self) -> Environment {
        self.config.environment()
    }

    /// Save, switch the configuration to `environment` and reload from its
    /// data file. A missing data file means starting fresh and counts as
    /// success.
    ///
    /// If the current data cannot be saved the switch is refused and nothing
    /// changes, unless there is nothing to lose.
    pub fn switch_environment(&mut self, environment: Environment) -> bool {
        if !self.save_projects(true) {
            if self.store.exists() || !self.projects.is_empty() {
                error!(%environment, "Could not save current data, not switching environment");
                return false;
            }
            warn!("Could not save current data before switching environment");
        }

        self.config.set_environment(environment);
        if let Err(err) = self.config.save() {
            warn!("Could not persist environment switch: {err:#}");
        }

        self.store = DataStore::new(self.config.data_file(), self.config.backup_policy());
        self.projects.clear();
        self.current_project_alias = None;
        self.current_sub_activity_alias = None;
        self.last_save = None;

        let success = self.load_projects() || !self.store.exists();
        info!(%environment, success, "Switched environment");
        success
    }

    /// Copy the current environment's data file to `target`
    pub fn copy_data_to_environment(&self, target: Environment) -> bool {
        let source = self.store.path();
        let destination = self.config.data_file_for(target);
        let policy = self.config.backup_policy();

        match store::migrate_data_file(source, &destination, policy.as_ref(), self.clock.now()) {
            Ok(()) => {
                info!(from = %self.current_environment(), to = %target, "Data copied");
                true
            }
            Err(err) => {
                error!(%err, "Error copying data");
                false
            }
        }
    }

    // ==================== Projects ====================

    pub fn projects(&self) -> &[Project] {
        &self.projects
    }

    /// Add a project. An empty alias defaults to the name. Returns `None`
    /// if the alias is already taken.
    pub fn add_project(&mut self, name: &str, dz_number: &str, alias: &str) -> Option<&mut Project> {
        let alias = if alias.trim().is_empty() { name } else { alias };

        if self.get_project(alias).is_some() {
            debug!(alias, "Project alias already exists");
            return None;
        }

        self.projects.push(Project::new(name, dz_number, alias));
        self.projects.last_mut()
    }

    pub fn remove_project(&mut self, alias: &str) -> bool {
        let Some(index) = self.projects.iter().position(|p| p.alias() == alias) else {
            return false;
        };

        self.projects.remove(index);
        if self.current_project_alias.as_deref() == Some(alias) {
            self.current_project_alias = None;
            self.current_sub_activity_alias = None;
        }
        true
    }

    /// Remove a sub-activity, clearing the selection if it pointed at it
    pub fn remove_sub_activity(&mut self, project_alias: &str, alias: &str) -> bool {
        let removed = self
            .get_project_mut(project_alias)
            .is_some_and(|project| project.remove_sub_activity(alias));

        if removed
            && self.current_project_alias.as_deref() == Some(project_alias)
            && self.current_sub_activity_alias.as_deref() == Some(alias)
        {
            self.current_sub_activity_alias = None;
        }
        removed
    }

    pub fn get_project(&self, alias: &str) -> Option<&Project> {
        self.projects.iter().find(|p| p.alias() == alias)
    }

    pub fn get_project_mut(&mut self, alias: &str) -> Option<&mut Project> {
        self.projects.iter_mut().find(|p| p.alias() == alias)
    }

    pub fn get_project_aliases(&self) -> Vec<&str> {
        self.projects.iter().map(Project::alias).collect()
    }

    // ==================== Selection ====================

    pub fn current_project_alias(&self) -> Option<&str> {
        self.current_project_alias.as_deref()
    }

    pub fn current_sub_activity_alias(&self) -> Option<&str> {
        self.current_sub_activity_alias.as_deref()
    }

    pub fn get_current_project(&self) -> Option<&Project> {
        self.get_project(self.current_project_alias.as_deref()?)
    }

    pub fn get_current_sub_activity(&self) -> Option<&SubActivity> {
        let alias = self.current_sub_activity_alias.as_deref()?;
        self.get_current_project()?.get_sub_activity(alias)
    }

    /// Select a project. Always clears the sub-activity selection, even when
    /// the project was already selected.
    pub fn set_current_project(&mut self, alias: &str) -> bool {
        if self.get_project(alias).is_none() {
            return false;
        }

        self.current_project_alias = Some(alias.to_string());
        self.current_sub_activity_alias = None;
        true
    }

    /// Select a sub-activity of the current project, or clear the selection
    /// with `None`
    pub fn set_current_sub_activity(&mut self, alias: Option<&str>) -> bool {
        let Some(alias) = alias else {
            self.current_sub_activity_alias = None;
            return true;
        };

        let exists = self
            .get_current_project()
            .is_some_and(|project| project.get_sub_activity(alias).is_some());
        if exists {
            self.current_sub_activity_alias = Some(alias.to_string());
        }
        exists
    }

    // ==================== Timers ====================

    /// Start today's timer for the current project and, if selected, its
    /// current sub-activity. Any other running timer is stopped first so at
    /// most one selection accumulates time.
    pub fn start_current_timer(&mut self) -> bool {
        if self.get_current_project().is_none() {
            return false;
        }

        self.stop_all_timers();

        let Some(index) = self
            .current_project_alias
            .as_deref()
            .and_then(|alias| self.projects.iter().position(|p| p.alias() == alias))
        else {
            return false;
        };

        let now = self.clock.now();
        let today = now.date();
        let project = &mut self.projects[index];
        project.get_today_record(today).start_timing(now);

        if let Some(alias) = self.current_sub_activity_alias.as_deref() {
            if let Some(sub) = project.get_sub_activity_mut(alias) {
                sub.get_today_record(today).start_timing(now);
            }
        }

        debug!(project = project.alias(), "Timer started");
        true
    }

    /// Stop every running timer of every project and sub-activity
    pub fn stop_all_timers(&mut self) {
        let now = self.clock.now();
        let mut stopped = 0;

        for project in &mut self.projects {
            stopped += project.stop_running(now);
            for sub in project.sub_activities_mut() {
                stopped += sub.stop_running(now);
            }
        }

        if stopped > 0 {
            debug!(stopped, "Timers stopped");
        }
    }

    /// Whether any project or sub-activity is currently timing
    pub fn is_any_timer_running(&self) -> bool {
        self.projects.iter().any(|project| {
            has_running_record(project)
                || project.sub_activities().iter().any(has_running_record)
        })
    }

    /// Today's total for a record owner including the running portion
    pub fn live_seconds_today(&self, owner: &impl Tracked) -> u64 {
        let now = self.clock.now();
        owner
            .time_records()
            .get(&now.date())
            .map_or(0, |record| record.get_current_total_seconds(now))
    }
}

fn has_running_record(owner: &impl Tracked) -> bool {
    owner.time_records().values().any(|record| record.is_running())
}

fn seconds(value: u64) -> Duration {
    let clamped = i64::try_from(value).unwrap_or(i64::MAX).min(i64::MAX / 1000);
    Duration::seconds(clamped)
}
