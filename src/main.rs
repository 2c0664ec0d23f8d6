mod cli;

use anyhow::{bail, Context, Result};
use clap::Parser;

use cli::{Cli, Commands, ConfigAction, EnvAction, ProjectsAction, SubAction};
use tick_tock::config::{self, Config, Environment};
use tick_tock::{format_time, logging, ProjectDataManager, Tracked};

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load();

    if let Err(err) = logging::enable_logging(&config.log_directory(), config.is_debug_mode()) {
        eprintln!("Logging disabled: {err:#}");
    }

    match cli.command {
        Commands::Status => cmd_status(config),
        Commands::Start => cmd_start(config),
        Commands::Stop => cmd_stop(config),
        Commands::Select { project, sub } => cmd_select(config, &project, sub.as_deref()),
        Commands::Projects { action } => match action {
            ProjectsAction::List => cmd_projects_list(config),
            ProjectsAction::Add { name, dz, alias } => cmd_projects_add(config, &name, &dz, &alias),
            ProjectsAction::Remove { alias } => cmd_projects_remove(config, &alias),
        },
        Commands::Sub { action } => match action {
            SubAction::Add {
                project,
                name,
                alias,
            } => cmd_sub_add(config, &project, &name, alias.as_deref()),
            SubAction::Remove { project, alias } => cmd_sub_remove(config, &project, &alias),
        },
        Commands::Env { action } => match action {
            EnvAction::Show => cmd_env_show(&config),
            EnvAction::Switch { environment } => cmd_env_switch(config, environment),
            EnvAction::Copy { target } => cmd_env_copy(config, target),
            EnvAction::DevCopy => cmd_migrate(&config, Environment::Production, Environment::Development),
            EnvAction::Promote => cmd_migrate(&config, Environment::Development, Environment::Production),
        },
        Commands::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(&config),
            ConfigAction::Show => cmd_config_show(&config),
            ConfigAction::Path => {
                println!("{}", config.config_path().display());
                Ok(())
            }
        },
    }
}

/// Open the data file of the configured environment. A file that exists
/// but cannot be loaded is never overwritten.
fn open_manager(config: Config) -> Result<ProjectDataManager> {
    let mut manager = ProjectDataManager::new(config);

    if !manager.load_projects() && manager.data_file().exists() {
        bail!(
            "Could not load {}; fix or remove the file first",
            manager.data_file().display()
        );
    }

    Ok(manager)
}

fn save(manager: &mut ProjectDataManager) -> Result<()> {
    if !manager.save_projects(true) {
        bail!("Failed to save projects to {}", manager.data_file().display());
    }
    Ok(())
}

fn describe_selection(manager: &ProjectDataManager) -> String {
    match (manager.get_current_project(), manager.get_current_sub_activity()) {
        (Some(project), Some(sub)) => format!("{} / {}", project.name, sub.name),
        (Some(project), None) => project.name.clone(),
        _ => "none".to_string(),
    }
}

fn cmd_status(config: Config) -> Result<()> {
    let manager = open_manager(config)?;
    let today = manager.today();

    println!("Environment: {}", manager.current_environment());
    println!("Data file:   {}", manager.data_file().display());
    println!("Selected:    {}", describe_selection(&manager));
    println!();

    if manager.projects().is_empty() {
        println!("No projects yet.");
        return Ok(());
    }

    println!("Today ({}):\n", today);

    for project in manager.projects() {
        let marker = if project.is_running_today(today) { "*" } else { " " };
        println!(
            "{} {:<20} {}  {}",
            marker,
            project.alias(),
            format_time(manager.live_seconds_today(project)),
            project.name
        );

        for sub in project.sub_activities() {
            let marker = if sub.is_running_today(today) { "*" } else { " " };
            println!(
                "  {} {:<18} {}  {}",
                marker,
                sub.alias(),
                format_time(manager.live_seconds_today(sub)),
                sub.name
            );
        }
    }

    Ok(())
}

fn cmd_start(config: Config) -> Result<()> {
    let mut manager = open_manager(config)?;

    if !manager.start_current_timer() {
        bail!("No project selected; use `tick-tock select <project>` first");
    }
    save(&mut manager)?;

    eprintln!("Started tracking: {}", describe_selection(&manager));
    Ok(())
}

fn cmd_stop(config: Config) -> Result<()> {
    let mut manager = open_manager(config)?;

    if !manager.is_any_timer_running() {
        eprintln!("No timer running");
        return Ok(());
    }

    manager.stop_all_timers();
    save(&mut manager)?;

    let today = manager.today();
    if let Some(project) = manager.get_current_project() {
        eprintln!(
            "Stopped tracking: {} (today: {})",
            describe_selection(&manager),
            project.get_total_time_today(today)
        );
    } else {
        eprintln!("Stopped all timers");
    }
    Ok(())
}

/// Change the selection. A running timer moves over to the new selection.
fn cmd_select(config: Config, project: &str, sub: Option<&str>) -> Result<()> {
    let mut manager = open_manager(config)?;
    let was_running = manager.is_any_timer_running();

    if !manager.set_current_project(project) {
        bail!("Unknown project: {}", project);
    }
    if !manager.set_current_sub_activity(sub) {
        bail!("Unknown sub-activity {} in project {}", sub.unwrap_or_default(), project);
    }
    if was_running {
        manager.start_current_timer();
    }
    save(&mut manager)?;

    eprintln!("Selected: {}", describe_selection(&manager));
    Ok(())
}

fn cmd_projects_list(config: Config) -> Result<()> {
    let manager = open_manager(config)?;

    if manager.projects().is_empty() {
        println!("No projects yet.");
        return Ok(());
    }

    println!("Projects:\n");

    for project in manager.projects() {
        println!("  Alias: {}", project.alias());
        println!("  Name:  {}", project.name);
        if !project.dz_number.is_empty() {
            println!("  DZ:    {}", project.dz_number);
        }
        if !project.sub_activities().is_empty() {
            println!("  Subs:  {}", project.sub_activity_aliases().join(", "));
        }
        println!();
    }

    Ok(())
}

fn cmd_projects_add(config: Config, name: &str, dz: &str, alias: &str) -> Result<()> {
    let mut manager = open_manager(config)?;

    let Some(project) = manager.add_project(name, dz, alias) else {
        bail!("A project with that alias already exists");
    };
    let alias = project.alias().to_string();
    save(&mut manager)?;

    println!("Added project: {}", alias);
    Ok(())
}

fn cmd_projects_remove(config: Config, alias: &str) -> Result<()> {
    let mut manager = open_manager(config)?;

    if !manager.remove_project(alias) {
        bail!("Unknown project: {}", alias);
    }
    save(&mut manager)?;

    println!("Removed project: {}", alias);
    Ok(())
}

fn cmd_sub_add(config: Config, project: &str, name: &str, alias: Option<&str>) -> Result<()> {
    let mut manager = open_manager(config)?;
    let alias = alias.filter(|a| !a.trim().is_empty()).unwrap_or(name);

    let target = manager
        .get_project_mut(project)
        .with_context(|| format!("Unknown project: {}", project))?;
    if target.add_sub_activity(name, alias).is_none() {
        bail!("Project {} already has a sub-activity {}", project, alias);
    }
    save(&mut manager)?;

    println!("Added sub-activity {} to {}", alias, project);
    Ok(())
}

fn cmd_sub_remove(config: Config, project: &str, alias: &str) -> Result<()> {
    let mut manager = open_manager(config)?;

    if !manager.remove_sub_activity(project, alias) {
        bail!("Unknown sub-activity {} in project {}", alias, project);
    }
    save(&mut manager)?;

    println!("Removed sub-activity {} from {}", alias, project);
    Ok(())
}

fn cmd_env_show(config: &Config) -> Result<()> {
    for environment in Environment::ALL {
        let marker = if environment == config.environment() { "*" } else { " " };
        println!(
            "{} {:<12} {}",
            marker,
            environment,
            config.data_file_for(environment).display()
        );
    }
    println!();
    println!("Window title: {}", config.window_title());
    Ok(())
}

fn cmd_env_switch(config: Config, environment: Environment) -> Result<()> {
    let mut manager = open_manager(config)?;

    if !manager.switch_environment(environment) {
        bail!(
            "Switched to {} but could not load {}",
            environment,
            manager.data_file().display()
        );
    }

    println!(
        "Switched to {} ({} projects)",
        environment,
        manager.projects().len()
    );
    Ok(())
}

fn cmd_env_copy(config: Config, target: Environment) -> Result<()> {
    let manager = open_manager(config)?;

    if !manager.copy_data_to_environment(target) {
        bail!("Failed to copy {} data to {}", manager.current_environment(), target);
    }

    println!("Copied {} data to {}", manager.current_environment(), target);
    Ok(())
}

fn cmd_migrate(config: &Config, from: Environment, to: Environment) -> Result<()> {
    if !config.migrate_data_file(from, to) {
        bail!("Failed to migrate data from {} to {}", from, to);
    }
    println!("Migrated data from {} to {}", from, to);
    Ok(())
}

fn cmd_config_init(config: &Config) -> Result<()> {
    let path = config::init_config_file(config.config_path())?;
    println!("Configuration initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(config: &Config) -> Result<()> {
    let json = serde_json::to_string_pretty(config.settings())?;
    println!("{}", json);
    println!();
    println!("Effective environment: {}", config.environment());
    println!("Data file:             {}", config.data_file().display());
    println!("Auto-save interval:    {}s", config.auto_save_interval());
    println!("Debug mode:            {}", config.is_debug_mode());
    match config.backup_policy() {
        Some(policy) => println!(
            "Backups:               keep {} in {}",
            policy.max_backups,
            policy.directory.display()
        ),
        None => println!("Backups:               disabled"),
    }
    Ok(())
}
